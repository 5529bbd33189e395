//! Routen und Client-Nachrichten
//!
//! Eine Route hat immer die Form `serverTyp.handler.methode`.

use pomelo_core::{PomeloError, PomeloResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Eine dekodierte Client-Nachricht, wie sie durch die Pipeline laeuft
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientMessage {
    /// Request-ID; 0 bei Notify
    #[serde(default)]
    pub id: u32,
    pub route: String,
    #[serde(default)]
    pub body: Value,
}

impl ClientMessage {
    pub fn neu(id: u32, route: impl Into<String>, body: Value) -> Self {
        Self {
            id,
            route: route.into(),
            body,
        }
    }

    /// Notify-Nachrichten erwarten keine Antwort
    pub fn ist_notify(&self) -> bool {
        self.id == 0
    }
}

/// Zerlegte Route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRecord {
    pub route: String,
    pub server_typ: String,
    pub handler: String,
    pub method: String,
}

impl RouteRecord {
    /// Zerlegt `serverTyp.handler.methode`; alles andere ist ungueltig
    pub fn parsen(route: &str) -> PomeloResult<Self> {
        let mut teile = route.split('.');
        match (teile.next(), teile.next(), teile.next(), teile.next()) {
            (Some(typ), Some(handler), Some(method), None)
                if !typ.is_empty() && !handler.is_empty() && !method.is_empty() =>
            {
                Ok(Self {
                    route: route.to_string(),
                    server_typ: typ.to_string(),
                    handler: handler.to_string(),
                    method: method.to_string(),
                })
            }
            _ => Err(PomeloError::UngueltigeRoute(route.to_string())),
        }
    }
}
