//! Zustelloptionen fuer Push-Nachrichten
//!
//! Die Optionen reisen mit Kanal-Pushes und Broadcasts ueber die RPC-Grenze
//! bis zum Scheduler des Frontend-Servers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Art der Zustellung
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushArt {
    /// Push an eine Liste von Sessions
    #[default]
    Push,
    /// Broadcast an alle (oder alle gebundenen) Sessions
    Broadcast,
    /// Antwort auf einen Request
    Response,
}

/// Optionen eines `schedule`-Aufrufs
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushOptions {
    pub art: PushArt,
    /// Nur an Sessions mit gebundener uid (nur Broadcast)
    pub binded: bool,
    /// Parameter fuer den registrierten Broadcast-Filter
    pub filter_param: Option<Value>,
    /// Unveraenderte Optionen des Aufrufers
    pub user_options: Option<Value>,
}

impl PushOptions {
    pub fn push() -> Self {
        Self::default()
    }

    pub fn response() -> Self {
        Self {
            art: PushArt::Response,
            ..Self::default()
        }
    }

    pub fn broadcast(binded: bool, filter_param: Option<Value>) -> Self {
        Self {
            art: PushArt::Broadcast,
            binded,
            filter_param,
            user_options: None,
        }
    }

    pub fn ist_broadcast(&self) -> bool {
        self.art == PushArt::Broadcast
    }
}
