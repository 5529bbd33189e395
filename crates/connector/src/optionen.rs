//! Laufzeitoptionen des Connectors

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Wie eine Verbindung geschlossen wird
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchliessArt {
    /// Ausstehende Daten schreiben, dann FIN bzw. Close-Frame
    #[default]
    End,
    /// Sofort verwerfen
    Destroy,
}

#[derive(Debug, Clone)]
pub struct ConnectorOptionen {
    /// Heartbeat-Intervall, das der Client im Handshake erhaelt (`None` = aus)
    pub heartbeat: Option<Duration>,
    /// Maximale Stille vor der Klassifizierung und zwischen zwei Lesevorgaengen
    pub leerlauf_timeout: Duration,
    /// TCP_NODELAY fuer Roh-TCP-Clients
    pub no_delay: bool,
    pub schliessen: SchliessArt,
    /// Maximale Body-Laenge eines Pakets
    pub max_paket_groesse: usize,
}

impl Default for ConnectorOptionen {
    fn default() -> Self {
        Self {
            heartbeat: Some(Duration::from_secs(30)),
            leerlauf_timeout: Duration::from_secs(90),
            no_delay: true,
            schliessen: SchliessArt::End,
            max_paket_groesse: pomelo_protocol::package::MAX_BODY_LAENGE,
        }
    }
}

impl ConnectorOptionen {
    /// Nach dieser Zeit ohne Paket gilt der Client als tot
    pub fn heartbeat_timeout(&self) -> Option<Duration> {
        self.heartbeat.map(|hb| hb * 2)
    }
}
