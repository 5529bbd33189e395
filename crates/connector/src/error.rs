//! Fehlertypen fuer den Connector

use pomelo_core::PomeloError;
use thiserror::Error;

/// Fehler auf Verbindungsebene
///
/// Erreichen nie den Anwendungscode: sie werden geloggt und schliessen die
/// betroffene Verbindung.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// IO-Fehler (TCP, Socket)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket-Handshake oder -Frame fehlgeschlagen
    #[error("WebSocket-Fehler: {0}")]
    WebSocket(String),

    /// Protokollverletzung (ungueltiger Pakettyp, Paket zu gross, ...)
    #[error("Protokollfehler: {0}")]
    Protokoll(String),

    /// Kein Paket innerhalb der erlaubten Zeit
    #[error("Zeitlimit: {0}")]
    Zeitlimit(&'static str),

    /// Fehler aus den Pomelo-Diensten (Scheduler, Kodierung)
    #[error(transparent)]
    Pomelo(#[from] PomeloError),
}

impl From<tokio_tungstenite::tungstenite::Error> for ConnectorError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(e.to_string())
    }
}

/// Result-Typ fuer den Connector
pub type ConnectorResult<T> = Result<T, ConnectorError>;
