//! Fehlertypen fuer Pomelo
//!
//! Zentraler Fehler-Enum fuer Routing, Sessions, Kanaele und die RPC-Grenze.
//! Der Typ ist `Clone`, weil ein Fehler sowohl an den Aufrufer als auch an
//! die After-Filter geht, und wird ueber RPC als Text transportiert.

use thiserror::Error;

use crate::types::SessionId;

/// Globaler Result-Alias fuer Pomelo
pub type PomeloResult<T> = std::result::Result<T, PomeloError>;

/// Alle moeglichen Fehler im Routing- und Zustellkern
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PomeloError {
    // --- Routing ---
    #[error("Ungueltige Route: {0}")]
    UngueltigeRoute(String),

    #[error("Kein Handler fuer Route: {0}")]
    UnbekannterHandler(String),

    #[error("Kein Server vom Typ: {0}")]
    KeinServer(String),

    // --- Sessions ---
    #[error("Session nicht gefunden: {0}")]
    SessionNichtGefunden(SessionId),

    #[error("Session ist geschlossen: {0}")]
    SessionGeschlossen(SessionId),

    #[error("Session {sid} ist bereits an uid {gebunden} gebunden")]
    BereitsGebunden { sid: SessionId, gebunden: String },

    #[error("Session {sid} ist nicht an uid {uid} gebunden")]
    NichtGebunden { sid: SessionId, uid: String },

    #[error("uid {0} hat bereits eine Session (single session)")]
    EinzelSession(String),

    #[error("Session {sid} ist fuer uid {uid} bereits registriert")]
    DoppelteSession { sid: SessionId, uid: String },

    // --- Kanaele ---
    #[error("Kanal ist zerstoert: {0}")]
    KanalZerstoert(String),

    #[error("Alle Empfaenger fehlgeschlagen: {0}")]
    AlleFehlgeschlagen(String),

    // --- Zustand ---
    #[error("Ungueltiger Zustand: {0}")]
    Zustand(String),

    // --- RPC ---
    #[error("RPC-Fehler: {0}")]
    Rpc(String),

    #[error("Ungueltige RPC-Argumente: {0}")]
    RpcArgumente(String),

    // --- Protokoll ---
    #[error("Protokollfehler: {0}")]
    Protokoll(String),

    #[error("Zeitlimit ueberschritten: {0}")]
    Zeitlimit(String),

    // --- Latch ---
    #[error("CountDownLatch falsch benutzt: {0}")]
    Latch(String),

    // --- Anwendung ---
    #[error("Anwendungsfehler ({code}): {nachricht}")]
    Anwendung { code: u32, nachricht: String },

    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl PomeloError {
    /// Erstellt einen internen Fehler aus einer beliebigen Nachricht
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Erstellt einen RPC-Fehler aus einer beliebigen Nachricht
    pub fn rpc(msg: impl Into<String>) -> Self {
        Self::Rpc(msg.into())
    }

    /// Fehlercode fuer die Client-Antwort
    ///
    /// Anwendungsfehler behalten ihren eigenen Code, alles andere ist 500.
    pub fn code(&self) -> u32 {
        match self {
            Self::Anwendung { code, .. } => *code,
            _ => 500,
        }
    }
}

impl From<serde_json::Error> for PomeloError {
    fn from(e: serde_json::Error) -> Self {
        Self::RpcArgumente(e.to_string())
    }
}
