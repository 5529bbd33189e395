//! Gemeinsame Identifikationstypen fuer Pomelo
//!
//! Newtypes verhindern Verwechslungen zwischen Session-IDs (pro Socket) und
//! Server-IDs (pro Prozess) zur Compilezeit.

use serde::{Deserialize, Serialize};

/// Session-ID, eindeutig innerhalb eines Frontend-Prozesses
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl SessionId {
    /// Gibt den inneren Zaehlerwert zurueck
    pub fn inner(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session:{}", self.0)
    }
}

/// Server-ID eines Prozesses im Cluster (z.B. "connector-server-1")
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(pub String);

impl ServerId {
    /// Erstellt eine ServerId aus einem beliebigen String
    pub fn neu(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Gibt die ID als `&str` zurueck
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leere IDs sind als Gruppenschluessel ungueltig
    pub fn ist_leer(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for ServerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Eintrag der Cluster-Tabelle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Eindeutige Server-ID
    pub id: ServerId,
    /// Server-Typ (z.B. "connector", "chat")
    pub typ: String,
    /// Host fuer Client- oder RPC-Verbindungen
    #[serde(default)]
    pub host: String,
    /// Port fuer Client- oder RPC-Verbindungen
    #[serde(default)]
    pub port: u16,
    /// Frontend-Server haben eigene Client-Sockets
    #[serde(default)]
    pub frontend: bool,
}

impl ServerInfo {
    /// Erstellt einen minimalen Eintrag ohne Netzwerkadresse
    pub fn neu(id: impl Into<String>, typ: impl Into<String>, frontend: bool) -> Self {
        Self {
            id: ServerId::neu(id),
            typ: typ.into(),
            host: String::new(),
            port: 0,
            frontend,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_display() {
        assert_eq!(SessionId(42).to_string(), "session:42");
    }

    #[test]
    fn server_id_leer() {
        assert!(ServerId::neu("").ist_leer());
        assert!(!ServerId::from("f1").ist_leer());
    }

    #[test]
    fn ids_sind_serde_transparent() {
        let json = serde_json::to_string(&SessionId(9)).unwrap();
        assert_eq!(json, "9");
        let sid: ServerId = serde_json::from_str("\"connector-1\"").unwrap();
        assert_eq!(sid.as_str(), "connector-1");
    }

    #[test]
    fn server_info_aus_json_mit_standardwerten() {
        let info: ServerInfo = serde_json::from_str(r#"{"id":"chat-1","typ":"chat"}"#).unwrap();
        assert_eq!(info.id, ServerId::neu("chat-1"));
        assert!(!info.frontend);
        assert_eq!(info.port, 0);
    }
}
