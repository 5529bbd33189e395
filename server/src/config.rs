//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass ein einzelner Connector-Server ohne
//! Konfigurationsdatei lauffaehig ist.

use pomelo_connector::{ConnectorOptionen, SchliessArt};
use pomelo_core::ServerInfo;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Identitaet dieses Servers
    pub server: ServerEinstellungen,
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Client-Verbindungen (nur Frontends)
    pub connector: ConnectorEinstellungen,
    /// Push-Scheduler
    pub scheduler: SchedulerEinstellungen,
    /// Kanaele
    pub kanal: KanalEinstellungen,
    /// Statische Cluster-Tabelle
    pub cluster: Vec<ServerInfo>,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

/// Identitaet des Servers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Eindeutige Server-ID
    pub id: String,
    /// Server-Typ, erster Teil jeder Route
    pub typ: String,
    /// Frontends halten Client-Sockets
    pub frontend: bool,
    /// Hoechstens eine Session pro uid
    pub single_session: bool,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            id: "connector-server-1".into(),
            typ: "connector".into(),
            frontend: true,
            single_session: false,
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer Client-Verbindungen (TCP und WebSocket)
    pub bind_adresse: String,
    /// Port fuer Client-Verbindungen (0 = vom Betriebssystem gewaehlt)
    pub port: u16,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            port: 3010,
        }
    }
}

/// Einstellungen fuer Client-Verbindungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorEinstellungen {
    /// Heartbeat-Intervall in Sekunden (0 = aus)
    pub heartbeat_sek: u64,
    /// Leerlauf-Timeout in Sekunden
    pub leerlauf_timeout_sek: u64,
    /// TCP_NODELAY fuer Roh-TCP-Clients
    pub no_delay: bool,
    /// "end" (sauber) oder "destroy" (sofort)
    pub schliessen: SchliessArt,
    /// Maximale Body-Laenge eines Pakets in Bytes
    pub max_paket_groesse: usize,
}

impl Default for ConnectorEinstellungen {
    fn default() -> Self {
        let standard = ConnectorOptionen::default();
        Self {
            heartbeat_sek: standard.heartbeat.map(|hb| hb.as_secs()).unwrap_or(0),
            leerlauf_timeout_sek: standard.leerlauf_timeout.as_secs(),
            no_delay: standard.no_delay,
            schliessen: standard.schliessen,
            max_paket_groesse: standard.max_paket_groesse,
        }
    }
}

/// Art des Push-Schedulers
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerArt {
    #[default]
    Direct,
    Buffer,
}

/// Push-Scheduler-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerEinstellungen {
    pub art: SchedulerArt,
    /// Flush-Takt des Buffer-Schedulers in Millisekunden
    pub flush_intervall_ms: u64,
}

impl Default for SchedulerEinstellungen {
    fn default() -> Self {
        Self {
            art: SchedulerArt::Direct,
            flush_intervall_ms: 20,
        }
    }
}

/// Kanal-Einstellungen
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KanalEinstellungen {
    /// Praefix fuer Schluessel im Kanal-Speicher
    pub praefix: Option<String>,
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: trace, debug, info, warn, error
    pub level: String,
    /// Log-Format: "text" oder "json"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Gibt die vollstaendige Bind-Adresse fuer Client-Verbindungen zurueck
    pub fn bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.port)
    }

    /// Eintrag dieses Servers fuer die Cluster-Tabelle
    pub fn server_info(&self) -> ServerInfo {
        ServerInfo {
            host: self.netzwerk.bind_adresse.clone(),
            port: self.netzwerk.port,
            ..ServerInfo::neu(&self.server.id, &self.server.typ, self.server.frontend)
        }
    }

    pub fn connector_optionen(&self) -> ConnectorOptionen {
        let c = &self.connector;
        ConnectorOptionen {
            heartbeat: (c.heartbeat_sek > 0).then(|| Duration::from_secs(c.heartbeat_sek)),
            leerlauf_timeout: Duration::from_secs(c.leerlauf_timeout_sek),
            no_delay: c.no_delay,
            schliessen: c.schliessen,
            max_paket_groesse: c.max_paket_groesse,
        }
    }

    pub fn flush_intervall(&self) -> Duration {
        Duration::from_millis(self.scheduler.flush_intervall_ms)
    }
}
