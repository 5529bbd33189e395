//! Pomelo Server – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet den Server.
//! Ohne RPC-Transport laeuft der Prozess als einzelner Server; Aufrufe an
//! andere Server der Cluster-Tabelle schlagen fehl.

use anyhow::Result;
use pomelo_core::DisconnectedRpc;
use pomelo_server::{config::ServerConfig, App};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad = std::env::var("POMELO_CONFIG").unwrap_or_else(|_| "config.toml".into());

    // Konfiguration laden (Standardwerte falls Datei fehlt)
    let config = ServerConfig::laden(&config_pfad)?;

    // Logging initialisieren
    logging_initialisieren(&config.logging.level, &config.logging.format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        server = %config.server.id,
        "Pomelo Server wird initialisiert"
    );

    let app = App::neu(config, Arc::new(DisconnectedRpc));
    app.laufen().await
}

/// Initialisiert tracing-subscriber mit dem konfigurierten Level und Format
///
/// `POMELO_LOG_LEVEL` ueberschreibt das Level aus der Konfiguration.
fn logging_initialisieren(level: &str, format: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_env("POMELO_LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt().with_env_filter(filter).with_target(true).init();
        }
    }
}
