//! pomelo-server – Bibliotheks-Root
//!
//! Baut aus einer `ServerConfig` einen vollstaendigen Server-Prozess
//! zusammen und stellt ihn fuer Integrationstests bereit.

pub mod config;
pub mod remote;

use anyhow::Result;
use config::{SchedulerArt, ServerConfig};
use pomelo_channel::{
    ChannelPushTarget, ChannelService, ChannelServiceOptionen, ChannelStore, CHANNEL_REMOTE,
};
use pomelo_connector::{ChannelRemote, Connector};
use pomelo_core::{AppContext, RemoteDispatch, RpcInvoker};
use pomelo_dispatch::{MsgRemote, Server, MSG_REMOTE};
use pomelo_push::{
    BroadcastFilter, BufferPushScheduler, DirectPushScheduler, PushSchedulerComponent, Scheduler,
};
use pomelo_session::{SessionRemote, SessionService, SESSION_REMOTE};
use remote::AppRemote;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Optionale Bausteine, die nicht aus der Konfiguration kommen
#[derive(Default)]
pub struct AppOptionen {
    /// Persistenter Kanal-Speicher
    pub store: Option<Arc<dyn ChannelStore>>,
    /// Filter fuer Broadcasts des konfigurierten Schedulers
    pub broadcast_filter: Option<Arc<dyn BroadcastFilter>>,
    /// Ersetzt den konfigurierten Scheduler (z.B. eine Auswahl-Komponente)
    pub scheduler: Option<Arc<dyn Scheduler>>,
}

/// Haelt den Zustand eines Server-Prozesses zusammen
pub struct App {
    config: ServerConfig,
    server: Arc<Server>,
    sessions: Arc<SessionService>,
    kanaele: Arc<ChannelService>,
    connector: Option<Arc<Connector>>,
    remote: Arc<dyn RemoteDispatch>,
}

impl App {
    pub fn neu(config: ServerConfig, rpc: Arc<dyn RpcInvoker>) -> Self {
        Self::mit_optionen(config, rpc, AppOptionen::default())
    }

    pub fn mit_optionen(config: ServerConfig, rpc: Arc<dyn RpcInvoker>, optionen: AppOptionen) -> Self {
        let ctx = AppContext::neu(config.server_info(), config.cluster.clone(), rpc);
        let server = Server::neu(Arc::clone(&ctx));
        let sessions = Arc::new(SessionService::neu(config.server.single_session));

        let mut remote = AppRemote::neu();
        let mut lokal: Option<Arc<dyn ChannelPushTarget>> = None;
        let connector = if config.server.frontend {
            let scheduler = optionen.scheduler.unwrap_or_else(|| {
                scheduler_erstellen(&config, &sessions, optionen.broadcast_filter)
            });
            let connector = Connector::neu(
                Arc::clone(&server),
                Arc::clone(&sessions),
                scheduler,
                config.connector_optionen(),
            );
            let channel_remote = Arc::new(ChannelRemote::neu(Arc::clone(&connector)));
            lokal = Some(Arc::clone(&channel_remote) as Arc<dyn ChannelPushTarget>);
            remote = remote
                .dienst(SESSION_REMOTE, Arc::new(SessionRemote::neu(Arc::clone(&sessions))))
                .dienst(CHANNEL_REMOTE, channel_remote);
            Some(connector)
        } else {
            remote = remote.dienst(MSG_REMOTE, Arc::new(MsgRemote::neu(Arc::clone(&server))));
            None
        };

        let kanaele = ChannelService::neu(
            ctx,
            ChannelServiceOptionen {
                praefix: config.kanal.praefix.clone(),
                store: optionen.store,
                lokal,
            },
        );

        tracing::debug!(server = %config.server.id, dienste = ?remote.namen(), "RPC-Dienste registriert");
        Self {
            config,
            server,
            sessions,
            kanaele,
            connector,
            remote: Arc::new(remote),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn server(&self) -> &Arc<Server> {
        &self.server
    }

    pub fn sessions(&self) -> &Arc<SessionService> {
        &self.sessions
    }

    pub fn kanaele(&self) -> &Arc<ChannelService> {
        &self.kanaele
    }

    /// Nur auf Frontends vorhanden
    pub fn connector(&self) -> Option<&Arc<Connector>> {
        self.connector.as_ref()
    }

    /// Eingang fuer RPCs an diesen Server
    pub fn remote(&self) -> &Arc<dyn RemoteDispatch> {
        &self.remote
    }

    /// Startet den Server; liefert bei Frontends die Client-Adresse
    ///
    /// Reihenfolge:
    /// 1. Dispatch-Pipeline freigeben
    /// 2. Kanaele aus dem Speicher wiederherstellen
    /// 3. Listener binden und Connector starten (nur Frontends)
    pub async fn starten(&self) -> Result<Option<SocketAddr>> {
        self.server.start()?;
        self.kanaele.restore().await?;

        let adresse = match &self.connector {
            Some(connector) => {
                let listener = TcpListener::bind(self.config.bind_adresse()).await?;
                Some(connector.starten(listener).await?)
            }
            None => None,
        };

        tracing::info!(
            server = %self.config.server.id,
            typ = %self.config.server.typ,
            adresse = ?adresse,
            "Server gestartet"
        );
        Ok(adresse)
    }

    pub async fn stoppen(&self) -> Result<()> {
        if let Some(connector) = &self.connector {
            connector.stoppen(false).await?;
        }
        self.server.stop();
        tracing::info!(server = %self.config.server.id, "Server gestoppt");
        Ok(())
    }

    /// Startet und laeuft bis Ctrl-C
    pub async fn laufen(self) -> Result<()> {
        self.starten().await?;
        tracing::info!("Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");
        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutdown-Signal empfangen, Server wird beendet");
        self.stoppen().await
    }
}

fn scheduler_erstellen(
    config: &ServerConfig,
    sessions: &Arc<SessionService>,
    filter: Option<Arc<dyn BroadcastFilter>>,
) -> Arc<dyn Scheduler> {
    let scheduler: Arc<dyn Scheduler> = match (config.scheduler.art, filter) {
        (SchedulerArt::Direct, None) => Arc::new(DirectPushScheduler::neu(Arc::clone(sessions))),
        (SchedulerArt::Direct, Some(filter)) => {
            Arc::new(DirectPushScheduler::neu(Arc::clone(sessions)).mit_filter(filter))
        }
        (SchedulerArt::Buffer, filter) => {
            let buffer = BufferPushScheduler::mit_intervall(Arc::clone(sessions), config.flush_intervall());
            match filter {
                Some(filter) => Arc::new(buffer.mit_filter(filter)),
                None => Arc::new(buffer),
            }
        }
    };
    Arc::new(PushSchedulerComponent::einzel(scheduler))
}
