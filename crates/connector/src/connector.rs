//! Connector – Frontend-Komponente zwischen Clients und Server
//!
//! Vergibt Session-IDs, reicht dekodierte Client-Nachrichten an
//! `Server::global_handle` weiter und kodiert Antworten und Pushes fuer den
//! Push-Scheduler.

use bytes::Bytes;
use pomelo_core::{PomeloResult, PushArt, PushOptions, SessionId};
use pomelo_dispatch::{ClientMessage, Server};
use pomelo_protocol::{Nachricht, NachrichtenTyp, Paket, PaketTyp};
use pomelo_push::Scheduler;
use pomelo_session::{FrontendSession, Session, SessionService, SessionSocket};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::error::ConnectorResult;
use crate::optionen::ConnectorOptionen;
use crate::switcher::Switcher;

pub struct Connector {
    server: Arc<Server>,
    sessions: Arc<SessionService>,
    scheduler: Arc<dyn Scheduler>,
    optionen: ConnectorOptionen,
    naechste_sid: AtomicU64,
    shutdown: watch::Sender<bool>,
}

impl Connector {
    pub fn neu(
        server: Arc<Server>,
        sessions: Arc<SessionService>,
        scheduler: Arc<dyn Scheduler>,
        optionen: ConnectorOptionen,
    ) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            server,
            sessions,
            scheduler,
            optionen,
            naechste_sid: AtomicU64::new(1),
            shutdown,
        })
    }

    pub fn server(&self) -> &Arc<Server> {
        &self.server
    }

    pub fn sessions(&self) -> &Arc<SessionService> {
        &self.sessions
    }

    pub fn optionen(&self) -> &ConnectorOptionen {
        &self.optionen
    }

    // -----------------------------------------------------------------------
    // Lebenszyklus
    // -----------------------------------------------------------------------

    /// Startet den Scheduler und den Switcher auf `listener`
    pub async fn starten(self: &Arc<Self>, listener: TcpListener) -> ConnectorResult<SocketAddr> {
        self.scheduler.start().await?;
        let adresse = listener.local_addr()?;
        let switcher = Switcher::neu(listener, Arc::clone(self));
        tokio::spawn(switcher.annehmen(self.shutdown.subscribe()));
        tracing::info!(adresse = %adresse, server = %self.server.ctx().server_id(), "Connector gestartet");
        Ok(adresse)
    }

    /// Stoppt die Annahme, schliesst alle Verbindungen und leert den Scheduler
    pub async fn stoppen(&self, force: bool) -> ConnectorResult<()> {
        self.shutdown.send_replace(true);
        self.scheduler.stop(force).await?;
        tracing::info!(server = %self.server.ctx().server_id(), "Connector gestoppt");
        Ok(())
    }

    pub(crate) fn shutdown_abonnieren(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    // -----------------------------------------------------------------------
    // Sessions und Nachrichten
    // -----------------------------------------------------------------------

    /// Legt die Session einer neuen Verbindung an
    pub(crate) fn session_anlegen(&self, socket: Arc<dyn SessionSocket>) -> Arc<Session> {
        let sid = SessionId(self.naechste_sid.fetch_add(1, Ordering::Relaxed));
        self.sessions
            .create(sid, self.server.ctx().server_id().clone(), socket)
    }

    /// Verarbeitet eine dekodierte Client-Nachricht
    ///
    /// Nur ein Request bekommt eine Antwort; bei einem Fehler lautet sie
    /// `{code: 500}`.
    pub(crate) async fn nachricht_behandeln(self: Arc<Self>, session: Arc<Session>, nachricht: Nachricht) {
        let body = match nachricht.body_json() {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(sid = %session.id(), route = %nachricht.route, fehler = %e, "Nachricht verworfen");
                return;
            }
        };
        let ist_request = nachricht.typ == NachrichtenTyp::Request;
        let msg = ClientMessage::neu(nachricht.id, nachricht.route, body);
        let route = msg.route.clone();
        let proxy = FrontendSession::neu(Arc::clone(&session), Arc::clone(&self.sessions));

        let ergebnis = self.server.global_handle(msg, proxy).await;
        if !ist_request {
            if let Err(e) = ergebnis {
                tracing::debug!(sid = %session.id(), route = %route, fehler = %e, "Notify fehlgeschlagen");
            }
            return;
        }

        let antwort = match ergebnis {
            Ok(antwort) => antwort,
            Err(e) => {
                tracing::warn!(sid = %session.id(), route = %route, fehler = %e, "Request fehlgeschlagen");
                json!({ "code": 500 })
            }
        };
        let opts = PushOptions::response();
        if let Err(e) = self.send(nachricht.id, &route, &antwort, &[session.id()], &opts).await {
            tracing::warn!(sid = %session.id(), route = %route, fehler = %e, "Antwort nicht zugestellt");
        }
    }

    /// Kodiert eine Antwort oder einen Push und uebergibt ihn dem Scheduler
    pub async fn send(
        &self,
        req_id: u32,
        route: &str,
        body: &Value,
        recvs: &[SessionId],
        opts: &PushOptions,
    ) -> PomeloResult<()> {
        let paket = kodieren(req_id, route, body, opts.art)?;
        self.scheduler.schedule(req_id, route, paket, recvs, opts).await
    }
}

/// DATA-Paket mit Response- oder Push-Nachricht
pub fn kodieren(req_id: u32, route: &str, body: &Value, art: PushArt) -> PomeloResult<Bytes> {
    let daten = serde_json::to_vec(body)?;
    let nachricht = match art {
        PushArt::Response => Nachricht::response(req_id, daten),
        PushArt::Push | PushArt::Broadcast => Nachricht::push(route, daten),
    };
    Paket::neu(PaketTyp::Data, nachricht.kodieren()?).kodieren()
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("server", self.server.ctx().server_id())
            .field("sessions", &self.sessions.session_anzahl())
            .field("optionen", &self.optionen)
            .finish()
    }
}
