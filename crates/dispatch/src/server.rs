//! Server – Dispatch-Pipeline eines Prozesses
//!
//! ```text
//! global_handle (Frontend)
//!   Route parsen ──Fehler──────────────────────────────────────► Aufrufer
//!   globale Before-Filter
//!   ├─ fremder Servertyp: msgRemote.forwardMessage per RPC
//!   └─ eigener Servertyp: lokaler Pfad
//!   globaler Error-Handler (optional)
//!   Ergebnis ──► Aufrufer, globale After-Filter laufen danach im Hintergrund
//!
//! handle (Backend, weitergeleitete Nachricht)
//!   Route parsen, lokaler Pfad
//!
//! lokaler Pfad
//!   lokale Before-Filter, Handler, lokaler Error-Handler,
//!   lokale After-Filter (abgewartet), Ergebnis
//! ```

use async_trait::async_trait;
use parking_lot::RwLock;
use pomelo_core::{AppContext, PomeloError, PomeloResult, RpcMessage};
use pomelo_session::SessionRef;
use serde_json::{json, Value};
use std::sync::{Arc, Weak};

use crate::filter::{AfterFilter, BeforeFilter, FilterService};
use crate::handler::HandlerService;
use crate::route::{ClientMessage, RouteRecord};
use crate::router::{RouteFunktion, ServerRouter};

/// Name des RPC-Dienstes fuer weitergeleitete Nachrichten
pub const MSG_REMOTE: &str = "msgRemote";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerZustand {
    Inited,
    Started,
    Stopped,
}

/// Von der Anwendung registrierter Fehlerbehandler
///
/// Darf den Fehler ersetzen oder in eine regulaere Antwort verwandeln.
#[async_trait]
pub trait ErrorHandler: Send + Sync {
    async fn behandeln(
        &self,
        fehler: PomeloError,
        msg: &ClientMessage,
        session: &SessionRef,
    ) -> PomeloResult<Value>;
}

pub struct Server {
    ctx: Arc<AppContext>,
    zustand: RwLock<ServerZustand>,
    globale_filter: FilterService,
    filter: FilterService,
    handler: HandlerService,
    router: ServerRouter,
    globaler_error_handler: RwLock<Option<Arc<dyn ErrorHandler>>>,
    error_handler: RwLock<Option<Arc<dyn ErrorHandler>>>,
    selbst: Weak<Server>,
}

impl Server {
    pub fn neu(ctx: Arc<AppContext>) -> Arc<Self> {
        Arc::new_cyclic(|selbst| Self {
            ctx,
            zustand: RwLock::new(ServerZustand::Inited),
            globale_filter: FilterService::neu(),
            filter: FilterService::neu(),
            handler: HandlerService::neu(),
            router: ServerRouter::neu(),
            globaler_error_handler: RwLock::new(None),
            error_handler: RwLock::new(None),
            selbst: selbst.clone(),
        })
    }

    pub fn ctx(&self) -> &Arc<AppContext> {
        &self.ctx
    }

    pub fn zustand(&self) -> ServerZustand {
        *self.zustand.read()
    }

    pub fn start(&self) -> PomeloResult<()> {
        let mut zustand = self.zustand.write();
        if *zustand != ServerZustand::Inited {
            return Err(PomeloError::Zustand(format!(
                "Server kann aus {:?} nicht gestartet werden",
                *zustand
            )));
        }
        *zustand = ServerZustand::Started;
        tracing::info!(server = %self.ctx.server_id(), typ = %self.ctx.server_typ(), "Server gestartet");
        Ok(())
    }

    pub fn stop(&self) {
        *self.zustand.write() = ServerZustand::Stopped;
        tracing::info!(server = %self.ctx.server_id(), "Server gestoppt");
    }

    // -----------------------------------------------------------------------
    // Registrierung
    // -----------------------------------------------------------------------

    pub fn handler(&self) -> &HandlerService {
        &self.handler
    }

    pub fn global_before(&self, filter: Arc<dyn BeforeFilter>) {
        self.globale_filter.before(filter);
    }

    pub fn global_after(&self, filter: Arc<dyn AfterFilter>) {
        self.globale_filter.after(filter);
    }

    pub fn before(&self, filter: Arc<dyn BeforeFilter>) {
        self.filter.before(filter);
    }

    pub fn after(&self, filter: Arc<dyn AfterFilter>) {
        self.filter.after(filter);
    }

    pub fn global_error_handler(&self, handler: Arc<dyn ErrorHandler>) {
        *self.globaler_error_handler.write() = Some(handler);
    }

    pub fn error_handler(&self, handler: Arc<dyn ErrorHandler>) {
        *self.error_handler.write() = Some(handler);
    }

    /// Eigene Routenfunktion fuer Weiterleitungen an `server_typ`
    pub fn route(&self, server_typ: &str, funktion: Arc<dyn RouteFunktion>) {
        self.router.route(server_typ, funktion);
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Einstieg fuer Client-Nachrichten auf dem Frontend
    pub async fn global_handle(&self, msg: ClientMessage, session: SessionRef) -> PomeloResult<Value> {
        self.gestartet_pruefen()?;
        let record = RouteRecord::parsen(&msg.route)?;

        let mut ergebnis = match self.globale_filter.before_filter(&msg, &session).await {
            Err(e) => Err(e),
            Ok(()) if record.server_typ != self.ctx.server_typ() => {
                self.weiterleiten(&record, &msg, &session).await
            }
            Ok(()) => self.lokal_ausfuehren(&record, &msg, &session).await,
        };

        if let Err(e) = ergebnis {
            let handler = self.globaler_error_handler.read().clone();
            ergebnis = match handler {
                Some(h) => h.behandeln(e, &msg, &session).await,
                None => Err(e),
            };
        }

        // Der Aufrufer wartet nicht auf die globalen After-Filter
        if let Some(server) = self.selbst.upgrade() {
            let ergebnis = ergebnis.clone();
            tokio::spawn(async move {
                let (fehler, antwort) = match ergebnis {
                    Ok(antwort) => (None, Some(antwort)),
                    Err(e) => (Some(e), None),
                };
                if let Some(e) = server
                    .globale_filter
                    .after_filter(fehler, &msg, &session, antwort.as_ref())
                    .await
                {
                    tracing::debug!(route = %msg.route, fehler = %e, "Globale After-Filter mit Fehler beendet");
                }
            });
        }

        ergebnis
    }

    /// Einstieg fuer weitergeleitete Nachrichten auf dem Backend
    pub async fn handle(&self, msg: ClientMessage, session: SessionRef) -> PomeloResult<Value> {
        self.gestartet_pruefen()?;
        let record = RouteRecord::parsen(&msg.route)?;
        self.lokal_ausfuehren(&record, &msg, &session).await
    }

    async fn lokal_ausfuehren(
        &self,
        record: &RouteRecord,
        msg: &ClientMessage,
        session: &SessionRef,
    ) -> PomeloResult<Value> {
        let mut ergebnis = match self.filter.before_filter(msg, session).await {
            Ok(()) => self.handler.handle(record, msg, Arc::clone(session)).await,
            Err(e) => Err(e),
        };

        if let Err(e) = ergebnis {
            let handler = self.error_handler.read().clone();
            ergebnis = match handler {
                Some(h) => h.behandeln(e, msg, session).await,
                None => Err(e),
            };
        }

        let (fehler, antwort) = match ergebnis {
            Ok(antwort) => (None, Some(antwort)),
            Err(e) => (Some(e), None),
        };
        match self.filter.after_filter(fehler, msg, session, antwort.as_ref()).await {
            Some(e) => Err(e),
            None => Ok(antwort.unwrap_or(Value::Null)),
        }
    }

    async fn weiterleiten(
        &self,
        record: &RouteRecord,
        msg: &ClientMessage,
        session: &SessionRef,
    ) -> PomeloResult<Value> {
        let kandidaten = self.ctx.server_nach_typ(&record.server_typ);
        let ziel = self
            .router
            .waehlen(&record.server_typ, session, msg, &kandidaten)?;

        tracing::debug!(route = %record.route, ziel = %ziel, sid = %session.id(), "Nachricht weitergeleitet");
        let args = vec![serde_json::to_value(msg)?, json!(session.export())];
        self.ctx
            .rpc_invoke(&ziel, RpcMessage::sys(MSG_REMOTE, "forwardMessage", args))
            .await
    }

    fn gestartet_pruefen(&self) -> PomeloResult<()> {
        match self.zustand() {
            ServerZustand::Started => Ok(()),
            andere => Err(PomeloError::Zustand(format!(
                "Server ist nicht gestartet ({andere:?})"
            ))),
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("server", self.ctx.server_id())
            .field("zustand", &self.zustand())
            .field("handler", &self.handler.anzahl())
            .finish()
    }
}
