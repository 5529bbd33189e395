//! Session-Proxies fuer Filter und Handler
//!
//! Handler sehen nie die kanonische `Session`, sondern einen `SessionContext`:
//! - `FrontendSession` auf dem Frontend-Server, schreibt direkt in den
//!   lokalen `SessionService`
//! - `BackendSession` auf Backend-Servern, schreibt per RPC an den
//!   `sessionRemote`-Dienst des besitzenden Frontends
//!
//! `set` aendert nur den lokalen Schnappschuss; erst `push`/`push_all`
//! uebertraegt Settings in die kanonische Session.

use async_trait::async_trait;
use parking_lot::RwLock;
use pomelo_core::{AppContext, PomeloResult, RpcMessage, ServerId, SessionId};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::service::SessionService;
use crate::session::{ExportedSession, Session};

/// Name des RPC-Dienstes auf dem Frontend
pub const SESSION_REMOTE: &str = "sessionRemote";

/// Faehigkeiten einer Session aus Sicht von Filtern und Handlern
#[async_trait]
pub trait SessionContext: Send + Sync {
    fn id(&self) -> SessionId;
    fn frontend_id(&self) -> ServerId;
    fn uid(&self) -> Option<String>;
    fn get(&self, key: &str) -> Option<Value>;

    /// Setzt ein Setting nur im lokalen Schnappschuss
    fn set(&self, key: &str, wert: Value);

    async fn bind(&self, uid: &str) -> PomeloResult<()>;
    async fn unbind(&self, uid: &str) -> PomeloResult<()>;

    /// Uebertraegt ein Setting in die kanonische Session
    async fn push(&self, key: &str) -> PomeloResult<()>;

    /// Uebertraegt alle Settings in die kanonische Session
    async fn push_all(&self) -> PomeloResult<()>;

    fn export(&self) -> ExportedSession;
}

/// Geteilte Referenz, wie sie an Filter und Handler geht
pub type SessionRef = Arc<dyn SessionContext>;

// ---------------------------------------------------------------------------
// FrontendSession
// ---------------------------------------------------------------------------

/// Proxy auf eine lokale Session
pub struct FrontendSession {
    session: Arc<Session>,
    service: Arc<SessionService>,
    schnappschuss: RwLock<ExportedSession>,
}

impl FrontendSession {
    pub fn neu(session: Arc<Session>, service: Arc<SessionService>) -> Arc<Self> {
        let schnappschuss = RwLock::new(session.export());
        Arc::new(Self {
            session,
            service,
            schnappschuss,
        })
    }

    /// Die kanonische Session hinter dem Proxy
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }
}

#[async_trait]
impl SessionContext for FrontendSession {
    fn id(&self) -> SessionId {
        self.session.id()
    }

    fn frontend_id(&self) -> ServerId {
        self.session.frontend_id().clone()
    }

    fn uid(&self) -> Option<String> {
        self.schnappschuss.read().uid.clone()
    }

    fn get(&self, key: &str) -> Option<Value> {
        self.schnappschuss.read().settings.get(key).cloned()
    }

    fn set(&self, key: &str, wert: Value) {
        self.schnappschuss.write().settings.insert(key.to_string(), wert);
    }

    async fn bind(&self, uid: &str) -> PomeloResult<()> {
        self.service.bind(self.session.id(), uid)?;
        self.schnappschuss.write().uid = Some(uid.to_string());
        Ok(())
    }

    async fn unbind(&self, uid: &str) -> PomeloResult<()> {
        self.service.unbind(self.session.id(), uid)?;
        self.schnappschuss.write().uid = None;
        Ok(())
    }

    async fn push(&self, key: &str) -> PomeloResult<()> {
        let wert = self.get(key).unwrap_or(Value::Null);
        self.service.import(self.session.id(), key, wert)
    }

    async fn push_all(&self) -> PomeloResult<()> {
        let settings = self.schnappschuss.read().settings.clone();
        self.service.import_all(self.session.id(), settings)
    }

    fn export(&self) -> ExportedSession {
        self.schnappschuss.read().clone()
    }
}

// ---------------------------------------------------------------------------
// BackendSession
// ---------------------------------------------------------------------------

/// Proxy auf eine Session eines entfernten Frontends
pub struct BackendSession {
    ctx: Arc<AppContext>,
    daten: RwLock<ExportedSession>,
}

impl BackendSession {
    pub fn neu(ctx: Arc<AppContext>, exportiert: ExportedSession) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            daten: RwLock::new(exportiert),
        })
    }

    async fn remote(&self, methode: &str, args: Vec<Value>) -> PomeloResult<Value> {
        let frontend = self.daten.read().frontend_id.clone();
        self.ctx
            .rpc_invoke(&frontend, RpcMessage::sys(SESSION_REMOTE, methode, args))
            .await
    }
}

#[async_trait]
impl SessionContext for BackendSession {
    fn id(&self) -> SessionId {
        self.daten.read().id
    }

    fn frontend_id(&self) -> ServerId {
        self.daten.read().frontend_id.clone()
    }

    fn uid(&self) -> Option<String> {
        self.daten.read().uid.clone()
    }

    fn get(&self, key: &str) -> Option<Value> {
        self.daten.read().settings.get(key).cloned()
    }

    fn set(&self, key: &str, wert: Value) {
        self.daten.write().settings.insert(key.to_string(), wert);
    }

    async fn bind(&self, uid: &str) -> PomeloResult<()> {
        let sid = self.id();
        self.remote("bind", vec![json!(sid), json!(uid)]).await?;
        self.daten.write().uid = Some(uid.to_string());
        Ok(())
    }

    async fn unbind(&self, uid: &str) -> PomeloResult<()> {
        let sid = self.id();
        self.remote("unbind", vec![json!(sid), json!(uid)]).await?;
        self.daten.write().uid = None;
        Ok(())
    }

    async fn push(&self, key: &str) -> PomeloResult<()> {
        let sid = self.id();
        let wert = self.get(key).unwrap_or(Value::Null);
        self.remote("pushSetting", vec![json!(sid), json!(key), wert])
            .await
            .map(|_| ())
    }

    async fn push_all(&self) -> PomeloResult<()> {
        let (sid, settings) = {
            let daten = self.daten.read();
            (daten.id, daten.settings.clone())
        };
        self.remote("pushAll", vec![json!(sid), Value::Object(settings)])
            .await
            .map(|_| ())
    }

    fn export(&self) -> ExportedSession {
        self.daten.read().clone()
    }
}
