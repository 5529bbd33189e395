//! msgRemote – nimmt weitergeleitete Nachrichten auf dem Backend entgegen

use async_trait::async_trait;
use pomelo_core::{PomeloError, PomeloResult, RemoteDispatch, RpcMessage};
use pomelo_session::{BackendSession, ExportedSession};
use serde_json::Value;
use std::sync::Arc;

use crate::route::ClientMessage;
use crate::server::Server;

/// Backend-Dienst `forwardMessage(msg, session)`
pub struct MsgRemote {
    server: Arc<Server>,
}

impl MsgRemote {
    pub fn neu(server: Arc<Server>) -> Self {
        Self { server }
    }

    /// Baut die BackendSession nach und ruft den lokalen Pfad auf
    pub async fn forward_message(
        &self,
        msg: ClientMessage,
        session: ExportedSession,
    ) -> PomeloResult<Value> {
        let backend = BackendSession::neu(Arc::clone(self.server.ctx()), session);
        self.server.handle(msg, backend).await
    }
}

#[async_trait]
impl RemoteDispatch for MsgRemote {
    async fn dispatch(&self, msg: RpcMessage) -> PomeloResult<Value> {
        match msg.method.as_str() {
            "forwardMessage" => self.forward_message(msg.arg(0)?, msg.arg(1)?).await,
            andere => Err(PomeloError::rpc(format!("msgRemote kennt keine Methode {andere}"))),
        }
    }
}
