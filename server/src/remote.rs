//! Eingang aller RPCs eines Servers
//!
//! Verteilt `sys.<dienst>.<methode>` an den passenden Remote-Dienst.
//! Frontends bieten `sessionRemote` und `channelRemote`, Backends `msgRemote`.

use async_trait::async_trait;
use pomelo_core::{PomeloError, PomeloResult, RemoteDispatch, RpcMessage};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct AppRemote {
    dienste: HashMap<&'static str, Arc<dyn RemoteDispatch>>,
}

impl AppRemote {
    pub fn neu() -> Self {
        Self::default()
    }

    pub fn dienst(mut self, name: &'static str, dienst: Arc<dyn RemoteDispatch>) -> Self {
        self.dienste.insert(name, dienst);
        self
    }

    pub fn hat(&self, name: &str) -> bool {
        self.dienste.contains_key(name)
    }

    /// Namen der angebotenen Dienste, sortiert
    pub fn namen(&self) -> Vec<&'static str> {
        let mut namen: Vec<_> = self.dienste.keys().copied().collect();
        namen.sort_unstable();
        namen
    }
}

#[async_trait]
impl RemoteDispatch for AppRemote {
    async fn dispatch(&self, msg: RpcMessage) -> PomeloResult<Value> {
        let Some(dienst) = self.dienste.get(msg.service.as_str()).cloned() else {
            tracing::warn!(pfad = %msg.pfad(), "RPC an unbekannten Dienst");
            return Err(PomeloError::rpc(format!(
                "Dienst {} auf diesem Server nicht vorhanden",
                msg.service
            )));
        };
        tracing::trace!(pfad = %msg.pfad(), "RPC empfangen");
        dienst.dispatch(msg).await
    }
}
