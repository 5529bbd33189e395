//! RPC-Grenze zwischen Frontend- und Backend-Prozessen
//!
//! Der Kern ruft entfernte Dienste nur ueber `RpcInvoker::rpc_invoke` auf.
//! Transport und Serialisierung liegen ausserhalb dieses Workspaces; hier
//! gibt es zwei Implementierungen:
//!
//! - `InProcessRpc`: mehrere logische Server in einem Prozess (Tests, Einzelbetrieb)
//! - `DisconnectedRpc`: jeder entfernte Aufruf schlaegt fehl

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Weak};

use crate::error::{PomeloError, PomeloResult};
use crate::types::ServerId;

/// Namespace der System-Dienste
pub const SYS_NAMESPACE: &str = "sys";

/// Ein RPC-Aufruf: `namespace.service.method(args...)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcMessage {
    pub namespace: String,
    pub service: String,
    pub method: String,
    pub args: Vec<Value>,
}

impl RpcMessage {
    /// Erstellt einen Aufruf im `sys`-Namespace
    pub fn sys(service: &str, method: &str, args: Vec<Value>) -> Self {
        Self {
            namespace: SYS_NAMESPACE.to_string(),
            service: service.to_string(),
            method: method.to_string(),
            args,
        }
    }

    /// Liest das Argument an `index` und deserialisiert es
    pub fn arg<T: serde::de::DeserializeOwned>(&self, index: usize) -> PomeloResult<T> {
        let wert = self.args.get(index).cloned().ok_or_else(|| {
            PomeloError::RpcArgumente(format!(
                "{}.{}: Argument {} fehlt",
                self.service, self.method, index
            ))
        })?;
        Ok(serde_json::from_value(wert)?)
    }

    /// Kurzname fuer Logs
    pub fn pfad(&self) -> String {
        format!("{}.{}.{}", self.namespace, self.service, self.method)
    }
}

/// Ausgehende Seite: ruft einen Dienst auf einem bestimmten Server auf
#[async_trait]
pub trait RpcInvoker: Send + Sync {
    async fn rpc_invoke(&self, server_id: &ServerId, msg: RpcMessage) -> PomeloResult<Value>;
}

/// Eingehende Seite: verteilt einen Aufruf an die lokalen Remote-Dienste
#[async_trait]
pub trait RemoteDispatch: Send + Sync {
    async fn dispatch(&self, msg: RpcMessage) -> PomeloResult<Value>;
}

// ---------------------------------------------------------------------------
// InProcessRpc
// ---------------------------------------------------------------------------

/// RPC zwischen logischen Servern im selben Prozess
///
/// Haelt nur schwache Referenzen auf die Ziele, weil jedes Ziel selbst
/// wieder ueber seinen `AppContext` auf diesen Invoker zeigt.
#[derive(Default)]
pub struct InProcessRpc {
    ziele: DashMap<ServerId, Weak<dyn RemoteDispatch>>,
}

impl InProcessRpc {
    pub fn neu() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registriert die Remote-Dienste eines Servers
    pub fn registrieren(&self, server_id: ServerId, ziel: &Arc<dyn RemoteDispatch>) {
        self.ziele.insert(server_id, Arc::downgrade(ziel));
    }

    /// Entfernt einen Server (simuliert einen Ausfall)
    pub fn entfernen(&self, server_id: &ServerId) {
        self.ziele.remove(server_id);
    }
}

#[async_trait]
impl RpcInvoker for InProcessRpc {
    async fn rpc_invoke(&self, server_id: &ServerId, msg: RpcMessage) -> PomeloResult<Value> {
        let ziel = self
            .ziele
            .get(server_id)
            .and_then(|weak| weak.upgrade())
            .ok_or_else(|| PomeloError::rpc(format!("Server {server_id} nicht erreichbar")))?;

        tracing::trace!(server = %server_id, pfad = %msg.pfad(), "In-Process-RPC");
        ziel.dispatch(msg).await
    }
}

// ---------------------------------------------------------------------------
// DisconnectedRpc
// ---------------------------------------------------------------------------

/// Invoker ohne Transport: jeder Aufruf schlaegt fehl
#[derive(Debug, Default, Clone, Copy)]
pub struct DisconnectedRpc;

#[async_trait]
impl RpcInvoker for DisconnectedRpc {
    async fn rpc_invoke(&self, server_id: &ServerId, msg: RpcMessage) -> PomeloResult<Value> {
        tracing::warn!(server = %server_id, pfad = %msg.pfad(), "Kein RPC-Transport konfiguriert");
        Err(PomeloError::rpc(format!(
            "kein RPC-Transport zu {server_id} fuer {}",
            msg.pfad()
        )))
    }
}
