//! Anwendungskontext eines Server-Prozesses
//!
//! Ersetzt die globale Application-Instanz: Identitaet des eigenen Servers,
//! Cluster-Tabelle und der RPC-Invoker werden explizit per `Arc` durch die
//! Konstruktoren gereicht.

use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;

use crate::error::PomeloResult;
use crate::rpc::{RpcInvoker, RpcMessage};
use crate::types::{ServerId, ServerInfo};

/// Gemeinsamer Kontext aller Dienste eines Prozesses
pub struct AppContext {
    server: ServerInfo,
    cluster: RwLock<Vec<ServerInfo>>,
    rpc: Arc<dyn RpcInvoker>,
}

impl AppContext {
    /// Erstellt einen neuen Kontext
    ///
    /// Der eigene Server wird in die Cluster-Tabelle aufgenommen, falls er fehlt.
    pub fn neu(server: ServerInfo, cluster: Vec<ServerInfo>, rpc: Arc<dyn RpcInvoker>) -> Arc<Self> {
        let mut cluster = cluster;
        if !cluster.iter().any(|s| s.id == server.id) {
            cluster.push(server.clone());
        }
        Arc::new(Self {
            server,
            cluster: RwLock::new(cluster),
            rpc,
        })
    }

    /// ID des eigenen Servers
    pub fn server_id(&self) -> &ServerId {
        &self.server.id
    }

    /// Typ des eigenen Servers
    pub fn server_typ(&self) -> &str {
        &self.server.typ
    }

    /// Eintrag des eigenen Servers
    pub fn server_info(&self) -> &ServerInfo {
        &self.server
    }

    /// Ob dieser Prozess Client-Sockets haelt
    pub fn ist_frontend(&self) -> bool {
        self.server.frontend
    }

    /// Alle Server eines Typs, in Reihenfolge der Cluster-Tabelle
    pub fn server_nach_typ(&self, typ: &str) -> Vec<ServerInfo> {
        self.cluster
            .read()
            .iter()
            .filter(|s| s.typ == typ)
            .cloned()
            .collect()
    }

    /// Nimmt einen Server in die Cluster-Tabelle auf (ersetzt gleiche ID)
    pub fn server_hinzufuegen(&self, info: ServerInfo) {
        let mut cluster = self.cluster.write();
        cluster.retain(|s| s.id != info.id);
        cluster.push(info);
    }

    /// Entfernt einen Server aus der Cluster-Tabelle
    pub fn server_entfernen(&self, id: &ServerId) {
        self.cluster.write().retain(|s| &s.id != id);
    }

    /// Ruft einen entfernten Dienst ueber die RPC-Grenze auf
    pub async fn rpc_invoke(&self, server_id: &ServerId, msg: RpcMessage) -> PomeloResult<Value> {
        self.rpc.rpc_invoke(server_id, msg).await
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("server", &self.server)
            .field("cluster", &self.cluster.read().len())
            .finish()
    }
}
