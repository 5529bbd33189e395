//! sessionRemote – RPC-Dienst des Frontends fuer Backend-Sessions
//!
//! Methoden (Argumente als JSON-Array):
//!
//! | Methode              | Argumente             |
//! |----------------------|-----------------------|
//! | `bind`               | sid, uid              |
//! | `unbind`             | sid, uid              |
//! | `pushSetting`        | sid, key, value       |
//! | `pushAll`            | sid, settings         |
//! | `kickByUid`          | uid, reason           |
//! | `kickBySid`          | sid, reason           |
//! | `getBoundSessionIds` | uid                   |

use async_trait::async_trait;
use pomelo_core::{PomeloError, PomeloResult, RemoteDispatch, RpcMessage, SessionId};
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::service::SessionService;

/// Frontend-seitiger Dienst fuer Session-Aenderungen von Backends
pub struct SessionRemote {
    service: Arc<SessionService>,
}

impl SessionRemote {
    pub fn neu(service: Arc<SessionService>) -> Self {
        Self { service }
    }

    pub fn bind(&self, sid: SessionId, uid: &str) -> PomeloResult<()> {
        self.service.bind(sid, uid)
    }

    pub fn unbind(&self, sid: SessionId, uid: &str) -> PomeloResult<()> {
        self.service.unbind(sid, uid)
    }

    pub fn push_setting(&self, sid: SessionId, key: &str, wert: Value) -> PomeloResult<()> {
        self.service.import(sid, key, wert)
    }

    pub fn push_all(&self, sid: SessionId, settings: Map<String, Value>) -> PomeloResult<()> {
        self.service.import_all(sid, settings)
    }

    pub fn kick_by_uid(&self, uid: &str, grund: &str) -> usize {
        self.service.kick(uid, grund)
    }

    pub fn kick_by_sid(&self, sid: SessionId, grund: &str) -> bool {
        self.service.kick_by_session_id(sid, grund)
    }

    pub fn get_bound_session_ids(&self, uid: &str) -> Vec<SessionId> {
        self.service.gebundene_ids(uid)
    }
}

#[async_trait]
impl RemoteDispatch for SessionRemote {
    async fn dispatch(&self, msg: RpcMessage) -> PomeloResult<Value> {
        match msg.method.as_str() {
            "bind" => {
                self.bind(msg.arg(0)?, &msg.arg::<String>(1)?)?;
                Ok(Value::Null)
            }
            "unbind" => {
                self.unbind(msg.arg(0)?, &msg.arg::<String>(1)?)?;
                Ok(Value::Null)
            }
            "pushSetting" => {
                self.push_setting(msg.arg(0)?, &msg.arg::<String>(1)?, msg.arg(2)?)?;
                Ok(Value::Null)
            }
            "pushAll" => {
                self.push_all(msg.arg(0)?, msg.arg(1)?)?;
                Ok(Value::Null)
            }
            "kickByUid" => {
                let grund: Option<String> = msg.arg(1).ok();
                let anzahl = self.kick_by_uid(&msg.arg::<String>(0)?, grund.as_deref().unwrap_or("kick"));
                Ok(json!(anzahl))
            }
            "kickBySid" => {
                let grund: Option<String> = msg.arg(1).ok();
                let erfolg = self.kick_by_sid(msg.arg(0)?, grund.as_deref().unwrap_or("kick"));
                Ok(json!(erfolg))
            }
            "getBoundSessionIds" => Ok(json!(self.get_bound_session_ids(&msg.arg::<String>(0)?))),
            andere => Err(PomeloError::rpc(format!(
                "sessionRemote kennt keine Methode {andere}"
            ))),
        }
    }
}
