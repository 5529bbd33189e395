//! channelRemote – Zustellung von Kanal-Nachrichten auf dem Frontend
//!
//! Wird von Backends per RPC aufgerufen oder vom `ChannelService` desselben
//! Servers direkt als lokales Ziel verwendet.

use async_trait::async_trait;
use pomelo_channel::ChannelPushTarget;
use pomelo_core::{PomeloError, PomeloResult, PushArt, PushOptions, RemoteDispatch, RpcMessage};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::connector::Connector;

pub struct ChannelRemote {
    connector: Arc<Connector>,
}

impl ChannelRemote {
    pub fn neu(connector: Arc<Connector>) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl ChannelPushTarget for ChannelRemote {
    /// uids ohne lebende Session landen in der Rueckgabe
    async fn push_message(
        &self,
        route: &str,
        msg: Value,
        uids: Vec<String>,
        opts: PushOptions,
    ) -> PomeloResult<Vec<String>> {
        if uids.is_empty() {
            tracing::warn!(route, "pushMessage ohne uids");
            return Ok(Vec::new());
        }

        let sessions = self.connector.sessions();
        let mut fail_ids = Vec::new();
        let mut sids = Vec::new();
        for uid in uids {
            let gefunden = sessions.get_by_uid(&uid);
            if gefunden.is_empty() {
                fail_ids.push(uid);
            } else {
                sids.extend(gefunden.iter().map(|s| s.id()));
            }
        }

        if !sids.is_empty() {
            let opts = PushOptions {
                art: PushArt::Push,
                ..opts
            };
            self.connector.send(0, route, &msg, &sids, &opts).await?;
        }
        Ok(fail_ids)
    }

    async fn broadcast(&self, route: &str, msg: Value, opts: PushOptions) -> PomeloResult<()> {
        let opts = PushOptions {
            art: PushArt::Broadcast,
            ..opts
        };
        self.connector.send(0, route, &msg, &[], &opts).await
    }
}

#[async_trait]
impl RemoteDispatch for ChannelRemote {
    async fn dispatch(&self, msg: RpcMessage) -> PomeloResult<Value> {
        match msg.method.as_str() {
            "pushMessage" => {
                let route: String = msg.arg(0)?;
                let inhalt: Value = msg.arg(1)?;
                let uids: Vec<String> = msg.arg(2)?;
                let opts: PushOptions = msg.arg(3)?;
                let fail_ids = self.push_message(&route, inhalt, uids, opts).await?;
                if fail_ids.is_empty() {
                    Ok(Value::Null)
                } else {
                    Ok(json!(fail_ids))
                }
            }
            "broadcast" => {
                let route: String = msg.arg(0)?;
                let inhalt: Value = msg.arg(1)?;
                let opts: PushOptions = msg.arg(2)?;
                self.broadcast(&route, inhalt, opts).await?;
                Ok(Value::Null)
            }
            andere => Err(PomeloError::rpc(format!(
                "channelRemote kennt keine Methode {andere}"
            ))),
        }
    }
}
