//! Gemeinsamer Vertrag aller Push-Scheduler

use async_trait::async_trait;
use bytes::Bytes;
use pomelo_core::{PomeloResult, PushOptions, SessionId};
use pomelo_session::{Session, SessionService};
use serde_json::Value;
use std::sync::Arc;

/// Zustellung kodierter Pakete an Sessions
///
/// `msg` ist bereits vollstaendig kodiert (Paket-Header + Nachricht).
#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn start(&self) -> PomeloResult<()> {
        Ok(())
    }

    async fn stop(&self, _force: bool) -> PomeloResult<()> {
        Ok(())
    }

    async fn schedule(
        &self,
        req_id: u32,
        route: &str,
        msg: Bytes,
        recvs: &[SessionId],
        opts: &PushOptions,
    ) -> PomeloResult<()>;
}

/// Praedikat fuer Broadcasts: `false` schliesst die Session aus
pub trait BroadcastFilter: Send + Sync {
    fn zulassen(&self, session: &Session, msg: &Bytes, filter_param: Option<&Value>) -> bool;
}

impl<F> BroadcastFilter for F
where
    F: Fn(&Session, &Bytes, Option<&Value>) -> bool + Send + Sync,
{
    fn zulassen(&self, session: &Session, msg: &Bytes, filter_param: Option<&Value>) -> bool {
        self(session, msg, filter_param)
    }
}

/// Sessions, die ein Broadcast erreichen soll
///
/// Mit `binded` nur Sessions mit uid; der Filter wird mit `filter_param`
/// pro Session gefragt.
pub(crate) fn broadcast_empfaenger(
    sessions: &SessionService,
    filter: Option<&Arc<dyn BroadcastFilter>>,
    msg: &Bytes,
    opts: &PushOptions,
) -> Vec<Arc<Session>> {
    let mut empfaenger = Vec::new();
    let mut pruefen = |session: &Arc<Session>| {
        let zugelassen = filter
            .map(|f| f.zulassen(session, msg, opts.filter_param.as_ref()))
            .unwrap_or(true);
        if zugelassen {
            empfaenger.push(Arc::clone(session));
        }
    };
    if opts.binded {
        sessions.for_each_binded_session(&mut pruefen);
    } else {
        sessions.for_each_session(&mut pruefen);
    }
    empfaenger
}
