//! Direkte Zustellung ohne Puffer

use async_trait::async_trait;
use bytes::Bytes;
use pomelo_core::{PomeloResult, PushOptions, SessionId};
use pomelo_session::SessionService;
use std::sync::Arc;

use crate::scheduler::{broadcast_empfaenger, BroadcastFilter, Scheduler};

/// Schreibt jede Nachricht sofort auf den Socket der Empfaenger
pub struct DirectPushScheduler {
    sessions: Arc<SessionService>,
    filter: Option<Arc<dyn BroadcastFilter>>,
}

impl DirectPushScheduler {
    pub fn neu(sessions: Arc<SessionService>) -> Self {
        Self {
            sessions,
            filter: None,
        }
    }

    pub fn mit_filter(mut self, filter: Arc<dyn BroadcastFilter>) -> Self {
        self.filter = Some(filter);
        self
    }
}

#[async_trait]
impl Scheduler for DirectPushScheduler {
    async fn schedule(
        &self,
        _req_id: u32,
        route: &str,
        msg: Bytes,
        recvs: &[SessionId],
        opts: &PushOptions,
    ) -> PomeloResult<()> {
        if opts.ist_broadcast() {
            let empfaenger = broadcast_empfaenger(&self.sessions, self.filter.as_ref(), &msg, opts);
            tracing::trace!(route, anzahl = empfaenger.len(), "Broadcast direkt");
            for session in empfaenger {
                session.send(msg.clone());
            }
        } else {
            for sid in recvs {
                self.sessions.send_message(*sid, msg.clone());
            }
        }

        // Erledigt erst nach einem Durchlauf der Laufzeit
        tokio::task::yield_now().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pomelo_core::ServerId;
    use pomelo_session::{KanalSocket, Session, SocketBefehl};
    use serde_json::{json, Value};
    use tokio::sync::mpsc::UnboundedReceiver;

    fn anlegen(
        service: &SessionService,
        sid: u64,
    ) -> (Arc<Session>, UnboundedReceiver<SocketBefehl>) {
        let (socket, rx) = KanalSocket::neu();
        let session = service.create(SessionId(sid), ServerId::neu("connector-1"), Arc::new(socket));
        (session, rx)
    }

    fn gesendet(rx: &mut UnboundedReceiver<SocketBefehl>) -> Vec<Bytes> {
        let mut alle = Vec::new();
        while let Ok(befehl) = rx.try_recv() {
            if let SocketBefehl::Senden(daten) = befehl {
                alle.push(daten);
            }
        }
        alle
    }

    #[tokio::test]
    async fn test_direkt_an_empfaenger() {
        let service = Arc::new(SessionService::neu(false));
        let (_a, mut rx_a) = anlegen(&service, 1);
        let (_b, mut rx_b) = anlegen(&service, 2);
        let scheduler = DirectPushScheduler::neu(Arc::clone(&service));

        scheduler
            .schedule(0, "onChat", Bytes::from_static(b"x"), &[SessionId(1), SessionId(99)], &PushOptions::push())
            .await
            .unwrap();

        assert_eq!(gesendet(&mut rx_a), vec![Bytes::from_static(b"x")]);
        assert!(gesendet(&mut rx_b).is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_nur_gebundene_mit_filter() {
        let service = Arc::new(SessionService::neu(false));
        let (_a, mut rx_a) = anlegen(&service, 1);
        let (b, mut rx_b) = anlegen(&service, 2);
        let (c, mut rx_c) = anlegen(&service, 3);
        service.bind(SessionId(2), "bob").unwrap();
        service.bind(SessionId(3), "carol").unwrap();
        b.set("raum", json!("lobby"));
        c.set("raum", json!("keller"));

        let filter = |session: &Session, _msg: &Bytes, param: Option<&Value>| {
            session.get("raum").as_ref() == param
        };
        let scheduler = DirectPushScheduler::neu(Arc::clone(&service)).mit_filter(Arc::new(filter));

        scheduler
            .schedule(
                0,
                "onNews",
                Bytes::from_static(b"n"),
                &[],
                &PushOptions::broadcast(true, Some(json!("lobby"))),
            )
            .await
            .unwrap();

        assert!(gesendet(&mut rx_a).is_empty(), "ungebundene Session ausgeschlossen");
        assert_eq!(gesendet(&mut rx_b).len(), 1);
        assert!(gesendet(&mut rx_c).is_empty(), "Filter lehnt ab");
    }

    #[tokio::test]
    async fn test_broadcast_an_alle() {
        let service = Arc::new(SessionService::neu(false));
        let (_a, mut rx_a) = anlegen(&service, 1);
        let (_b, mut rx_b) = anlegen(&service, 2);
        let scheduler = DirectPushScheduler::neu(Arc::clone(&service));

        scheduler
            .schedule(0, "onNews", Bytes::from_static(b"n"), &[], &PushOptions::broadcast(false, None))
            .await
            .unwrap();

        assert_eq!(gesendet(&mut rx_a).len(), 1);
        assert_eq!(gesendet(&mut rx_b).len(), 1);
    }
}
