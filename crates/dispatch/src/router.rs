//! Server-Router: waehlt den Zielserver fuer weitergeleitete Nachrichten
//!
//! Standard: FNV-1a-Hash der uid (ungebunden: der Session-ID) modulo
//! Anzahl der Server des Zieltyps. Pro Servertyp kann eine eigene
//! Routenfunktion registriert werden.

use dashmap::DashMap;
use pomelo_core::{PomeloError, PomeloResult, ServerId, ServerInfo};
use pomelo_session::SessionRef;
use std::sync::Arc;

use crate::route::ClientMessage;

/// Waehlt einen Server aus der Liste aller Server eines Typs
pub trait RouteFunktion: Send + Sync {
    fn waehlen(
        &self,
        session: &SessionRef,
        msg: &ClientMessage,
        server: &[ServerInfo],
    ) -> PomeloResult<ServerId>;
}

impl<F> RouteFunktion for F
where
    F: Fn(&SessionRef, &ClientMessage, &[ServerInfo]) -> PomeloResult<ServerId> + Send + Sync,
{
    fn waehlen(
        &self,
        session: &SessionRef,
        msg: &ClientMessage,
        server: &[ServerInfo],
    ) -> PomeloResult<ServerId> {
        self(session, msg, server)
    }
}

/// Standard-Route ueber den uid-Hash
#[derive(Debug, Default, Clone, Copy)]
pub struct HashRoute;

impl RouteFunktion for HashRoute {
    fn waehlen(
        &self,
        session: &SessionRef,
        _msg: &ClientMessage,
        server: &[ServerInfo],
    ) -> PomeloResult<ServerId> {
        if server.is_empty() {
            return Err(PomeloError::KeinServer(String::new()));
        }
        let schluessel = session
            .uid()
            .unwrap_or_else(|| session.id().inner().to_string());
        let index = (fnv1a(schluessel.as_bytes()) % server.len() as u64) as usize;
        Ok(server[index].id.clone())
    }
}

/// Routentabelle pro Servertyp
#[derive(Default)]
pub struct ServerRouter {
    routen: DashMap<String, Arc<dyn RouteFunktion>>,
    standard: HashRoute,
}

impl ServerRouter {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Registriert eine eigene Routenfunktion fuer einen Servertyp
    pub fn route(&self, server_typ: &str, funktion: Arc<dyn RouteFunktion>) {
        self.routen.insert(server_typ.to_string(), funktion);
    }

    /// Waehlt den Zielserver; ohne Server dieses Typs ein Routing-Fehler
    pub fn waehlen(
        &self,
        server_typ: &str,
        session: &SessionRef,
        msg: &ClientMessage,
        server: &[ServerInfo],
    ) -> PomeloResult<ServerId> {
        if server.is_empty() {
            return Err(PomeloError::KeinServer(server_typ.to_string()));
        }
        let eigene = self.routen.get(server_typ).map(|r| Arc::clone(r.value()));
        match eigene {
            Some(funktion) => funktion.waehlen(session, msg, server),
            None => self.standard.waehlen(session, msg, server),
        }
    }
}

/// 64-Bit FNV-1a
fn fnv1a(daten: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    daten.iter().fold(OFFSET, |hash, &byte| {
        (hash ^ byte as u64).wrapping_mul(PRIME)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pomelo_core::SessionId;
    use pomelo_session::{FrontendSession, KanalSocket, SessionService};
    use serde_json::Value;

    fn session_mit_uid(uid: Option<&str>) -> SessionRef {
        let service = Arc::new(SessionService::neu(false));
        let (socket, _rx) = KanalSocket::neu();
        let s = service.create(SessionId(1), ServerId::neu("f1"), Arc::new(socket));
        if let Some(uid) = uid {
            service.bind(SessionId(1), uid).unwrap();
        }
        FrontendSession::neu(s, service)
    }

    fn chat_server() -> Vec<ServerInfo> {
        (1..=3)
            .map(|i| ServerInfo::neu(format!("chat-{i}"), "chat", false))
            .collect()
    }

    #[test]
    fn fnv_referenzwerte() {
        assert_eq!(fnv1a(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a(b"a"), 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn gleiche_uid_gleicher_server() {
        let router = ServerRouter::neu();
        let msg = ClientMessage::neu(1, "chat.h.m", Value::Null);
        let server = chat_server();

        let a = router.waehlen("chat", &session_mit_uid(Some("alice")), &msg, &server).unwrap();
        let b = router.waehlen("chat", &session_mit_uid(Some("alice")), &msg, &server).unwrap();
        assert_eq!(a, b);
        assert!(server.iter().any(|s| s.id == a));
    }

    #[test]
    fn kein_server_ist_fehler() {
        let router = ServerRouter::neu();
        let msg = ClientMessage::neu(1, "chat.h.m", Value::Null);
        assert_eq!(
            router.waehlen("chat", &session_mit_uid(None), &msg, &[]).unwrap_err(),
            PomeloError::KeinServer("chat".into())
        );
    }

    #[test]
    fn eigene_route() {
        let router = ServerRouter::neu();
        router.route(
            "chat",
            Arc::new(|_: &SessionRef, _: &ClientMessage, server: &[ServerInfo]| {
                Ok::<_, PomeloError>(server[server.len() - 1].id.clone())
            }),
        );
        let msg = ClientMessage::neu(1, "chat.h.m", Value::Null);
        let ziel = router
            .waehlen("chat", &session_mit_uid(Some("bob")), &msg, &chat_server())
            .unwrap();
        assert_eq!(ziel.as_str(), "chat-3");
    }
}
