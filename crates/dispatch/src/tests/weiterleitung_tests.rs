//! Tests fuer die Weiterleitung Frontend -> Backend ueber InProcessRpc

use async_trait::async_trait;
use pomelo_core::{
    AppContext, InProcessRpc, PomeloError, PomeloResult, RemoteDispatch, RpcMessage, ServerId,
    ServerInfo, SessionId,
};
use pomelo_session::{FrontendSession, KanalSocket, SessionRemote, SessionService, SESSION_REMOTE};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::{ClientMessage, MsgRemote, Server, MSG_REMOTE};

/// Verteilt eingehende RPCs eines Servers nach Dienstname
struct Verteiler {
    dienste: Vec<(&'static str, Arc<dyn RemoteDispatch>)>,
}

#[async_trait]
impl RemoteDispatch for Verteiler {
    async fn dispatch(&self, msg: RpcMessage) -> PomeloResult<Value> {
        let dienst = self
            .dienste
            .iter()
            .find(|(name, _)| *name == msg.service)
            .map(|(_, d)| Arc::clone(d))
            .ok_or_else(|| PomeloError::rpc(format!("unbekannter Dienst {}", msg.service)))?;
        dienst.dispatch(msg).await
    }
}

struct Cluster {
    frontend: Arc<Server>,
    sessions: Arc<SessionService>,
    backend: Arc<Server>,
    _ziele: Vec<Arc<dyn RemoteDispatch>>,
}

fn cluster() -> Cluster {
    let rpc = InProcessRpc::neu();
    let connector = ServerInfo::neu("connector-1", "connector", true);
    let chat = ServerInfo::neu("chat-1", "chat", false);

    let frontend = Server::neu(AppContext::neu(connector.clone(), vec![chat.clone()], rpc.clone()));
    let backend = Server::neu(AppContext::neu(chat, vec![connector], rpc.clone()));
    let sessions = Arc::new(SessionService::neu(false));

    let frontend_ziel: Arc<dyn RemoteDispatch> = Arc::new(Verteiler {
        dienste: vec![(
            SESSION_REMOTE,
            Arc::new(SessionRemote::neu(Arc::clone(&sessions))) as Arc<dyn RemoteDispatch>,
        )],
    });
    let backend_ziel: Arc<dyn RemoteDispatch> = Arc::new(Verteiler {
        dienste: vec![(
            MSG_REMOTE,
            Arc::new(MsgRemote::neu(Arc::clone(&backend))) as Arc<dyn RemoteDispatch>,
        )],
    });
    rpc.registrieren(ServerId::neu("connector-1"), &frontend_ziel);
    rpc.registrieren(ServerId::neu("chat-1"), &backend_ziel);

    backend
        .handler()
        .registrieren_fn("chatHandler", "login", |msg, session| async move {
            let uid = msg.body["uid"].as_str().unwrap_or_default().to_string();
            session.bind(&uid).await?;
            session.set("raum", json!("lobby"));
            session.push("raum").await?;
            Ok::<_, PomeloError>(json!({ "uid": session.uid(), "frontend": session.frontend_id() }))
        })
        .expect("Handler registrieren fehlgeschlagen");

    frontend.start().unwrap();
    backend.start().unwrap();

    Cluster {
        frontend,
        sessions,
        backend,
        _ziele: vec![frontend_ziel, backend_ziel],
    }
}

#[tokio::test]
async fn test_weiterleitung_an_backend() {
    let c = cluster();
    let (socket, _rx) = KanalSocket::neu();
    let session = c
        .sessions
        .create(SessionId(7), ServerId::neu("connector-1"), Arc::new(socket));
    let proxy = FrontendSession::neu(session, Arc::clone(&c.sessions));

    let antwort = c
        .frontend
        .global_handle(
            ClientMessage::neu(1, "chat.chatHandler.login", json!({ "uid": "alice" })),
            proxy,
        )
        .await
        .expect("Weiterleitung fehlgeschlagen");

    assert_eq!(antwort, json!({ "uid": "alice", "frontend": "connector-1" }));

    // Das Backend hat ueber sessionRemote die kanonische Session veraendert
    let kanonisch = c.sessions.get(SessionId(7)).unwrap();
    assert_eq!(kanonisch.uid().as_deref(), Some("alice"));
    assert_eq!(kanonisch.get("raum"), Some(json!("lobby")));
    assert_eq!(c.sessions.gebundene_ids("alice"), vec![SessionId(7)]);
}

#[tokio::test]
async fn test_weiterleitung_ohne_zielserver() {
    let c = cluster();
    let (socket, _rx) = KanalSocket::neu();
    let session = c
        .sessions
        .create(SessionId(8), ServerId::neu("connector-1"), Arc::new(socket));
    let proxy = FrontendSession::neu(session, Arc::clone(&c.sessions));

    let fehler = c
        .frontend
        .global_handle(ClientMessage::neu(1, "area.playerHandler.move", Value::Null), proxy)
        .await
        .unwrap_err();
    assert_eq!(fehler, PomeloError::KeinServer("area".into()));
}

#[tokio::test]
async fn test_backend_fehler_kommt_beim_frontend_an() {
    let c = cluster();
    c.backend.stop();

    let (socket, _rx) = KanalSocket::neu();
    let session = c
        .sessions
        .create(SessionId(9), ServerId::neu("connector-1"), Arc::new(socket));
    let proxy = FrontendSession::neu(session, Arc::clone(&c.sessions));

    let fehler = c
        .frontend
        .global_handle(
            ClientMessage::neu(1, "chat.chatHandler.login", json!({ "uid": "bob" })),
            proxy,
        )
        .await
        .unwrap_err();
    assert!(matches!(fehler, PomeloError::Zustand(_)));
    assert!(c.sessions.get_by_uid("bob").is_empty());
}
