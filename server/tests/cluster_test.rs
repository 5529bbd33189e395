//! Integrationstests: Frontend und Backend im selben Prozess ueber InProcessRpc
//!
//! Client -> connector-1 (TCP) -> msgRemote -> chat-1
//! chat-1 -> channelRemote -> connector-1 -> Client

mod hilfen;

use hilfen::{backend_config, cluster_eintrag, frontend_config, request_paket, TcpClient};
use pomelo_core::{InProcessRpc, PomeloError, PushOptions};
use pomelo_protocol::{Nachricht, NachrichtenTyp};
use pomelo_server::App;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

struct Cluster {
    rpc: Arc<InProcessRpc>,
    frontend: App,
    backend: App,
    adresse: SocketAddr,
}

async fn cluster_starten() -> Cluster {
    let rpc = InProcessRpc::neu();
    let mut frontend_cfg = frontend_config("connector-1");
    let mut backend_cfg = backend_config("chat-1", "chat");
    frontend_cfg.cluster = vec![cluster_eintrag(&backend_cfg)];
    backend_cfg.cluster = vec![cluster_eintrag(&frontend_cfg)];

    let frontend = App::neu(frontend_cfg, rpc.clone());
    let backend = App::neu(backend_cfg, rpc.clone());
    rpc.registrieren(frontend.server().ctx().server_id().clone(), frontend.remote());
    rpc.registrieren(backend.server().ctx().server_id().clone(), backend.remote());

    let kanaele = Arc::clone(backend.kanaele());
    backend
        .server()
        .handler()
        .registrieren_fn("chatHandler", "join", move |msg, session| {
            let kanaele = Arc::clone(&kanaele);
            async move {
                let uid = msg.body["uid"].as_str().unwrap_or_default().to_string();
                session.bind(&uid).await?;
                let raum = kanaele.create_channel("lobby");
                raum.add(&uid, &session.frontend_id());
                let fail_ids = raum
                    .push_message("onJoin", json!({ "uid": uid }), PushOptions::push())
                    .await?;
                Ok::<_, PomeloError>(json!({ "code": 200, "fail": fail_ids }))
            }
        })
        .unwrap();

    backend.starten().await.unwrap();
    let adresse = frontend.starten().await.unwrap().expect("Frontend ohne Adresse");
    Cluster {
        rpc,
        frontend,
        backend,
        adresse,
    }
}

/// Sammelt `anzahl` Nachrichten und trennt Antworten von Pushes
async fn sammeln(client: &mut TcpClient, anzahl: usize) -> (Vec<Nachricht>, Vec<Nachricht>) {
    let mut antworten = Vec::new();
    let mut pushes = Vec::new();
    for _ in 0..anzahl {
        let nachricht = client.nachricht().await;
        match nachricht.typ {
            NachrichtenTyp::Response => antworten.push(nachricht),
            NachrichtenTyp::Push => pushes.push(nachricht),
            andere => panic!("unerwarteter Nachrichtentyp {andere:?}"),
        }
    }
    (antworten, pushes)
}

#[tokio::test]
async fn test_request_wird_an_backend_weitergeleitet() {
    let cluster = cluster_starten().await;
    let mut client = TcpClient::verbinden(cluster.adresse).await;
    client.handshake().await;

    client
        .senden(request_paket(1, "chat.chatHandler.join", json!({ "uid": "alice" })))
        .await;
    let (antworten, pushes) = sammeln(&mut client, 2).await;

    assert_eq!(antworten.len(), 1);
    assert_eq!(antworten[0].id, 1);
    assert_eq!(
        antworten[0].body_json().unwrap(),
        json!({ "code": 200, "fail": [] })
    );

    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].route, "onJoin");
    assert_eq!(pushes[0].body_json().unwrap(), json!({ "uid": "alice" }));

    // bind ueber sessionRemote ist auf dem Frontend angekommen
    assert_eq!(cluster.frontend.sessions().get_by_uid("alice").len(), 1);
    assert_eq!(
        cluster.backend.kanaele().get_channel("lobby", false).unwrap().get_members(),
        vec!["alice".to_string()]
    );
}

#[tokio::test]
async fn test_zweiter_client_erhaelt_kanal_push() {
    let cluster = cluster_starten().await;
    let mut alice = TcpClient::verbinden(cluster.adresse).await;
    let mut bob = TcpClient::verbinden(cluster.adresse).await;
    alice.handshake().await;
    bob.handshake().await;

    alice
        .senden(request_paket(1, "chat.chatHandler.join", json!({ "uid": "alice" })))
        .await;
    sammeln(&mut alice, 2).await;

    bob.senden(request_paket(1, "chat.chatHandler.join", json!({ "uid": "bob" })))
        .await;
    sammeln(&mut bob, 2).await;

    let push = alice.nachricht().await;
    assert_eq!(push.typ, NachrichtenTyp::Push);
    assert_eq!(push.body_json().unwrap(), json!({ "uid": "bob" }));
}

#[tokio::test]
async fn test_backend_nicht_erreichbar_ergibt_code_500() {
    let cluster = cluster_starten().await;
    cluster
        .rpc
        .entfernen(cluster.backend.server().ctx().server_id());

    let mut client = TcpClient::verbinden(cluster.adresse).await;
    client.handshake().await;
    client
        .senden(request_paket(9, "chat.chatHandler.join", json!({ "uid": "carol" })))
        .await;

    let antwort = client.nachricht().await;
    assert_eq!(antwort.typ, NachrichtenTyp::Response);
    assert_eq!(antwort.id, 9);
    assert_eq!(antwort.body_json().unwrap(), json!({ "code": 500 }));
    assert!(cluster.frontend.sessions().get_by_uid("carol").is_empty());
}
