//! Tests fuer Handshake, Heartbeat, DATA und KICK einer Verbindung

use bytes::Bytes;
use pomelo_core::SessionId;
use pomelo_protocol::{NachrichtenTyp, PaketTyp};
use serde_json::{json, Value};
use std::time::Duration;

use super::hilfen::{ist_response, test_connector, test_connector_mit, verbinden};
use crate::optionen::{ConnectorOptionen, SchliessArt};

#[tokio::test]
async fn test_handshake_liefert_heartbeat() {
    let connector = test_connector();
    let mut client = verbinden(&connector);

    let antwort = client.handshake().await;
    assert_eq!(antwort, json!({ "code": 200, "sys": { "heartbeat": 1 } }));
    assert_eq!(connector.sessions().session_anzahl(), 1);
}

#[tokio::test]
async fn test_handshake_ohne_sys_schliesst() {
    let connector = test_connector();
    let mut client = verbinden(&connector);

    client.senden(PaketTyp::Handshake, json!({ "user": {} }).to_string());
    let antwort = client.empfangen().await;
    assert_eq!(antwort.typ, PaketTyp::Handshake);
    let antwort: Value = serde_json::from_slice(&antwort.body).unwrap();
    assert_eq!(antwort["code"], 500);

    let kick = client.empfangen().await;
    assert_eq!(kick.typ, PaketTyp::Kick);
    assert_eq!(connector.sessions().session_anzahl(), 0);
}

#[tokio::test]
async fn test_request_bekommt_antwort() {
    let connector = test_connector();
    let mut client = verbinden(&connector);
    client.handshake().await;

    client.request(5, "connector.entryHandler.echo", json!({ "a": 1 }));
    let antwort = client.nachricht().await;
    assert!(ist_response(&antwort, 5));
    assert_eq!(antwort.body_json().unwrap(), json!({ "a": 1 }));
}

#[tokio::test]
async fn test_fehler_wird_code_500_und_notify_bleibt_stumm() {
    let connector = test_connector();
    let mut client = verbinden(&connector);
    client.handshake().await;

    client.notify("connector.entryHandler.echo", json!({ "still": true }));
    client.request(6, "connector.entryHandler.gibtsnicht", json!({}));

    let antwort = client.nachricht().await;
    assert!(ist_response(&antwort, 6), "Notify darf keine Antwort erzeugen");
    assert_eq!(antwort.body_json().unwrap(), json!({ "code": 500 }));
}

#[tokio::test]
async fn test_data_vor_handshake_wird_verworfen() {
    let connector = test_connector();
    let mut client = verbinden(&connector);

    client.request(1, "connector.entryHandler.echo", json!({}));
    let antwort = client.handshake().await;
    assert_eq!(antwort["code"], 200);

    client.request(2, "connector.entryHandler.echo", json!({ "n": 2 }));
    let antwort = client.nachricht().await;
    assert!(ist_response(&antwort, 2), "Request 1 wurde nie beantwortet");
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_antwort_und_zeitlimit() {
    let connector = test_connector();
    let mut client = verbinden(&connector);
    client.handshake().await;

    client.senden(PaketTyp::Heartbeat, Bytes::new());
    let antwort = client.empfangen().await;
    assert_eq!(antwort.typ, PaketTyp::Heartbeat);
    assert!(antwort.body.is_empty());

    // heartbeat 1 s -> Zeitlimit nach 2 s ohne Paket
    tokio::time::sleep(Duration::from_secs(3)).await;

    let kick = client.empfangen().await;
    assert_eq!(kick.typ, PaketTyp::Kick);
    let grund: Value = serde_json::from_slice(&kick.body).unwrap();
    assert_eq!(grund, json!({ "reason": "heartbeat timeout" }));
    assert_eq!(connector.sessions().session_anzahl(), 0);
}

#[tokio::test]
async fn test_kick_vom_server() {
    let connector = test_connector();
    let mut client = verbinden(&connector);
    client.handshake().await;

    assert!(connector.sessions().kick_by_session_id(SessionId(1), "kick"));

    let kick = client.empfangen().await;
    assert_eq!(kick.typ, PaketTyp::Kick);
    assert_eq!(
        serde_json::from_slice::<Value>(&kick.body).unwrap(),
        json!({ "reason": "kick" })
    );

    // Das verzoegerte Trennen schliesst die Senke sauber
    for _ in 0..20 {
        if client.geschlossen.lock().is_some() {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(*client.geschlossen.lock(), Some(SchliessArt::End));
}

#[tokio::test]
async fn test_ungueltiger_pakettyp_schliesst() {
    let connector = test_connector();
    let mut client = verbinden(&connector);

    client.roh_senden(Bytes::from_static(&[9, 0, 0, 0]));

    let kick = client.empfangen().await;
    assert_eq!(kick.typ, PaketTyp::Kick);
    assert_eq!(connector.sessions().session_anzahl(), 0);
}

#[tokio::test]
async fn test_login_bindet_uid() {
    let connector = test_connector();
    let mut client = verbinden(&connector);
    client.handshake().await;

    client.request(1, "connector.entryHandler.login", json!({ "uid": "alice" }));
    let antwort = client.nachricht().await;
    assert_eq!(antwort.typ, NachrichtenTyp::Response);
    assert_eq!(antwort.body_json().unwrap()["code"], 200);
    assert_eq!(connector.sessions().gebundene_ids("alice"), vec![SessionId(1)]);
}

#[tokio::test]
async fn test_nachrichten_eines_clients_in_reihenfolge() {
    let connector = test_connector();
    let mut client = verbinden(&connector);
    client.handshake().await;

    client.request(1, "connector.entryHandler.warten", json!({ "ms": 100 }));
    client.request(2, "connector.entryHandler.echo", json!({ "n": 2 }));
    client.request(3, "connector.entryHandler.warten", json!({ "ms": 10 }));

    for id in 1..=3 {
        let antwort = client.nachricht().await;
        assert!(ist_response(&antwort, id), "Antwort {} statt {id}", antwort.id);
    }
}

#[tokio::test]
async fn test_destroy_trennt_ohne_kick() {
    let connector = test_connector_mit(ConnectorOptionen {
        heartbeat: Some(Duration::from_secs(1)),
        schliessen: SchliessArt::Destroy,
        ..ConnectorOptionen::default()
    });
    let mut client = verbinden(&connector);
    client.handshake().await;

    assert!(connector.sessions().kick_by_session_id(SessionId(1), "kick"));

    client.ende().await;
    assert_eq!(*client.geschlossen.lock(), Some(SchliessArt::Destroy));
    assert_eq!(connector.sessions().session_anzahl(), 0);
}
