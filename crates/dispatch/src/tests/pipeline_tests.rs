//! Tests fuer die Dispatch-Pipeline eines einzelnen Servers

use async_trait::async_trait;
use parking_lot::Mutex;
use pomelo_core::{AppContext, DisconnectedRpc, PomeloError, PomeloResult, ServerId, ServerInfo, SessionId};
use pomelo_session::{FrontendSession, KanalSocket, SessionRef, SessionService};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};

use crate::{AfterFilter, BeforeFilter, ClientMessage, ErrorHandler, Server, ServerZustand};

type Log = Arc<Mutex<Vec<String>>>;

struct LogFilter {
    name: &'static str,
    log: Log,
    ablehnen: bool,
}

#[async_trait]
impl BeforeFilter for LogFilter {
    async fn before(&self, _msg: &ClientMessage, _session: &SessionRef) -> PomeloResult<()> {
        self.log.lock().push(format!("before:{}", self.name));
        if self.ablehnen {
            return Err(PomeloError::Anwendung {
                code: 403,
                nachricht: self.name.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl AfterFilter for LogFilter {
    async fn after(
        &self,
        fehler: Option<PomeloError>,
        _msg: &ClientMessage,
        _session: &SessionRef,
        _antwort: Option<&Value>,
    ) -> Option<PomeloError> {
        self.log.lock().push(format!("after:{}", self.name));
        fehler
    }
}

fn log_filter(name: &'static str, log: &Log) -> Arc<LogFilter> {
    Arc::new(LogFilter {
        name,
        log: Arc::clone(log),
        ablehnen: false,
    })
}

fn connector_server() -> Arc<Server> {
    let ctx = AppContext::neu(
        ServerInfo::neu("connector-1", "connector", true),
        vec![],
        Arc::new(DisconnectedRpc),
    );
    Server::neu(ctx)
}

fn test_session() -> SessionRef {
    let service = Arc::new(SessionService::neu(false));
    let (socket, _rx) = KanalSocket::neu();
    let session = service.create(SessionId(1), ServerId::neu("connector-1"), Arc::new(socket));
    FrontendSession::neu(session, service)
}

fn echo_registrieren(server: &Server, log: &Log) {
    let log = Arc::clone(log);
    server
        .handler()
        .registrieren_fn("entryHandler", "echo", move |msg, _session| {
            let log = Arc::clone(&log);
            async move {
                log.lock().push("handler".to_string());
                Ok::<_, PomeloError>(msg.body)
            }
        })
        .expect("Handler registrieren fehlgeschlagen");
}

fn echo_nachricht() -> ClientMessage {
    ClientMessage::neu(1, "connector.entryHandler.echo", json!({ "text": "hallo" }))
}

#[tokio::test]
async fn test_dispatch_vor_start_ist_zustandsfehler() {
    let server = connector_server();
    let fehler = server
        .global_handle(echo_nachricht(), test_session())
        .await
        .unwrap_err();
    assert!(matches!(fehler, PomeloError::Zustand(_)));

    server.start().expect("Start fehlgeschlagen");
    assert_eq!(server.zustand(), ServerZustand::Started);
    server.stop();
    assert!(server.global_handle(echo_nachricht(), test_session()).await.is_err());
    assert!(server.start().is_err(), "STOPPED ist endgueltig");
}

#[tokio::test]
async fn test_ungueltige_route_ohne_filter() {
    let log: Log = Default::default();
    let server = connector_server();
    server.global_before(log_filter("g", &log));
    server.start().unwrap();

    let fehler = server
        .global_handle(ClientMessage::neu(1, "connector.echo", Value::Null), test_session())
        .await
        .unwrap_err();

    assert_eq!(fehler, PomeloError::UngueltigeRoute("connector.echo".into()));
    tokio::task::yield_now().await;
    assert!(log.lock().is_empty());
}

#[tokio::test]
async fn test_filter_reihenfolge_global_und_lokal() {
    let log: Log = Default::default();
    let server = connector_server();
    for name in ["g1", "g2"] {
        let f = log_filter(name, &log);
        server.global_before(f.clone());
        server.global_after(f);
    }
    for name in ["l1", "l2"] {
        let f = log_filter(name, &log);
        server.before(f.clone());
        server.after(f);
    }
    echo_registrieren(&server, &log);
    server.start().unwrap();

    let antwort = server
        .global_handle(echo_nachricht(), test_session())
        .await
        .expect("Dispatch fehlgeschlagen");
    assert_eq!(antwort, json!({ "text": "hallo" }));

    // Globale After-Filter laufen im Hintergrund
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(
        *log.lock(),
        vec![
            "before:g1", "before:g2", "before:l1", "before:l2", "handler", "after:l2", "after:l1",
            "after:g2", "after:g1",
        ]
    );
}

/// After-Filter, der erst nach einem Signal fertig wird
struct BlockierenderFilter {
    freigabe: Arc<Notify>,
    fertig: Mutex<Option<oneshot::Sender<()>>>,
}

#[async_trait]
impl AfterFilter for BlockierenderFilter {
    async fn after(
        &self,
        fehler: Option<PomeloError>,
        _msg: &ClientMessage,
        _session: &SessionRef,
        _antwort: Option<&Value>,
    ) -> Option<PomeloError> {
        self.freigabe.notified().await;
        if let Some(tx) = self.fertig.lock().take() {
            let _ = tx.send(());
        }
        fehler
    }
}

#[tokio::test]
async fn test_globale_after_filter_werden_nicht_abgewartet() {
    let log: Log = Default::default();
    let server = connector_server();
    let freigabe = Arc::new(Notify::new());
    let (tx, rx) = oneshot::channel();
    server.global_after(Arc::new(BlockierenderFilter {
        freigabe: Arc::clone(&freigabe),
        fertig: Mutex::new(Some(tx)),
    }));
    echo_registrieren(&server, &log);
    server.start().unwrap();

    // Ergebnis kommt an, obwohl der After-Filter noch blockiert
    let antwort = server.global_handle(echo_nachricht(), test_session()).await;
    assert!(antwort.is_ok());

    freigabe.notify_one();
    rx.await.expect("Globaler After-Filter ist nicht gelaufen");
}

/// After-Filter mit Verzoegerung, der einen Merker setzt
struct LangsamerFilter {
    gelaufen: Arc<Mutex<bool>>,
}

#[async_trait]
impl AfterFilter for LangsamerFilter {
    async fn after(
        &self,
        fehler: Option<PomeloError>,
        _msg: &ClientMessage,
        _session: &SessionRef,
        _antwort: Option<&Value>,
    ) -> Option<PomeloError> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        *self.gelaufen.lock() = true;
        fehler
    }
}

#[tokio::test(start_paused = true)]
async fn test_lokale_after_filter_werden_abgewartet() {
    let log: Log = Default::default();
    let server = connector_server();
    let gelaufen = Arc::new(Mutex::new(false));
    server.after(Arc::new(LangsamerFilter {
        gelaufen: Arc::clone(&gelaufen),
    }));
    echo_registrieren(&server, &log);
    server.start().unwrap();

    server
        .handle(echo_nachricht(), test_session())
        .await
        .expect("Lokaler Dispatch fehlgeschlagen");
    assert!(*gelaufen.lock(), "Lokale After-Filter muessen vor dem Ergebnis fertig sein");
}

#[tokio::test]
async fn test_before_fehler_ueberspringt_handler() {
    let log: Log = Default::default();
    let server = connector_server();
    server.before(Arc::new(LogFilter {
        name: "sperre",
        log: Arc::clone(&log),
        ablehnen: true,
    }));
    server.after(log_filter("nach", &log));
    echo_registrieren(&server, &log);
    server.start().unwrap();

    let fehler = server
        .global_handle(echo_nachricht(), test_session())
        .await
        .unwrap_err();
    assert_eq!(fehler.code(), 403);
    assert_eq!(*log.lock(), vec!["before:sperre", "after:nach"]);
}

struct Uebersetzer;

#[async_trait]
impl ErrorHandler for Uebersetzer {
    async fn behandeln(
        &self,
        fehler: PomeloError,
        _msg: &ClientMessage,
        _session: &SessionRef,
    ) -> PomeloResult<Value> {
        Ok(json!({ "code": fehler.code(), "grund": fehler.to_string() }))
    }
}

#[tokio::test]
async fn test_error_handler_verwandelt_fehler() {
    let server = connector_server();
    server.error_handler(Arc::new(Uebersetzer));
    server.start().unwrap();

    // Kein Handler registriert
    let antwort = server
        .global_handle(echo_nachricht(), test_session())
        .await
        .expect("Error-Handler sollte eine Antwort liefern");
    assert_eq!(antwort["code"], 500);
}

#[tokio::test]
async fn test_globaler_error_handler_sieht_lokale_fehler() {
    let server = connector_server();
    server.global_error_handler(Arc::new(Uebersetzer));
    server.start().unwrap();

    let antwort = server
        .global_handle(echo_nachricht(), test_session())
        .await
        .unwrap();
    assert!(antwort["grund"].as_str().unwrap().contains("connector.entryHandler.echo"));
}
