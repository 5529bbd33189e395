//! HandlerService – Registry der Geschaeftslogik eines Servers
//!
//! Handler werden beim Start unter `(handler, methode)` registriert und dabei
//! validiert. Zwei Aufrufkonventionen:
//! - Nachricht: der Handler erhaelt die ganze `ClientMessage`
//! - Argumente: der Handler erhaelt ein Argument-Array; steht im Body ein
//!   Feld `__args__`, ist das dieses Array, sonst `[body]`

use async_trait::async_trait;
use dashmap::DashMap;
use pomelo_core::{PomeloError, PomeloResult};
use pomelo_session::SessionRef;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

use crate::route::{ClientMessage, RouteRecord};

/// Feld im Body fuer die Argument-Konvention
pub const ARGS_FELD: &str = "__args__";

#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, msg: &ClientMessage, session: SessionRef) -> PomeloResult<Value>;
}

#[async_trait]
pub trait ArgsHandler: Send + Sync {
    async fn handle(&self, args: Vec<Value>, session: SessionRef) -> PomeloResult<Value>;
}

#[derive(Clone)]
enum Eintrag {
    Nachricht(Arc<dyn Handler>),
    Argumente(Arc<dyn ArgsHandler>),
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(ClientMessage, SessionRef) -> Fut + Send + Sync,
    Fut: Future<Output = PomeloResult<Value>> + Send + 'static,
{
    async fn handle(&self, msg: &ClientMessage, session: SessionRef) -> PomeloResult<Value> {
        (self.0)(msg.clone(), session).await
    }
}

struct FnArgsHandler<F>(F);

#[async_trait]
impl<F, Fut> ArgsHandler for FnArgsHandler<F>
where
    F: Fn(Vec<Value>, SessionRef) -> Fut + Send + Sync,
    Fut: Future<Output = PomeloResult<Value>> + Send + 'static,
{
    async fn handle(&self, args: Vec<Value>, session: SessionRef) -> PomeloResult<Value> {
        (self.0)(args, session).await
    }
}

/// Handler-Registry eines Servers
#[derive(Default)]
pub struct HandlerService {
    handler: DashMap<(String, String), Eintrag>,
}

impl HandlerService {
    pub fn neu() -> Self {
        Self::default()
    }

    pub fn registrieren(&self, handler: &str, methode: &str, h: Arc<dyn Handler>) -> PomeloResult<()> {
        self.eintragen(handler, methode, Eintrag::Nachricht(h))
    }

    pub fn registrieren_args(
        &self,
        handler: &str,
        methode: &str,
        h: Arc<dyn ArgsHandler>,
    ) -> PomeloResult<()> {
        self.eintragen(handler, methode, Eintrag::Argumente(h))
    }

    /// Registriert eine async Funktion `(msg, session)`
    pub fn registrieren_fn<F, Fut>(&self, handler: &str, methode: &str, f: F) -> PomeloResult<()>
    where
        F: Fn(ClientMessage, SessionRef) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PomeloResult<Value>> + Send + 'static,
    {
        self.registrieren(handler, methode, Arc::new(FnHandler(f)))
    }

    /// Registriert eine async Funktion `(args, session)`
    pub fn registrieren_args_fn<F, Fut>(&self, handler: &str, methode: &str, f: F) -> PomeloResult<()>
    where
        F: Fn(Vec<Value>, SessionRef) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PomeloResult<Value>> + Send + 'static,
    {
        self.registrieren_args(handler, methode, Arc::new(FnArgsHandler(f)))
    }

    pub fn anzahl(&self) -> usize {
        self.handler.len()
    }

    pub fn hat(&self, handler: &str, methode: &str) -> bool {
        self.handler
            .contains_key(&(handler.to_string(), methode.to_string()))
    }

    /// Ruft die zur Route passende Geschaeftsfunktion auf
    pub async fn handle(
        &self,
        record: &RouteRecord,
        msg: &ClientMessage,
        session: SessionRef,
    ) -> PomeloResult<Value> {
        let eintrag = self
            .handler
            .get(&(record.handler.clone(), record.method.clone()))
            .map(|e| e.value().clone())
            .ok_or_else(|| PomeloError::UnbekannterHandler(record.route.clone()))?;

        match eintrag {
            Eintrag::Nachricht(h) => h.handle(msg, session).await,
            Eintrag::Argumente(h) => h.handle(argumente(&msg.body), session).await,
        }
    }

    fn eintragen(&self, handler: &str, methode: &str, eintrag: Eintrag) -> PomeloResult<()> {
        for teil in [handler, methode] {
            if teil.is_empty() || teil.contains('.') {
                return Err(PomeloError::UngueltigeRoute(format!("{handler}.{methode}")));
            }
        }
        let key = (handler.to_string(), methode.to_string());
        if self.handler.contains_key(&key) {
            return Err(PomeloError::intern(format!(
                "Handler {handler}.{methode} ist bereits registriert"
            )));
        }
        self.handler.insert(key, eintrag);
        tracing::debug!(handler = %handler, methode = %methode, "Handler registriert");
        Ok(())
    }
}

fn argumente(body: &Value) -> Vec<Value> {
    match body.get(ARGS_FELD) {
        Some(Value::Array(args)) => args.clone(),
        _ => vec![body.clone()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pomelo_core::{ServerId, SessionId};
    use pomelo_session::{FrontendSession, KanalSocket, SessionService};
    use serde_json::json;

    fn session() -> SessionRef {
        let service = Arc::new(SessionService::neu(false));
        let (socket, _rx) = KanalSocket::neu();
        let s = service.create(SessionId(1), ServerId::neu("f1"), Arc::new(socket));
        FrontendSession::neu(s, service)
    }

    #[tokio::test]
    async fn nachrichten_konvention() {
        let service = HandlerService::neu();
        service
            .registrieren_fn("chatHandler", "send", |msg, session| async move {
                Ok::<_, PomeloError>(json!({ "echo": msg.body, "sid": session.id() }))
            })
            .unwrap();

        let record = RouteRecord::parsen("chat.chatHandler.send").unwrap();
        let msg = ClientMessage::neu(1, "chat.chatHandler.send", json!("hi"));
        let antwort = service.handle(&record, &msg, session()).await.unwrap();
        assert_eq!(antwort, json!({ "echo": "hi", "sid": 1 }));
    }

    #[tokio::test]
    async fn argument_konvention() {
        let service = HandlerService::neu();
        service
            .registrieren_args_fn("mathHandler", "add", |args, _session| async move {
                let summe: i64 = args.iter().filter_map(Value::as_i64).sum();
                Ok::<_, PomeloError>(json!(summe))
            })
            .unwrap();

        let record = RouteRecord::parsen("calc.mathHandler.add").unwrap();
        let msg = ClientMessage::neu(1, "calc.mathHandler.add", json!({ "__args__": [1, 2, 3] }));
        assert_eq!(service.handle(&record, &msg, session()).await.unwrap(), json!(6));

        let msg = ClientMessage::neu(1, "calc.mathHandler.add", json!(5));
        assert_eq!(service.handle(&record, &msg, session()).await.unwrap(), json!(5));
    }

    #[tokio::test]
    async fn unbekannter_handler() {
        let service = HandlerService::neu();
        let record = RouteRecord::parsen("chat.x.y").unwrap();
        let msg = ClientMessage::neu(1, "chat.x.y", Value::Null);
        assert_eq!(
            service.handle(&record, &msg, session()).await.unwrap_err(),
            PomeloError::UnbekannterHandler("chat.x.y".into())
        );
    }

    #[test]
    fn registrierung_wird_validiert() {
        let service = HandlerService::neu();
        let leer = |_: ClientMessage, _: SessionRef| async { Ok::<_, PomeloError>(Value::Null) };
        assert!(service.registrieren_fn("", "m", leer).is_err());
        assert!(service.registrieren_fn("a.b", "m", leer).is_err());
        service.registrieren_fn("h", "m", leer).unwrap();
        assert!(service.registrieren_fn("h", "m", leer).is_err());
        assert!(service.hat("h", "m"));
        assert_eq!(service.anzahl(), 1);
    }
}
