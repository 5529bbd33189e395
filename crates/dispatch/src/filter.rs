//! Filterketten
//!
//! Before-Filter laufen in Registrierungsreihenfolge und brechen beim ersten
//! Fehler ab. After-Filter laufen in umgekehrter Registrierungsreihenfolge
//! (zuletzt registriert laeuft zuerst), alle laufen, und jeder darf den
//! erhaltenen Fehler ersetzen oder aufheben.

use async_trait::async_trait;
use parking_lot::RwLock;
use pomelo_core::{PomeloError, PomeloResult};
use pomelo_session::SessionRef;
use serde_json::Value;
use std::sync::Arc;

use crate::route::ClientMessage;

#[async_trait]
pub trait BeforeFilter: Send + Sync {
    async fn before(&self, msg: &ClientMessage, session: &SessionRef) -> PomeloResult<()>;
}

#[async_trait]
pub trait AfterFilter: Send + Sync {
    /// Erhaelt den bisherigen Fehler und gibt den weiterzureichenden zurueck
    async fn after(
        &self,
        fehler: Option<PomeloError>,
        msg: &ClientMessage,
        session: &SessionRef,
        antwort: Option<&Value>,
    ) -> Option<PomeloError>;
}

/// Eine Before- und eine After-Kette
#[derive(Default)]
pub struct FilterService {
    befores: RwLock<Vec<Arc<dyn BeforeFilter>>>,
    afters: RwLock<Vec<Arc<dyn AfterFilter>>>,
}

impl FilterService {
    pub fn neu() -> Self {
        Self::default()
    }

    pub fn before(&self, filter: Arc<dyn BeforeFilter>) {
        self.befores.write().push(filter);
    }

    pub fn after(&self, filter: Arc<dyn AfterFilter>) {
        self.afters.write().insert(0, filter);
    }

    pub async fn before_filter(&self, msg: &ClientMessage, session: &SessionRef) -> PomeloResult<()> {
        let kette = self.befores.read().clone();
        for filter in kette {
            filter.before(msg, session).await?;
        }
        Ok(())
    }

    pub async fn after_filter(
        &self,
        mut fehler: Option<PomeloError>,
        msg: &ClientMessage,
        session: &SessionRef,
        antwort: Option<&Value>,
    ) -> Option<PomeloError> {
        let kette = self.afters.read().clone();
        for filter in kette {
            fehler = filter.after(fehler, msg, session, antwort).await;
        }
        fehler
    }
}
