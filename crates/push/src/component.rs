//! Push-Scheduler-Komponente des Frontends
//!
//! Haelt entweder genau einen Scheduler oder mehrere benannte Scheduler plus
//! einen Selektor, der pro Push einen davon auswaehlt.

use async_trait::async_trait;
use bytes::Bytes;
use pomelo_core::{PomeloError, PomeloResult, PushOptions, SessionId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::scheduler::Scheduler;

/// Waehlt pro Push den Namen eines registrierten Schedulers
#[async_trait]
pub trait SchedulerSelektor: Send + Sync {
    async fn waehlen(
        &self,
        req_id: u32,
        route: &str,
        msg: &Bytes,
        recvs: &[SessionId],
        opts: &PushOptions,
    ) -> PomeloResult<String>;
}

enum Modus {
    Einzel(Arc<dyn Scheduler>),
    Auswahl {
        scheduler: HashMap<String, Arc<dyn Scheduler>>,
        selektor: Arc<dyn SchedulerSelektor>,
    },
}

pub struct PushSchedulerComponent {
    modus: Modus,
}

impl PushSchedulerComponent {
    pub fn einzel(scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            modus: Modus::Einzel(scheduler),
        }
    }

    pub fn auswahl(
        scheduler: HashMap<String, Arc<dyn Scheduler>>,
        selektor: Arc<dyn SchedulerSelektor>,
    ) -> Self {
        Self {
            modus: Modus::Auswahl { scheduler, selektor },
        }
    }

    pub fn ist_auswahl(&self) -> bool {
        matches!(self.modus, Modus::Auswahl { .. })
    }

    fn alle(&self) -> Vec<Arc<dyn Scheduler>> {
        match &self.modus {
            Modus::Einzel(s) => vec![Arc::clone(s)],
            Modus::Auswahl { scheduler, .. } => scheduler.values().cloned().collect(),
        }
    }
}

#[async_trait]
impl Scheduler for PushSchedulerComponent {
    async fn start(&self) -> PomeloResult<()> {
        for s in self.alle() {
            s.start().await?;
        }
        Ok(())
    }

    async fn stop(&self, force: bool) -> PomeloResult<()> {
        for s in self.alle() {
            s.stop(force).await?;
        }
        Ok(())
    }

    async fn schedule(
        &self,
        req_id: u32,
        route: &str,
        msg: Bytes,
        recvs: &[SessionId],
        opts: &PushOptions,
    ) -> PomeloResult<()> {
        match &self.modus {
            Modus::Einzel(s) => s.schedule(req_id, route, msg, recvs, opts).await,
            Modus::Auswahl { scheduler, selektor } => {
                let name = selektor.waehlen(req_id, route, &msg, recvs, opts).await?;
                match scheduler.get(&name) {
                    Some(s) => s.schedule(req_id, route, msg, recvs, opts).await,
                    None => {
                        tracing::error!(name = %name, route, "Ungueltige Scheduler-Auswahl");
                        Err(PomeloError::intern(format!("unbekannter Push-Scheduler: {name}")))
                    }
                }
            }
        }
    }
}
