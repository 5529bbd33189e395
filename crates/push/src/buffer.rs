//! Gepufferte Zustellung
//!
//! Nachrichten werden pro Session in einer Warteschlange gesammelt und von
//! einer Hintergrund-Task im festen Takt als Batch geschrieben. Schliesst
//! eine Session, wird ihre Warteschlange verworfen.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use pomelo_core::{PomeloResult, PushOptions, SessionId};
use pomelo_session::{Session, SessionService};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::scheduler::{broadcast_empfaenger, BroadcastFilter, Scheduler};

/// Standard-Takt der Flush-Task
pub const STANDARD_FLUSH_INTERVALL: Duration = Duration::from_millis(20);

type Warteschlangen = DashMap<SessionId, Vec<Bytes>>;

pub struct BufferPushScheduler {
    sessions: Arc<SessionService>,
    filter: Option<Arc<dyn BroadcastFilter>>,
    warteschlangen: Arc<Warteschlangen>,
    intervall: Duration,
    flush_task: Mutex<Option<JoinHandle<()>>>,
}

impl BufferPushScheduler {
    pub fn neu(sessions: Arc<SessionService>) -> Self {
        Self::mit_intervall(sessions, STANDARD_FLUSH_INTERVALL)
    }

    pub fn mit_intervall(sessions: Arc<SessionService>, intervall: Duration) -> Self {
        Self {
            sessions,
            filter: None,
            warteschlangen: Arc::new(DashMap::new()),
            intervall,
            flush_task: Mutex::new(None),
        }
    }

    pub fn mit_filter(mut self, filter: Arc<dyn BroadcastFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Anzahl wartender Nachrichten einer Session (`None` ohne Warteschlange)
    pub fn wartend(&self, sid: SessionId) -> Option<usize> {
        self.warteschlangen.get(&sid).map(|q| q.len())
    }

    /// Schreibt alle nicht-leeren Warteschlangen als Batch
    pub fn flush(&self) {
        flush(&self.sessions, &self.warteschlangen);
    }

    fn einreihen(&self, session: &Arc<Session>, msg: Bytes) {
        if session.ist_geschlossen() {
            return;
        }

        let mut neu = false;
        self.warteschlangen
            .entry(session.id())
            .or_insert_with(|| {
                neu = true;
                Vec::new()
            })
            .push(msg);

        // Erst nach Freigabe des Eintrags: der Beobachter kann sofort feuern
        if neu {
            let schlangen: Weak<Warteschlangen> = Arc::downgrade(&self.warteschlangen);
            session.on_closed(move |sid, _grund| {
                if let Some(schlangen) = schlangen.upgrade() {
                    schlangen.remove(&sid);
                }
            });
        }
    }
}

fn flush(sessions: &SessionService, warteschlangen: &Warteschlangen) {
    let mut faellig = Vec::new();
    for mut eintrag in warteschlangen.iter_mut() {
        if !eintrag.value().is_empty() {
            let sid = *eintrag.key();
            faellig.push((sid, std::mem::take(eintrag.value_mut())));
        }
    }

    for (sid, batch) in faellig {
        match sessions.get(sid) {
            Some(session) => {
                session.send_batch(batch);
            }
            None => tracing::debug!(sid = %sid, "Batch fuer unbekannte Session verworfen"),
        }
    }
}

#[async_trait]
impl Scheduler for BufferPushScheduler {
    async fn start(&self) -> PomeloResult<()> {
        let mut task = self.flush_task.lock();
        if task.is_some() {
            return Ok(());
        }

        let sessions = Arc::downgrade(&self.sessions);
        let schlangen = Arc::downgrade(&self.warteschlangen);
        let intervall = self.intervall;
        *task = Some(tokio::spawn(async move {
            let mut takt = tokio::time::interval(intervall);
            takt.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                takt.tick().await;
                let (Some(sessions), Some(schlangen)) = (sessions.upgrade(), schlangen.upgrade())
                else {
                    break;
                };
                flush(&sessions, &schlangen);
            }
        }));
        tracing::debug!(intervall_ms = intervall.as_millis() as u64, "Buffer-Scheduler gestartet");
        Ok(())
    }

    async fn stop(&self, _force: bool) -> PomeloResult<()> {
        if let Some(task) = self.flush_task.lock().take() {
            task.abort();
        }
        self.flush();
        Ok(())
    }

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
            tracing::trace!(route, anzahl = empfaenger.len(), "Broadcast gepuffert");
            for session in &empfaenger {
                self.einreihen(session, msg.clone());
            }
        } else {
            for sid in recvs {
                if let Some(session) = self.sessions.get(*sid) {
                    self.einreihen(&session, msg.clone());
                }
            }
        }
        Ok(())
    }
}

impl Drop for BufferPushScheduler {
    fn drop(&mut self) {
        if let Some(task) = self.flush_task.get_mut().take() {
            task.abort();
        }
    }
}
