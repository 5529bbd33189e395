//! SessionService – Verwaltung aller Sessions eines Frontend-Servers
//!
//! Zwei Indizes:
//! - `sessions`: SessionId -> Session
//! - `uid_map`:  uid -> gebundene Sessions (nie leer, leere Eintraege werden entfernt)
//!
//! Eine Session bindet hoechstens eine uid. Im Einzel-Session-Modus gehoert
//! zu jeder uid hoechstens eine Session.

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use pomelo_core::{PomeloError, PomeloResult, ServerId, SessionId};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::session::{Session, SessionSocket};

/// Kapazitaet des Ereignis-Kanals
const EREIGNIS_KAPAZITAET: usize = 256;

/// Ereignisse des SessionService
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEreignis {
    /// Session wurde an eine uid gebunden
    Gebunden { sid: SessionId, uid: String },
    /// Bindung an die uid wurde geloest
    Entbunden { sid: SessionId, uid: String },
    /// Session wurde geschlossen; `uid` ist die zuletzt gebundene
    Geschlossen {
        sid: SessionId,
        uid: Option<String>,
        grund: String,
    },
}

/// Zentrale Session-Verwaltung eines Frontend-Servers
pub struct SessionService {
    sessions: DashMap<SessionId, Arc<Session>>,
    uid_map: DashMap<String, Vec<Arc<Session>>>,
    einzel_session: bool,
    /// Serialisiert Binden, Entbinden und Schliessen ueber beide Indizes
    bindung: Mutex<()>,
    ereignisse: broadcast::Sender<SessionEreignis>,
}

impl SessionService {
    /// Erstellt einen neuen Service
    ///
    /// Mit `einzel_session` darf jede uid nur an eine Session gebunden sein.
    pub fn neu(einzel_session: bool) -> Self {
        let (ereignisse, _) = broadcast::channel(EREIGNIS_KAPAZITAET);
        Self {
            sessions: DashMap::new(),
            uid_map: DashMap::new(),
            einzel_session,
            bindung: Mutex::new(()),
            ereignisse,
        }
    }

    /// Abonniert Bind-, Unbind- und Close-Ereignisse
    pub fn abonnieren(&self) -> broadcast::Receiver<SessionEreignis> {
        self.ereignisse.subscribe()
    }

    // -----------------------------------------------------------------------
    // Anlegen / Nachschlagen
    // -----------------------------------------------------------------------

    /// Registriert eine neue Session fuer einen frisch angenommenen Socket
    pub fn create(
        &self,
        sid: SessionId,
        frontend_id: ServerId,
        socket: Arc<dyn SessionSocket>,
    ) -> Arc<Session> {
        let session = Session::neu(sid, frontend_id, socket);
        if self.sessions.insert(sid, Arc::clone(&session)).is_some() {
            tracing::warn!(sid = %sid, "Session-ID doppelt vergeben, alte Session ersetzt");
        }
        tracing::debug!(sid = %sid, "Session angelegt");
        session
    }

    pub fn get(&self, sid: SessionId) -> Option<Arc<Session>> {
        self.sessions.get(&sid).map(|s| Arc::clone(s.value()))
    }

    /// Alle an `uid` gebundenen Sessions (leer wenn keine)
    pub fn get_by_uid(&self, uid: &str) -> Vec<Arc<Session>> {
        self.uid_map
            .get(uid)
            .map(|liste| liste.value().clone())
            .unwrap_or_default()
    }

    /// IDs der an `uid` gebundenen Sessions
    pub fn gebundene_ids(&self, uid: &str) -> Vec<SessionId> {
        self.get_by_uid(uid).iter().map(|s| s.id()).collect()
    }

    pub fn session_anzahl(&self) -> usize {
        self.sessions.len()
    }

    /// Ruft `f` fuer jede Session auf
    ///
    /// Arbeitet auf einem Schnappschuss, damit `f` den Service wieder aufrufen darf.
    pub fn for_each_session<F: FnMut(&Arc<Session>)>(&self, mut f: F) {
        let alle: Vec<Arc<Session>> = self.sessions.iter().map(|e| Arc::clone(e.value())).collect();
        for session in &alle {
            f(session);
        }
    }

    /// Ruft `f` fuer jede an eine uid gebundene Session auf
    pub fn for_each_binded_session<F: FnMut(&Arc<Session>)>(&self, mut f: F) {
        let alle: Vec<Arc<Session>> = self
            .uid_map
            .iter()
            .flat_map(|e| e.value().clone())
            .collect();
        for session in &alle {
            f(session);
        }
    }

    // -----------------------------------------------------------------------
    // Binden / Entbinden
    // -----------------------------------------------------------------------

    /// Bindet eine Session an eine uid
    ///
    /// Erneutes Binden derselben uid ist ein erfolgreicher No-op. Eine
    /// geschlossene Session kann nicht mehr gebunden werden.
    pub fn bind(&self, sid: SessionId, uid: &str) -> PomeloResult<()> {
        {
            let _bindung = self.bindung.lock();
            let session = self.get(sid).ok_or(PomeloError::SessionNichtGefunden(sid))?;
            if session.ist_geschlossen() {
                return Err(PomeloError::SessionGeschlossen(sid));
            }

            match session.uid() {
                Some(gebunden) if gebunden == uid => return Ok(()),
                Some(gebunden) => return Err(PomeloError::BereitsGebunden { sid, gebunden }),
                None => {}
            }

            let mut liste = self.uid_map.entry(uid.to_string()).or_default();
            if self.einzel_session && !liste.is_empty() {
                return Err(PomeloError::EinzelSession(uid.to_string()));
            }
            if liste.iter().any(|s| s.id() == sid) {
                return Err(PomeloError::DoppelteSession {
                    sid,
                    uid: uid.to_string(),
                });
            }
            liste.push(Arc::clone(&session));
            session.uid_setzen(Some(uid.to_string()));
        }

        tracing::debug!(sid = %sid, uid = %uid, "Session gebunden");
        let _ = self.ereignisse.send(SessionEreignis::Gebunden {
            sid,
            uid: uid.to_string(),
        });
        Ok(())
    }

    /// Loest die Bindung einer Session an eine uid
    pub fn unbind(&self, sid: SessionId, uid: &str) -> PomeloResult<()> {
        {
            let _bindung = self.bindung.lock();
            let session = self.get(sid).ok_or(PomeloError::SessionNichtGefunden(sid))?;

            match session.uid() {
                Some(gebunden) if gebunden == uid => {}
                _ => {
                    return Err(PomeloError::NichtGebunden {
                        sid,
                        uid: uid.to_string(),
                    })
                }
            }

            self.aus_uid_map_entfernen(uid, sid);
            session.uid_setzen(None);
        }

        tracing::debug!(sid = %sid, uid = %uid, "Session entbunden");
        let _ = self.ereignisse.send(SessionEreignis::Entbunden {
            sid,
            uid: uid.to_string(),
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Entfernen / Schliessen
    // -----------------------------------------------------------------------

    /// Entfernt eine Session aus beiden Indizes (idempotent)
    pub fn remove(&self, sid: SessionId) {
        let _bindung = self.bindung.lock();
        self.aus_indizes_entfernen(sid);
    }

    /// Schliesst eine Session
    ///
    /// Reihenfolge: Zustand CLOSED, aus den Indizes entfernen, Beobachter und
    /// Abonnenten benachrichtigen, KICK an den Socket, Trennen im naechsten
    /// Scheduler-Durchlauf. Wiederholte Aufrufe sind No-ops.
    pub fn schliessen(&self, sid: SessionId, grund: &str) -> bool {
        let (session, uid) = {
            let _bindung = self.bindung.lock();
            let Some(session) = self.get(sid) else {
                return false;
            };
            if !session.als_geschlossen_markieren() {
                return false;
            }
            let uid = session.uid();
            self.aus_indizes_entfernen(sid);
            (session, uid)
        };

        session.beobachter_benachrichtigen(grund);
        let _ = self.ereignisse.send(SessionEreignis::Geschlossen {
            sid,
            uid: uid.clone(),
            grund: grund.to_string(),
        });
        tracing::debug!(sid = %sid, uid = ?uid, grund = %grund, "Session geschlossen");

        let socket = Arc::clone(session.socket());
        socket.kick(grund);
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            socket.disconnect();
        });
        true
    }

    /// Schliesst alle Sessions einer uid und gibt deren Anzahl zurueck
    pub fn kick(&self, uid: &str, grund: &str) -> usize {
        self.get_by_uid(uid)
            .iter()
            .filter(|s| self.schliessen(s.id(), grund))
            .count()
    }

    pub fn kick_by_session_id(&self, sid: SessionId, grund: &str) -> bool {
        self.schliessen(sid, grund)
    }

    // -----------------------------------------------------------------------
    // Settings
    // -----------------------------------------------------------------------

    /// Setzt ein einzelnes Setting der kanonischen Session
    pub fn import(&self, sid: SessionId, key: &str, wert: Value) -> PomeloResult<()> {
        let session = self.get(sid).ok_or(PomeloError::SessionNichtGefunden(sid))?;
        session.set(key, wert);
        Ok(())
    }

    /// Ersetzt alle Settings der kanonischen Session
    pub fn import_all(&self, sid: SessionId, settings: Map<String, Value>) -> PomeloResult<()> {
        let session = self.get(sid).ok_or(PomeloError::SessionNichtGefunden(sid))?;
        session.set_all(settings);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Direkte Zustellung
    // -----------------------------------------------------------------------

    /// Sendet ein kodiertes Paket direkt; `false` wenn die Session fehlt
    pub fn send_message(&self, sid: SessionId, daten: Bytes) -> bool {
        match self.get(sid) {
            Some(session) => session.send(daten),
            None => {
                tracing::debug!(sid = %sid, "Nachricht fuer unbekannte Session verworfen");
                false
            }
        }
    }

    /// Sendet an alle Sessions einer uid; `false` wenn keine erreicht wurde
    pub fn send_message_by_uid(&self, uid: &str, daten: Bytes) -> bool {
        let sessions = self.get_by_uid(uid);
        let mut erreicht = false;
        for session in &sessions {
            erreicht |= session.send(daten.clone());
        }
        erreicht
    }

    /// Sendet mehrere Pakete in einem Schreibvorgang
    pub fn send_batch(&self, sid: SessionId, daten: Vec<Bytes>) -> bool {
        match self.get(sid) {
            Some(session) => session.send_batch(daten),
            None => false,
        }
    }

    // -----------------------------------------------------------------------
    // Intern
    // -----------------------------------------------------------------------

    /// Nur unter `bindung` aufrufen
    fn aus_indizes_entfernen(&self, sid: SessionId) {
        let Some((_, session)) = self.sessions.remove(&sid) else {
            return;
        };
        if let Some(uid) = session.uid() {
            self.aus_uid_map_entfernen(&uid, sid);
        }
    }

    fn aus_uid_map_entfernen(&self, uid: &str, sid: SessionId) {
        if let Entry::Occupied(mut eintrag) = self.uid_map.entry(uid.to_string()) {
            eintrag.get_mut().retain(|s| s.id() != sid);
            if eintrag.get().is_empty() {
                eintrag.remove();
            }
        }
    }
}

impl std::fmt::Debug for SessionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionService")
            .field("sessions", &self.sessions.len())
            .field("uids", &self.uid_map.len())
            .field("einzel_session", &self.einzel_session)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
