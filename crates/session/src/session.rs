//! Session einer einzelnen Client-Verbindung
//!
//! Eine `Session` gehoert genau einem Socket auf einem Frontend-Server.
//! Sie haelt die gebundene uid, frei definierbare Settings und die
//! Beobachter, die beim Schliessen benachrichtigt werden.

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use pomelo_core::{ServerId, SessionId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// SessionSocket
// ---------------------------------------------------------------------------

/// Schreibende Seite einer Client-Verbindung
///
/// Alle Methoden sind nicht-blockierend; die eigentliche IO erledigt der
/// Schreib-Task der Verbindung.
pub trait SessionSocket: Send + Sync {
    /// Sendet ein bereits kodiertes Paket
    fn send(&self, daten: Bytes) -> bool;

    /// Sendet mehrere Pakete in einem Schreibvorgang
    fn send_batch(&self, daten: Vec<Bytes>) -> bool;

    /// Kuendigt das Schliessen an (KICK-Paket mit Grund)
    fn kick(&self, grund: &str);

    /// Trennt die Verbindung
    fn disconnect(&self);
}

/// Befehle an den Schreib-Task einer Verbindung
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketBefehl {
    Senden(Bytes),
    Batch(Vec<Bytes>),
    Kick(String),
    Trennen,
}

/// `SessionSocket` ueber einen unbeschraenkten mpsc-Kanal
#[derive(Debug, Clone)]
pub struct KanalSocket {
    tx: mpsc::UnboundedSender<SocketBefehl>,
}

impl KanalSocket {
    /// Erstellt Socket und Empfaengerseite fuer den Schreib-Task
    pub fn neu() -> (Self, mpsc::UnboundedReceiver<SocketBefehl>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl SessionSocket for KanalSocket {
    fn send(&self, daten: Bytes) -> bool {
        self.tx.send(SocketBefehl::Senden(daten)).is_ok()
    }

    fn send_batch(&self, daten: Vec<Bytes>) -> bool {
        self.tx.send(SocketBefehl::Batch(daten)).is_ok()
    }

    fn kick(&self, grund: &str) {
        let _ = self.tx.send(SocketBefehl::Kick(grund.to_string()));
    }

    fn disconnect(&self) {
        let _ = self.tx.send(SocketBefehl::Trennen);
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionZustand {
    Inited,
    Closed,
}

/// Serialisierbarer Schnappschuss einer Session
///
/// Reist bei weitergeleiteten Nachrichten zum Backend-Server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportedSession {
    pub id: SessionId,
    pub frontend_id: ServerId,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub settings: Map<String, Value>,
}

type ClosedBeobachter = Box<dyn FnOnce(SessionId, &str) + Send>;

struct SessionDaten {
    uid: Option<String>,
    settings: Map<String, Value>,
    zustand: SessionZustand,
}

/// Kanonische Session auf dem Frontend-Server
pub struct Session {
    id: SessionId,
    frontend_id: ServerId,
    socket: Arc<dyn SessionSocket>,
    daten: RwLock<SessionDaten>,
    beobachter: Mutex<Vec<ClosedBeobachter>>,
}

impl Session {
    pub fn neu(id: SessionId, frontend_id: ServerId, socket: Arc<dyn SessionSocket>) -> Arc<Self> {
        Arc::new(Self {
            id,
            frontend_id,
            socket,
            daten: RwLock::new(SessionDaten {
                uid: None,
                settings: Map::new(),
                zustand: SessionZustand::Inited,
            }),
            beobachter: Mutex::new(Vec::new()),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn frontend_id(&self) -> &ServerId {
        &self.frontend_id
    }

    pub fn uid(&self) -> Option<String> {
        self.daten.read().uid.clone()
    }

    pub fn ist_gebunden(&self) -> bool {
        self.daten.read().uid.is_some()
    }

    pub fn zustand(&self) -> SessionZustand {
        self.daten.read().zustand
    }

    pub fn ist_geschlossen(&self) -> bool {
        self.zustand() == SessionZustand::Closed
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.daten.read().settings.get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, wert: Value) {
        self.daten.write().settings.insert(key.into(), wert);
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.daten.write().settings.remove(key)
    }

    /// Uebernimmt alle Settings (ersetzt die bisherigen)
    pub fn set_all(&self, settings: Map<String, Value>) {
        self.daten.write().settings = settings;
    }

    pub fn settings(&self) -> Map<String, Value> {
        self.daten.read().settings.clone()
    }

    /// Registriert einen einmaligen Beobachter fuer das Schliessen
    ///
    /// Ist die Session bereits geschlossen, wird der Beobachter sofort aufgerufen.
    pub fn on_closed<F>(&self, beobachter: F)
    where
        F: FnOnce(SessionId, &str) + Send + 'static,
    {
        {
            let mut liste = self.beobachter.lock();
            if !self.ist_geschlossen() {
                liste.push(Box::new(beobachter));
                return;
            }
        }
        beobachter(self.id, "bereits geschlossen");
    }

    /// Sendet ein kodiertes Paket; `false` wenn geschlossen oder Socket weg
    pub fn send(&self, daten: Bytes) -> bool {
        if self.ist_geschlossen() {
            return false;
        }
        self.socket.send(daten)
    }

    pub fn send_batch(&self, daten: Vec<Bytes>) -> bool {
        if self.ist_geschlossen() {
            return false;
        }
        self.socket.send_batch(daten)
    }

    pub fn export(&self) -> ExportedSession {
        let daten = self.daten.read();
        ExportedSession {
            id: self.id,
            frontend_id: self.frontend_id.clone(),
            uid: daten.uid.clone(),
            settings: daten.settings.clone(),
        }
    }

    pub(crate) fn uid_setzen(&self, uid: Option<String>) {
        self.daten.write().uid = uid;
    }

    /// Markiert die Session als geschlossen; `false` wenn sie es schon war
    pub(crate) fn als_geschlossen_markieren(&self) -> bool {
        let mut daten = self.daten.write();
        if daten.zustand == SessionZustand::Closed {
            return false;
        }
        daten.zustand = SessionZustand::Closed;
        true
    }

    pub(crate) fn beobachter_benachrichtigen(&self, grund: &str) {
        let beobachter = std::mem::take(&mut *self.beobachter.lock());
        for b in beobachter {
            b(self.id, grund);
        }
    }

    pub(crate) fn socket(&self) -> &Arc<dyn SessionSocket> {
        &self.socket
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let daten = self.daten.read();
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("frontend_id", &self.frontend_id)
            .field("uid", &daten.uid)
            .field("zustand", &daten.zustand)
            .finish()
    }
}
