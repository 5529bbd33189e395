//! Client-Verbindung – Paketbefehle und Lebenszyklus
//!
//! ## State Machine
//! ```text
//! Inited --HANDSHAKE--> WaitAck --HANDSHAKE_ACK--> Working
//!    |                     |                          |
//!    +---------------------+------> Closed <----------+
//! ```
//!
//! Jede Verbindung besteht aus zwei Tasks: dem Lese-Task (dieses Modul) und
//! einem Schreib-Task, der die `SocketBefehl`e der Session abarbeitet. So
//! laufen Handshake-Antworten, Pushes und das KICK-Paket ueber dieselbe
//! Warteschlange und bleiben in Reihenfolge.
//!
//! DATA-Nachrichten gehen an einen dritten Task pro Verbindung, der sie
//! nacheinander an den Dispatcher gibt. Ein Handler sieht die Nachrichten
//! eines Clients also in Empfangsreihenfolge.

use bytes::Bytes;
use pomelo_protocol::{Nachricht, Paket, PaketTyp};
use pomelo_session::{KanalSocket, Session, SocketBefehl};
use serde_json::{json, Map, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::connector::Connector;
use crate::optionen::SchliessArt;
use crate::transport::{PaketQuelle, PaketSenke};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbindungsZustand {
    Inited,
    WaitAck,
    Working,
    Closed,
}

/// Betreibt eine Verbindung vom ersten Paket bis zum Schliessen der Session
pub(crate) async fn betreiben<Q, S>(connector: Arc<Connector>, peer: SocketAddr, quelle: Q, senke: S)
where
    Q: PaketQuelle,
    S: PaketSenke + 'static,
{
    let (socket, befehle) = KanalSocket::neu();
    let session = connector.session_anlegen(Arc::new(socket));
    let (beendet_tx, beendet_rx) = watch::channel(false);
    tokio::spawn(schreiben(senke, befehle, connector.optionen().schliessen, beendet_tx));
    let (nachrichten, eingang) = mpsc::unbounded_channel();
    tokio::spawn(verteilen(Arc::clone(&connector), Arc::clone(&session), eingang));

    tracing::debug!(peer = %peer, sid = %session.id(), "Session fuer Verbindung angelegt");
    let mut verbindung = Verbindung {
        connector,
        session,
        peer,
        zustand: VerbindungsZustand::Inited,
        heartbeat_frist: None,
        nachrichten,
    };
    let grund = verbindung.lesen(quelle, beendet_rx).await;
    verbindung.beenden(grund);
}

/// Schreib-Task: arbeitet die Befehle der Session ab
async fn schreiben<S: PaketSenke>(
    mut senke: S,
    mut befehle: mpsc::UnboundedReceiver<SocketBefehl>,
    art: SchliessArt,
    beendet: watch::Sender<bool>,
) {
    while let Some(befehl) = befehle.recv().await {
        let ergebnis = match befehl {
            SocketBefehl::Senden(daten) => senke.schreiben(vec![daten]).await,
            SocketBefehl::Batch(daten) => senke.schreiben(daten).await,
            // Destroy verwirft ausstehende Daten, auch das KICK-Paket
            SocketBefehl::Kick(_) if art == SchliessArt::Destroy => break,
            SocketBefehl::Kick(grund) => match kick_paket(&grund) {
                Ok(paket) => senke.schreiben(vec![paket]).await,
                Err(e) => Err(e.into()),
            },
            SocketBefehl::Trennen => break,
        };
        if let Err(e) = ergebnis {
            tracing::debug!(fehler = %e, "Schreiben fehlgeschlagen");
            break;
        }
    }
    senke.schliessen(art).await;
    let _ = beendet.send(true);
}

/// Dispatch-Task: gibt Nachrichten in Empfangsreihenfolge weiter
async fn verteilen(
    connector: Arc<Connector>,
    session: Arc<Session>,
    mut eingang: mpsc::UnboundedReceiver<Nachricht>,
) {
    while let Some(nachricht) = eingang.recv().await {
        Arc::clone(&connector)
            .nachricht_behandeln(Arc::clone(&session), nachricht)
            .await;
    }
}

/// KICK-Paket mit `{reason}`
pub(crate) fn kick_paket(grund: &str) -> pomelo_core::PomeloResult<Bytes> {
    Paket::neu(PaketTyp::Kick, json!({ "reason": grund }).to_string()).kodieren()
}

struct Verbindung {
    connector: Arc<Connector>,
    session: Arc<Session>,
    peer: SocketAddr,
    zustand: VerbindungsZustand,
    heartbeat_frist: Option<Instant>,
    nachrichten: mpsc::UnboundedSender<Nachricht>,
}

impl Verbindung {
    /// Lese-Schleife; liefert den Grund fuer das Schliessen
    async fn lesen<Q: PaketQuelle>(
        &mut self,
        mut quelle: Q,
        mut beendet: watch::Receiver<bool>,
    ) -> &'static str {
        let mut shutdown = self.connector.shutdown_abonnieren();
        let leerlauf = self.connector.optionen().leerlauf_timeout;

        loop {
            if *shutdown.borrow() {
                return "server shutdown";
            }

            let leerlauf_frist = Instant::now() + leerlauf;
            let (frist, heartbeat) = match self.heartbeat_frist {
                Some(hb) if hb <= leerlauf_frist => (hb, true),
                _ => (leerlauf_frist, false),
            };

            tokio::select! {
                gelesen = tokio::time::timeout_at(frist, quelle.lesen()) => match gelesen {
                    Err(_) if heartbeat => {
                        tracing::info!(peer = %self.peer, sid = %self.session.id(), "Heartbeat-Zeitlimit");
                        return "heartbeat timeout";
                    }
                    Err(_) => {
                        tracing::debug!(peer = %self.peer, sid = %self.session.id(), "Leerlauf-Zeitlimit");
                        return "idle timeout";
                    }
                    Ok(Ok(Some(frames))) => {
                        for frame in frames {
                            if let Some(grund) = self.paket(frame) {
                                return grund;
                            }
                        }
                    }
                    Ok(Ok(None)) => return "connection closed",
                    Ok(Err(e)) => {
                        tracing::warn!(peer = %self.peer, fehler = %e, "Lesefehler, Verbindung wird geschlossen");
                        return "socket error";
                    }
                },

                _ = beendet.changed() => return "disconnected",

                _ = shutdown.changed() => return "server shutdown",
            }
        }
    }

    /// Behandelt einen vollstaendigen Frame; `Some(grund)` schliesst die Verbindung
    fn paket(&mut self, frame: Bytes) -> Option<&'static str> {
        let paket = match Paket::aus_frame(&frame) {
            Ok(paket) => paket,
            Err(e) => {
                tracing::warn!(peer = %self.peer, fehler = %e, "Ungueltiges Paket");
                return Some("protocol error");
            }
        };

        let folge = match paket.typ {
            PaketTyp::Handshake => self.handshake(&paket.body),
            PaketTyp::HandshakeAck => {
                if self.zustand == VerbindungsZustand::WaitAck {
                    self.zustand = VerbindungsZustand::Working;
                    tracing::debug!(sid = %self.session.id(), "Handshake abgeschlossen");
                } else {
                    tracing::warn!(sid = %self.session.id(), zustand = ?self.zustand, "Unerwartetes HANDSHAKE_ACK");
                }
                None
            }
            PaketTyp::Heartbeat => {
                if self.connector.optionen().heartbeat.is_some() {
                    self.senden(Paket::leer(PaketTyp::Heartbeat));
                }
                None
            }
            PaketTyp::Data => self.data(paket.body),
            PaketTyp::Kick => {
                tracing::debug!(sid = %self.session.id(), "KICK vom Client ignoriert");
                None
            }
        };

        self.frist_erneuern();
        folge
    }

    fn handshake(&mut self, body: &[u8]) -> Option<&'static str> {
        if self.zustand != VerbindungsZustand::Inited {
            tracing::warn!(sid = %self.session.id(), zustand = ?self.zustand, "Wiederholter Handshake ignoriert");
            return None;
        }

        let anfrage: Value = serde_json::from_slice(body).unwrap_or(Value::Null);
        if anfrage.get("sys").is_none() {
            tracing::warn!(peer = %self.peer, "Handshake ohne sys abgelehnt");
            self.senden(Paket::neu(PaketTyp::Handshake, json!({ "code": 500 }).to_string()));
            return Some("handshake error");
        }

        let mut sys = Map::new();
        if let Some(heartbeat) = self.connector.optionen().heartbeat {
            sys.insert("heartbeat".into(), json!(heartbeat.as_secs()));
        }
        self.senden(Paket::neu(
            PaketTyp::Handshake,
            json!({ "code": 200, "sys": sys }).to_string(),
        ));
        self.zustand = VerbindungsZustand::WaitAck;
        None
    }

    fn data(&mut self, body: Bytes) -> Option<&'static str> {
        if self.zustand != VerbindungsZustand::Working {
            tracing::warn!(sid = %self.session.id(), zustand = ?self.zustand, "DATA vor Handshake verworfen");
            return None;
        }

        let nachricht = match Nachricht::dekodieren(&body) {
            Ok(nachricht) => nachricht,
            Err(e) => {
                tracing::warn!(sid = %self.session.id(), fehler = %e, "Nachricht nicht dekodierbar");
                return Some("protocol error");
            }
        };
        tracing::trace!(sid = %self.session.id(), route = %nachricht.route, id = nachricht.id, "Nachricht empfangen");
        if self.nachrichten.send(nachricht).is_err() {
            tracing::debug!(sid = %self.session.id(), "Dispatch-Task beendet, Nachricht verworfen");
        }
        None
    }

    /// Jedes Paket nach dem Handshake verschiebt die Heartbeat-Frist
    fn frist_erneuern(&mut self) {
        if self.zustand == VerbindungsZustand::Inited {
            return;
        }
        if let Some(timeout) = self.connector.optionen().heartbeat_timeout() {
            self.heartbeat_frist = Some(Instant::now() + timeout);
        }
    }

    fn senden(&self, paket: Paket) {
        match paket.kodieren() {
            Ok(daten) => {
                self.session.send(daten);
            }
            Err(e) => tracing::warn!(sid = %self.session.id(), fehler = %e, "Paket nicht kodierbar"),
        }
    }

    fn beenden(&mut self, grund: &str) {
        self.zustand = VerbindungsZustand::Closed;
        if self.connector.sessions().schliessen(self.session.id(), grund) {
            tracing::debug!(peer = %self.peer, sid = %self.session.id(), grund, "Verbindung geschlossen");
        }
    }
}
