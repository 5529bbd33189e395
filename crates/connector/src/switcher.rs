//! Switcher – Besitzt den Listener und ordnet Verbindungen einem Transport zu
//!
//! Die ersten Bytes jeder neuen Verbindung werden nur angesehen (`peek`),
//! nicht gelesen. Beginnen sie mit einem HTTP-Verb, uebernimmt der
//! WebSocket-Transport, sonst der Roh-TCP-Transport.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use crate::connector::Connector;
use crate::{tcp, ws};

/// Verben, an denen eine HTTP-Anfrage (WebSocket-Upgrade) erkannt wird
pub const HTTP_VERBEN: [&[u8]; 5] = [b"GET ", b"POST", b"DELETE", b"PUT ", b"HEAD"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp,
    WebSocket,
}

/// Ordnet eine Verbindung anhand ihrer ersten Bytes zu
///
/// Ein kurzer Kopf zaehlt als HTTP, solange er Anfang eines Verbs ist;
/// Roh-TCP-Pakete beginnen immer mit einem Typ-Byte 1..=5.
pub fn klassifizieren(kopf: &[u8]) -> Transport {
    let http = HTTP_VERBEN.iter().any(|verb| {
        let n = kopf.len().min(verb.len());
        n > 0 && kopf[..n] == verb[..n]
    });
    if http {
        Transport::WebSocket
    } else {
        Transport::Tcp
    }
}

pub struct Switcher {
    listener: TcpListener,
    connector: Arc<Connector>,
}

impl Switcher {
    pub fn neu(listener: TcpListener, connector: Arc<Connector>) -> Self {
        Self {
            listener,
            connector,
        }
    }

    /// Accept-Loop; endet beim Shutdown-Signal
    pub async fn annehmen(self, mut shutdown_rx: watch::Receiver<bool>) {
        let adresse = self.listener.local_addr().ok();
        tracing::info!(adresse = ?adresse, "Switcher nimmt Verbindungen an");

        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            tracing::debug!(peer = %peer, "Verbindung akzeptiert");
                            let connector = Arc::clone(&self.connector);
                            tokio::spawn(zuordnen(connector, stream, peer));
                        }
                        Err(e) => {
                            tracing::error!(fehler = %e, "TCP-Accept-Fehler");
                            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        }
                    }
                }

                geaendert = shutdown_rx.changed() => {
                    if geaendert.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!(adresse = ?adresse, "Switcher gestoppt");
    }
}

async fn zuordnen(connector: Arc<Connector>, stream: TcpStream, peer: SocketAddr) {
    let mut kopf = [0u8; 8];
    let leerlauf = connector.optionen().leerlauf_timeout;
    let n = match tokio::time::timeout(leerlauf, stream.peek(&mut kopf)).await {
        Ok(Ok(0)) => {
            tracing::debug!(peer = %peer, "Verbindung ohne Daten geschlossen");
            return;
        }
        Ok(Ok(n)) => n,
        Ok(Err(e)) => {
            tracing::debug!(peer = %peer, fehler = %e, "Erste Bytes nicht lesbar");
            return;
        }
        Err(_) => {
            tracing::debug!(peer = %peer, "Leerlauf vor dem ersten Paket");
            return;
        }
    };

    match klassifizieren(&kopf[..n]) {
        Transport::Tcp => tcp::verarbeiten(connector, stream, peer).await,
        Transport::WebSocket => ws::verarbeiten(connector, stream, peer).await,
    }
}
