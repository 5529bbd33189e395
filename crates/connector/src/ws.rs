//! WebSocket-Transport
//!
//! Jede binaere WebSocket-Nachricht wird durch denselben `PaketLeser`
//! geschoben wie ein TCP-Chunk; ein Paket darf also ueber mehrere
//! WebSocket-Nachrichten verteilt sein. Text-Frames werden ignoriert.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use pomelo_protocol::PaketLeser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::connection;
use crate::connector::Connector;
use crate::error::{ConnectorError, ConnectorResult};
use crate::optionen::SchliessArt;
use crate::transport::{PaketQuelle, PaketSenke};

type WsStrom = WebSocketStream<TcpStream>;

pub struct WsQuelle {
    strom: SplitStream<WsStrom>,
    leser: PaketLeser,
    /// Fehler, der nach bereits fertigen Frames desselben Chunks gemeldet wird
    ausstehend: Option<ConnectorError>,
}

impl WsQuelle {
    fn neu(strom: SplitStream<WsStrom>, max_body: usize) -> Self {
        Self {
            strom,
            leser: PaketLeser::mit_max_groesse(max_body),
            ausstehend: None,
        }
    }
}

#[async_trait]
impl PaketQuelle for WsQuelle {
    async fn lesen(&mut self) -> ConnectorResult<Option<Vec<Bytes>>> {
        if let Some(e) = self.ausstehend.take() {
            return Err(e);
        }

        loop {
            match self.strom.next().await {
                Some(Ok(Message::Binary(daten))) => {
                    let mut frames = Vec::new();
                    if let Err(e) = self.leser.verarbeiten(&daten, &mut frames) {
                        if frames.is_empty() {
                            return Err(e.into());
                        }
                        self.ausstehend = Some(e.into());
                    }
                    if !frames.is_empty() {
                        return Ok(Some(frames));
                    }
                }
                Some(Ok(Message::Text(_))) => {
                    tracing::warn!("Text-Frame auf WebSocket ignoriert");
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                // Ping/Pong beantwortet tungstenite selbst
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }
}

pub struct WsSenke(SplitSink<WsStrom, Message>);

#[async_trait]
impl PaketSenke for WsSenke {
    async fn schreiben(&mut self, pakete: Vec<Bytes>) -> ConnectorResult<()> {
        for paket in pakete {
            self.0.feed(Message::Binary(paket.into())).await?;
        }
        self.0.flush().await?;
        Ok(())
    }

    async fn schliessen(&mut self, art: SchliessArt) {
        if art == SchliessArt::End {
            if let Err(e) = self.0.close().await {
                tracing::debug!(fehler = %e, "WebSocket-Close fehlgeschlagen");
            }
        }
    }
}

/// Fuehrt den WebSocket-Handshake aus und betreibt die Verbindung
pub(crate) async fn verarbeiten(connector: Arc<Connector>, stream: TcpStream, peer: SocketAddr) {
    let handshake = tokio::time::timeout(
        connector.optionen().leerlauf_timeout,
        tokio_tungstenite::accept_async(stream),
    )
    .await;
    let strom = match handshake {
        Ok(Ok(strom)) => strom,
        Ok(Err(e)) => {
            tracing::warn!(peer = %peer, fehler = %e, "WebSocket-Handshake fehlgeschlagen");
            return;
        }
        Err(_) => {
            tracing::warn!(peer = %peer, "WebSocket-Handshake: Zeitlimit");
            return;
        }
    };

    let (senke, quelle) = strom.split();
    tracing::debug!(peer = %peer, "WebSocket-Verbindung");
    let quelle = WsQuelle::neu(quelle, connector.optionen().max_paket_groesse);
    connection::betreiben(connector, peer, quelle, WsSenke(senke)).await;
}
