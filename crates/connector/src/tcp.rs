//! Roh-TCP-Transport ueber `Framed` mit `PaketCodec`

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use pomelo_protocol::PaketCodec;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::connection;
use crate::connector::Connector;
use crate::error::{ConnectorError, ConnectorResult};
use crate::optionen::SchliessArt;
use crate::transport::{PaketQuelle, PaketSenke};

type TcpRahmen = Framed<TcpStream, PaketCodec>;

pub struct TcpQuelle(SplitStream<TcpRahmen>);

#[async_trait]
impl PaketQuelle for TcpQuelle {
    async fn lesen(&mut self) -> ConnectorResult<Option<Vec<Bytes>>> {
        match self.0.next().await {
            Some(Ok(frame)) => Ok(Some(vec![frame])),
            // Der Codec meldet Protokollverletzungen als InvalidData
            Some(Err(e)) if e.kind() == io::ErrorKind::InvalidData => {
                Err(ConnectorError::Protokoll(e.to_string()))
            }
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }
}

pub struct TcpSenke(SplitSink<TcpRahmen, Bytes>);

#[async_trait]
impl PaketSenke for TcpSenke {
    async fn schreiben(&mut self, pakete: Vec<Bytes>) -> ConnectorResult<()> {
        for paket in pakete {
            self.0.feed(paket).await?;
        }
        self.0.flush().await?;
        Ok(())
    }

    async fn schliessen(&mut self, art: SchliessArt) {
        if art == SchliessArt::End {
            if let Err(e) = self.0.close().await {
                tracing::debug!(fehler = %e, "TCP-Shutdown fehlgeschlagen");
            }
        }
    }
}

/// Betreibt eine als Roh-TCP erkannte Verbindung bis zum Ende
pub(crate) async fn verarbeiten(connector: Arc<Connector>, stream: TcpStream, peer: SocketAddr) {
    if connector.optionen().no_delay {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(peer = %peer, fehler = %e, "TCP_NODELAY nicht gesetzt");
        }
    }

    let codec = PaketCodec::mit_max_groesse(connector.optionen().max_paket_groesse);
    let (senke, quelle) = Framed::new(stream, codec).split::<Bytes>();
    tracing::debug!(peer = %peer, "TCP-Verbindung");
    connection::betreiben(connector, peer, TcpQuelle(quelle), TcpSenke(senke)).await;
}
