//! Gemeinsame Hilfen der Integrationstests: Konfiguration und Roh-Clients

#![allow(dead_code)]

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use pomelo_core::{PomeloError, ServerInfo};
use pomelo_protocol::{Nachricht, Paket, PaketCodec, PaketTyp};
use pomelo_server::config::ServerConfig;
use pomelo_server::App;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

pub const ZEITLIMIT: Duration = Duration::from_secs(5);

/// Frontend auf 127.0.0.1 mit zufaelligem Port
pub fn frontend_config(id: &str) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.server.id = id.into();
    config.server.typ = "connector".into();
    config.server.frontend = true;
    config.netzwerk.bind_adresse = "127.0.0.1".into();
    config.netzwerk.port = 0;
    config.connector.heartbeat_sek = 1;
    config
}

pub fn backend_config(id: &str, typ: &str) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.server.id = id.into();
    config.server.typ = typ.into();
    config.server.frontend = false;
    config
}

pub fn cluster_eintrag(config: &ServerConfig) -> ServerInfo {
    config.server_info()
}

/// Echo-Handler `connector.entryHandler.echo`
pub fn echo_registrieren(app: &App) {
    app.server()
        .handler()
        .registrieren_fn("entryHandler", "echo", |msg, _session| async move {
            Ok::<_, PomeloError>(msg.body)
        })
        .expect("Handler registrieren fehlgeschlagen");
}

pub fn paket(typ: PaketTyp, body: impl Into<Bytes>) -> Bytes {
    Paket::neu(typ, body).kodieren().unwrap()
}

pub fn handshake_paket() -> Bytes {
    paket(
        PaketTyp::Handshake,
        json!({ "sys": { "type": "rust-test", "version": "0.1.0" }, "user": {} }).to_string(),
    )
}

pub fn request_paket(id: u32, route: &str, body: Value) -> Bytes {
    let nachricht = Nachricht::request(id, route, body.to_string());
    paket(PaketTyp::Data, nachricht.kodieren().unwrap())
}

pub fn dekodieren(paket: &Paket) -> Nachricht {
    assert_eq!(paket.typ, PaketTyp::Data, "DATA erwartet");
    Nachricht::dekodieren(&paket.body).unwrap()
}

/// Roh-TCP-Client, der denselben Codec wie der Server verwendet
pub struct TcpClient {
    rahmen: Framed<TcpStream, PaketCodec>,
}

impl TcpClient {
    pub async fn verbinden(adresse: SocketAddr) -> Self {
        let stream = TcpStream::connect(adresse).await.expect("Verbindung fehlgeschlagen");
        Self::aus_stream(stream)
    }

    pub fn aus_stream(stream: TcpStream) -> Self {
        Self {
            rahmen: Framed::new(stream, PaketCodec::neu()),
        }
    }

    pub async fn senden(&mut self, daten: Bytes) {
        self.rahmen.send(daten).await.expect("Senden fehlgeschlagen");
    }

    /// Naechstes Paket; `None` wenn der Server die Verbindung schliesst
    pub async fn empfangen_oder_ende(&mut self) -> Option<Paket> {
        match tokio::time::timeout(ZEITLIMIT, self.rahmen.next()).await {
            Ok(Some(Ok(frame))) => Some(Paket::aus_frame(&frame).unwrap()),
            Ok(Some(Err(_))) | Ok(None) => None,
            Err(_) => panic!("kein Paket vom Server"),
        }
    }

    pub async fn empfangen(&mut self) -> Paket {
        self.empfangen_oder_ende().await.expect("Verbindung beendet")
    }

    pub async fn nachricht(&mut self) -> Nachricht {
        let paket = self.empfangen().await;
        dekodieren(&paket)
    }

    pub async fn handshake(&mut self) -> Value {
        self.senden(handshake_paket()).await;
        let antwort = self.empfangen().await;
        assert_eq!(antwort.typ, PaketTyp::Handshake);
        self.senden(paket(PaketTyp::HandshakeAck, Bytes::new())).await;
        serde_json::from_slice(&antwort.body).unwrap()
    }
}
