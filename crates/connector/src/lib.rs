//! pomelo-connector – Frontend-Connector
//!
//! - `switcher`:       Listener, Zuordnung TCP/WebSocket per `peek`
//! - `tcp`, `ws`:      Transporte hinter `PaketQuelle`/`PaketSenke`
//! - `connection`:     Handshake, Heartbeat, DATA und KICK pro Verbindung
//! - `connector`:      Session-Vergabe, Weitergabe an den Server, Kodierung fuer den Scheduler
//! - `channel_remote`: `channelRemote`-Dienst fuer Kanal-Pushes

pub mod channel_remote;
pub mod connection;
pub mod connector;
pub mod error;
pub mod optionen;
pub mod switcher;
pub mod tcp;
pub mod transport;
pub mod ws;

#[cfg(test)]
mod tests;

pub use channel_remote::ChannelRemote;
pub use connection::VerbindungsZustand;
pub use connector::Connector;
pub use error::{ConnectorError, ConnectorResult};
pub use optionen::{ConnectorOptionen, SchliessArt};
pub use switcher::{klassifizieren, Switcher, Transport};
pub use transport::{PaketQuelle, PaketSenke};
