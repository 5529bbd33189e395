//! pomelo-channel – Kanaele
//!
//! Ein Kanal gruppiert Benutzer nach ihrem Frontend-Server. Pushes an einen
//! Kanal erzeugen einen Aufruf pro Frontend; das eigene Frontend wird
//! direkt bedient, entfernte ueber die RPC-Grenze.

pub mod channel;
pub mod service;
pub mod store;

pub use channel::{Channel, KanalZustand, Mitglied};
pub use service::{ChannelPushTarget, ChannelService, ChannelServiceOptionen, Gruppen, CHANNEL_REMOTE};
pub use store::{ChannelStore, MemoryChannelStore};
