//! pomelo-protocol – Binaeres Client-Protokoll
//!
//! Zwei Ebenen:
//! - Pakete (`package`): 4-Byte-Header mit Typ und 24-Bit-Laenge
//! - Nachrichten (`message`): `{id, route, body}` im Body eines DATA-Pakets
//!
//! `wire` enthaelt die Reassemblierungs-Zustandsmaschine und den Codec
//! fuer `tokio_util::codec::Framed`.

pub mod message;
pub mod package;
pub mod wire;

pub use message::{Nachricht, NachrichtenTyp};
pub use package::{Paket, PaketTyp, HEADER_GROESSE};
pub use wire::{LeseZustand, PaketCodec, PaketLeser};
