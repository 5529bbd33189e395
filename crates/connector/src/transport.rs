//! Gemeinsame Schnittstelle der Transporte
//!
//! TCP und WebSocket liefern beide vollstaendige Frames (Header + Body) und
//! nehmen bereits kodierte Pakete entgegen. Die Verbindungslogik in
//! `connection` kennt nur diese beiden Traits.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::ConnectorResult;
use crate::optionen::SchliessArt;

/// Lesende Haelfte einer Verbindung
#[async_trait]
pub trait PaketQuelle: Send {
    /// Naechste vollstaendige Frames; `None` wenn die Gegenseite sauber schliesst
    async fn lesen(&mut self) -> ConnectorResult<Option<Vec<Bytes>>>;
}

/// Schreibende Haelfte einer Verbindung
#[async_trait]
pub trait PaketSenke: Send {
    /// Schreibt alle Pakete und flusht einmal am Ende
    async fn schreiben(&mut self, pakete: Vec<Bytes>) -> ConnectorResult<()>;

    async fn schliessen(&mut self, art: SchliessArt);
}
