//! Framing fuer Client-Verbindungen
//!
//! `PaketLeser` ist die Zustandsmaschine, die aus beliebig zerstueckelten
//! Chunks vollstaendige Frames (Header + Body) zusammensetzt:
//!
//! ```text
//! Kopf --(4 Bytes, gueltiger Typ)--> Rumpf --(Body komplett)--> Kopf
//!   |
//!   +--(ungueltiger Typ / zu gross)--> Geschlossen
//! ```
//!
//! Ein Chunk wird immer vollstaendig verarbeitet, bevor der Leser zurueckkehrt.
//! `PaketCodec` bindet den Leser an `tokio_util::codec::Framed`.

use bytes::{Bytes, BytesMut};
use pomelo_core::{PomeloError, PomeloResult};
use std::collections::VecDeque;
use std::io;
use tokio_util::codec::{Decoder, Encoder};

use crate::package::{body_laenge, kodieren_in, Paket, PaketTyp, HEADER_GROESSE, MAX_BODY_LAENGE};

// ---------------------------------------------------------------------------
// PaketLeser
// ---------------------------------------------------------------------------

/// Zustand des Lesers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeseZustand {
    /// Header wird gelesen
    Kopf,
    /// Body wird gelesen
    Rumpf,
    /// Protokollverletzung oder explizit geschlossen
    Geschlossen,
}

/// Zustandsmaschine fuer die Paket-Reassemblierung
#[derive(Debug)]
pub struct PaketLeser {
    zustand: LeseZustand,
    kopf: [u8; HEADER_GROESSE],
    kopf_offset: usize,
    paket: Vec<u8>,
    paket_offset: usize,
    max_body: usize,
}

impl PaketLeser {
    /// Erstellt einen Leser mit der maximalen 24-Bit-Body-Laenge
    pub fn neu() -> Self {
        Self::mit_max_groesse(MAX_BODY_LAENGE)
    }

    /// Erstellt einen Leser mit eigener Body-Obergrenze
    pub fn mit_max_groesse(max_body: usize) -> Self {
        Self {
            zustand: LeseZustand::Kopf,
            kopf: [0; HEADER_GROESSE],
            kopf_offset: 0,
            paket: Vec::new(),
            paket_offset: 0,
            max_body,
        }
    }

    pub fn zustand(&self) -> LeseZustand {
        self.zustand
    }

    /// Schliesst den Leser; weitere Chunks werden abgelehnt
    pub fn schliessen(&mut self) {
        self.zustand = LeseZustand::Geschlossen;
        self.paket = Vec::new();
    }

    /// Verarbeitet einen Chunk vollstaendig
    ///
    /// Fertige Frames werden an `ausgabe` angehaengt. Bei einer
    /// Protokollverletzung geht der Leser in `Geschlossen` ueber; Frames, die
    /// im selben Chunk davor fertig wurden, bleiben in `ausgabe`.
    pub fn verarbeiten(&mut self, chunk: &[u8], ausgabe: &mut Vec<Bytes>) -> PomeloResult<()> {
        if self.zustand == LeseZustand::Geschlossen {
            return Err(PomeloError::Protokoll("Socket ist geschlossen".into()));
        }

        let mut offset = 0;
        while offset < chunk.len() && self.zustand != LeseZustand::Geschlossen {
            if self.zustand == LeseZustand::Kopf {
                offset = self.kopf_lesen(chunk, offset)?;
            }
            if self.zustand == LeseZustand::Rumpf {
                offset = self.rumpf_lesen(chunk, offset, ausgabe);
            }
        }
        Ok(())
    }

    fn kopf_lesen(&mut self, daten: &[u8], offset: usize) -> PomeloResult<usize> {
        let len = (HEADER_GROESSE - self.kopf_offset).min(daten.len() - offset);
        let ende = offset + len;
        self.kopf[self.kopf_offset..self.kopf_offset + len].copy_from_slice(&daten[offset..ende]);
        self.kopf_offset += len;

        if self.kopf_offset < HEADER_GROESSE {
            return Ok(ende);
        }

        if PaketTyp::aus_byte(self.kopf[0]).is_none() {
            let typ = self.kopf[0];
            self.schliessen();
            return Err(PomeloError::Protokoll(format!(
                "Ungueltiger Pakettyp im Header: {typ}"
            )));
        }

        let groesse = body_laenge(&self.kopf);
        if groesse > self.max_body {
            self.schliessen();
            return Err(PomeloError::Protokoll(format!(
                "Paket zu gross: {groesse} Bytes (Maximum: {} Bytes)",
                self.max_body
            )));
        }

        let mut paket = Vec::with_capacity(HEADER_GROESSE + groesse);
        paket.extend_from_slice(&self.kopf);
        paket.resize(HEADER_GROESSE + groesse, 0);
        self.paket = paket;
        self.paket_offset = HEADER_GROESSE;
        self.zustand = LeseZustand::Rumpf;
        Ok(ende)
    }

    fn rumpf_lesen(&mut self, daten: &[u8], offset: usize, ausgabe: &mut Vec<Bytes>) -> usize {
        let len = (self.paket.len() - self.paket_offset).min(daten.len() - offset);
        let ende = offset + len;
        self.paket[self.paket_offset..self.paket_offset + len].copy_from_slice(&daten[offset..ende]);
        self.paket_offset += len;

        if self.paket_offset == self.paket.len() {
            ausgabe.push(Bytes::from(std::mem::take(&mut self.paket)));
            self.zuruecksetzen();
        }
        ende
    }

    fn zuruecksetzen(&mut self) {
        self.kopf_offset = 0;
        self.paket_offset = 0;
        self.zustand = LeseZustand::Kopf;
    }
}

impl Default for PaketLeser {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// PaketCodec
// ---------------------------------------------------------------------------

/// tokio-util Codec: dekodiert vollstaendige Frames, kodiert Pakete und Rohbytes
#[derive(Debug, Default)]
pub struct PaketCodec {
    leser: PaketLeser,
    fertig: VecDeque<Bytes>,
    fehler: Option<PomeloError>,
}

impl PaketCodec {
    pub fn neu() -> Self {
        Self::default()
    }

    pub fn mit_max_groesse(max_body: usize) -> Self {
        Self {
            leser: PaketLeser::mit_max_groesse(max_body),
            ..Self::default()
        }
    }
}

impl Decoder for PaketCodec {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if !src.is_empty() && self.fehler.is_none() {
            let chunk = src.split();
            let mut frames = Vec::new();
            if let Err(e) = self.leser.verarbeiten(&chunk, &mut frames) {
                self.fehler = Some(e);
            }
            self.fertig.extend(frames);
        }

        // Frames vor einer Protokollverletzung werden noch ausgeliefert
        if let Some(frame) = self.fertig.pop_front() {
            return Ok(Some(frame));
        }
        if let Some(e) = self.fehler.take() {
            return Err(io::Error::new(io::ErrorKind::InvalidData, e.to_string()));
        }
        Ok(None)
    }
}

impl Encoder<Paket> for PaketCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Paket, dst: &mut BytesMut) -> Result<(), Self::Error> {
        kodieren_in(item.typ, &item.body, dst)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
    }
}

impl Encoder<Bytes> for PaketCodec {
    type Error = io::Error;

    /// Bereits kodierte Pakete (z.B. aus dem Push-Scheduler) unveraendert schreiben
    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&item);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
