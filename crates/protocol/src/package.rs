//! Paket-Ebene des Wire-Protokolls
//!
//! ## Paket-Format
//!
//! ```text
//! +--------+--------+--------+--------+----...----+
//! | Typ    | Laenge (24 Bit BE)       | Body       |
//! +--------+--------+--------+--------+----...----+
//! ```
//!
//! Der Typ stammt aus einer geschlossenen Menge (`PaketTyp`), die Laenge
//! zaehlt nur die Body-Bytes.

use bytes::{BufMut, Bytes, BytesMut};
use pomelo_core::{PomeloError, PomeloResult};

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Groesse des Paket-Headers in Bytes
pub const HEADER_GROESSE: usize = 4;

/// Groesste mit 24 Bit darstellbare Body-Laenge
pub const MAX_BODY_LAENGE: usize = 0x00FF_FFFF;

// ---------------------------------------------------------------------------
// PaketTyp
// ---------------------------------------------------------------------------

/// Pakettyp (Byte 0 des Headers)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PaketTyp {
    Handshake = 1,
    HandshakeAck = 2,
    Heartbeat = 3,
    Data = 4,
    Kick = 5,
}

impl PaketTyp {
    /// Wandelt ein Header-Byte um; unbekannte Typen ergeben `None`
    pub fn aus_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Handshake),
            2 => Some(Self::HandshakeAck),
            3 => Some(Self::Heartbeat),
            4 => Some(Self::Data),
            5 => Some(Self::Kick),
            _ => None,
        }
    }

    pub fn als_byte(self) -> u8 {
        self as u8
    }
}

// ---------------------------------------------------------------------------
// Paket
// ---------------------------------------------------------------------------

/// Ein vollstaendiges Paket (Header bereits ausgewertet)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paket {
    pub typ: PaketTyp,
    pub body: Bytes,
}

impl Paket {
    pub fn neu(typ: PaketTyp, body: impl Into<Bytes>) -> Self {
        Self {
            typ,
            body: body.into(),
        }
    }

    /// Paket ohne Body (Heartbeat, HandshakeAck)
    pub fn leer(typ: PaketTyp) -> Self {
        Self {
            typ,
            body: Bytes::new(),
        }
    }

    /// Kodiert das Paket in Header + Body
    pub fn kodieren(&self) -> PomeloResult<Bytes> {
        let mut buf = BytesMut::with_capacity(HEADER_GROESSE + self.body.len());
        kodieren_in(self.typ, &self.body, &mut buf)?;
        Ok(buf.freeze())
    }

    /// Dekodiert einen vollstaendigen Frame (Header + Body)
    ///
    /// Erwartet genau einen Frame, wie ihn der `PaketLeser` liefert.
    pub fn aus_frame(frame: &[u8]) -> PomeloResult<Self> {
        let kopf = kopf_lesen(frame)?;
        let body = &frame[HEADER_GROESSE..];
        if body.len() != kopf.laenge {
            return Err(PomeloError::Protokoll(format!(
                "Body-Laenge {} passt nicht zum Header ({})",
                body.len(),
                kopf.laenge
            )));
        }
        Ok(Self {
            typ: kopf.typ,
            body: Bytes::copy_from_slice(body),
        })
    }
}

/// Ausgewerteter Header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaketKopf {
    pub typ: PaketTyp,
    pub laenge: usize,
}

/// Body-Laenge aus den Bytes 1..4 (24 Bit big-endian)
pub fn body_laenge(kopf: &[u8; HEADER_GROESSE]) -> usize {
    ((kopf[1] as usize) << 16) | ((kopf[2] as usize) << 8) | kopf[3] as usize
}

/// Liest den Header am Anfang von `daten`
pub fn kopf_lesen(daten: &[u8]) -> PomeloResult<PaketKopf> {
    if daten.len() < HEADER_GROESSE {
        return Err(PomeloError::Protokoll(format!(
            "Header unvollstaendig: {} Bytes",
            daten.len()
        )));
    }
    let typ = PaketTyp::aus_byte(daten[0])
        .ok_or_else(|| PomeloError::Protokoll(format!("Ungueltiger Pakettyp: {}", daten[0])))?;
    let kopf = [daten[0], daten[1], daten[2], daten[3]];
    Ok(PaketKopf {
        typ,
        laenge: body_laenge(&kopf),
    })
}

/// Schreibt Header + Body in einen Puffer
pub fn kodieren_in(typ: PaketTyp, body: &[u8], dst: &mut BytesMut) -> PomeloResult<()> {
    if body.len() > MAX_BODY_LAENGE {
        return Err(PomeloError::Protokoll(format!(
            "Body zu gross: {} Bytes (Maximum: {} Bytes)",
            body.len(),
            MAX_BODY_LAENGE
        )));
    }
    let laenge = body.len();
    dst.reserve(HEADER_GROESSE + laenge);
    dst.put_u8(typ.als_byte());
    dst.put_u8(((laenge >> 16) & 0xff) as u8);
    dst.put_u8(((laenge >> 8) & 0xff) as u8);
    dst.put_u8((laenge & 0xff) as u8);
    dst.put_slice(body);
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
