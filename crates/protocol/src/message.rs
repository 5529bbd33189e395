//! Nachrichten-Ebene: Inhalt eines DATA-Pakets
//!
//! ## Nachrichten-Format
//!
//! ```text
//! +------+-----------------+--------------------------+----...----+
//! | Flag | ID (Varint)     | Route (1 Byte Laenge + N) | Body       |
//! +------+-----------------+--------------------------+----...----+
//! ```
//!
//! - Flag: `(typ << 1) | route_komprimiert`
//! - ID nur bei REQUEST und RESPONSE (Base-128, niederwertige Gruppe zuerst)
//! - Route nur bei REQUEST, NOTIFY und PUSH
//!
//! Komprimierte Routen (2-Byte-Codes aus einem Routen-Woerterbuch) werden
//! nicht unterstuetzt und als Protokollfehler abgelehnt.

use bytes::{BufMut, Bytes, BytesMut};
use pomelo_core::{PomeloError, PomeloResult};
use serde_json::Value;

/// Maske fuer das Kompressions-Bit im Flag
const ROUTE_KOMPRIMIERT: u8 = 0x01;

/// Maske fuer den Nachrichtentyp nach dem Shift
const TYP_MASKE: u8 = 0x07;

/// Maximale Routen-Laenge (1 Byte Laengenfeld)
pub const MAX_ROUTE_LAENGE: usize = 255;

/// Nachrichtentyp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NachrichtenTyp {
    Request = 0,
    Notify = 1,
    Response = 2,
    Push = 3,
}

impl NachrichtenTyp {
    fn aus_bits(bits: u8) -> PomeloResult<Self> {
        match bits {
            0 => Ok(Self::Request),
            1 => Ok(Self::Notify),
            2 => Ok(Self::Response),
            3 => Ok(Self::Push),
            andere => Err(PomeloError::Protokoll(format!(
                "Unbekannter Nachrichtentyp: {andere}"
            ))),
        }
    }

    fn hat_id(self) -> bool {
        matches!(self, Self::Request | Self::Response)
    }

    fn hat_route(self) -> bool {
        matches!(self, Self::Request | Self::Notify | Self::Push)
    }
}

/// Eine dekodierte Nachricht `{id, route, body}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nachricht {
    pub typ: NachrichtenTyp,
    /// Request-ID (0 bei Notify und Push)
    pub id: u32,
    /// Route (leer bei Response)
    pub route: String,
    /// Body-Bytes (JSON)
    pub body: Bytes,
}

impl Nachricht {
    pub fn request(id: u32, route: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            typ: NachrichtenTyp::Request,
            id,
            route: route.into(),
            body: body.into(),
        }
    }

    pub fn notify(route: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            typ: NachrichtenTyp::Notify,
            id: 0,
            route: route.into(),
            body: body.into(),
        }
    }

    pub fn response(id: u32, body: impl Into<Bytes>) -> Self {
        Self {
            typ: NachrichtenTyp::Response,
            id,
            route: String::new(),
            body: body.into(),
        }
    }

    pub fn push(route: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            typ: NachrichtenTyp::Push,
            id: 0,
            route: route.into(),
            body: body.into(),
        }
    }

    /// Kodiert die Nachricht in einen DATA-Body
    pub fn kodieren(&self) -> PomeloResult<Bytes> {
        let route = self.route.as_bytes();
        if self.typ.hat_route() && route.len() > MAX_ROUTE_LAENGE {
            return Err(PomeloError::Protokoll(format!(
                "Route zu lang: {} Bytes (Maximum: {MAX_ROUTE_LAENGE})",
                route.len()
            )));
        }

        let mut buf = BytesMut::with_capacity(1 + 5 + 1 + route.len() + self.body.len());
        buf.put_u8((self.typ as u8) << 1);

        if self.typ.hat_id() {
            varint_schreiben(self.id, &mut buf);
        }
        if self.typ.hat_route() {
            buf.put_u8(route.len() as u8);
            buf.put_slice(route);
        }
        buf.put_slice(&self.body);
        Ok(buf.freeze())
    }

    /// Dekodiert einen DATA-Body
    pub fn dekodieren(daten: &[u8]) -> PomeloResult<Self> {
        let (&flag, mut rest) = daten
            .split_first()
            .ok_or_else(|| PomeloError::Protokoll("Leere Nachricht".into()))?;

        let typ = NachrichtenTyp::aus_bits((flag >> 1) & TYP_MASKE)?;
        let komprimiert = flag & ROUTE_KOMPRIMIERT != 0;

        let mut id = 0;
        if typ.hat_id() {
            let (wert, gelesen) = varint_lesen(rest)?;
            id = wert;
            rest = &rest[gelesen..];
        }

        let mut route = String::new();
        if typ.hat_route() {
            if komprimiert {
                return Err(PomeloError::Protokoll(
                    "Komprimierte Route ohne Routen-Woerterbuch".into(),
                ));
            }
            let (&laenge, nach_laenge) = rest
                .split_first()
                .ok_or_else(|| PomeloError::Protokoll("Routen-Laenge fehlt".into()))?;
            let laenge = laenge as usize;
            if nach_laenge.len() < laenge {
                return Err(PomeloError::Protokoll("Route abgeschnitten".into()));
            }
            route = std::str::from_utf8(&nach_laenge[..laenge])
                .map_err(|_| PomeloError::Protokoll("Route ist kein UTF-8".into()))?
                .to_string();
            rest = &nach_laenge[laenge..];
        }

        Ok(Self {
            typ,
            id,
            route,
            body: Bytes::copy_from_slice(rest),
        })
    }

    /// Body als JSON; ein leerer Body ergibt ein leeres Objekt
    pub fn body_json(&self) -> PomeloResult<Value> {
        if self.body.is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        serde_json::from_slice(&self.body)
            .map_err(|e| PomeloError::Protokoll(format!("Body ist kein JSON: {e}")))
    }
}

fn varint_schreiben(mut wert: u32, dst: &mut BytesMut) {
    loop {
        let mut byte = (wert & 0x7f) as u8;
        wert >>= 7;
        if wert != 0 {
            byte |= 0x80;
        }
        dst.put_u8(byte);
        if wert == 0 {
            break;
        }
    }
}

fn varint_lesen(daten: &[u8]) -> PomeloResult<(u32, usize)> {
    let mut wert: u64 = 0;
    for (i, &byte) in daten.iter().enumerate() {
        if i >= 5 {
            break;
        }
        wert |= ((byte & 0x7f) as u64) << (7 * i);
        if byte & 0x80 == 0 {
            return u32::try_from(wert)
                .map(|w| (w, i + 1))
                .map_err(|_| PomeloError::Protokoll("Nachrichten-ID zu gross".into()));
        }
    }
    Err(PomeloError::Protokoll("Nachrichten-ID unvollstaendig".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_layout() {
        let msg = Nachricht::request(300, "chat.chatHandler.send", &b"{}"[..]);
        let bytes = msg.kodieren().unwrap();
        // Flag 0, ID 300 = 0xAC 0x02, Routen-Laenge 21
        assert_eq!(&bytes[..4], &[0x00, 0xAC, 0x02, 21]);
        assert_eq!(Nachricht::dekodieren(&bytes).unwrap(), msg);
    }

    #[test]
    fn notify_ohne_id() {
        let msg = Nachricht::notify("area.playerHandler.move", &b"{\"x\":1}"[..]);
        let bytes = msg.kodieren().unwrap();
        assert_eq!(bytes[0], 0x02);
        assert_eq!(bytes[1] as usize, msg.route.len());
        let zurueck = Nachricht::dekodieren(&bytes).unwrap();
        assert_eq!(zurueck.id, 0);
        assert_eq!(zurueck.route, "area.playerHandler.move");
    }

    #[test]
    fn response_ohne_route() {
        let bytes = Nachricht::response(5, &b"{\"code\":200}"[..]).kodieren().unwrap();
        assert_eq!(&bytes[..2], &[0x04, 0x05]);
        let zurueck = Nachricht::dekodieren(&bytes).unwrap();
        assert_eq!(zurueck.typ, NachrichtenTyp::Response);
        assert!(zurueck.route.is_empty());
        assert_eq!(zurueck.body_json().unwrap()["code"], 200);
    }

    #[test]
    fn komprimierte_route_abgelehnt() {
        // Notify mit gesetztem Kompressions-Bit und 2-Byte-Code
        let daten = [0x03, 0x00, 0x01, b'{', b'}'];
        assert!(Nachricht::dekodieren(&daten).is_err());
    }

    #[test]
    fn abgeschnittene_route_abgelehnt() {
        let daten = [0x02, 10, b'a', b'b'];
        assert!(Nachricht::dekodieren(&daten).is_err());
    }

    #[test]
    fn unvollstaendige_id_abgelehnt() {
        assert!(Nachricht::dekodieren(&[0x00, 0x80]).is_err());
        assert!(Nachricht::dekodieren(&[]).is_err());
    }

    #[test]
    fn zu_lange_route_abgelehnt() {
        let route = "a".repeat(MAX_ROUTE_LAENGE + 1);
        assert!(Nachricht::push(route, Bytes::new()).kodieren().is_err());
    }

    #[test]
    fn leerer_body_ist_leeres_objekt() {
        let msg = Nachricht::notify("a.b.c", Bytes::new());
        assert!(msg.body_json().unwrap().as_object().unwrap().is_empty());
    }

    #[test]
    fn grosse_id() {
        let msg = Nachricht::request(u32::MAX, "a.b.c", Bytes::new());
        let bytes = msg.kodieren().unwrap();
        assert_eq!(Nachricht::dekodieren(&bytes).unwrap().id, u32::MAX);
    }
}
