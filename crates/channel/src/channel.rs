//! Kanal – benannte Gruppe von Benutzern
//!
//! Mitglieder werden nach ihrem Frontend-Server gruppiert, damit ein Push
//! pro Frontend genau einen Aufruf braucht. `sid` bezeichnet hier die
//! Server-ID des Frontends, nicht die Session.

use parking_lot::RwLock;
use pomelo_core::{PomeloError, PomeloResult, PushOptions, ServerId};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use crate::service::{ChannelService, Gruppen};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KanalZustand {
    Inited,
    Destroyed,
}

/// Mitgliedseintrag eines Kanals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mitglied {
    pub uid: String,
    pub sid: ServerId,
}

struct KanalDaten {
    gruppen: Gruppen,
    eintraege: HashMap<String, Mitglied>,
    user_amount: usize,
    zustand: KanalZustand,
}

/// Ein Kanal, verwaltet vom `ChannelService`
pub struct Channel {
    name: String,
    service: Weak<ChannelService>,
    daten: RwLock<KanalDaten>,
}

impl Channel {
    pub(crate) fn neu(name: &str, service: Weak<ChannelService>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            service,
            daten: RwLock::new(KanalDaten {
                gruppen: HashMap::new(),
                eintraege: HashMap::new(),
                user_amount: 0,
                zustand: KanalZustand::Inited,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn zustand(&self) -> KanalZustand {
        self.daten.read().zustand
    }

    pub fn user_amount(&self) -> usize {
        self.daten.read().user_amount
    }

    /// Fuegt ein Mitglied hinzu
    ///
    /// `false` wenn der Kanal zerstoert ist oder `sid` leer. Doppelte
    /// Eintraege werden nicht erkannt.
    pub fn add(&self, uid: &str, sid: &ServerId) -> bool {
        let mut daten = self.daten.write();
        if !self.eintragen_in(&mut daten, uid, sid) {
            return false;
        }
        // Unter der Kanal-Sperre einreihen, damit der Speicher dieselbe Reihenfolge sieht
        if let Some(service) = self.service.upgrade() {
            service.mitglied_speichern(&self.name, sid, uid);
        }
        true
    }

    /// Entfernt ein Mitglied; `true` wenn es existierte
    ///
    /// War `uid` mehrfach unter `sid` eingetragen, verschwindet nur ein
    /// Eintrag. Datensatz und Speicherwert fallen erst mit dem letzten weg.
    pub fn leave(&self, uid: &str, sid: &ServerId) -> bool {
        if uid.is_empty() || sid.ist_leer() {
            return false;
        }

        let mut daten = self.daten.write();
        let (gruppe_leer, noch_eingetragen) = {
            let Some(gruppe) = daten.gruppen.get_mut(sid) else {
                return false;
            };
            let Some(pos) = gruppe.iter().position(|u| u == uid) else {
                return false;
            };
            gruppe.remove(pos);
            (gruppe.is_empty(), gruppe.iter().any(|u| u == uid))
        };
        if gruppe_leer {
            daten.gruppen.remove(sid);
        }
        daten.user_amount = daten.user_amount.saturating_sub(1);
        if noch_eingetragen {
            return true;
        }

        if daten.eintraege.get(uid).is_some_and(|m| &m.sid == sid) {
            let anderes_frontend = daten
                .gruppen
                .iter()
                .find(|(_, gruppe)| gruppe.iter().any(|u| u == uid))
                .map(|(frontend, _)| frontend.clone());
            match anderes_frontend {
                Some(frontend) => {
                    if let Some(mitglied) = daten.eintraege.get_mut(uid) {
                        mitglied.sid = frontend;
                    }
                }
                None => {
                    daten.eintraege.remove(uid);
                }
            }
        }
        if let Some(service) = self.service.upgrade() {
            service.mitglied_loeschen(&self.name, sid, uid);
        }
        true
    }

    /// Alle Mitglieder-uids ueber alle Frontends
    pub fn get_members(&self) -> Vec<String> {
        self.daten
            .read()
            .gruppen
            .values()
            .flat_map(|g| g.iter().cloned())
            .collect()
    }

    pub fn get_member(&self, uid: &str) -> Option<Mitglied> {
        self.daten.read().eintraege.get(uid).cloned()
    }

    /// Schickt eine Nachricht an alle Mitglieder
    ///
    /// Ergebnis sind die uids, die auf erfolgreichen Frontends nicht
    /// zugestellt werden konnten.
    pub async fn push_message(
        &self,
        route: &str,
        msg: Value,
        opts: PushOptions,
    ) -> PomeloResult<Vec<String>> {
        let gruppen = {
            let daten = self.daten.read();
            if daten.zustand == KanalZustand::Destroyed {
                return Err(PomeloError::KanalZerstoert(self.name.clone()));
            }
            daten.gruppen.clone()
        };
        let service = self
            .service
            .upgrade()
            .ok_or_else(|| PomeloError::intern("ChannelService wurde beendet"))?;
        service.send_message_by_group(route, msg, gruppen, opts).await
    }

    /// Zerstoert den Kanal (endgueltig) und entfernt ihn aus dem Service
    pub fn destroy(&self) {
        self.zerstoert_markieren();
        if let Some(service) = self.service.upgrade() {
            service.destroy_channel(&self.name);
        }
    }

    /// Traegt ein Mitglied ohne Speicher-Schreibzugriff ein (Restore)
    pub(crate) fn eintragen(&self, uid: &str, sid: &ServerId) -> bool {
        let mut daten = self.daten.write();
        self.eintragen_in(&mut daten, uid, sid)
    }

    fn eintragen_in(&self, daten: &mut KanalDaten, uid: &str, sid: &ServerId) -> bool {
        if daten.zustand == KanalZustand::Destroyed {
            return false;
        }
        if sid.ist_leer() {
            tracing::warn!(kanal = %self.name, uid = %uid, "uid ohne Frontend-ID ignoriert");
            return false;
        }
        daten
            .gruppen
            .entry(sid.clone())
            .or_default()
            .push(uid.to_string());
        daten.eintraege.insert(
            uid.to_string(),
            Mitglied {
                uid: uid.to_string(),
                sid: sid.clone(),
            },
        );
        daten.user_amount += 1;
        true
    }

    pub(crate) fn zerstoert_markieren(&self) {
        self.daten.write().zustand = KanalZustand::Destroyed;
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let daten = self.daten.read();
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("gruppen", &daten.gruppen.len())
            .field("user_amount", &daten.user_amount)
            .field("zustand", &daten.zustand)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kanal() -> Arc<Channel> {
        Channel::neu("raum", Weak::new())
    }

    #[test]
    fn add_zaehlt_nur_mit_sid() {
        let k = kanal();
        assert!(k.add("alice", &ServerId::neu("f1")));
        assert!(!k.add("bob", &ServerId::neu("")));
        assert_eq!(k.user_amount(), 1);
        assert_eq!(k.get_member("alice").unwrap().sid.as_str(), "f1");
        assert!(k.get_member("bob").is_none());
    }

    #[test]
    fn leave_zaehlt_nur_existierende() {
        let k = kanal();
        let f1 = ServerId::neu("f1");
        k.add("alice", &f1);

        assert!(!k.leave("bob", &f1));
        assert_eq!(k.user_amount(), 1);
        assert!(k.leave("alice", &f1));
        assert_eq!(k.user_amount(), 0);
        assert!(!k.leave("alice", &f1));
        assert_eq!(k.user_amount(), 0);
        assert!(k.daten.read().gruppen.is_empty());
    }

    #[test]
    fn doppelte_eintraege_werden_gezaehlt() {
        let k = kanal();
        let f1 = ServerId::neu("f1");
        assert!(k.add("alice", &f1));
        assert!(k.add("alice", &f1));
        assert_eq!(k.user_amount(), 2);
        assert_eq!(k.get_members(), vec!["alice", "alice"]);

        assert!(k.leave("alice", &f1));
        assert_eq!(k.get_members(), vec!["alice"]);
        assert!(k.get_member("alice").is_some(), "ein Eintrag ist noch da");

        assert!(k.leave("alice", &f1));
        assert!(k.get_member("alice").is_none());
        assert_eq!(k.user_amount(), 0);
    }

    #[test]
    fn mitglied_auf_zwei_frontends() {
        let k = kanal();
        let (f1, f2) = (ServerId::neu("f1"), ServerId::neu("f2"));
        k.add("alice", &f1);
        k.add("alice", &f2);

        assert!(k.leave("alice", &f2));
        assert_eq!(k.get_member("alice").unwrap().sid, f1);
        assert!(!k.leave("alice", &f2));
        assert_eq!(k.user_amount(), 1);
    }

    #[test]
    fn zerstoerter_kanal_nimmt_niemanden_auf() {
        let k = kanal();
        k.destroy();
        assert_eq!(k.zustand(), KanalZustand::Destroyed);
        assert!(!k.add("alice", &ServerId::neu("f1")));
    }

    #[tokio::test]
    async fn push_auf_zerstoertem_kanal() {
        let k = kanal();
        k.destroy();
        let fehler = k
            .push_message("onChat", Value::Null, PushOptions::push())
            .await
            .unwrap_err();
        assert_eq!(fehler, PomeloError::KanalZerstoert("raum".into()));
    }

    #[test]
    fn mitglieder_ueber_frontends() {
        let k = kanal();
        k.add("alice", &ServerId::neu("f1"));
        k.add("bob", &ServerId::neu("f2"));
        let mut alle = k.get_members();
        alle.sort();
        assert_eq!(alle, vec!["alice", "bob"]);
    }
}
