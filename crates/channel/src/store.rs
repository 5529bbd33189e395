//! Persistenter Kanal-Speicher
//!
//! Schluessel: `[praefix:]serverId:kanalName` (Mitglieder) und
//! `[praefix:]serverId` (Index aller Kanaele). Werte der Mitglieder haben
//! die Form `frontendId:uid`. Die Semantik entspricht einer Menge.

use async_trait::async_trait;
use dashmap::DashMap;
use pomelo_core::PomeloResult;

/// Austauschbarer Speicher fuer Kanalmitgliedschaften
#[async_trait]
pub trait ChannelStore: Send + Sync {
    async fn add(&self, key: &str, wert: &str) -> PomeloResult<()>;
    async fn remove(&self, key: &str, wert: &str) -> PomeloResult<()>;
    async fn load(&self, key: &str) -> PomeloResult<Vec<String>>;
    async fn remove_all(&self, key: &str) -> PomeloResult<()>;
}

/// Speicher im Prozess (Tests, Neustart ohne externen Speicher)
#[derive(Debug, Default)]
pub struct MemoryChannelStore {
    daten: DashMap<String, Vec<String>>,
}

impl MemoryChannelStore {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Anzahl der Werte unter einem Schluessel
    pub fn anzahl(&self, key: &str) -> usize {
        self.daten.get(key).map(|w| w.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ChannelStore for MemoryChannelStore {
    async fn add(&self, key: &str, wert: &str) -> PomeloResult<()> {
        let mut werte = self.daten.entry(key.to_string()).or_default();
        if !werte.iter().any(|w| w == wert) {
            werte.push(wert.to_string());
        }
        Ok(())
    }

    async fn remove(&self, key: &str, wert: &str) -> PomeloResult<()> {
        if let Some(mut werte) = self.daten.get_mut(key) {
            werte.retain(|w| w != wert);
        }
        self.daten.remove_if(key, |_, werte| werte.is_empty());
        Ok(())
    }

    async fn load(&self, key: &str) -> PomeloResult<Vec<String>> {
        Ok(self.daten.get(key).map(|w| w.clone()).unwrap_or_default())
    }

    async fn remove_all(&self, key: &str) -> PomeloResult<()> {
        self.daten.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mengen_semantik() {
        let store = MemoryChannelStore::neu();
        store.add("k", "f1:alice").await.unwrap();
        store.add("k", "f1:alice").await.unwrap();
        store.add("k", "f2:bob").await.unwrap();
        assert_eq!(store.load("k").await.unwrap(), vec!["f1:alice", "f2:bob"]);

        store.remove("k", "f1:alice").await.unwrap();
        assert_eq!(store.anzahl("k"), 1);
        store.remove("k", "f2:bob").await.unwrap();
        assert!(store.load("k").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_all_loescht_schluessel() {
        let store = MemoryChannelStore::neu();
        store.add("k", "a").await.unwrap();
        store.remove_all("k").await.unwrap();
        assert_eq!(store.anzahl("k"), 0);
    }
}
