//! ChannelService – Kanalverwaltung und Zustellung ueber Frontends
//!
//! Zustellung an Kanalmitglieder laeuft pro Frontend-Gruppe: das eigene
//! Frontend wird direkt ueber das lokale `ChannelPushTarget` bedient,
//! entfernte Frontends ueber `sys.channelRemote.*`.
//!
//! Erfolg bedeutet: mindestens eine Gruppe (bzw. ein Server beim Broadcast)
//! war erfolgreich. Erst wenn alle scheitern, gibt es einen Fehler.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use pomelo_core::{
    AppContext, CountDownLatch, LatchAusloeser, PomeloError, PomeloResult, PushArt, PushOptions,
    RpcMessage, ServerId,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, OnceLock, Weak};
use tokio::sync::{mpsc, oneshot};

use crate::channel::Channel;
use crate::store::ChannelStore;

/// Name des RPC-Dienstes auf dem Frontend
pub const CHANNEL_REMOTE: &str = "channelRemote";

/// Frontend-ID -> uids
pub type Gruppen = HashMap<ServerId, Vec<String>>;

/// Lokale Zustellung auf dem eigenen Frontend
#[async_trait]
pub trait ChannelPushTarget: Send + Sync {
    /// Zustellung an uids; Ergebnis sind die nicht erreichten uids
    async fn push_message(
        &self,
        route: &str,
        msg: Value,
        uids: Vec<String>,
        opts: PushOptions,
    ) -> PomeloResult<Vec<String>>;

    /// Broadcast an alle (oder alle gebundenen) Sessions dieses Frontends
    async fn broadcast(&self, route: &str, msg: Value, opts: PushOptions) -> PomeloResult<()>;
}

/// Optionen beim Erstellen des Service
#[derive(Default)]
pub struct ChannelServiceOptionen {
    /// Praefix fuer Speicher-Schluessel
    pub praefix: Option<String>,
    pub store: Option<Arc<dyn ChannelStore>>,
    /// Lokales Ziel, nur auf Frontend-Servern gesetzt
    pub lokal: Option<Arc<dyn ChannelPushTarget>>,
}

/// Verwaltung aller Kanaele eines Servers
pub struct ChannelService {
    ctx: Arc<AppContext>,
    kanaele: DashMap<String, Arc<Channel>>,
    praefix: Option<String>,
    speicher: Option<SpeicherWarteschlange>,
    lokal: Option<Arc<dyn ChannelPushTarget>>,
    selbst: Weak<ChannelService>,
}

impl ChannelService {
    pub fn neu(ctx: Arc<AppContext>, optionen: ChannelServiceOptionen) -> Arc<Self> {
        Arc::new_cyclic(|selbst| Self {
            ctx,
            kanaele: DashMap::new(),
            praefix: optionen.praefix,
            speicher: optionen.store.map(SpeicherWarteschlange::neu),
            lokal: optionen.lokal,
            selbst: selbst.clone(),
        })
    }

    // -----------------------------------------------------------------------
    // Kanaele
    // -----------------------------------------------------------------------

    /// Erstellt einen Kanal oder gibt den vorhandenen zurueck
    pub fn create_channel(&self, name: &str) -> Arc<Channel> {
        if let Some(kanal) = self.kanaele.get(name) {
            return Arc::clone(kanal.value());
        }
        match self.kanaele.entry(name.to_string()) {
            Entry::Occupied(eintrag) => Arc::clone(eintrag.get()),
            Entry::Vacant(eintrag) => {
                // Einreihen solange der Eintrag gesperrt ist
                self.speichern(SpeicherOp::Add(self.index_key(), self.kanal_key(name)));
                let kanal = Channel::neu(name, self.selbst.clone());
                eintrag.insert(Arc::clone(&kanal));
                tracing::debug!(kanal = %name, "Kanal erstellt");
                kanal
            }
        }
    }

    /// Gibt einen Kanal zurueck, optional mit Anlegen
    pub fn get_channel(&self, name: &str, erstellen: bool) -> Option<Arc<Channel>> {
        match self.kanaele.get(name) {
            Some(kanal) => Some(Arc::clone(kanal.value())),
            None if erstellen => Some(self.create_channel(name)),
            None => None,
        }
    }

    /// Zerstoert einen Kanal und loescht seine gespeicherten Mitglieder
    pub fn destroy_channel(&self, name: &str) {
        let Entry::Occupied(eintrag) = self.kanaele.entry(name.to_string()) else {
            return;
        };
        // Ab hier nimmt der Kanal niemanden mehr auf, spaetere Adds erreichen den Speicher nicht
        eintrag.get().zerstoert_markieren();
        self.speichern(SpeicherOp::Remove(self.index_key(), self.kanal_key(name)));
        self.speichern(SpeicherOp::RemoveAll(self.kanal_key(name)));
        eintrag.remove();
        tracing::debug!(kanal = %name, "Kanal zerstoert");
    }

    pub fn kanal_anzahl(&self) -> usize {
        self.kanaele.len()
    }

    // -----------------------------------------------------------------------
    // Zustellung
    // -----------------------------------------------------------------------

    /// Push an eine explizite Empfaengerliste `(uid, frontendId)`
    pub async fn push_message_by_uids(
        &self,
        route: &str,
        msg: Value,
        empfaenger: &[(String, ServerId)],
        opts: PushOptions,
    ) -> PomeloResult<Vec<String>> {
        if empfaenger.is_empty() {
            return Err(PomeloError::intern("Empfaengerliste ist leer"));
        }
        let mut gruppen = Gruppen::new();
        for (uid, sid) in empfaenger {
            if sid.ist_leer() {
                tracing::warn!(uid = %uid, "uid ohne Frontend-ID ignoriert");
                continue;
            }
            gruppen.entry(sid.clone()).or_default().push(uid.clone());
        }
        self.send_message_by_group(route, msg, gruppen, opts).await
    }

    /// Broadcast an alle Server eines Typs
    pub async fn broadcast(
        &self,
        server_typ: &str,
        route: &str,
        msg: Value,
        opts: PushOptions,
    ) -> PomeloResult<()> {
        let ziele: Vec<ServerId> = self
            .ctx
            .server_nach_typ(server_typ)
            .into_iter()
            .map(|s| s.id)
            .collect();
        if ziele.is_empty() {
            return Ok(());
        }

        let opts = PushOptions {
            art: PushArt::Broadcast,
            ..opts
        };
        let route = route.to_string();
        let ctx = Arc::clone(&self.ctx);
        let lokal = self.lokal.clone();

        jeder_erfolg_reicht(ziele, "broadcast", move |ziel| {
            let (route, msg, opts) = (route.clone(), msg.clone(), opts.clone());
            let ctx = Arc::clone(&ctx);
            let lokal = lokal.clone();
            async move {
                match lokal {
                    Some(lokal) if &ziel == ctx.server_id() => {
                        lokal.broadcast(&route, msg, opts).await?
                    }
                    _ => {
                        let args = vec![json!(route), msg, serde_json::to_value(&opts)?];
                        ctx.rpc_invoke(&ziel, RpcMessage::sys(CHANNEL_REMOTE, "broadcast", args))
                            .await?;
                    }
                }
                Ok::<_, PomeloError>(Vec::new())
            }
        })
        .await
        .map(|_| ())
    }

    /// Zustellung pro Frontend-Gruppe mit "mindestens einer erfolgreich"
    pub(crate) async fn send_message_by_group(
        &self,
        route: &str,
        msg: Value,
        gruppen: Gruppen,
        opts: PushOptions,
    ) -> PomeloResult<Vec<String>> {
        let gruppen: Gruppen = gruppen.into_iter().filter(|(_, g)| !g.is_empty()).collect();
        if gruppen.is_empty() {
            return Ok(Vec::new());
        }

        let opts = PushOptions {
            art: PushArt::Push,
            ..opts
        };
        let ziele: Vec<ServerId> = gruppen.keys().cloned().collect();
        let gruppen = Arc::new(gruppen);
        let route = route.to_string();
        let ctx = Arc::clone(&self.ctx);
        let lokal = self.lokal.clone();

        jeder_erfolg_reicht(ziele, "pushMessage", move |ziel| {
            let uids = gruppen.get(&ziel).cloned().unwrap_or_default();
            let (route, msg, opts) = (route.clone(), msg.clone(), opts.clone());
            let ctx = Arc::clone(&ctx);
            let lokal = lokal.clone();
            async move {
                match lokal {
                    Some(lokal) if &ziel == ctx.server_id() => {
                        lokal.push_message(&route, msg, uids, opts).await
                    }
                    _ => {
                        let args = vec![
                            json!(route),
                            msg,
                            json!(uids),
                            serde_json::to_value(&opts)?,
                        ];
                        let antwort = ctx
                            .rpc_invoke(&ziel, RpcMessage::sys(CHANNEL_REMOTE, "pushMessage", args))
                            .await?;
                        if antwort.is_null() {
                            return Ok(Vec::new());
                        }
                        Ok(serde_json::from_value(antwort)?)
                    }
                }
            }
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Speicher
    // -----------------------------------------------------------------------

    /// Laedt alle gespeicherten Kanaele samt Mitgliedern
    pub async fn restore(&self) -> PomeloResult<()> {
        let Some(speicher) = &self.speicher else {
            return Ok(());
        };
        speicher.abgleichen().await;
        let store = Arc::clone(&speicher.store);

        let index_key = self.index_key();
        let kanal_keys = store.load(&index_key).await?;
        for kanal_key in kanal_keys {
            let Some(name) = kanal_key.strip_prefix(&format!("{index_key}:")) else {
                tracing::warn!(key = %kanal_key, "Unbekannter Kanal-Schluessel im Speicher");
                continue;
            };
            let kanal = Arc::clone(
                self.kanaele
                    .entry(name.to_string())
                    .or_insert_with(|| Channel::neu(name, self.selbst.clone()))
                    .value(),
            );
            for eintrag in store.load(&kanal_key).await? {
                match eintrag.split_once(':') {
                    Some((sid, uid)) => {
                        kanal.eintragen(uid, &ServerId::neu(sid));
                    }
                    None => tracing::warn!(kanal = %name, wert = %eintrag, "Ungueltiger Mitgliedseintrag"),
                }
            }
            tracing::debug!(kanal = %name, mitglieder = kanal.user_amount(), "Kanal wiederhergestellt");
        }
        Ok(())
    }

    /// Wartet, bis alle bisher eingereihten Schreibzugriffe im Speicher sind
    pub async fn speicher_abgleichen(&self) {
        if let Some(speicher) = &self.speicher {
            speicher.abgleichen().await;
        }
    }

    pub(crate) fn mitglied_speichern(&self, kanal: &str, sid: &ServerId, uid: &str) {
        self.speichern(SpeicherOp::Add(self.kanal_key(kanal), format!("{sid}:{uid}")));
    }

    pub(crate) fn mitglied_loeschen(&self, kanal: &str, sid: &ServerId, uid: &str) {
        self.speichern(SpeicherOp::Remove(self.kanal_key(kanal), format!("{sid}:{uid}")));
    }

    fn index_key(&self) -> String {
        match &self.praefix {
            Some(praefix) => format!("{praefix}:{}", self.ctx.server_id()),
            None => self.ctx.server_id().to_string(),
        }
    }

    fn kanal_key(&self, name: &str) -> String {
        format!("{}:{name}", self.index_key())
    }

    fn speichern(&self, op: SpeicherOp) {
        if let Some(speicher) = &self.speicher {
            speicher.einreihen(op);
        }
    }
}

impl std::fmt::Debug for ChannelService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelService")
            .field("server", self.ctx.server_id())
            .field("kanaele", &self.kanaele.len())
            .field("store", &self.speicher.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Speicher-Warteschlange
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum SpeicherOp {
    Add(String, String),
    Remove(String, String),
    RemoveAll(String),
    /// Meldet sich, sobald alle vorherigen Operationen ausgefuehrt sind
    Abgleich(oneshot::Sender<()>),
}

/// Schreibzugriffe auf den Speicher in Aufrufreihenfolge
///
/// Ein einzelner Task arbeitet die Operationen nacheinander ab. Er wird beim
/// ersten Zugriff gestartet, damit der Service auch ausserhalb einer
/// Runtime erstellt werden kann.
struct SpeicherWarteschlange {
    store: Arc<dyn ChannelStore>,
    tx: OnceLock<mpsc::UnboundedSender<SpeicherOp>>,
}

impl SpeicherWarteschlange {
    fn neu(store: Arc<dyn ChannelStore>) -> Self {
        Self {
            store,
            tx: OnceLock::new(),
        }
    }

    fn einreihen(&self, op: SpeicherOp) {
        let tx = self.tx.get_or_init(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn(speicher_arbeiter(Arc::clone(&self.store), rx));
                }
                Err(_) => tracing::error!("Kanal-Speicher ohne Tokio-Runtime, Schreibzugriffe gehen verloren"),
            }
            tx
        });
        if let Err(e) = tx.send(op) {
            tracing::warn!(op = ?e.0, "Kanal-Speicher nicht erreichbar");
        }
    }

    async fn abgleichen(&self) {
        let (tx, rx) = oneshot::channel();
        self.einreihen(SpeicherOp::Abgleich(tx));
        let _ = rx.await;
    }
}

async fn speicher_arbeiter(store: Arc<dyn ChannelStore>, mut rx: mpsc::UnboundedReceiver<SpeicherOp>) {
    while let Some(op) = rx.recv().await {
        let ergebnis = match &op {
            SpeicherOp::Add(key, wert) => store.add(key, wert).await,
            SpeicherOp::Remove(key, wert) => store.remove(key, wert).await,
            SpeicherOp::RemoveAll(key) => store.remove_all(key).await,
            SpeicherOp::Abgleich(_) => Ok(()),
        };
        match op {
            SpeicherOp::Abgleich(antwort) => {
                let _ = antwort.send(());
            }
            op => {
                if let Err(e) = ergebnis {
                    tracing::warn!(fehler = %e, op = ?op, "Kanal-Speicher nicht aktualisiert");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Fan-out
// ---------------------------------------------------------------------------

/// Zaehlt den Latch beim Verlassen des Ziel-Tasks herunter, auch nach einer Panik
struct LatchWaechter(CountDownLatch);

impl Drop for LatchWaechter {
    fn drop(&mut self) {
        if let Err(e) = self.0.done() {
            tracing::error!(fehler = %e, "CountDownLatch inkonsistent");
        }
    }
}

#[derive(Default)]
struct FanOutStand {
    erfolg: bool,
    fail_ids: Vec<String>,
}

/// Ruft `aufruf` fuer jedes Ziel parallel auf
///
/// Ein `CountDownLatch` ueber alle Ziele sammelt die Ergebnisse. Fehlgeschlagene
/// uids erfolgreicher Ziele werden zusammengefuehrt; scheitern alle Ziele,
/// ist das Ergebnis `AlleFehlgeschlagen`.
async fn jeder_erfolg_reicht<F, Fut>(
    ziele: Vec<ServerId>,
    methode: &str,
    aufruf: F,
) -> PomeloResult<Vec<String>>
where
    F: Fn(ServerId) -> Fut,
    Fut: Future<Output = PomeloResult<Vec<String>>> + Send + 'static,
{
    let (latch, fertig) = CountDownLatch::mit_kanal(ziele.len(), None)?;
    let stand = Arc::new(Mutex::new(FanOutStand::default()));

    for ziel in ziele {
        let zukunft = aufruf(ziel.clone());
        let latch = latch.clone();
        let stand = Arc::clone(&stand);
        let methode = methode.to_string();
        tokio::spawn(async move {
            let _waechter = LatchWaechter(latch);
            match zukunft.await {
                Ok(fehlgeschlagen) => {
                    let mut stand = stand.lock();
                    stand.erfolg = true;
                    stand.fail_ids.extend(fehlgeschlagen);
                }
                Err(e) => {
                    tracing::error!(server = %ziel, methode = %methode, fehler = %e, "Zustellung an Server fehlgeschlagen");
                }
            }
        });
    }

    match fertig.await {
        Ok(LatchAusloeser::Abgeschlossen) => {}
        Ok(LatchAusloeser::Zeitlimit) => {
            return Err(PomeloError::Zeitlimit(format!("{methode}: Fan-out")));
        }
        Err(_) => return Err(PomeloError::intern("CountDownLatch ohne Ergebnis verworfen")),
    }

    let mut stand = stand.lock();
    if !stand.erfolg {
        return Err(PomeloError::AlleFehlgeschlagen(methode.to_string()));
    }
    Ok(std::mem::take(&mut stand.fail_ids))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
