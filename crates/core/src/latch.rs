//! CountDownLatch – Fan-in-Synchronisation fuer parallele Zustellungen
//!
//! Ein Latch wird mit einem positiven Zaehler erzeugt. Jeder `done()`-Aufruf
//! zaehlt herunter; bei 0 feuert der Callback genau einmal. Mit optionalem
//! Zeitlimit feuert der Callback stattdessen mit `LatchAusloeser::Zeitlimit`,
//! falls der Zaehler bis dahin nicht 0 erreicht hat.
//!
//! Nach einem Zeitlimit erreicht ein spaetes `done()` zwar noch 0, feuert den
//! Callback aber kein zweites Mal.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::{PomeloError, PomeloResult};

/// Grund fuer das Feuern des Callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatchAusloeser {
    /// Alle `done()`-Aufrufe sind eingegangen
    Abgeschlossen,
    /// Das Zeitlimit ist vor dem letzten `done()` abgelaufen
    Zeitlimit,
}

type LatchCallback = Box<dyn FnOnce(LatchAusloeser) + Send>;

struct LatchZustand {
    zaehler: usize,
    callback: Option<LatchCallback>,
    timer: Option<JoinHandle<()>>,
}

/// Zaehlender Latch mit einmaligem Callback
///
/// Clone teilt den inneren Zustand, damit mehrere Tasks `done()` aufrufen koennen.
#[derive(Clone)]
pub struct CountDownLatch {
    inner: Arc<Mutex<LatchZustand>>,
}

impl CountDownLatch {
    /// Erstellt einen neuen Latch
    ///
    /// Ein Zaehler von 0 ist ein Programmierfehler und wird abgelehnt.
    /// Mit Zeitlimit muss der Aufruf innerhalb einer tokio-Runtime erfolgen.
    pub fn neu<F>(zaehler: usize, zeitlimit: Option<Duration>, callback: F) -> PomeloResult<Self>
    where
        F: FnOnce(LatchAusloeser) + Send + 'static,
    {
        if zaehler == 0 {
            return Err(PomeloError::Latch("Zaehler muss groesser als 0 sein".into()));
        }

        let inner = Arc::new(Mutex::new(LatchZustand {
            zaehler,
            callback: Some(Box::new(callback)),
            timer: None,
        }));

        if let Some(dauer) = zeitlimit {
            let weak = Arc::downgrade(&inner);
            let timer = tokio::spawn(async move {
                tokio::time::sleep(dauer).await;
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let callback = {
                    let mut zustand = inner.lock();
                    zustand.timer = None;
                    zustand.callback.take()
                };
                if let Some(cb) = callback {
                    tracing::debug!(dauer_ms = dauer.as_millis() as u64, "CountDownLatch: Zeitlimit erreicht");
                    cb(LatchAusloeser::Zeitlimit);
                }
            });
            inner.lock().timer = Some(timer);
        }

        Ok(Self { inner })
    }

    /// Erstellt einen Latch, dessen Ausloeser ueber einen oneshot-Kanal ankommt
    pub fn mit_kanal(
        zaehler: usize,
        zeitlimit: Option<Duration>,
    ) -> PomeloResult<(Self, oneshot::Receiver<LatchAusloeser>)> {
        let (tx, rx) = oneshot::channel();
        let latch = Self::neu(zaehler, zeitlimit, move |ausloeser| {
            let _ = tx.send(ausloeser);
        })?;
        Ok((latch, rx))
    }

    /// Zaehlt um eins herunter
    ///
    /// Gibt einen Fehler zurueck, wenn der Zaehler bereits 0 ist.
    pub fn done(&self) -> PomeloResult<()> {
        let (callback, timer) = {
            let mut zustand = self.inner.lock();
            if zustand.zaehler == 0 {
                return Err(PomeloError::Latch("done() nach Erreichen von 0".into()));
            }
            zustand.zaehler -= 1;
            if zustand.zaehler > 0 {
                return Ok(());
            }
            (zustand.callback.take(), zustand.timer.take())
        };

        if let Some(timer) = timer {
            timer.abort();
        }
        if let Some(cb) = callback {
            cb(LatchAusloeser::Abgeschlossen);
        }
        Ok(())
    }

    /// Verbleibender Zaehlerstand
    pub fn verbleibend(&self) -> usize {
        self.inner.lock().zaehler
    }
}

impl std::fmt::Debug for CountDownLatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountDownLatch")
            .field("verbleibend", &self.verbleibend())
            .finish()
    }
}
