//! Prozessweite Vergabe von Session-IDs
//!
//! Der Startwert wird einmalig aus der Uhrzeit abgeleitet, danach wird
//! atomar hochgezaehlt. Tests koennen einen eigenen Generator injizieren.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

static GLOBALER_GENERATOR: OnceLock<Arc<SessionIdGenerator>> = OnceLock::new();

/// Monoton steigender Zaehler fuer Session-IDs
#[derive(Debug)]
pub struct SessionIdGenerator {
    zaehler: AtomicU64,
}

impl SessionIdGenerator {
    /// Erstellt einen Generator, dessen erste ID `start + 1` ist
    pub fn ab(start: u64) -> Self {
        Self {
            zaehler: AtomicU64::new(start),
        }
    }

    /// Startwert aus den unteren 32 Bit der aktuellen Unix-Zeit
    pub fn zeitbasiert() -> Self {
        Self::ab(startwert(chrono::Utc::now().timestamp()))
    }

    /// Der prozessweit geteilte Generator (beim ersten Zugriff initialisiert)
    pub fn global() -> Arc<Self> {
        Arc::clone(GLOBALER_GENERATOR.get_or_init(|| Arc::new(Self::zeitbasiert())))
    }

    /// Vergibt die naechste ID
    pub fn naechste(&self) -> u64 {
        self.zaehler.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    /// Setzt den Zaehler zurueck (nur fuer Tests gedacht)
    pub fn zuruecksetzen(&self, start: u64) {
        self.zaehler.store(start, Ordering::Relaxed);
    }
}

/// Untere 32 Bit eines Unix-Zeitstempels, 0 fuer Zeiten vor 1970
fn startwert(sekunden: i64) -> u64 {
    u64::try_from(sekunden).unwrap_or_default() & u64::from(u32::MAX)
}

impl Default for SessionIdGenerator {
    fn default() -> Self {
        Self::zeitbasiert()
    }
}
