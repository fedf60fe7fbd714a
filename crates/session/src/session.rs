//! Session – eine Verbindung mit Identitaet und optionaler Send-Queue
//!
//! Jede akzeptierte Verbindung bekommt genau eine `Session`. Ist eine
//! Queue-Groesse > 0 konfiguriert, laeuft pro Session ein Drain-Task, der
//! die Queue in Reihenfolge auf die Verbindung schreibt. `send()` blockiert
//! dann nie: eine volle Queue liefert `SessionBlocked`.
//!
//! ## Lebenszyklus
//! ```text
//! neu() -> set_token() -> Manager::add_session() -> receive()/send() ... -> close()
//! ```
//! `close()` laeuft genau einmal: Codec schliessen, Drain-Task beenden,
//! aus dem Manager austragen.

use imgate_core::Identity;
use imgate_protocol::{Codec, Message};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{SessionError, SessionResult};
use crate::manager::{Manager, ManagerInner};

/// Eine Client-Session
pub struct Session {
    id: u64,
    /// Name des besitzenden Managers
    name: Arc<str>,
    token: RwLock<String>,
    codec: Arc<dyn Codec>,
    /// Nicht-besitzende Rueckreferenz auf den Manager
    manager: Weak<ManagerInner>,
    send_tx: Option<mpsc::Sender<Message>>,
    geschlossen: AtomicBool,
    schliess_signal: CancellationToken,
    /// Identitaet unter der die Session im Manager eingetragen ist
    pub(crate) registriert: Mutex<Option<Identity>>,
}

impl Session {
    /// Erstellt eine neue Session fuer `codec` im Manager `manager`
    ///
    /// Bei `send_queue_groesse > 0` wird der Drain-Task gestartet; das muss
    /// innerhalb einer tokio-Runtime geschehen.
    pub fn neu(codec: Arc<dyn Codec>, manager: &Manager, send_queue_groesse: usize) -> Arc<Self> {
        let inner = manager.inner();
        let id = inner.ids.naechste();

        let (send_tx, send_rx) = if send_queue_groesse > 0 {
            let (tx, rx) = mpsc::channel(send_queue_groesse);
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let session = Arc::new(Self {
            id,
            name: Arc::clone(&inner.name),
            token: RwLock::new(String::new()),
            codec,
            manager: Arc::downgrade(inner),
            send_tx,
            geschlossen: AtomicBool::new(false),
            schliess_signal: inner.abbruch.child_token(),
            registriert: Mutex::new(None),
        });

        if let Some(rx) = send_rx {
            inner.tasks.spawn(send_loop(
                Arc::downgrade(&session),
                Arc::clone(&session.codec),
                rx,
                session.schliess_signal.clone(),
                id,
            ));
        }

        tracing::debug!(
            session_id = id,
            manager = %session.name,
            queue = send_queue_groesse,
            "Session erstellt"
        );
        session
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Name des Managers, zu dem die Session gehoert
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn token(&self) -> String {
        self.token.read().clone()
    }

    /// Setzt den Token fuer die Indizierung im Manager
    ///
    /// Eine bereits eingetragene Session wird nicht neu indiziert; der
    /// Aufrufer setzt den Token vor `Manager::add_session`.
    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write() = token.into();
    }

    /// Identitaet `<name>:<token>:<id>`; schlaegt fehl solange kein Token gesetzt ist
    pub fn identity(&self) -> SessionResult<Identity> {
        Ok(Identity::bauen(&self.name, &self.token.read(), self.id)?)
    }

    pub fn is_closed(&self) -> bool {
        self.geschlossen.load(Ordering::Acquire)
    }

    pub fn set_read_deadline(&self, frist: Option<Instant>) {
        self.codec.set_read_deadline(frist);
    }

    pub fn set_write_deadline(&self, frist: Option<Instant>) {
        self.codec.set_write_deadline(frist);
    }

    /// Liest die naechste Nachricht von der Verbindung
    pub async fn receive(&self) -> SessionResult<Message> {
        Ok(self.codec.receive().await?)
    }

    /// Sendet eine Nachricht
    ///
    /// Ohne Queue synchron ueber den Codec, mit Queue nicht-blockierend.
    ///
    /// # Fehler
    /// - `SessionClosed` wenn die Session geschlossen ist
    /// - `SessionBlocked` wenn die Send-Queue voll ist
    pub async fn send(&self, nachricht: Message) -> SessionResult<()> {
        if self.is_closed() {
            return Err(SessionError::SessionClosed);
        }

        let Some(tx) = &self.send_tx else {
            return Ok(self.codec.send(&nachricht).await?);
        };

        tx.try_send(nachricht).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SessionError::SessionBlocked,
            mpsc::error::TrySendError::Closed(_) => SessionError::SessionClosed,
        })
    }

    /// Schliesst die Session
    ///
    /// Nur der erste Aufruf schliesst Codec und Drain-Task und traegt die
    /// Session aus dem Manager aus. Jeder weitere liefert `SessionClosed`.
    pub async fn close(&self) -> SessionResult<()> {
        if self
            .geschlossen
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SessionError::SessionClosed);
        }

        let ergebnis = self.codec.close().await;
        self.schliess_signal.cancel();

        if let Some(manager) = self.manager.upgrade() {
            manager.remove_session(self);
        }

        tracing::debug!(session_id = self.id, manager = %self.name, "Session geschlossen");
        ergebnis.map_err(|e| SessionError::Protocol(e.into()))
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("token", &*self.token.read())
            .field("geschlossen", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Drain-Task: schreibt die Send-Queue in Reihenfolge auf die Verbindung
///
/// Endet beim Schliessen der Session (noch wartende Nachrichten werden
/// verworfen) oder beim ersten Sendefehler; in diesem Fall wird die
/// Session geschlossen.
async fn send_loop(
    session: Weak<Session>,
    codec: Arc<dyn Codec>,
    mut rx: mpsc::Receiver<Message>,
    schliess_signal: CancellationToken,
    session_id: u64,
) {
    loop {
        tokio::select! {
            biased;

            _ = schliess_signal.cancelled() => break,

            nachricht = rx.recv() => {
                // Alle Sender weg: Session wurde freigegeben
                let Some(nachricht) = nachricht else { break };

                // Auch ein haengendes Schreiben endet mit dem Schliess-Signal
                let ergebnis = tokio::select! {
                    biased;
                    _ = schliess_signal.cancelled() => break,
                    ergebnis = codec.send(&nachricht) => ergebnis,
                };

                if let Err(e) = ergebnis {
                    if !schliess_signal.is_cancelled() {
                        tracing::warn!(
                            session_id,
                            fehler = %e,
                            nachricht = %nachricht,
                            "Senden aus der Queue fehlgeschlagen"
                        );
                    }
                    break;
                }
            }
        }
    }

    if let Some(session) = session.upgrade() {
        let _ = session.close().await;
    }
    tracing::trace!(session_id, "Drain-Task beendet");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
