//! Session-Manager – geshardete Registry aller lebenden Sessions
//!
//! Sessions werden nach dem Hash ihres Tokens auf `SHARD_ANZAHL` Shards
//! verteilt. Jeder Shard hat ein eigenes `RwLock` und zwei Maps:
//! Identitaet -> Session und Token -> Identitaeten (Multi-Device).
//! Operationen auf verschiedenen Tokens konkurrieren nur, wenn sie auf
//! denselben Shard fallen; ein globales Lock gibt es nicht.
//!
//! Clone des Managers teilt den inneren Zustand.

use futures_util::future::join_all;
use imgate_core::Identity;
use parking_lot::RwLock;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::{SessionError, SessionResult};
use crate::id::SessionIdGenerator;
use crate::session::Session;

/// Anzahl der unabhaengig gesperrten Shards
pub const SHARD_ANZAHL: usize = 32;

// ---------------------------------------------------------------------------
// Shard
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Shard {
    sessions: HashMap<Identity, Arc<Session>>,
    /// Token -> Identitaeten in Registrierungsreihenfolge
    token_sessions: HashMap<String, Vec<Identity>>,
}

/// Waehlt den Shard fuer einen Token (`hash(token) mod SHARD_ANZAHL`)
///
/// Einfuegen, Suchen und Entfernen muessen alle ueber diese Funktion gehen.
pub(crate) fn shard_index(token: &str) -> usize {
    let mut hasher = DefaultHasher::new();
    token.hash(&mut hasher);
    (hasher.finish() % SHARD_ANZAHL as u64) as usize
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Registry aller Sessions eines Servers
#[derive(Clone)]
pub struct Manager {
    inner: Arc<ManagerInner>,
}

pub(crate) struct ManagerInner {
    pub(crate) name: Arc<str>,
    shards: [RwLock<Shard>; SHARD_ANZAHL],
    entsorgt: AtomicBool,
    entsorgen: OnceCell<()>,
    /// Eltern-Signal aller Drain-Tasks, auch nicht registrierter Sessions
    pub(crate) abbruch: CancellationToken,
    /// Zaehlt laufende Drain-Tasks
    pub(crate) tasks: TaskTracker,
    pub(crate) ids: Arc<SessionIdGenerator>,
}

impl Manager {
    /// Erstellt einen Manager, der IDs aus dem prozessweiten Generator bezieht
    pub fn neu(name: impl Into<String>) -> Self {
        Self::mit_id_generator(name, SessionIdGenerator::global())
    }

    /// Erstellt einen Manager mit eigenem ID-Generator
    pub fn mit_id_generator(name: impl Into<String>, ids: Arc<SessionIdGenerator>) -> Self {
        let name: String = name.into();
        Self {
            inner: Arc::new(ManagerInner {
                name: Arc::from(name),
                shards: std::array::from_fn(|_| RwLock::new(Shard::default())),
                entsorgt: AtomicBool::new(false),
                entsorgen: OnceCell::new(),
                abbruch: CancellationToken::new(),
                tasks: TaskTracker::new(),
                ids,
            }),
        }
    }

    pub(crate) fn inner(&self) -> &Arc<ManagerInner> {
        &self.inner
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Gibt true zurueck sobald `close()` begonnen hat
    pub fn is_closed(&self) -> bool {
        self.inner.entsorgt.load(Ordering::Acquire)
    }

    /// Traegt eine Session unter ihrer Identitaet und ihrem Token ein
    ///
    /// # Fehler
    /// - `Identity` wenn die Session noch keinen Token hat
    /// - `SessionClosed` wenn Session oder Manager bereits geschlossen sind
    pub fn add_session(&self, session: &Arc<Session>) -> SessionResult<()> {
        if session.is_closed() {
            return Err(SessionError::SessionClosed);
        }
        let identity = session.identity()?;

        // Nach einem Token-Wechsel zuerst die alte Eintragung austragen
        let vorher = session.registriert.lock().clone();
        if vorher.is_some_and(|alt| alt != identity) {
            self.inner.remove_session(session);
        }

        {
            let mut shard = self.inner.shard(identity.token()).write();
            // Unter dem Shard-Lock pruefen, sonst kann close() die Session verpassen
            if self.is_closed() {
                return Err(SessionError::SessionClosed);
            }

            if shard
                .sessions
                .insert(identity.clone(), Arc::clone(session))
                .is_none()
            {
                shard
                    .token_sessions
                    .entry(identity.token().to_string())
                    .or_default()
                    .push(identity.clone());
            }
            *session.registriert.lock() = Some(identity.clone());
        }

        tracing::debug!(
            manager = %self.inner.name,
            identity = %identity,
            "Session registriert"
        );

        // close() kann parallel gelaufen sein, bevor die Registrierung sichtbar war
        if session.is_closed() {
            self.inner.remove_session(session);
            return Err(SessionError::SessionClosed);
        }
        Ok(())
    }

    /// Sucht eine Session ueber ihre Identitaet
    pub fn get_session(&self, identity: &Identity) -> Option<Arc<Session>> {
        self.inner
            .shard(identity.token())
            .read()
            .sessions
            .get(identity)
            .cloned()
    }

    /// Alle Sessions eines Tokens in Registrierungsreihenfolge
    pub fn get_token_sessions(&self, token: &str) -> Vec<Arc<Session>> {
        let shard = self.inner.shard(token).read();

        shard
            .token_sessions
            .get(token)
            .map(|ids| {
                ids.iter()
                    .filter_map(|identity| shard.sessions.get(identity).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Traegt eine Session aus (wird von `Session::close` aufgerufen)
    pub fn remove_session(&self, session: &Session) {
        self.inner.remove_session(session);
    }

    /// Gesamtzahl der eingetragenen Sessions
    pub fn session_anzahl(&self) -> usize {
        self.inner
            .shards
            .iter()
            .map(|shard| shard.read().sessions.len())
            .sum()
    }

    /// Schliesst alle Sessions und wartet auf alle Drain-Tasks
    ///
    /// Laeuft genau einmal; weitere Aufrufe warten auf den ersten.
    pub async fn close(&self) {
        self.inner
            .entsorgen
            .get_or_init(|| async {
                self.inner.entsorgt.store(true, Ordering::Release);

                // Pro Shard unter Write-Lock austragen, ausserhalb schliessen:
                // Session::close greift selbst auf den Shard zu
                let mut offen = Vec::new();
                for shard in &self.inner.shards {
                    let mut shard = shard.write();
                    offen.extend(shard.sessions.drain().map(|(_, session)| session));
                    shard.token_sessions.clear();
                }

                tracing::info!(
                    manager = %self.inner.name,
                    sessions = offen.len(),
                    "Manager wird geschlossen"
                );

                join_all(
                    offen
                        .iter()
                        .filter(|session| !session.is_closed())
                        .map(|session| session.close()),
                )
                .await;

                // Drain-Tasks von Sessions ausserhalb der Registry beenden;
                // sie schliessen ihre Session beim Verlassen selbst
                self.inner.abbruch.cancel();

                self.inner.tasks.close();
                self.inner.tasks.wait().await;

                tracing::info!(manager = %self.inner.name, "Manager geschlossen");
            })
            .await;
    }
}

impl ManagerInner {
    fn shard(&self, token: &str) -> &RwLock<Shard> {
        &self.shards[shard_index(token)]
    }

    pub(crate) fn remove_session(&self, session: &Session) {
        let Some(identity) = session.registriert.lock().take() else {
            return;
        };

        let mut shard = self.shard(identity.token()).write();
        if shard.sessions.remove(&identity).is_none() {
            return;
        }

        if let Some(ids) = shard.token_sessions.get_mut(identity.token()) {
            ids.retain(|id| id != &identity);
            if ids.is_empty() {
                shard.token_sessions.remove(identity.token());
            }
        }
        drop(shard);

        tracing::debug!(manager = %self.name, identity = %identity, "Session ausgetragen");
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("name", &self.inner.name)
            .field("geschlossen", &self.is_closed())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use imgate_protocol::{Codec, StreamCodec};
    use tokio::io::duplex;

    fn test_manager() -> Manager {
        Manager::mit_id_generator("gateway", Arc::new(SessionIdGenerator::ab(6)))
    }

    fn test_session(manager: &Manager, token: &str) -> Arc<Session> {
        let (a, _b) = duplex(1024);
        let codec: Arc<dyn Codec> = Arc::new(StreamCodec::new(a));
        let session = Session::neu(codec, manager, 0);
        session.set_token(token);
        session
    }

    #[test]
    fn shard_index_ist_deterministisch() {
        for token in ["", "u1", "alice", "ein-langer-token-mit-vielen-zeichen"] {
            let index = shard_index(token);
            assert!(index < SHARD_ANZAHL);
            assert_eq!(index, shard_index(token));
        }
    }

    #[tokio::test]
    async fn registrieren_und_finden() {
        let manager = test_manager();
        let session = test_session(&manager, "alice");
        manager.add_session(&session).unwrap();

        let identity = session.identity().unwrap();
        let gefunden = manager.get_session(&identity).expect("Session erwartet");
        assert_eq!(gefunden.id(), session.id());
        assert_eq!(gefunden.token(), "alice");
        assert_eq!(manager.session_anzahl(), 1);
    }

    #[tokio::test]
    async fn ohne_token_nicht_registrierbar() {
        let manager = test_manager();
        let session = test_session(&manager, "");
        assert!(matches!(
            manager.add_session(&session),
            Err(SessionError::Identity(_))
        ));
        assert_eq!(manager.session_anzahl(), 0);
    }

    #[tokio::test]
    async fn multi_device_reihenfolge() {
        let manager = test_manager();
        let s7 = test_session(&manager, "u1");
        let s8 = test_session(&manager, "u1");
        assert_eq!((s7.id(), s8.id()), (7, 8));

        manager.add_session(&s7).unwrap();
        manager.add_session(&s8).unwrap();

        let ids: Vec<u64> = manager
            .get_token_sessions("u1")
            .iter()
            .map(|s| s.id())
            .collect();
        assert_eq!(ids, vec![7, 8]);
        assert!(manager.get_token_sessions("unbekannt").is_empty());
    }

    #[tokio::test]
    async fn doppelte_registrierung_ohne_duplikat() {
        let manager = test_manager();
        let session = test_session(&manager, "u1");
        manager.add_session(&session).unwrap();
        manager.add_session(&session).unwrap();

        assert_eq!(manager.get_token_sessions("u1").len(), 1);
    }

    #[tokio::test]
    async fn entfernen_raeumt_token_auf() {
        let manager = test_manager();
        let a = test_session(&manager, "u1");
        let b = test_session(&manager, "u1");
        manager.add_session(&a).unwrap();
        manager.add_session(&b).unwrap();

        manager.remove_session(&a);
        let rest = manager.get_token_sessions("u1");
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].id(), b.id());
        assert!(manager.get_session(&a.identity().unwrap()).is_none());

        b.close().await.unwrap();
        assert!(manager.get_token_sessions("u1").is_empty());

        let shard = manager.inner.shard("u1").read();
        assert!(!shard.token_sessions.contains_key("u1"));
    }

    #[tokio::test]
    async fn spaeter_token_wechsel_entfernt_alte_eintragung() {
        let manager = test_manager();
        let session = test_session(&manager, "alt");
        manager.add_session(&session).unwrap();

        session.set_token("neu");
        assert_eq!(manager.get_token_sessions("alt").len(), 1);

        session.close().await.unwrap();
        assert!(manager.get_token_sessions("alt").is_empty());
        assert_eq!(manager.session_anzahl(), 0);
    }

    #[tokio::test]
    async fn erneute_registrierung_nach_token_wechsel_ersetzt_eintragung() {
        let manager = test_manager();
        let session = test_session(&manager, "alt");
        manager.add_session(&session).unwrap();

        session.set_token("neu");
        manager.add_session(&session).unwrap();
        assert!(manager.get_token_sessions("alt").is_empty());
        assert_eq!(manager.get_token_sessions("neu").len(), 1);
        assert_eq!(manager.session_anzahl(), 1);

        session.close().await.unwrap();
        assert!(manager.get_token_sessions("neu").is_empty());
        assert_eq!(manager.session_anzahl(), 0);
    }

    #[tokio::test]
    async fn close_schliesst_alle_sessions() {
        let manager = test_manager();
        let sessions: Vec<_> = (0..5)
            .map(|i| {
                let s = test_session(&manager, &format!("user{i}"));
                manager.add_session(&s).unwrap();
                s
            })
            .collect();

        manager.close().await;
        assert!(manager.is_closed());
        assert_eq!(manager.session_anzahl(), 0);
        for session in &sessions {
            assert!(session.is_closed());
        }

        // Zweiter Aufruf ist ein No-Op
        manager.close().await;
    }

    #[tokio::test]
    async fn registrieren_nach_close_abgelehnt() {
        let manager = test_manager();
        manager.close().await;

        let session = test_session(&manager, "spaet");
        assert!(matches!(
            manager.add_session(&session),
            Err(SessionError::SessionClosed)
        ));
    }
}
