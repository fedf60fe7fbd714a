//! imgate-session – Sessions und Session-Registry
//!
//! Dieser Crate verbindet den Codec einer Verbindung mit einer Identitaet
//! und verwaltet alle lebenden Sessions in einem nach Token geshardeten
//! Manager.
//!
//! ## Architektur
//!
//! ```text
//! Acceptor (extern)
//!     |  Codec pro Verbindung
//!     v
//! Session  -- optional: Send-Queue + Drain-Task
//!     |  set_token() -> Manager::add_session()
//!     v
//! Manager (32 Shards, je RwLock)
//!     +-- sessions:       Identity -> Session
//!     +-- token_sessions: Token    -> [Identity]  (Multi-Device)
//! ```

pub mod error;
pub mod id;
pub mod manager;
pub mod session;

// Bequeme Re-Exporte
pub use error::{SessionError, SessionResult};
pub use id::SessionIdGenerator;
pub use manager::{Manager, SHARD_ANZAHL};
pub use session::Session;
