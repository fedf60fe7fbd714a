//! imgate-core – Gemeinsame Typen und Fehlertypen
//!
//! Dieses Crate stellt die Session-Identitaet bereit, die von Protokoll-,
//! Session- und Server-Crate gemeinsam genutzt wird.

pub mod error;
pub mod identity;

// Re-Exporte fuer bequemen Zugriff
pub use error::{IdentityError, IdentityResult};
pub use identity::{Identity, IDENTITY_TRENNER};
