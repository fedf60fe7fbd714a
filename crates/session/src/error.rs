//! Fehlertypen fuer Sessions und Manager

use imgate_core::IdentityError;
use imgate_protocol::ProtocolError;
use thiserror::Error;

/// Fehlertyp fuer Session-Operationen
#[derive(Debug, Error)]
pub enum SessionError {
    /// Session ist geschlossen, die Operation ist dauerhaft ungueltig
    #[error("Session ist geschlossen")]
    SessionClosed,

    /// Send-Queue ist voll (Gegenseite liest zu langsam)
    #[error("Session ist blockiert")]
    SessionBlocked,

    /// Codec- oder Transportfehler
    #[error("Protokollfehler: {0}")]
    Protocol(#[from] ProtocolError),

    /// Identitaet konnte nicht gebildet werden (z.B. Token fehlt)
    #[error("Ungueltige Identitaet: {0}")]
    Identity(#[from] IdentityError),
}

impl SessionError {
    /// Gibt true zurueck wenn ein erneuter Versuch sinnvoll sein koennte
    pub fn ist_voruebergehend(&self) -> bool {
        matches!(self, Self::SessionBlocked)
    }
}

/// Result-Typ fuer Session-Operationen
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nur_blockiert_ist_voruebergehend() {
        assert!(SessionError::SessionBlocked.ist_voruebergehend());
        assert!(!SessionError::SessionClosed.ist_voruebergehend());
        assert!(!SessionError::from(IdentityError::LeererToken).ist_voruebergehend());
    }
}
