//! Fehlertypen fuer imgate-core
//!
//! Eine fehlerhafte Identitaet ist ein Programmierfehler des Aufrufers.
//! Sie bricht nur den einzelnen Aufruf ab, nie den Prozess.

use thiserror::Error;

/// Result-Alias fuer Identitaets-Operationen
pub type IdentityResult<T> = std::result::Result<T, IdentityError>;

/// Fehler beim Bauen oder Parsen einer Session-Identitaet
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("Name der Identitaet ist leer")]
    LeererName,

    #[error("Token der Identitaet ist leer")]
    LeererToken,

    /// Name oder Token enthalten den Trenner ':'
    #[error("Ungueltiges Zeichen ':' in {feld}: {wert:?}")]
    UngueltigesZeichen { feld: &'static str, wert: String },

    #[error("Identitaet muss genau 3 Felder haben, erhalten: {0}")]
    FeldAnzahl(usize),

    #[error("Ungueltige Session-ID: {0:?}")]
    UngueltigeId(String),
}
