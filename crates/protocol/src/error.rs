//! Fehlertypen fuer das Wire-Protokoll

use std::io;
use thiserror::Error;

/// Result-Typ fuer Codec-Operationen
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Fehler beim Lesen oder Schreiben eines Frames
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Angegebene Gesamtlaenge ausserhalb des erlaubten Bereichs
    #[error("Ungueltige Paketlaenge: {laenge} Bytes")]
    RawPackLength { laenge: usize },

    /// Header-Laengen-Feld entspricht nicht der festen Header-Groesse
    #[error("Ungueltige Header-Laenge: {laenge} Bytes")]
    RawHeaderLength { laenge: u16 },

    /// Body ueberschreitet das Maximum beim Senden
    #[error("Body zu gross: {laenge} Bytes")]
    BodyZuGross { laenge: usize },

    /// Transportfehler (Verbindung, Frist, geschlossener Codec)
    #[error("IO-Fehler: {0}")]
    Io(#[from] io::Error),
}

impl ProtocolError {
    /// Gibt true zurueck wenn der Fehler aus der Transportschicht stammt
    pub fn ist_transport(&self) -> bool {
        matches!(self, Self::Io(_))
    }

    /// Gibt true zurueck wenn eine Lese- oder Schreibfrist abgelaufen ist
    pub fn ist_zeitlimit(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == io::ErrorKind::TimedOut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_erkennung() {
        let e: ProtocolError = io::Error::from(io::ErrorKind::TimedOut).into();
        assert!(e.ist_transport());
        assert!(e.ist_zeitlimit());

        let e = ProtocolError::RawHeaderLength { laenge: 11 };
        assert!(!e.ist_transport());
        assert!(!e.ist_zeitlimit());
        assert_eq!(e.to_string(), "Ungueltige Header-Laenge: 11 Bytes");
    }
}
