//! Session-Identitaet – zusammengesetzter Schluessel `<name>:<token>:<id>`
//!
//! Die Identitaet ist der Primaerschluessel des Session-Managers. Sie wird
//! aus dem Namen des Managers, dem Token der Session und der numerischen
//! Session-ID gebildet und laesst sich verlustfrei als String darstellen.
//!
//! ```text
//! gateway-1:alice:4711
//! ^^^^^^^^^ ^^^^^ ^^^^
//! Name      Token ID
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{IdentityError, IdentityResult};

/// Trennzeichen zwischen den drei Feldern
pub const IDENTITY_TRENNER: char = ':';

/// Eindeutiger Name einer Session innerhalb eines Managers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity {
    name: String,
    token: String,
    id: u64,
}

impl Identity {
    /// Baut eine Identitaet aus ihren drei Bestandteilen
    ///
    /// # Fehler
    /// - `LeererName` / `LeererToken` wenn ein Feld leer ist
    /// - `UngueltigesZeichen` wenn Name oder Token den Trenner enthalten
    pub fn bauen(name: &str, token: &str, id: u64) -> IdentityResult<Self> {
        if name.is_empty() {
            return Err(IdentityError::LeererName);
        }
        if token.is_empty() {
            return Err(IdentityError::LeererToken);
        }
        feld_pruefen("name", name)?;
        feld_pruefen("token", token)?;

        Ok(Self {
            name: name.to_string(),
            token: token.to_string(),
            id,
        })
    }

    /// Parst die String-Form `<name>:<token>:<id>`
    pub fn parsen(s: &str) -> IdentityResult<Self> {
        let felder: Vec<&str> = s.split(IDENTITY_TRENNER).collect();
        if felder.len() != 3 {
            return Err(IdentityError::FeldAnzahl(felder.len()));
        }

        let id = felder[2]
            .parse::<u64>()
            .map_err(|_| IdentityError::UngueltigeId(felder[2].to_string()))?;

        Self::bauen(felder[0], felder[1], id)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Zerlegt die Identitaet in `(name, token, id)`
    pub fn into_teile(self) -> (String, String, u64) {
        (self.name, self.token, self.id)
    }
}

fn feld_pruefen(feld: &'static str, wert: &str) -> IdentityResult<()> {
    if wert.contains(IDENTITY_TRENNER) {
        return Err(IdentityError::UngueltigesZeichen {
            feld,
            wert: wert.to_string(),
        });
    }
    Ok(())
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}",
            self.name,
            self.token,
            self.id,
            sep = IDENTITY_TRENNER
        )
    }
}

impl FromStr for Identity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parsen(s)
    }
}

impl TryFrom<String> for Identity {
    type Error = IdentityError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parsen(&s)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
