//! Nachrichtentypen und Frame-Konstanten
//!
//! Eine `Message` besteht aus einem festen 10-Byte-Header und einem Body
//! von hoechstens 4096 Bytes.

use bytes::Bytes;
use std::fmt;

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Maximale Body-Groesse (hartes Limit)
pub const MAX_BODY_SIZE: usize = 1 << 12;

/// Groesse des Gesamtlaengen-Felds
pub const PACK_LEN_SIZE: usize = 4;
/// Groesse des Header-Laengen-Felds
pub const HEADER_LEN_SIZE: usize = 2;

pub const VERSION_SIZE: usize = 1;
pub const STATUS_SIZE: usize = 1;
pub const SERVICE_ID_SIZE: usize = 2;
pub const CMD_SIZE: usize = 2;
pub const SEQ_SIZE: usize = 4;

/// Feste Groesse des rohen Headers (ohne Laengen-Felder)
pub const RAW_HEADER_SIZE: usize =
    VERSION_SIZE + STATUS_SIZE + SERVICE_ID_SIZE + CMD_SIZE + SEQ_SIZE;

/// Obergrenze fuer das Gesamtlaengen-Feld eines empfangenen Frames
pub const MAX_PACK_SIZE: usize = MAX_BODY_SIZE + RAW_HEADER_SIZE + HEADER_LEN_SIZE + PACK_LEN_SIZE;

/// Kleinste gueltige Gesamtlaenge (Frame ohne Body)
pub const MIN_PACK_SIZE: usize = HEADER_LEN_SIZE + RAW_HEADER_SIZE;

// ---------------------------------------------------------------------------
// Header / Message
// ---------------------------------------------------------------------------

/// Protokoll-Header
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Header {
    /// Protokollversion
    pub version: u8,
    /// Statuscode (0 = ok)
    pub status: u8,
    /// Ziel-Service
    pub service_id: u16,
    /// Kommando innerhalb des Services
    pub cmd: u16,
    /// Sequenznummer (Request/Response-Zuordnung)
    pub seq: u32,
}

/// Eine vollstaendige Nachricht: Header + Body
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: Header,
    pub body: Bytes,
}

impl Message {
    /// Erstellt eine neue Nachricht
    pub fn neu(header: Header, body: impl Into<Bytes>) -> Self {
        Self {
            header,
            body: body.into(),
        }
    }

    /// Antwort auf diese Nachricht (gleicher Service, gleiches Kommando, gleiche Seq)
    pub fn antwort(&self, status: u8, body: impl Into<Bytes>) -> Self {
        Self {
            header: Header {
                status,
                ..self.header
            },
            body: body.into(),
        }
    }

    /// Menschenlesbare Darstellung fuer Logs
    pub fn format(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ver:{}, status:{}, serviceId:{}, cmd:{}, seq:{}, body:{}",
            self.header.version,
            self.header.status,
            self.header.service_id,
            self.header.cmd,
            self.header.seq,
            String::from_utf8_lossy(&self.body)
        )
    }
}
