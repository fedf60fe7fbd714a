//! Codec – liest und schreibt Nachrichten auf genau einer Verbindung
//!
//! Der `Codec`-Trait ist die Schnittstelle zwischen Session und Transport.
//! `StreamCodec` implementiert ihn fuer jeden `AsyncRead + AsyncWrite`
//! Stream (TCP, TLS, In-Memory-Duplex).
//!
//! ## Fristen
//! Lese- und Schreibfristen sind absolute Zeitpunkte. Eine abgelaufene Frist
//! liefert einen gewoehnlichen IO-Fehler (`ErrorKind::TimedOut`).
//!
//! ## Schliessen
//! `close()` weckt laufende `receive`/`send`-Aufrufe auf; sie enden mit
//! `ErrorKind::NotConnected`. Bereits gepufferte Teil-Frames bleiben im
//! `FramedRead` erhalten, ein abgebrochenes `receive` verliert keine Bytes.

use async_trait::async_trait;
use bytes::BytesMut;
use futures_util::StreamExt;
use std::future::Future;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tokio_util::codec::{Encoder, FramedRead};

use crate::error::ProtocolResult;
use crate::message::{Message, HEADER_LEN_SIZE, PACK_LEN_SIZE, RAW_HEADER_SIZE};
use crate::wire::ImFrameCodec;

// ---------------------------------------------------------------------------
// Codec-Trait
// ---------------------------------------------------------------------------

/// Nachrichten-Codec fuer eine einzelne Verbindung
#[async_trait]
pub trait Codec: Send + Sync {
    /// Setzt die Lesefrist (`None` = keine Frist)
    fn set_read_deadline(&self, frist: Option<Instant>);

    /// Setzt die Schreibfrist (`None` = keine Frist)
    fn set_write_deadline(&self, frist: Option<Instant>);

    /// Liest genau eine Nachricht (blockierend bis Frame, Fehler oder Frist)
    async fn receive(&self) -> ProtocolResult<Message>;

    /// Schreibt eine Nachricht als einzelnen Frame
    async fn send(&self, message: &Message) -> ProtocolResult<()>;

    /// Schliesst die Verbindung
    async fn close(&self) -> io::Result<()>;
}

// ---------------------------------------------------------------------------
// ImProtocol
// ---------------------------------------------------------------------------

/// Fabrik fuer Codecs des IM-Protokolls
#[derive(Debug, Default, Clone, Copy)]
pub struct ImProtocol;

impl ImProtocol {
    pub fn new() -> Self {
        Self
    }

    /// Erstellt einen Codec fuer einen akzeptierten Stream
    pub fn codec<S>(&self, stream: S) -> Arc<dyn Codec>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Arc::new(StreamCodec::new(stream))
    }
}

// ---------------------------------------------------------------------------
// StreamCodec
// ---------------------------------------------------------------------------

/// `Codec` ueber einem beliebigen bidirektionalen Byte-Stream
///
/// Lese- und Schreibhaelfte sind getrennt gesperrt, damit ein blockierendes
/// `receive` parallele `send`-Aufrufe nicht aufhaelt.
pub struct StreamCodec<S> {
    reader: Mutex<FramedRead<ReadHalf<S>, ImFrameCodec>>,
    writer: Mutex<WriteHalf<S>>,
    lese_frist: parking_lot::Mutex<Option<Instant>>,
    schreib_frist: parking_lot::Mutex<Option<Instant>>,
    geschlossen: watch::Sender<bool>,
}

impl<S> StreamCodec<S>
where
    S: AsyncRead + AsyncWrite,
{
    pub fn new(stream: S) -> Self {
        let (lesen, schreiben) = tokio::io::split(stream);
        let (geschlossen, _) = watch::channel(false);
        Self {
            reader: Mutex::new(FramedRead::new(lesen, ImFrameCodec::new())),
            writer: Mutex::new(schreiben),
            lese_frist: parking_lot::Mutex::new(None),
            schreib_frist: parking_lot::Mutex::new(None),
            geschlossen,
        }
    }

    /// Gibt true zurueck wenn `close()` bereits aufgerufen wurde
    pub fn ist_geschlossen(&self) -> bool {
        *self.geschlossen.borrow()
    }

    /// Fuehrt `arbeit` aus bis sie fertig ist, die Frist ablaeuft oder der
    /// Codec geschlossen wird
    async fn begrenzt<T, F>(&self, frist: Option<Instant>, arbeit: F) -> ProtocolResult<T>
    where
        F: Future<Output = ProtocolResult<T>>,
    {
        let mut geschlossen = self.geschlossen.subscribe();
        let schliess_signal = async move {
            let _ = geschlossen.wait_for(|zu| *zu).await;
        };

        tokio::select! {
            biased;

            () = schliess_signal => Err(nicht_verbunden().into()),
            ergebnis = mit_frist(frist, arbeit) => ergebnis,
        }
    }
}

#[async_trait]
impl<S> Codec for StreamCodec<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    fn set_read_deadline(&self, frist: Option<Instant>) {
        *self.lese_frist.lock() = frist;
    }

    fn set_write_deadline(&self, frist: Option<Instant>) {
        *self.schreib_frist.lock() = frist;
    }

    async fn receive(&self) -> ProtocolResult<Message> {
        let frist = *self.lese_frist.lock();

        self.begrenzt(frist, async {
            let mut reader = self.reader.lock().await;
            match reader.next().await {
                Some(ergebnis) => ergebnis,
                // Gegenseite hat die Verbindung sauber geschlossen
                None => Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
            }
        })
        .await
    }

    async fn send(&self, message: &Message) -> ProtocolResult<()> {
        let frame_len = PACK_LEN_SIZE + HEADER_LEN_SIZE + RAW_HEADER_SIZE + message.body.len();
        let mut puffer = BytesMut::with_capacity(frame_len);
        ImFrameCodec::new().encode(message, &mut puffer)?;

        let frist = *self.schreib_frist.lock();

        self.begrenzt(frist, async {
            let mut writer = self.writer.lock().await;
            writer.write_all(&puffer).await?;
            writer.flush().await?;
            Ok(())
        })
        .await
    }

    async fn close(&self) -> io::Result<()> {
        self.geschlossen.send_replace(true);

        let mut writer = self.writer.lock().await;
        writer.shutdown().await
    }
}

/// Wartet auf `arbeit`, hoechstens bis `frist`
async fn mit_frist<T, F>(frist: Option<Instant>, arbeit: F) -> ProtocolResult<T>
where
    F: Future<Output = ProtocolResult<T>>,
{
    match frist {
        Some(frist) => tokio::time::timeout_at(frist, arbeit)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "Frist ueberschritten"))?,
        None => arbeit.await,
    }
}

fn nicht_verbunden() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "Codec geschlossen")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
