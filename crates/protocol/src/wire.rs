//! Wire-Format fuer Stream-Verbindungen
//!
//! Frame-basiertes Protokoll: Gesamtlaenge (u32 big-endian) gefolgt von
//! Header-Laenge (u16), festem 10-Byte-Header und Body.
//!
//! ## Frame-Format
//!
//! ```text
//! Offset  Groesse  Feld
//! 0       4        Gesamtlaenge (Bytes nach diesem Feld)
//! 4       2        Header-Laenge (immer 10)
//! 6       1        version
//! 7       1        status
//! 8       2        serviceId
//! 10      2        cmd
//! 12      4        seq
//! 16      n        body (n = Gesamtlaenge - Header-Laenge - 2)
//! ```

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;
use crate::message::{
    Header, Message, HEADER_LEN_SIZE, MAX_BODY_SIZE, MAX_PACK_SIZE, MIN_PACK_SIZE, PACK_LEN_SIZE,
    RAW_HEADER_SIZE,
};

// ---------------------------------------------------------------------------
// ImFrameCodec
// ---------------------------------------------------------------------------

/// tokio-util Codec fuer das binaere IM-Frame-Format
///
/// Implementiert `Decoder` und `Encoder<Message>` fuer die Verwendung mit
/// `FramedRead` / `FramedWrite`. Der Codec ist zustandslos.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImFrameCodec;

impl ImFrameCodec {
    pub fn new() -> Self {
        Self
    }
}

// ---------------------------------------------------------------------------
// Decoder-Implementierung
// ---------------------------------------------------------------------------

impl Decoder for ImFrameCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Warte auf das Gesamtlaengen-Feld
        if src.len() < PACK_LEN_SIZE {
            return Ok(None);
        }

        let pack_len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;

        // Laenge pruefen bevor der Rest des Frames gelesen wird
        if pack_len > MAX_PACK_SIZE || pack_len < MIN_PACK_SIZE {
            tracing::debug!(laenge = pack_len, "Frame mit ungueltiger Gesamtlaenge verworfen");
            return Err(ProtocolError::RawPackLength { laenge: pack_len });
        }

        let frame_len = PACK_LEN_SIZE + pack_len;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        src.advance(PACK_LEN_SIZE);
        let mut frame = src.split_to(pack_len);

        let header_len = frame.get_u16();
        if header_len as usize != RAW_HEADER_SIZE {
            tracing::debug!(laenge = header_len, "Frame mit ungueltiger Header-Laenge verworfen");
            return Err(ProtocolError::RawHeaderLength { laenge: header_len });
        }

        let header = Header {
            version: frame.get_u8(),
            status: frame.get_u8(),
            service_id: frame.get_u16(),
            cmd: frame.get_u16(),
            seq: frame.get_u32(),
        };

        // Rest ist der Body (leer bei reinem Header-Frame)
        Ok(Some(Message {
            header,
            body: frame.freeze(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Encoder-Implementierung
// ---------------------------------------------------------------------------

impl Encoder<&Message> for ImFrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: &Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body_len = item.body.len();
        if body_len > MAX_BODY_SIZE {
            return Err(ProtocolError::BodyZuGross { laenge: body_len });
        }

        let pack_len = HEADER_LEN_SIZE + RAW_HEADER_SIZE + body_len;
        dst.reserve(PACK_LEN_SIZE + pack_len);

        dst.put_u32(pack_len as u32);
        dst.put_u16(RAW_HEADER_SIZE as u16);
        dst.put_u8(item.header.version);
        dst.put_u8(item.header.status);
        dst.put_u16(item.header.service_id);
        dst.put_u16(item.header.cmd);
        dst.put_u32(item.header.seq);
        dst.put_slice(&item.body);

        Ok(())
    }
}

impl Encoder<Message> for ImFrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        Encoder::<&Message>::encode(self, &item, dst)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn test_nachricht(seq: u32, body: &'static [u8]) -> Message {
        Message::neu(
            Header {
                version: 1,
                status: 2,
                service_id: 0x0304,
                cmd: 0x0506,
                seq,
            },
            body,
        )
    }

    #[test]
    fn encode_exaktes_byte_layout() {
        let mut codec = ImFrameCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(&test_nachricht(0x0708090A, b"hi"), &mut buf)
            .unwrap();

        assert_eq!(
            &buf[..],
            &[
                0x00, 0x00, 0x00, 0x0E, // Gesamtlaenge 2 + 10 + 2
                0x00, 0x0A, // Header-Laenge
                0x01, // version
                0x02, // status
                0x03, 0x04, // serviceId
                0x05, 0x06, // cmd
                0x07, 0x08, 0x09, 0x0A, // seq
                b'h', b'i',
            ]
        );
    }

    #[test]
    fn encode_decode_round_trip() {
        let mut codec = ImFrameCodec::new();
        let original = test_nachricht(42, b"payload");

        let mut buf = BytesMut::new();
        codec.encode(&original, &mut buf).unwrap();

        let decoded = codec
            .decode(&mut buf)
            .unwrap()
            .expect("Muss eine Nachricht enthalten");
        assert_eq!(decoded, original);
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_ohne_body() {
        let mut codec = ImFrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(&test_nachricht(1, b""), &mut buf).unwrap();
        assert_eq!(buf.len(), PACK_LEN_SIZE + MIN_PACK_SIZE);

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert!(decoded.body.is_empty());
        assert_eq!(decoded.header.seq, 1);
    }

    #[test]
    fn decode_maximaler_body() {
        let mut codec = ImFrameCodec::new();
        let body = vec![0xABu8; MAX_BODY_SIZE];
        let original = Message::neu(Header::default(), body);

        let mut buf = BytesMut::new();
        codec.encode(&original, &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.body.len(), MAX_BODY_SIZE);
        assert_eq!(decoded, original);
    }

    #[test]
    fn decode_unvollstaendiger_frame() {
        let mut codec = ImFrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(&test_nachricht(1, b"abcdef"), &mut buf).unwrap();

        let half = buf.len() / 2;
        let mut partial = buf.split_to(half);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        // Rest nachliefern
        partial.unsplit(buf);
        assert!(codec.decode(&mut partial).unwrap().is_some());
    }

    #[test]
    fn decode_zu_wenig_bytes_fuer_laengenfeld() {
        let mut codec = ImFrameCodec::new();
        let mut buf = BytesMut::from(&[0x00, 0x00][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn decode_ablehnung_zu_grosser_frame() {
        let mut codec = ImFrameCodec::new();
        let mut buf = BytesMut::new();
        // Nur das Laengenfeld, kein Body: Ablehnung ohne auf Daten zu warten
        buf.put_u32(MAX_PACK_SIZE as u32 + 1);

        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::RawPackLength { laenge } if laenge == MAX_PACK_SIZE + 1
        ));
    }

    #[test]
    fn decode_ablehnung_zu_kleiner_frame() {
        let mut codec = ImFrameCodec::new();
        let mut buf = BytesMut::new();
        buf.put_u32(5);
        buf.put_slice(&[0u8; 5]);

        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, ProtocolError::RawPackLength { laenge: 5 }));
    }

    #[test]
    fn decode_ablehnung_falsche_header_laenge() {
        let mut codec = ImFrameCodec::new();
        let mut buf = BytesMut::new();
        buf.put_u32(MIN_PACK_SIZE as u32);
        buf.put_u16(11);
        buf.put_slice(&[0u8; RAW_HEADER_SIZE]);

        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, ProtocolError::RawHeaderLength { laenge: 11 }));
    }

    #[test]
    fn encode_ablehnung_zu_grosser_body() {
        let mut codec = ImFrameCodec::new();
        let original = Message::neu(Header::default(), vec![0u8; MAX_BODY_SIZE + 1]);

        let mut buf = BytesMut::new();
        let err = codec.encode(original, &mut buf).unwrap_err();
        assert!(matches!(err, ProtocolError::BodyZuGross { .. }));
        assert!(buf.is_empty());
    }

    #[test]
    fn mehrere_nachrichten_im_buffer() {
        let mut codec = ImFrameCodec::new();
        let mut buf = BytesMut::new();

        for i in 0..3u32 {
            codec.encode(&test_nachricht(i, b"x"), &mut buf).unwrap();
        }
        for i in 0..3u32 {
            let msg = codec.decode(&mut buf).unwrap().expect("Nachricht erwartet");
            assert_eq!(msg.header.seq, i);
        }
        assert!(buf.is_empty());
    }
}
