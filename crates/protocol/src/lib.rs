//! imgate-protocol – Binaeres Wire-Protokoll
//!
//! Dieses Crate definiert das Frame-Format zwischen Client und Gateway,
//! einen `tokio-util` Codec dafuer und den `Codec`-Trait, ueber den eine
//! Session genau eine Verbindung liest und beschreibt.
//!
//! ## Frame-Format (alle Integer big-endian)
//!
//! ```text
//! +------------+-----------+-----+--------+-----------+-----+-----+------...
//! | Laenge u32 | HdrLen u16| ver | status | serviceId | cmd | seq | body
//! |  4 Bytes   |  2 Bytes  |  1  |   1    |    2      |  2  |  4  | <= 4096
//! +------------+-----------+-----+--------+-----------+-----+-----+------...
//! ```

pub mod codec;
pub mod error;
pub mod message;
pub mod wire;

pub use codec::{Codec, ImProtocol, StreamCodec};
pub use error::{ProtocolError, ProtocolResult};
pub use message::{Header, Message};
pub use wire::ImFrameCodec;
