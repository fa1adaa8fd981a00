//! Media packet protocol
//!
//! Every datagram carries a fixed 12-byte header followed by a slice of one
//! frame's payload:
//!
//! ```text
//! 0        4       6       8      9          12
//! ┌────────┬───────┬───────┬──────┬──────────┬──────────────────┐
//! │FrameId │ Index │ Count │ Kind │ Reserved │ payload slice ...│
//! │ i32 LE │u16 LE │u16 LE │  u8  │  3 x 0   │ <= MTU - 12      │
//! └────────┴───────┴───────┴──────┴──────────┴──────────────────┘
//! ```

pub mod fragment;
pub mod header;

pub use fragment::fragment;
pub use header::{parse_header, PacketHeader, StreamKind, HEADER_SIZE};
