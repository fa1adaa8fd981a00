//! Network subsystem for UDP media transport

pub mod sender;
pub mod session;
pub mod udp;

pub use sender::MediaSender;
pub use session::{DatagramSender, DatagramSession, PacketHandler, SessionState, SessionStats};
pub use udp::create_socket;
