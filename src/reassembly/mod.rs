//! Receiver-side frame reassembly
//!
//! One [`ReassemblyEngine`] exists per stream kind. Engines rebuild complete
//! frame payloads from fragments that may arrive lost, duplicated or out of
//! order, and hand them to a [`ReadyQueue`] owned by the consumer.

pub mod clock;
pub mod demux;
pub mod engine;
pub mod queue;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use demux::MediaDemux;
pub use engine::{FrameAssembly, ReassemblyEngine, ReassemblyStats};
pub use queue::ReadyQueue;
