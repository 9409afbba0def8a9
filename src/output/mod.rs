//! Output transports shared by the consumer stages

pub mod framing;
mod shared;
mod target;
mod transport;

pub use shared::{BoxedWriter, SinkHandle, SinkRegistry, SinkStats};
pub use target::OutputTarget;
pub use transport::open;
