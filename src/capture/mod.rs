//! Screen capture module
//!
//! A [`CaptureBackend`] announces frames from its own thread; the
//! [`FramePacer`] turns those announcements into a bounded, rate-limited pull
//! for the producer stage, which converts the pixels through a
//! [`ConvertBackend`].

mod backend;
mod convert;
mod generic;
mod pacer;

pub use backend::{CaptureBackend, CaptureRequest, FrameBuffer, FrameCallback};
pub use convert::{ConvertBackend, PixelConvert, SwsConvert, i420_size};
pub use generic::{GenericDisplay, GenericScreenCapture};
pub use pacer::{FrameLease, FramePacer, PacerStats};
