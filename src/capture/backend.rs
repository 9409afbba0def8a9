//! Interface to a platform screen-capture backend

use anyhow::Result;
use bytes::Bytes;
use std::sync::Arc;

/// Notification fired from the backend's thread for every new frame:
/// `(frame_number, timestamp_ns)`.
pub type FrameCallback = Arc<dyn Fn(u64, i64) + Send + Sync>;

/// Virtual display requested from the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRequest {
    pub padding_top: u32,
    pub padding_bottom: u32,
    pub width: u32,
    pub height: u32,
}

/// Frame buffer exposed between `acquire_frame_buffer` and
/// `release_frame_buffer`.
#[derive(Clone)]
pub struct FrameBuffer {
    /// RGBA pixels, `stride * height` pixels long
    pub data: Bytes,
    /// Row length in pixels
    pub stride: u32,
    pub width: u32,
    pub height: u32,
    pub frame_number: u64,
    /// Monotonic clock, nanoseconds
    pub timestamp: i64,
}

impl std::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("frame_number", &self.frame_number)
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

/// Platform screen capture.
///
/// Backends are shared behind an `Arc` and driven from two threads: the
/// stream's executor (through the frame pacer) and the backend's own
/// delivery thread, hence `&self` everywhere.
pub trait CaptureBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn init(&self) -> Result<()>;

    fn fini(&self);

    /// Native display resolution `(width, height)`
    fn display_info(&self) -> Result<(u32, u32)>;

    /// Start producing frames, announcing each one through `on_frame`
    fn create(&self, request: CaptureRequest, on_frame: FrameCallback) -> Result<()>;

    /// Stop producing frames; `on_frame` is not called afterwards
    fn destroy(&self);

    /// Check out the most recent frame
    fn acquire_frame_buffer(&self) -> Result<FrameBuffer>;

    fn release_frame_buffer(&self);
}
