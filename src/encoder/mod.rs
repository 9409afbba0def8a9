//! Video encoding
//!
//! The encode stage talks to a [`CodecBackend`]; the production backend is
//! FFmpeg through `ac-ffmpeg`.

mod ffmpeg;
mod frame_pool;

pub use ffmpeg::FfmpegCodec;

use crate::config::{CodecId, TranscodeParams};
use anyhow::Result;
use bytes::Bytes;

/// Settings an encoder is opened with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderConfig {
    pub codec: CodecId,
    pub width: u32,
    pub height: u32,
    /// kbps, zero keeps the codec default
    pub bitrate: u32,
    /// Constant rate factor, zero keeps the codec default
    pub crf: u32,
    pub framerate: u32,
}

impl EncoderConfig {
    pub fn new(params: &TranscodeParams, width: u32, height: u32) -> Self {
        Self {
            codec: params.codec,
            width,
            height,
            bitrate: params.bitrate,
            crf: params.crf,
            framerate: params.framerate,
        }
    }
}

/// Planar I420 picture handed to an encoder
#[derive(Debug, Clone, Copy)]
pub struct RawVideoFrame<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
}

/// An open encoder session.
pub trait VideoEncode: Send {
    fn codec_name(&self) -> &str;

    /// One-time stream header (parameter sets), if the codec exposes one
    fn header(&self) -> Option<Bytes>;

    /// Encode one picture at `pts` (in ticks of 1 / (framerate * 1000) s).
    ///
    /// Returns every record the codec produced for it, possibly none.
    fn encode(&mut self, frame: &RawVideoFrame<'_>, pts: i64) -> Result<Vec<Bytes>>;
}

/// Factory for encoder sessions.
pub trait CodecBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn open(&self, config: &EncoderConfig) -> Result<Box<dyn VideoEncode>>;
}
