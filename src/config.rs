use crate::assets::{DEFAULT_FRAME_RATE, MAX_FRAME_RATE};
use crate::error::{PipelineError, Result};
use std::fmt;
use std::str::FromStr;

/// Codec selection for the encode stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodecId {
    #[default]
    H264,
    Aac,
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecId::H264 => write!(f, "h264"),
            CodecId::Aac => write!(f, "aac"),
        }
    }
}

/// Parameters shared by every stage of a chain.
///
/// Zero means "unset" for every numeric field except `framerate`:
/// a zero `width`/`height` asks the capture stage for the display resolution,
/// a zero `crf`/`bitrate` leaves the encoder default in place.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeParams {
    pub width: u32,
    pub height: u32,
    /// Rows cropped from the top of the display.
    pub top: u32,
    /// Rows cropped from the bottom of the display.
    pub bottom: u32,
    pub codec: CodecId,
    pub crf: u32,
    /// Target bitrate in kbps.
    pub bitrate: u32,
    pub framerate: u32,
    /// Prefix every written record with its 4-byte length.
    pub packetize: bool,
}

impl Default for TranscodeParams {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            top: 0,
            bottom: 0,
            codec: CodecId::H264,
            crf: 0,
            bitrate: 0,
            framerate: DEFAULT_FRAME_RATE,
            packetize: false,
        }
    }
}

impl TranscodeParams {
    pub fn validate(&self) -> Result<()> {
        if self.framerate == 0 || self.framerate > MAX_FRAME_RATE {
            return Err(PipelineError::configuration(format!(
                "framerate {} out of range (1 - {MAX_FRAME_RATE})",
                self.framerate
            )));
        }
        if (self.width == 0) != (self.height == 0) {
            return Err(PipelineError::configuration(
                "video size needs both width and height",
            ));
        }
        if self.crf > 53 {
            return Err(PipelineError::configuration(format!(
                "crf {} out of range (0 - 53)",
                self.crf
            )));
        }
        Ok(())
    }
}

/// `WxH` as accepted by `--video-size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoSize {
    pub width: u32,
    pub height: u32,
}

impl FromStr for VideoSize {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| PipelineError::configuration(format!("invalid video size '{s}'")))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|_| PipelineError::configuration(format!("invalid video size '{s}'")))
        };
        Ok(Self {
            width: parse(w)?,
            height: parse(h)?,
        })
    }
}

/// Chain used when the user does not pass `--filters`.
pub fn default_chain(scheme: &str, verbose: bool) -> String {
    format!(
        "cap:repeat:av:{}:{}",
        if verbose { "stat" } else { "" },
        scheme
    )
}

/// Returns a version as specified in Cargo.toml
pub fn app_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn app_name() -> &'static str {
    env!("CARGO_PKG_NAME")
}
