//! Stage trait and the context stages are initialized with

use std::sync::Arc;

use super::types::{MediaKind, Packet};
use crate::capture::{CaptureBackend, ConvertBackend, GenericScreenCapture, SwsConvert};
use crate::config::TranscodeParams;
use crate::encoder::{CodecBackend, FfmpegCodec};
use crate::error::{PipelineError, Result};
use crate::output::OutputTarget;
use crate::utils::sos::SignalOfStop;

/// Position of a stage in its chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageRole {
    /// First stage, creates packets
    Producer,
    /// Neither first nor last
    Transform,
    /// Last stage, delivers packets
    Consumer,
    /// Only stage of a one-stage chain, both producer and consumer
    Sole,
}

impl StageRole {
    pub fn from_position(index: usize, len: usize) -> Self {
        match (index == 0, index + 1 == len) {
            (true, true) => StageRole::Sole,
            (true, false) => StageRole::Producer,
            (false, true) => StageRole::Consumer,
            (false, false) => StageRole::Transform,
        }
    }

    pub fn is_producer(self) -> bool {
        matches!(self, StageRole::Producer | StageRole::Sole)
    }

    pub fn is_consumer(self) -> bool {
        matches!(self, StageRole::Consumer | StageRole::Sole)
    }

    pub fn require_producer(self, stage: &str) -> Result<()> {
        self.require(stage, self.is_producer(), "the first stage")
    }

    pub fn require_consumer(self, stage: &str) -> Result<()> {
        self.require(stage, self.is_consumer(), "the last stage")
    }

    pub fn require_transform(self, stage: &str) -> Result<()> {
        self.require(stage, self == StageRole::Transform, "a middle stage")
    }

    fn require(self, stage: &str, ok: bool, expected: &str) -> Result<()> {
        if ok {
            Ok(())
        } else {
            Err(PipelineError::configuration(format!(
                "stage '{stage}' must be {expected}, found as {self:?}"
            )))
        }
    }
}

/// External collaborators the stages delegate to
#[derive(Clone)]
pub struct Backends {
    pub capture: Arc<dyn CaptureBackend>,
    pub codec: Arc<dyn CodecBackend>,
    pub convert: Arc<dyn ConvertBackend>,
}

impl Backends {
    pub fn new(
        capture: Arc<dyn CaptureBackend>,
        codec: Arc<dyn CodecBackend>,
        convert: Arc<dyn ConvertBackend>,
    ) -> Self {
        Self {
            capture,
            codec,
            convert,
        }
    }

    /// Generic screen capture, FFmpeg scaling and encoding
    pub fn platform() -> Self {
        Self::new(
            Arc::new(GenericScreenCapture::new()),
            Arc::new(FfmpegCodec),
            Arc::new(SwsConvert),
        )
    }
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends")
            .field("capture", &self.capture.name())
            .field("codec", &self.codec.name())
            .field("convert", &self.convert.name())
            .finish()
    }
}

/// Everything a stage may look at while initializing
pub struct StageContext<'a> {
    pub kind: MediaKind,
    pub params: &'a TranscodeParams,
    pub target: Option<&'a OutputTarget>,
    pub backends: &'a Backends,
    pub stop: &'a SignalOfStop,
}

impl StageContext<'_> {
    /// The output target, required by consumer stages
    pub fn require_target(&self, stage: &str) -> Result<&OutputTarget> {
        self.target.ok_or_else(|| {
            PipelineError::configuration(format!("stage '{stage}' needs an output target"))
        })
    }
}

/// A processing stage.
///
/// One instance per chain position, owned by its chain and driven from the
/// stream's executor thread only.
pub trait Filter: Send {
    /// Name the stage is registered under
    fn name(&self) -> &'static str;

    /// Prepare the stage for its position; refuse a position it cannot serve.
    fn init(&mut self, ctx: &StageContext<'_>, role: StageRole) -> Result<()>;

    /// Release whatever `init` acquired. Called once, even after errors.
    fn fini(&mut self) -> Result<()> {
        Ok(())
    }

    /// Process the packet in place.
    ///
    /// [`PipelineError::Retry`] means "nothing to hand downstream this tick".
    fn apply(&mut self, packet: &mut Packet) -> Result<()>;

    /// Whether the tick continues at this stage after an upstream retry,
    /// with the sentinel packet. Stages that can produce on their own (the
    /// repeat stage) return `true`.
    fn resumes_after_retry(&self) -> bool {
        false
    }
}
