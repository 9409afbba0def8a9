//! Error taxonomy shared by every stage and by the chain engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// The stage has nothing to hand downstream this tick.
    #[error("stage not ready, retry on next tick")]
    Retry,

    /// The frame pacer wait elapsed without a frame.
    #[error("timed out after {ms}ms waiting for a frame")]
    Timeout { ms: u64 },

    #[error("configuration invalid: {reason}")]
    Configuration { reason: String },

    #[error("stage '{stage}' failed to initialize: {source}")]
    StageInit {
        stage: String,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {reason}")]
    Codec { reason: String },

    #[error("capture error: {reason}")]
    Capture { reason: String },
}

impl PipelineError {
    pub fn configuration(reason: impl Into<String>) -> Self {
        PipelineError::Configuration {
            reason: reason.into(),
        }
    }

    /// Wrap a collaborator failure coming from the codec backend.
    pub fn codec(err: anyhow::Error) -> Self {
        PipelineError::Codec {
            reason: format!("{err:#}"),
        }
    }

    /// Wrap a collaborator failure coming from the capture backend.
    pub fn capture(err: anyhow::Error) -> Self {
        PipelineError::Capture {
            reason: format!("{err:#}"),
        }
    }

    /// `Retry` and `Timeout` are tick-local and never end a run.
    pub fn is_retry(&self) -> bool {
        matches!(self, PipelineError::Retry | PipelineError::Timeout { .. })
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, PipelineError::Configuration { .. })
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(PipelineError::Retry.is_retry());
        assert!(PipelineError::Timeout { ms: 10 }.is_retry());
        assert!(!PipelineError::configuration("bad").is_retry());
        assert!(!PipelineError::Io(std::io::Error::other("boom")).is_retry());
    }

    #[test]
    fn test_stage_init_keeps_cause() {
        let err = PipelineError::StageInit {
            stage: "tcp".into(),
            source: Box::new(PipelineError::Io(std::io::Error::other("refused"))),
        };
        let text = err.to_string();
        assert!(text.contains("tcp"));
        assert!(text.contains("refused"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
