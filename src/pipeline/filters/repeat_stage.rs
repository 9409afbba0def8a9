//! `repeat`: re-emit the last packet while upstream is idle

use std::time::{Duration, Instant};

use crate::assets::REPEAT_INTERVAL;
use crate::error::{PipelineError, Result};
use crate::pipeline::stage::{Filter, StageContext, StageRole};
use crate::pipeline::types::Packet;

/// Keeps a copy of the last packet it saw and hands it out again when
/// nothing new arrives for `max(2 / framerate, 80ms)`.
pub struct RepeatStage {
    cached: Option<Packet>,
    interval: Duration,
    last_emit: Instant,
}

impl RepeatStage {
    pub fn new() -> Self {
        Self {
            cached: None,
            interval: REPEAT_INTERVAL,
            last_emit: Instant::now(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for RepeatStage {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for RepeatStage {
    fn name(&self) -> &'static str {
        "repeat"
    }

    fn init(&mut self, ctx: &StageContext<'_>, _role: StageRole) -> Result<()> {
        let two_frames = Duration::from_secs(2) / ctx.params.framerate.max(1);
        self.interval = two_frames.max(REPEAT_INTERVAL);
        Ok(())
    }

    fn fini(&mut self) -> Result<()> {
        self.cached = None;
        Ok(())
    }

    fn apply(&mut self, packet: &mut Packet) -> Result<()> {
        let now = Instant::now();

        if !packet.is_empty() {
            self.cached = Some(packet.clone());
            self.last_emit = now;
            return Ok(());
        }

        match &self.cached {
            Some(cached) if now.duration_since(self.last_emit) >= self.interval => {
                *packet = cached.clone();
                self.last_emit = now;
                Ok(())
            }
            _ => Err(PipelineError::Retry),
        }
    }

    fn resumes_after_retry(&self) -> bool {
        true
    }
}
