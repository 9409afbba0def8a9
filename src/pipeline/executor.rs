//! Drives one chain on its own thread

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{error, info, warn};

use super::chain::{Chain, TickOutcome};
use super::health::PipelineHealth;
use super::state::PipelineState;
use super::types::Packet;
use crate::error::{PipelineError, Result};
use crate::utils::sos::SignalOfStop;

/// How a completed run went
#[derive(Debug, Clone)]
pub struct RunReport {
    pub state: PipelineState,
    pub ticks: u64,
    pub retries: u64,
    pub frames: u64,
    pub bytes: u64,
    pub elapsed: Duration,
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} after {:.1}s: {} frames, {} bytes, {} ticks ({} idle)",
            self.state,
            self.elapsed.as_secs_f64(),
            self.frames,
            self.bytes,
            self.ticks,
            self.retries
        )
    }
}

/// Executor for a single stream.
///
/// Streams share no executor state: a failure in one never stops another.
pub struct Executor {
    name: String,
    health: Arc<PipelineHealth>,
    state: Arc<Mutex<PipelineState>>,
}

impl Executor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            health: Arc::new(PipelineHealth::new()),
            state: Arc::new(Mutex::new(PipelineState::Idle)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn health(&self) -> Arc<PipelineHealth> {
        self.health.clone()
    }

    pub fn state(&self) -> PipelineState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, target: PipelineState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.can_transition_to(&target) {
            warn!(
                "Stream {}: unexpected transition {} -> {}",
                self.name, *state, target
            );
        }
        *state = target;
    }

    /// Tick `chain` until `stop` is cancelled or a stage fails, then finalize
    /// it.
    ///
    /// Ends `Completed` on cancellation and returns the report; ends `Failed`
    /// on a non-retry error and returns that error.
    pub fn run(&self, mut chain: Chain, stop: &SignalOfStop) -> Result<RunReport> {
        let started_at = Instant::now();
        info!("Stream {} running {}", self.name, chain.spec());

        let failure = if stop.cancelled() {
            self.transition(PipelineState::Stopping);
            None
        } else {
            self.transition(PipelineState::Running { started_at });
            let failure = self.tick_loop(&mut chain, stop);
            self.transition(PipelineState::Stopping);
            failure
        };

        if let Err(e) = chain.finalize() {
            warn!("Stream {}: teardown incomplete: {}", self.name, e);
        }

        let terminal = if failure.is_some() {
            PipelineState::Failed
        } else {
            PipelineState::Completed
        };
        self.transition(terminal);

        let summary = self.health.summary();
        let report = RunReport {
            state: terminal,
            ticks: summary.ticks,
            retries: summary.retries,
            frames: summary.frames_processed,
            bytes: summary.bytes_processed,
            elapsed: started_at.elapsed(),
        };

        match failure {
            Some(e) => {
                error!("Stream {} failed: {} ({})", self.name, e, report);
                Err(e)
            }
            None => {
                info!("Stream {} {}", self.name, report);
                Ok(report)
            }
        }
    }

    fn tick_loop(&self, chain: &mut Chain, stop: &SignalOfStop) -> Option<PipelineError> {
        while !stop.cancelled() {
            let mut packet = Packet::empty(chain.kind());
            self.health.record_tick();

            match chain.tick(&mut packet) {
                Ok(TickOutcome::Delivered { bytes }) => self.health.record_frame(bytes),
                Ok(TickOutcome::Idle) => {
                    self.health.record_retry();
                    std::thread::yield_now();
                }
                Err(e) => {
                    self.health.record_stage_failure();
                    return Some(e);
                }
            }
        }
        None
    }

    /// Run on a dedicated, named thread.
    pub fn spawn(self, chain: Chain, stop: SignalOfStop) -> Result<StreamHandle> {
        let name = self.name.clone();
        let health = self.health.clone();
        let state = self.state.clone();

        let thread = std::thread::Builder::new()
            .name(format!("stream-{name}"))
            .spawn(move || self.run(chain, &stop))?;

        Ok(StreamHandle {
            name,
            health,
            state,
            thread,
        })
    }
}

/// Handle on a stream running on its own thread
pub struct StreamHandle {
    name: String,
    health: Arc<PipelineHealth>,
    state: Arc<Mutex<PipelineState>>,
    thread: JoinHandle<Result<RunReport>>,
}

impl StreamHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn health(&self) -> Arc<PipelineHealth> {
        self.health.clone()
    }

    pub fn state(&self) -> PipelineState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the run to end.
    pub fn join(self) -> Result<RunReport> {
        self.thread.join().unwrap_or_else(|_| {
            Err(PipelineError::Io(std::io::Error::other(format!(
                "stream {} panicked",
                self.name
            ))))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::chain::StageSlot;
    use crate::pipeline::stage::{Filter, StageRole};
    use crate::pipeline::types::MediaKind;
    use crate::testing::{Recorder, Step, wait_until};

    fn chain(stages: Vec<Box<dyn Filter>>) -> Chain {
        let len = stages.len();
        let slots = stages
            .into_iter()
            .enumerate()
            .map(|(i, filter)| StageSlot {
                filter,
                role: StageRole::from_position(i, len),
            })
            .collect();
        Chain::new(slots, "test".into(), None, MediaKind::Video)
    }

    #[test]
    fn test_completes_on_cancel() {
        let recorder = Recorder::default();
        let stop = SignalOfStop::new();
        let executor = Executor::new("ok");
        let handle = executor
            .spawn(chain(vec![recorder.source("src"), recorder.sink("out")]), stop.clone())
            .unwrap();

        let health = handle.health();
        assert!(wait_until(Duration::from_secs(2), || health.frames_processed() >= 5));
        stop.cancel();

        let report = handle.join().unwrap();
        assert_eq!(report.state, PipelineState::Completed);
        assert!(report.frames >= 5);
        assert_eq!(recorder.finalized(), vec!["src", "out"]);
    }

    #[test]
    fn test_fails_on_stage_error() {
        let recorder = Recorder::default();
        let stop = SignalOfStop::new();
        let executor = Executor::new("bad");
        let health = executor.health();

        let err = executor
            .run(
                chain(vec![
                    recorder.scripted("src", [Step::Emit(b"1"), Step::Retry, Step::Emit(b"2"), Step::Fail]),
                    recorder.sink("out"),
                ]),
                &stop,
            )
            .unwrap_err();

        assert!(matches!(err, PipelineError::Io(_)));
        assert_eq!(health.frames_processed(), 2);
        assert_eq!(health.retries(), 1);
        assert_eq!(health.stage_failures(), 1);
        assert_eq!(recorder.finalized(), vec!["src", "out"]);
        assert_eq!(executor.state(), PipelineState::Failed);
    }

    #[test]
    fn test_cancelled_before_start() {
        let recorder = Recorder::default();
        let stop = SignalOfStop::new();
        stop.cancel();

        let executor = Executor::new("early");
        let report = executor
            .run(chain(vec![recorder.source("src"), recorder.sink("out")]), &stop)
            .unwrap();
        assert_eq!(report.state, PipelineState::Completed);
        assert_eq!(report.ticks, 0);
        assert!(recorder.applied().is_empty());
        assert_eq!(recorder.finalized(), vec!["src", "out"]);
    }

    #[test]
    fn test_failure_stays_in_its_stream() {
        let recorder = Recorder::default();
        let stop = SignalOfStop::new();

        let failing = Executor::new("failing")
            .spawn(
                chain(vec![recorder.scripted("f-src", [Step::Fail]), recorder.sink("f-out")]),
                stop.clone(),
            )
            .unwrap();
        let healthy = Executor::new("healthy")
            .spawn(chain(vec![recorder.source("h-src"), recorder.sink("h-out")]), stop.clone())
            .unwrap();

        assert!(failing.join().is_err());
        let health = healthy.health();
        let before = health.frames_processed();
        assert!(wait_until(Duration::from_secs(2), || health.frames_processed() > before + 3));
        assert!(healthy.state().is_running());

        stop.cancel();
        assert_eq!(healthy.join().unwrap().state, PipelineState::Completed);
    }
}
