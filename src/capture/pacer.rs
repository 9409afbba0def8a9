//! Frame pacing between the capture backend and the producer stage
//!
//! The backend announces frames from its own thread; the producer pulls
//! them on the executor thread. [`FramePacer`] sits in between:
//!
//! - arrivals closer than the target interval to the last accepted frame are
//!   discarded on the spot (acquired and released right away),
//! - at most one accepted frame is pending; a newer accepted arrival
//!   collapses the older one,
//! - while the producer holds a frame, discarded arrivals are only counted
//!   and drained by [`FramePacer::release`], one acquire/release per arrival,
//! - [`FramePacer::acquire`] is the only blocking call and its wait is bounded.

use super::backend::{CaptureBackend, FrameBuffer};
use crate::error::{PipelineError, Result};
use log::warn;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Counters kept by a pacer over its lifetime
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PacerStats {
    /// Arrivals that became the pending frame
    pub accepted: u64,
    /// Arrivals (or collapsed pending frames) that were never delivered
    pub dropped: u64,
    /// Drops that happened while a frame was checked out
    pub deferred: u64,
    /// Frames handed to the producer
    pub delivered: u64,
}

#[derive(Default)]
struct PacerState {
    pending: u32,
    deferred: u32,
    locked: bool,
    last_accepted: Option<i64>,
    ready: Option<(u64, i64)>,
    interrupted: bool,
    stats: PacerStats,
}

pub struct FramePacer {
    backend: Arc<dyn CaptureBackend>,
    interval_ns: i64,
    state: Mutex<PacerState>,
    available: Condvar,
}

impl FramePacer {
    pub fn new(backend: Arc<dyn CaptureBackend>, framerate: u32) -> Self {
        Self {
            backend,
            interval_ns: 1_000_000_000 / i64::from(framerate.max(1)),
            state: Mutex::new(PacerState::default()),
            available: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PacerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Called by the backend for every new frame.
    pub fn on_frame_available(&self, frame_number: u64, timestamp: i64) {
        let mut state = self.lock();

        let too_early = state
            .last_accepted
            .is_some_and(|last| timestamp - last < self.interval_ns);

        if too_early {
            self.drop_arrival(&mut state);
            return;
        }

        if state.pending > 0 {
            // newer frame wins
            self.drop_arrival(&mut state);
            state.pending -= 1;
        }

        state.pending += 1;
        state.last_accepted = Some(timestamp);
        state.ready = Some((frame_number, timestamp));
        state.stats.accepted += 1;
        self.available.notify_one();
    }

    fn drop_arrival(&self, state: &mut PacerState) {
        state.stats.dropped += 1;
        if state.locked {
            state.deferred += 1;
            state.stats.deferred += 1;
        } else {
            self.discard();
        }
    }

    fn discard(&self) {
        match self.backend.acquire_frame_buffer() {
            Ok(_) => self.backend.release_frame_buffer(),
            Err(e) => warn!("Unable to discard frame on {}: {e:#}", self.backend.name()),
        }
    }

    /// Wait up to `timeout` for a pending frame and check it out.
    ///
    /// Fails with [`PipelineError::Timeout`] when nothing arrived in time or
    /// the pacer was interrupted.
    pub fn acquire(&self, timeout: Duration) -> Result<FrameLease<'_>> {
        let guard = self.lock();
        let (mut state, _) = self
            .available
            .wait_timeout_while(guard, timeout, |s| s.pending == 0 && !s.interrupted)
            .unwrap_or_else(PoisonError::into_inner);

        if state.pending == 0 || state.locked {
            return Err(PipelineError::Timeout {
                ms: timeout.as_millis() as u64,
            });
        }

        state.pending -= 1;
        let (frame_number, timestamp) = state.ready.take().unwrap_or_default();

        let buffer = self
            .backend
            .acquire_frame_buffer()
            .map_err(PipelineError::capture)?;

        state.locked = true;
        state.stats.delivered += 1;

        Ok(FrameLease {
            pacer: self,
            buffer,
            frame_number,
            timestamp,
        })
    }

    /// Give the checked-out frame back and drain arrivals deferred meanwhile.
    pub fn release(&self) {
        let mut state = self.lock();
        if !state.locked {
            return;
        }

        self.backend.release_frame_buffer();
        while state.deferred > 0 {
            self.discard();
            state.deferred -= 1;
        }
        state.locked = false;
    }

    /// Wake a blocked [`acquire`](Self::acquire) and make further calls return
    /// immediately.
    pub fn interrupt(&self) {
        let mut state = self.lock();
        state.interrupted = true;
        self.available.notify_all();
    }

    pub fn stats(&self) -> PacerStats {
        self.lock().stats
    }

    pub fn is_locked(&self) -> bool {
        self.lock().locked
    }
}

/// A checked-out frame. Dropping the lease releases it back to the pacer.
pub struct FrameLease<'a> {
    pacer: &'a FramePacer,
    buffer: FrameBuffer,
    frame_number: u64,
    timestamp: i64,
}

impl FrameLease<'_> {
    /// The producer's current buffer
    pub fn buffer(&self) -> &FrameBuffer {
        &self.buffer
    }

    /// Number of the accepted arrival this lease was granted for
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Timestamp (ns) of the accepted arrival
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

impl Drop for FrameLease<'_> {
    fn drop(&mut self) {
        self.pacer.release();
    }
}
