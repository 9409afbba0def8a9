//! `stat`: throughput statistics

use std::time::Instant;

use log::info;

use crate::assets::{STAT_INTERVAL, TICKS_PER_FRAME};
use crate::error::{PipelineError, Result};
use crate::pipeline::stage::{Filter, StageContext, StageRole};
use crate::pipeline::types::{Packet, Timestamp};

/// Counts frames and bytes passing through and logs a progress line once
/// per second, plus a final one on finalize.
#[derive(Default)]
pub struct StatStage {
    framerate: u32,
    frames: u64,
    total_size: u64,
    interval_size: u64,
    media_time: Timestamp,
    last: Option<Instant>,
    max_bitrate: f64,
}

/// One progress line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatLine {
    pub frames: u64,
    pub total_mb: f64,
    pub media_time: Timestamp,
    /// Average over media time, kb/s; negative while media time is zero
    pub bitrate: f64,
    /// Over the last interval, kb/s
    pub instant_bitrate: f64,
    pub max_bitrate: f64,
}

impl std::fmt::Display for StatLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let micros = self.media_time.micros.unsigned_abs();
        let secs = micros / 1_000_000;
        write!(
            f,
            "f={:5} s={:6.2}MB t={:02}:{:02}.{:02} b={:7.1}kb/s {:6.1}({:6.1})kb/s",
            self.frames,
            self.total_mb,
            (secs / 60) % 60,
            secs % 60,
            (micros % 1_000_000) / 10_000,
            self.bitrate,
            self.instant_bitrate,
            self.max_bitrate
        )
    }
}

impl StatStage {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, packet: &mut Packet) {
        self.frames += 1;
        let size = packet.size() as u64;
        self.total_size += size;
        self.interval_size += size;

        let pts = *packet.pts.get_or_insert_with(|| {
            let ticks = self.frames as i64 * TICKS_PER_FRAME;
            Timestamp::from_micros(ticks * 1_000_000 / (i64::from(self.framerate.max(1)) * TICKS_PER_FRAME))
        });
        self.media_time = pts;
    }

    fn line(&mut self, now: Instant) -> Option<StatLine> {
        let Some(last) = self.last else {
            self.last = Some(now);
            return None;
        };

        let media_ms = self.media_time.micros as f64 / 1000.0;
        let bitrate = if media_ms > 0.0 {
            self.total_size as f64 * 8.0 / media_ms
        } else {
            -1.0
        };
        let elapsed_ms = now.duration_since(last).as_secs_f64() * 1000.0;
        let instant_bitrate = if elapsed_ms > 0.0 {
            self.interval_size as f64 * 8.0 / elapsed_ms
        } else {
            0.0
        };
        self.max_bitrate = self.max_bitrate.max(instant_bitrate);

        self.interval_size = 0;
        self.last = Some(now);

        Some(StatLine {
            frames: self.frames,
            total_mb: self.total_size as f64 / 1024.0 / 1024.0,
            media_time: self.media_time,
            bitrate,
            instant_bitrate,
            max_bitrate: self.max_bitrate,
        })
    }

    fn due(&self, now: Instant) -> bool {
        self.last
            .is_none_or(|last| now.duration_since(last) >= STAT_INTERVAL)
    }
}

impl Filter for StatStage {
    fn name(&self) -> &'static str {
        "stat"
    }

    fn init(&mut self, ctx: &StageContext<'_>, role: StageRole) -> Result<()> {
        role.require_transform(self.name())?;
        *self = Self {
            framerate: ctx.params.framerate,
            ..Self::default()
        };
        Ok(())
    }

    fn fini(&mut self) -> Result<()> {
        if let Some(line) = self.line(Instant::now()) {
            info!("{line}");
        }
        Ok(())
    }

    fn apply(&mut self, packet: &mut Packet) -> Result<()> {
        if packet.is_empty() {
            return Err(PipelineError::Retry);
        }

        self.record(packet);
        let now = Instant::now();
        if self.due(now) {
            if let Some(line) = self.line(now) {
                info!("{line}");
            }
        }
        Ok(())
    }
}
