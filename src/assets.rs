use std::time::Duration;

pub const DEFAULT_FRAME_RATE: u32 = 15;

/// Highest accepted frame rate; keeps the encoder time base
/// (`framerate * TICKS_PER_FRAME`) inside an i32.
pub const MAX_FRAME_RATE: u32 = 240;

/// Upper bound on the number of stages in one chain.
pub const MAX_STAGES: usize = 8;

/// How long the producer blocks on the frame pacer before yielding the tick.
pub const PACER_WAIT: Duration = Duration::from_millis(10);

/// Floor for the repeat stage re-emission interval.
pub const REPEAT_INTERVAL: Duration = Duration::from_millis(80);

pub const STAT_INTERVAL: Duration = Duration::from_secs(1);

// encoder
pub const GOP_SIZE: u32 = 100;
pub const TICKS_PER_FRAME: i64 = 1000;

/// Bytes per pixel of the frames handed out by capture backends (RGBA).
pub const RGBA_BPP: usize = 4;

/// Size of the length prefix written before each packetized record.
pub const LENGTH_PREFIX_SIZE: usize = 4;
