//! Test doubles: recording stages that log what the engine does to them,
//! scripted capture, converter and codec backends.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use anyhow::{Result as AnyResult, bail};
use bytes::{BufMut, Bytes, BytesMut};

use crate::assets::RGBA_BPP;
use crate::capture::{
    CaptureBackend, CaptureRequest, ConvertBackend, FrameBuffer, FrameCallback, PixelConvert,
    i420_size,
};
use crate::config::TranscodeParams;
use crate::encoder::{CodecBackend, EncoderConfig, RawVideoFrame, VideoEncode};
use crate::error::{PipelineError, Result};
use crate::output::OutputTarget;
use crate::pipeline::stage::{Backends, Filter, StageContext, StageRole};
use crate::pipeline::types::{MediaKind, Packet};
use crate::utils::sos::SignalOfStop;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Poll `cond` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}

/// A unique path under the temp dir
pub fn temp_path(tag: &str) -> PathBuf {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    std::env::temp_dir().join(format!(
        "castchain-{}-{}-{}.bin",
        tag,
        std::process::id(),
        SEQ.fetch_add(1, Ordering::Relaxed)
    ))
}

pub fn test_backends() -> Backends {
    Backends::new(
        Arc::new(ScriptedCapture::new(4, 2)),
        Arc::new(ScriptedCodec::default()),
        Arc::new(ScriptedConvert::default()),
    )
}

/// Run `f` with a video context over the test backends.
pub fn with_context<R>(
    params: &TranscodeParams,
    target: Option<&OutputTarget>,
    f: impl FnOnce(&StageContext<'_>) -> R,
) -> R {
    let backends = test_backends();
    let stop = SignalOfStop::new();
    f(&StageContext {
        kind: MediaKind::Video,
        params,
        target,
        backends: &backends,
        stop: &stop,
    })
}

/// Run `f` with a context using `codec` and the given stream kind.
pub fn with_backends<R>(
    codec: Arc<dyn CodecBackend>,
    params: &TranscodeParams,
    kind: MediaKind,
    f: impl FnOnce(&StageContext<'_>) -> R,
) -> R {
    let backends = Backends::new(
        Arc::new(ScriptedCapture::new(4, 2)),
        codec,
        Arc::new(ScriptedConvert::default()),
    );
    let stop = SignalOfStop::new();
    f(&StageContext {
        kind,
        params,
        target: None,
        backends: &backends,
        stop: &stop,
    })
}

// ---------------------------------------------------------------------------
// Recorder stages
// ---------------------------------------------------------------------------

/// What a scripted stage does on each call, in order
#[derive(Debug, Clone, Copy)]
pub enum Step {
    Emit(&'static [u8]),
    Retry,
    Fail,
}

#[derive(Default)]
struct RecorderLog {
    created: Vec<&'static str>,
    initialized: Vec<(&'static str, StageRole)>,
    applied: Vec<&'static str>,
    delivered: Vec<Vec<u8>>,
    finalized: Vec<&'static str>,
}

/// Factory for stages that log into one shared journal.
#[derive(Clone, Default)]
pub struct Recorder {
    log: Arc<Mutex<RecorderLog>>,
}

enum Behavior {
    Pass,
    Source,
    Sink,
    Scripted(VecDeque<Step>),
    Resuming(&'static [u8]),
}

struct RecordingStage {
    name: &'static str,
    log: Arc<Mutex<RecorderLog>>,
    behavior: Behavior,
    fail_init: bool,
    fail_fini: bool,
}

impl Recorder {
    fn make(&self, name: &'static str, behavior: Behavior) -> RecordingStage {
        lock(&self.log).created.push(name);
        RecordingStage {
            name,
            log: self.log.clone(),
            behavior,
            fail_init: false,
            fail_fini: false,
        }
    }

    /// Leaves packets untouched
    pub fn stage(&self, name: &'static str) -> Box<dyn Filter> {
        Box::new(self.make(name, Behavior::Pass))
    }

    /// Emits a small packet roughly every millisecond
    pub fn source(&self, name: &'static str) -> Box<dyn Filter> {
        Box::new(self.make(name, Behavior::Source))
    }

    /// Records and consumes every packet
    pub fn sink(&self, name: &'static str) -> Box<dyn Filter> {
        Box::new(self.make(name, Behavior::Sink))
    }

    /// Plays `steps`, then retries forever
    pub fn scripted(&self, name: &'static str, steps: impl IntoIterator<Item = Step>) -> Box<dyn Filter> {
        Box::new(self.make(name, Behavior::Scripted(steps.into_iter().collect())))
    }

    /// Resumes after upstream retries and fills the sentinel with `payload`
    pub fn resuming(&self, name: &'static str, payload: &'static [u8]) -> Box<dyn Filter> {
        Box::new(self.make(name, Behavior::Resuming(payload)))
    }

    pub fn failing_init(&self, name: &'static str) -> Box<dyn Filter> {
        let mut stage = self.make(name, Behavior::Pass);
        stage.fail_init = true;
        Box::new(stage)
    }

    pub fn failing_fini(&self, name: &'static str) -> Box<dyn Filter> {
        let mut stage = self.make(name, Behavior::Pass);
        stage.fail_fini = true;
        Box::new(stage)
    }

    pub fn created(&self) -> Vec<&'static str> {
        lock(&self.log).created.clone()
    }

    pub fn initialized(&self) -> Vec<(&'static str, StageRole)> {
        lock(&self.log).initialized.clone()
    }

    pub fn applied(&self) -> Vec<&'static str> {
        lock(&self.log).applied.clone()
    }

    pub fn delivered(&self) -> Vec<Vec<u8>> {
        lock(&self.log).delivered.clone()
    }

    pub fn finalized(&self) -> Vec<&'static str> {
        lock(&self.log).finalized.clone()
    }
}

impl Filter for RecordingStage {
    fn name(&self) -> &'static str {
        self.name
    }

    fn init(&mut self, _ctx: &StageContext<'_>, role: StageRole) -> Result<()> {
        if self.fail_init {
            return Err(PipelineError::Io(std::io::Error::other("init refused")));
        }
        lock(&self.log).initialized.push((self.name, role));
        Ok(())
    }

    fn fini(&mut self) -> Result<()> {
        lock(&self.log).finalized.push(self.name);
        if self.fail_fini {
            return Err(PipelineError::Io(std::io::Error::other("fini refused")));
        }
        Ok(())
    }

    fn apply(&mut self, packet: &mut Packet) -> Result<()> {
        lock(&self.log).applied.push(self.name);

        match &mut self.behavior {
            Behavior::Pass => Ok(()),
            Behavior::Source => {
                std::thread::sleep(Duration::from_millis(1));
                packet.set_data(Bytes::from_static(b"frame"));
                Ok(())
            }
            Behavior::Sink => {
                let data = packet.data().cloned().ok_or(PipelineError::Retry)?;
                lock(&self.log).delivered.push(data.to_vec());
                packet.clear();
                Ok(())
            }
            Behavior::Scripted(steps) => match steps.pop_front() {
                Some(Step::Emit(payload)) => {
                    packet.set_data(Bytes::from_static(payload));
                    Ok(())
                }
                Some(Step::Fail) => Err(PipelineError::Io(std::io::Error::other("scripted failure"))),
                Some(Step::Retry) | None => Err(PipelineError::Retry),
            },
            Behavior::Resuming(payload) => {
                if packet.is_empty() {
                    packet.set_data(Bytes::from_static(*payload));
                }
                Ok(())
            }
        }
    }

    fn resumes_after_retry(&self) -> bool {
        matches!(self.behavior, Behavior::Resuming(_))
    }
}

// ---------------------------------------------------------------------------
// Scripted capture backend
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CaptureLog {
    callback: Option<FrameCallback>,
    requested: Option<CaptureRequest>,
    acquired: usize,
    released: usize,
    destroyed: bool,
    finalized: bool,
    last_frame: u64,
}

/// Capture backend whose frames are announced by the test with [`emit`].
///
/// [`emit`]: ScriptedCapture::emit
pub struct ScriptedCapture {
    width: u32,
    height: u32,
    fail_create: bool,
    log: Mutex<CaptureLog>,
}

impl ScriptedCapture {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            fail_create: false,
            log: Mutex::new(CaptureLog::default()),
        }
    }

    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    /// Announce frame `frame_number` taken at `timestamp` ns.
    pub fn emit(&self, frame_number: u64, timestamp: i64) {
        let callback = {
            let mut log = lock(&self.log);
            log.last_frame = frame_number;
            log.callback.clone()
        };
        if let Some(callback) = callback {
            callback(frame_number, timestamp);
        }
    }

    pub fn requested(&self) -> Option<CaptureRequest> {
        lock(&self.log).requested
    }

    pub fn acquired(&self) -> usize {
        lock(&self.log).acquired
    }

    pub fn released(&self) -> usize {
        lock(&self.log).released
    }

    pub fn destroyed(&self) -> bool {
        lock(&self.log).destroyed
    }

    pub fn finalized(&self) -> bool {
        lock(&self.log).finalized
    }
}

impl CaptureBackend for ScriptedCapture {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn init(&self) -> AnyResult<()> {
        Ok(())
    }

    fn fini(&self) {
        lock(&self.log).finalized = true;
    }

    fn display_info(&self) -> AnyResult<(u32, u32)> {
        Ok((self.width, self.height))
    }

    fn create(&self, request: CaptureRequest, on_frame: FrameCallback) -> AnyResult<()> {
        let mut log = lock(&self.log);
        log.requested = Some(request);
        if self.fail_create {
            bail!("scripted create failure");
        }
        log.callback = Some(on_frame);
        Ok(())
    }

    fn destroy(&self) {
        let mut log = lock(&self.log);
        log.callback = None;
        log.destroyed = true;
    }

    fn acquire_frame_buffer(&self) -> AnyResult<FrameBuffer> {
        let mut log = lock(&self.log);
        log.acquired += 1;
        let pixels = (self.width * self.height) as usize;
        Ok(FrameBuffer {
            data: Bytes::from(vec![0x80; pixels * RGBA_BPP]),
            stride: self.width,
            width: self.width,
            height: self.height,
            frame_number: log.last_frame,
            timestamp: 0,
        })
    }

    fn release_frame_buffer(&self) {
        lock(&self.log).released += 1;
    }
}

// ---------------------------------------------------------------------------
// Scripted codec backend
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CodecLog {
    opened: usize,
    last_config: Option<EncoderConfig>,
    pts_seen: Vec<i64>,
    encoded_sizes: Vec<usize>,
}

/// Deterministic codec: every frame becomes `records_per_frame` records of
/// varying size, after swallowing the first `delay` frames.
pub struct ScriptedCodec {
    delay: usize,
    records_per_frame: usize,
    log: Arc<Mutex<CodecLog>>,
}

impl Default for ScriptedCodec {
    fn default() -> Self {
        Self {
            delay: 0,
            records_per_frame: 1,
            log: Arc::new(Mutex::new(CodecLog::default())),
        }
    }
}

impl ScriptedCodec {
    pub const HEADER: &'static [u8] = b"\x00\x00\x00\x01scripted-header";

    pub fn with_delay(mut self, frames: usize) -> Self {
        self.delay = frames;
        self
    }

    pub fn with_records_per_frame(mut self, records: usize) -> Self {
        self.records_per_frame = records;
        self
    }

    pub fn opened(&self) -> usize {
        lock(&self.log).opened
    }

    pub fn last_config(&self) -> Option<EncoderConfig> {
        lock(&self.log).last_config
    }

    pub fn pts_seen(&self) -> Vec<i64> {
        lock(&self.log).pts_seen.clone()
    }

    /// Size of every record produced so far, in output order
    pub fn encoded_sizes(&self) -> Vec<usize> {
        lock(&self.log).encoded_sizes.clone()
    }
}

impl CodecBackend for ScriptedCodec {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn open(&self, config: &EncoderConfig) -> AnyResult<Box<dyn VideoEncode>> {
        let mut log = lock(&self.log);
        log.opened += 1;
        log.last_config = Some(*config);
        Ok(Box::new(ScriptedEncoder {
            delay: self.delay,
            records_per_frame: self.records_per_frame,
            frames: 0,
            log: self.log.clone(),
        }))
    }
}

struct ScriptedEncoder {
    delay: usize,
    records_per_frame: usize,
    frames: usize,
    log: Arc<Mutex<CodecLog>>,
}

impl VideoEncode for ScriptedEncoder {
    fn codec_name(&self) -> &str {
        "scripted"
    }

    fn header(&self) -> Option<Bytes> {
        Some(Bytes::from_static(ScriptedCodec::HEADER))
    }

    fn encode(&mut self, frame: &RawVideoFrame<'_>, pts: i64) -> AnyResult<Vec<Bytes>> {
        if frame.data.len() != i420_size(frame.width, frame.height) {
            bail!(
                "{} bytes is not a {}x{} I420 picture",
                frame.data.len(),
                frame.width,
                frame.height
            );
        }

        let mut log = lock(&self.log);
        log.pts_seen.push(pts);
        self.frames += 1;
        if self.frames <= self.delay {
            return Ok(Vec::new());
        }

        let records: Vec<Bytes> = (0..self.records_per_frame)
            .map(|i| Bytes::from(vec![self.frames as u8; 16 + self.frames % 7 + i]))
            .collect();
        log.encoded_sizes.extend(records.iter().map(Bytes::len));
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// Scripted pixel converter
// ---------------------------------------------------------------------------

/// Converter filling luma with 16 and chroma with 128; logs every session
/// it opens.
#[derive(Default)]
pub struct ScriptedConvert {
    sessions: Arc<Mutex<Vec<(u32, u32)>>>,
}

impl ScriptedConvert {
    /// Size of every session opened so far
    pub fn sessions(&self) -> Vec<(u32, u32)> {
        lock(&self.sessions).clone()
    }
}

impl ConvertBackend for ScriptedConvert {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn open(&self, width: u32, height: u32) -> AnyResult<Box<dyn PixelConvert>> {
        lock(&self.sessions).push((width, height));
        Ok(Box::new(ScriptedSession { width, height }))
    }
}

struct ScriptedSession {
    width: u32,
    height: u32,
}

impl PixelConvert for ScriptedSession {
    fn convert(&mut self, frame: &FrameBuffer, dst: &mut BytesMut) -> AnyResult<()> {
        if (frame.width, frame.height) != (self.width, self.height) {
            bail!(
                "frame is {}x{}, session converts {}x{}",
                frame.width,
                frame.height,
                self.width,
                self.height
            );
        }
        let luma = (self.width * self.height) as usize;
        dst.put_bytes(16, luma);
        dst.put_bytes(128, i420_size(self.width, self.height) - luma);
        Ok(())
    }
}
