//! `cap`: screen capture producer

use std::sync::Arc;

use bytes::BytesMut;
use log::{debug, info};

use crate::assets::PACER_WAIT;
use crate::capture::{
    CaptureBackend, CaptureRequest, ConvertBackend, FrameCallback, FramePacer, PixelConvert,
};
use crate::error::{PipelineError, Result};
use crate::pipeline::stage::{Filter, StageContext, StageRole};
use crate::pipeline::types::{MediaKind, Packet, Timestamp};

/// Pulls paced frames from the capture backend and emits them as I420
/// video packets.
#[derive(Default)]
pub struct CaptureStage {
    backend: Option<Arc<dyn CaptureBackend>>,
    pacer: Option<Arc<FramePacer>>,
    convert: Option<Arc<dyn ConvertBackend>>,
    /// Converter session and the frame size it was opened for
    session: Option<((u32, u32), Box<dyn PixelConvert>)>,
    buffer: BytesMut,
}

impl CaptureStage {
    pub fn new() -> Self {
        Self::default()
    }

    fn open(
        backend: &Arc<dyn CaptureBackend>,
        ctx: &StageContext<'_>,
    ) -> anyhow::Result<Arc<FramePacer>> {
        let params = ctx.params;
        let (width, height) = if params.width == 0 && params.height == 0 {
            backend.display_info()?
        } else {
            (params.width, params.height)
        };

        let pacer = Arc::new(FramePacer::new(backend.clone(), params.framerate));

        let waiter = Arc::downgrade(&pacer);
        ctx.stop.on_cancel(move || {
            if let Some(pacer) = waiter.upgrade() {
                pacer.interrupt();
            }
        });

        let target = Arc::downgrade(&pacer);
        let on_frame: FrameCallback = Arc::new(move |frame_number, timestamp| {
            if let Some(pacer) = target.upgrade() {
                pacer.on_frame_available(frame_number, timestamp);
            }
        });

        backend.create(
            CaptureRequest {
                padding_top: params.top,
                padding_bottom: params.bottom,
                width,
                height,
            },
            on_frame,
        )?;

        info!(
            "Capturing {}x{} at {} fps via {} backend",
            width,
            height,
            params.framerate,
            backend.name()
        );
        Ok(pacer)
    }
}

impl Filter for CaptureStage {
    fn name(&self) -> &'static str {
        "cap"
    }

    fn init(&mut self, ctx: &StageContext<'_>, role: StageRole) -> Result<()> {
        role.require_producer(self.name())?;
        if ctx.kind != MediaKind::Video {
            return Err(PipelineError::configuration(format!(
                "stage 'cap' produces video, chain carries {}",
                ctx.kind
            )));
        }

        let backend = ctx.backends.capture.clone();
        backend.init().map_err(PipelineError::capture)?;

        match Self::open(&backend, ctx) {
            Ok(pacer) => {
                self.pacer = Some(pacer);
                self.backend = Some(backend);
                self.convert = Some(ctx.backends.convert.clone());
                Ok(())
            }
            Err(e) => {
                backend.fini();
                Err(PipelineError::capture(e.context("unable to create display")))
            }
        }
    }

    fn fini(&mut self) -> Result<()> {
        self.session = None;
        self.convert = None;
        if let Some(backend) = self.backend.take() {
            backend.destroy();
            if let Some(pacer) = self.pacer.take() {
                let stats = pacer.stats();
                info!(
                    "Capture done: {} delivered, {} accepted, {} dropped ({} while busy)",
                    stats.delivered, stats.accepted, stats.dropped, stats.deferred
                );
            }
            backend.fini();
        }
        Ok(())
    }

    fn apply(&mut self, packet: &mut Packet) -> Result<()> {
        let (Some(pacer), Some(convert)) = (self.pacer.as_ref(), self.convert.as_ref()) else {
            return Err(PipelineError::configuration("stage 'cap' used before init"));
        };

        let lease = pacer.acquire(PACER_WAIT)?;
        let frame = lease.buffer();
        let (width, height) = (frame.width, frame.height);

        if self.session.as_ref().map(|(size, _)| *size) != Some((width, height)) {
            let session = convert.open(width, height).map_err(|e| {
                PipelineError::capture(e.context("unable to open pixel converter"))
            })?;
            debug!("Converting {}x{} frames via {}", width, height, convert.name());
            self.session = Some(((width, height), session));
        }
        let Some((_, session)) = self.session.as_mut() else {
            return Err(PipelineError::configuration("pixel converter unavailable"));
        };

        self.buffer.clear();
        session
            .convert(frame, &mut self.buffer)
            .map_err(|e| PipelineError::capture(e.context("unable to convert frame to yuv")))?;

        let pts = Timestamp::from_nanos(lease.timestamp());
        drop(lease);

        let kind = packet.kind;
        *packet = Packet::video(self.buffer.split().freeze(), width, height, pts);
        packet.kind = kind;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TranscodeParams;
    use crate::capture::i420_size;
    use crate::pipeline::stage::Backends;
    use crate::testing::{ScriptedCapture, ScriptedCodec, ScriptedConvert};
    use crate::utils::sos::SignalOfStop;
    use std::time::Instant;

    fn init_with(
        capture: &Arc<ScriptedCapture>,
        convert: &Arc<ScriptedConvert>,
        params: &TranscodeParams,
        role: StageRole,
        stop: &SignalOfStop,
    ) -> Result<CaptureStage> {
        let backends = Backends::new(
            capture.clone(),
            Arc::new(ScriptedCodec::default()),
            convert.clone(),
        );
        let ctx = StageContext {
            kind: MediaKind::Video,
            params,
            target: None,
            backends: &backends,
            stop,
        };
        let mut stage = CaptureStage::new();
        stage.init(&ctx, role)?;
        Ok(stage)
    }

    fn init(capture: &Arc<ScriptedCapture>, params: &TranscodeParams, role: StageRole) -> Result<CaptureStage> {
        let convert = Arc::new(ScriptedConvert::default());
        init_with(capture, &convert, params, role, &SignalOfStop::new())
    }

    #[test]
    fn test_emits_i420_packets() {
        let capture = Arc::new(ScriptedCapture::new(4, 2));
        let mut stage = init(&capture, &TranscodeParams::default(), StageRole::Producer).unwrap();

        // display size used when no size is configured
        assert_eq!(capture.requested().map(|r| (r.width, r.height)), Some((4, 2)));

        let mut packet = Packet::empty(MediaKind::Video);
        assert!(stage.apply(&mut packet).unwrap_err().is_retry());

        capture.emit(1, 1_000_000);
        stage.apply(&mut packet).unwrap();
        assert_eq!(packet.dimensions, Some((4, 2)));
        assert_eq!(packet.size(), i420_size(4, 2));
        assert_eq!(packet.pts, Some(Timestamp::from_micros(1_000)));
        assert_eq!(capture.acquired(), capture.released());

        stage.fini().unwrap();
        assert!(capture.destroyed());
    }

    #[test]
    fn test_converter_opened_once_per_size() {
        let capture = Arc::new(ScriptedCapture::new(4, 2));
        let convert = Arc::new(ScriptedConvert::default());
        let stop = SignalOfStop::new();
        let mut stage = init_with(
            &capture,
            &convert,
            &TranscodeParams::default(),
            StageRole::Producer,
            &stop,
        )
        .unwrap();
        assert!(convert.sessions().is_empty());

        for n in 0..3 {
            capture.emit(n, n as i64 * 1_000_000_000);
            let mut packet = Packet::empty(MediaKind::Video);
            stage.apply(&mut packet).unwrap();
            let data = packet.data().unwrap();
            assert_eq!(&data[..8], &[16; 8]);
            assert_eq!(&data[8..], &[128; 4]);
        }
        assert_eq!(convert.sessions(), vec![(4, 2)]);
        stage.fini().unwrap();
    }

    #[test]
    fn test_cancel_cuts_frame_waits_short() {
        let capture = Arc::new(ScriptedCapture::new(4, 2));
        let convert = Arc::new(ScriptedConvert::default());
        let stop = SignalOfStop::new();
        let mut stage = init_with(
            &capture,
            &convert,
            &TranscodeParams::default(),
            StageRole::Producer,
            &stop,
        )
        .unwrap();

        stop.cancel();
        let started = Instant::now();
        for _ in 0..20 {
            let mut packet = Packet::empty(MediaKind::Video);
            assert!(stage.apply(&mut packet).is_err());
        }
        // uninterrupted, 20 waits take 20 * PACER_WAIT
        assert!(started.elapsed() < PACER_WAIT * 5);
        stage.fini().unwrap();
    }

    #[test]
    fn test_configured_size_and_padding() {
        let capture = Arc::new(ScriptedCapture::new(4, 2));
        let params = TranscodeParams {
            width: 640,
            height: 480,
            top: 10,
            bottom: 20,
            ..Default::default()
        };
        let mut stage = init(&capture, &params, StageRole::Producer).unwrap();
        assert_eq!(
            capture.requested(),
            Some(CaptureRequest {
                padding_top: 10,
                padding_bottom: 20,
                width: 640,
                height: 480
            })
        );
        stage.fini().unwrap();
    }

    #[test]
    fn test_refuses_non_producer_position() {
        let capture = Arc::new(ScriptedCapture::new(4, 2));
        let err = init(&capture, &TranscodeParams::default(), StageRole::Consumer)
            .err()
            .unwrap();
        assert!(err.is_configuration());
        assert!(capture.requested().is_none());
    }

    #[test]
    fn test_create_failure_finalizes_backend() {
        let capture = Arc::new(ScriptedCapture::new(4, 2).failing_create());
        let err = init(&capture, &TranscodeParams::default(), StageRole::Producer)
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::Capture { .. }));
        assert!(capture.finalized());
    }
}
