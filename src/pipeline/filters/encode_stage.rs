//! `av`: video encoder

use std::sync::Arc;

use log::{debug, info};

use crate::assets::TICKS_PER_FRAME;
use crate::config::TranscodeParams;
use crate::encoder::{CodecBackend, EncoderConfig, RawVideoFrame, VideoEncode};
use crate::error::{PipelineError, Result};
use crate::pipeline::stage::{Filter, StageContext, StageRole};
use crate::pipeline::types::{MediaKind, Packet, Timestamp};

/// Encodes raw I420 packets.
///
/// The encoder is opened on the first frame with that frame's dimensions.
/// The codec header rides along as side data of the first output packet.
#[derive(Default)]
pub struct EncodeStage {
    codec: Option<Arc<dyn CodecBackend>>,
    params: Option<TranscodeParams>,
    encoder: Option<Box<dyn VideoEncode>>,
    next_pts: i64,
    header_sent: bool,
}

impl EncodeStage {
    pub fn new() -> Self {
        Self::default()
    }

    fn encoder_for(&mut self, width: u32, height: u32) -> Result<&mut Box<dyn VideoEncode>> {
        if self.encoder.is_none() {
            let (Some(codec), Some(params)) = (self.codec.as_ref(), self.params.as_ref()) else {
                return Err(PipelineError::configuration("stage 'av' used before init"));
            };
            let config = EncoderConfig::new(params, width, height);
            let encoder = codec.open(&config).map_err(PipelineError::codec)?;
            info!(
                "Opened {} encoder {}x{} (crf {}, {} kbps)",
                encoder.codec_name(),
                width,
                height,
                config.crf,
                config.bitrate
            );
            self.next_pts = 0;
            self.header_sent = false;
            self.encoder = Some(encoder);
        }

        self.encoder
            .as_mut()
            .ok_or_else(|| PipelineError::configuration("encoder unavailable"))
    }

    fn media_time(&self, ticks: i64) -> Timestamp {
        let framerate = self.params.as_ref().map_or(1, |p| p.framerate.max(1));
        Timestamp::from_micros(ticks * 1_000_000 / (i64::from(framerate) * TICKS_PER_FRAME))
    }
}

impl Filter for EncodeStage {
    fn name(&self) -> &'static str {
        "av"
    }

    fn init(&mut self, ctx: &StageContext<'_>, role: StageRole) -> Result<()> {
        if role.is_producer() {
            return Err(PipelineError::configuration(
                "stage 'av' needs an upstream producer",
            ));
        }
        if ctx.kind != MediaKind::Video {
            return Err(PipelineError::configuration(format!(
                "stage 'av' encodes video only, chain carries {}",
                ctx.kind
            )));
        }
        self.codec = Some(ctx.backends.codec.clone());
        self.params = Some(ctx.params.clone());
        Ok(())
    }

    fn fini(&mut self) -> Result<()> {
        if let Some(encoder) = self.encoder.take() {
            debug!(
                "Closing {} encoder after {} frames",
                encoder.codec_name(),
                self.next_pts / TICKS_PER_FRAME
            );
        }
        Ok(())
    }

    fn apply(&mut self, packet: &mut Packet) -> Result<()> {
        let Some(data) = packet.data().cloned() else {
            return Err(PipelineError::Retry);
        };
        let Some((width, height)) = packet.dimensions else {
            return Err(PipelineError::configuration(
                "stage 'av' needs raw video with dimensions",
            ));
        };

        let pts = self.next_pts;
        let encoder = self.encoder_for(width, height)?;
        let records = encoder
            .encode(
                &RawVideoFrame {
                    data: &data,
                    width,
                    height,
                },
                pts,
            )
            .map_err(PipelineError::codec)?;
        let header = encoder.header();
        self.next_pts += TICKS_PER_FRAME;

        if records.is_empty() {
            packet.clear();
            return Err(PipelineError::Retry);
        }

        packet.clear();
        packet.set_records(records);
        packet.pts = Some(self.media_time(pts));
        packet.duration = TICKS_PER_FRAME;

        if !self.header_sent {
            self.header_sent = true;
            if let Some(header) = header {
                debug!("Attaching {} bytes of codec header", header.len());
                packet.set_side_data(header);
            }
        }
        Ok(())
    }
}
