use super::frame_pool::FramePool;
use super::{CodecBackend, EncoderConfig, RawVideoFrame, VideoEncode};
use crate::assets::{GOP_SIZE, TICKS_PER_FRAME};
use crate::capture::i420_size;
use crate::config::CodecId;
use ac_ffmpeg::codec::video::VideoEncoder;
use ac_ffmpeg::codec::{Encoder, video};
use ac_ffmpeg::time::TimeBase;
use anyhow::{Result, anyhow, bail, ensure};
use bytes::Bytes;
use log::{debug, info};

struct EncoderProfile {
    codec: &'static str,
    options: &'static [(&'static str, &'static str)],
    /// Private option receiving the constant rate factor, if the codec has one
    crf_option: Option<&'static str>,
}

/// H.264 encoders tried in order.
const H264_CHAIN: &[EncoderProfile] = &[
    EncoderProfile {
        codec: "libx264",
        options: &[
            ("profile", "high"),
            ("level", "5.2"),
            ("preset", "veryfast"),
            ("tune", "zerolatency"),
        ],
        crf_option: Some("crf"),
    },
    // software fallback for builds without GPL codecs
    EncoderProfile {
        codec: "libopenh264",
        options: &[("profile", "high")],
        crf_option: None,
    },
];

/// FFmpeg codec backend
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegCodec;

impl CodecBackend for FfmpegCodec {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn open(&self, config: &EncoderConfig) -> Result<Box<dyn VideoEncode>> {
        match config.codec {
            CodecId::H264 => Ok(Box::new(FfmpegEncoder::new(config)?)),
            other => bail!("codec {other} is not supported by the video encoder"),
        }
    }
}

pub struct FfmpegEncoder {
    encoder: VideoEncoder,
    frame_pool: FramePool,
    header: Option<Bytes>,
    width: u32,
    height: u32,
    codec_name: String,
}

unsafe impl Send for FfmpegEncoder {}

impl FfmpegEncoder {
    pub fn new(config: &EncoderConfig) -> Result<Self> {
        ensure!(
            config.width > 0 && config.height > 0,
            "invalid encoder size {}x{}",
            config.width,
            config.height
        );
        ensure!(config.framerate > 0, "framerate must be positive");

        // yuv420p needs even dimensions
        let w = config.width.next_multiple_of(2) as usize;
        let h = config.height.next_multiple_of(2) as usize;
        let ticks_per_second = i32::try_from(i64::from(config.framerate) * TICKS_PER_FRAME)
            .map_err(|_| anyhow!("framerate {} too high", config.framerate))?;
        let time_base = TimeBase::new(1, ticks_per_second);
        let pixel_format = video::frame::get_pixel_format("yuv420p");

        let (encoder, codec_name) = Self::try_create_encoder(config, w, h, time_base, pixel_format)?;
        info!("Using encoder: {} ({}x{} @ {} fps)", codec_name, w, h, config.framerate);

        let parameters = encoder.codec_parameters();
        let header = parameters
            .extradata()
            .filter(|data| !data.is_empty())
            .map(Bytes::copy_from_slice);
        if let Some(header) = &header {
            debug!("Found {} bytes of codec header", header.len());
        }

        Ok(Self {
            encoder,
            frame_pool: FramePool::new(w, h, time_base, pixel_format),
            header,
            width: config.width,
            height: config.height,
            codec_name,
        })
    }

    fn try_create_encoder(
        config: &EncoderConfig,
        w: usize,
        h: usize,
        time_base: TimeBase,
        pixel_format: video::frame::PixelFormat,
    ) -> Result<(VideoEncoder, String)> {
        for profile in H264_CHAIN {
            let mut builder = match VideoEncoder::builder(profile.codec) {
                Ok(b) => b,
                Err(e) => {
                    debug!("Encoder {} not available, skipping: {}", profile.codec, e);
                    continue;
                }
            };
            builder = builder
                .pixel_format(pixel_format)
                .width(w)
                .height(h)
                .time_base(time_base)
                .set_option("g", GOP_SIZE)
                .set_option("bf", 0)
                .set_option("flags", "+global_header");
            for (k, v) in profile.options {
                builder = builder.set_option(k, v);
            }
            if config.bitrate > 0 {
                let bits = u64::from(config.bitrate) * 1000;
                builder = builder.set_option("maxrate", bits).set_option("bufsize", bits);
            }
            if let (Some(option), true) = (profile.crf_option, config.crf > 0) {
                builder = builder.set_option(option, config.crf);
            }

            match builder.build() {
                Ok(enc) => return Ok((enc, profile.codec.to_string())),
                Err(e) => {
                    debug!("Encoder {} failed to initialize: {}", profile.codec, e);
                    continue;
                }
            }
        }
        Err(anyhow!(
            "No H.264 encoder available, install FFmpeg with libx264 support"
        ))
    }

    fn drain(&mut self) -> Result<Vec<Bytes>> {
        let mut records = Vec::new();
        while let Some(packet) = self.encoder.take()? {
            records.push(Bytes::copy_from_slice(packet.data()));
        }
        Ok(records)
    }
}

impl VideoEncode for FfmpegEncoder {
    fn codec_name(&self) -> &str {
        &self.codec_name
    }

    fn header(&self) -> Option<Bytes> {
        self.header.clone()
    }

    fn encode(&mut self, frame: &RawVideoFrame<'_>, pts: i64) -> Result<Vec<Bytes>> {
        ensure!(
            frame.width == self.width && frame.height == self.height,
            "frame size {}x{} differs from encoder size {}x{}",
            frame.width,
            frame.height,
            self.width,
            self.height
        );
        ensure!(
            frame.data.len() >= i420_size(frame.width, frame.height),
            "short I420 frame: {} bytes",
            frame.data.len()
        );

        let picture = self.frame_pool.fill_i420(
            frame.data,
            frame.width as usize,
            frame.height as usize,
            pts,
        );
        self.encoder.push(picture.clone())?;
        self.frame_pool.recycle(picture);

        self.drain()
    }
}
