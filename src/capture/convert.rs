//! RGBA to planar I420 conversion
//!
//! The producer stage opens one [`PixelConvert`] session per capture size
//! through a [`ConvertBackend`]. The production backend runs FFmpeg's
//! software scaler.

use ac_ffmpeg::codec::video::frame::get_pixel_format;
use ac_ffmpeg::codec::video::scaler::Algorithm;
use ac_ffmpeg::codec::video::{PixelFormat, VideoFrame, VideoFrameMut, VideoFrameScaler};
use anyhow::{Result, ensure};
use bytes::{BufMut, BytesMut};
use log::debug;

use super::FrameBuffer;
use crate::assets::RGBA_BPP;

/// Bytes needed for an I420 image of the given size
pub fn i420_size(width: u32, height: u32) -> usize {
    let (w, h) = (width as usize, height as usize);
    let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
    w * h + 2 * cw * ch
}

/// Factory for converter sessions.
pub trait ConvertBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Open a session converting `width`x`height` RGBA frames
    fn open(&self, width: u32, height: u32) -> Result<Box<dyn PixelConvert>>;
}

/// A converter session bound to one picture size.
pub trait PixelConvert: Send {
    /// Append the Y, U and V planes of `frame`, tightly packed, to `dst`.
    fn convert(&mut self, frame: &FrameBuffer, dst: &mut BytesMut) -> Result<()>;
}

/// FFmpeg software scaler, rgba to yuv420p at the same size
#[derive(Debug, Default, Clone, Copy)]
pub struct SwsConvert;

impl ConvertBackend for SwsConvert {
    fn name(&self) -> &'static str {
        "swscale"
    }

    fn open(&self, width: u32, height: u32) -> Result<Box<dyn PixelConvert>> {
        Ok(Box::new(SwsSession::new(width, height)?))
    }
}

struct SwsSession {
    scaler: VideoFrameScaler,
    source_format: PixelFormat,
    width: u32,
    height: u32,
}

impl SwsSession {
    fn new(width: u32, height: u32) -> Result<Self> {
        ensure!(width > 0 && height > 0, "empty frame {width}x{height}");

        let source_format = get_pixel_format("rgba");
        let scaler = VideoFrameScaler::builder()
            .source_pixel_format(source_format)
            .source_width(width as usize)
            .source_height(height as usize)
            .target_pixel_format(get_pixel_format("yuv420p"))
            .target_width(width as usize)
            .target_height(height as usize)
            .algorithm(Algorithm::Bilinear)
            .build()?;

        debug!("Opened rgba -> yuv420p scaler for {}x{}", width, height);
        Ok(Self {
            scaler,
            source_format,
            width,
            height,
        })
    }

    fn rgba_frame(&self, frame: &FrameBuffer) -> VideoFrame {
        let mut picture =
            VideoFrameMut::black(self.source_format, self.width as usize, self.height as usize);
        {
            let mut planes = picture.planes_mut();
            copy_rows(
                &frame.data,
                frame.stride as usize * RGBA_BPP,
                self.width as usize * RGBA_BPP,
                planes[0].lines_mut(),
            );
        }
        picture.freeze()
    }
}

impl PixelConvert for SwsSession {
    fn convert(&mut self, frame: &FrameBuffer, dst: &mut BytesMut) -> Result<()> {
        check_frame(frame, self.width, self.height)?;

        let rgba = self.rgba_frame(frame);
        let yuv = self.scaler.scale(&rgba)?;

        let (w, h) = (self.width as usize, self.height as usize);
        let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
        dst.reserve(i420_size(self.width, self.height));

        let planes = yuv.planes();
        let mut written = 0;
        for (index, (width, rows)) in [(w, h), (cw, ch), (cw, ch)].into_iter().enumerate() {
            written += pack_plane(planes[index].lines(), width, rows, dst);
        }
        ensure!(
            written == i420_size(self.width, self.height),
            "scaler returned {written} bytes for {}x{}",
            self.width,
            self.height
        );
        Ok(())
    }
}

/// Refuse frames whose geometry does not match the session.
fn check_frame(frame: &FrameBuffer, width: u32, height: u32) -> Result<()> {
    ensure!(
        frame.width == width && frame.height == height,
        "frame is {}x{}, converter expects {width}x{height}",
        frame.width,
        frame.height
    );
    ensure!(
        frame.stride >= frame.width,
        "stride {} shorter than width {}",
        frame.stride,
        frame.width
    );

    let row = width as usize * RGBA_BPP;
    let stride = frame.stride as usize * RGBA_BPP;
    ensure!(
        frame.data.len() >= stride * (height as usize - 1) + row,
        "frame buffer too small: {} bytes for {width}x{height}",
        frame.data.len()
    );
    Ok(())
}

/// Copy `row` bytes of each source line into the destination lines.
fn copy_rows<'a>(
    source: &[u8],
    src_stride: usize,
    row: usize,
    lines: impl Iterator<Item = &'a mut [u8]>,
) {
    for (src, dst) in source.chunks(src_stride).zip(lines) {
        let n = row.min(src.len()).min(dst.len());
        dst[..n].copy_from_slice(&src[..n]);
    }
}

/// Append `rows` lines of `width` bytes, dropping line padding.
fn pack_plane<'a>(
    lines: impl Iterator<Item = &'a [u8]>,
    width: usize,
    rows: usize,
    dst: &mut BytesMut,
) -> usize {
    let mut written = 0;
    for line in lines.take(rows) {
        let n = width.min(line.len());
        dst.put_slice(&line[..n]);
        written += n;
    }
    written
}
