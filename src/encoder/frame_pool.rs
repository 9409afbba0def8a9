use ac_ffmpeg::codec::video::{PixelFormat, VideoFrame, VideoFrameMut};
use ac_ffmpeg::time::{TimeBase, Timestamp};
use std::collections::VecDeque;

/// Frames kept around for reuse.
const POOL_SIZE: usize = 4;

/// Pool of writable yuv420p frames the encoder session fills from I420
/// packets.
///
/// Frames pushed into the encoder are returned with [`FramePool::recycle`];
/// a frame the codec still references is skipped until it is free again.
pub(crate) struct FramePool {
    frames: VecDeque<VideoFrame>,
    width: usize,
    height: usize,
    time_base: TimeBase,
    pixel_format: PixelFormat,
}

impl FramePool {
    pub fn new(width: usize, height: usize, time_base: TimeBase, pixel_format: PixelFormat) -> Self {
        Self {
            frames: VecDeque::with_capacity(POOL_SIZE),
            width,
            height,
            time_base,
            pixel_format,
        }
    }

    pub fn recycle(&mut self, frame: VideoFrame) {
        if self.frames.len() < POOL_SIZE {
            self.frames.push_back(frame);
        }
    }

    fn take(&mut self) -> VideoFrameMut {
        for _ in 0..self.frames.len() {
            let Some(frame) = self.frames.pop_front() else {
                break;
            };
            match frame.try_into_mut() {
                Ok(frame) => return frame,
                Err(frame) => self.frames.push_back(frame),
            }
        }

        VideoFrameMut::black(self.pixel_format, self.width, self.height)
            .with_time_base(self.time_base)
    }

    /// Copy an I420 picture of `width`x`height` into a pooled frame.
    ///
    /// The pooled frame may be larger (even-aligned); extra rows and columns
    /// keep whatever the frame held before.
    pub fn fill_i420(&mut self, src: &[u8], width: usize, height: usize, pts: i64) -> VideoFrame {
        let mut frame = self.take();

        let chroma_w = width.div_ceil(2);
        let chroma_h = height.div_ceil(2);
        let planes_src = [
            (0, width * height, width, height),
            (width * height, chroma_w * chroma_h, chroma_w, chroma_h),
            (width * height + chroma_w * chroma_h, chroma_w * chroma_h, chroma_w, chroma_h),
        ];

        {
            let mut planes = frame.planes_mut();
            for (index, (offset, len, src_stride, rows)) in planes_src.into_iter().enumerate() {
                let Some(source) = src.get(offset..offset + len) else {
                    break;
                };
                let destination = planes[index].data_mut();
                let dst_rows = if index == 0 { self.height } else { self.height.div_ceil(2) };
                let dst_stride = destination.len() / dst_rows.max(1);
                copy_plane(source, src_stride, destination, dst_stride, rows.min(dst_rows));
            }
        }

        frame
            .with_pts(Timestamp::new(pts, self.time_base))
            .freeze()
    }
}

/// Row-by-row copy between planes of different line sizes.
#[inline]
fn copy_plane(source: &[u8], src_stride: usize, destination: &mut [u8], dst_stride: usize, rows: usize) {
    let width = src_stride.min(dst_stride);

    if src_stride == dst_stride {
        let len = (rows * src_stride).min(source.len()).min(destination.len());
        destination[..len].copy_from_slice(&source[..len]);
        return;
    }

    for (src_row, dst_row) in source
        .chunks(src_stride)
        .zip(destination.chunks_mut(dst_stride))
        .take(rows)
    {
        let n = width.min(src_row.len()).min(dst_row.len());
        dst_row[..n].copy_from_slice(&src_row[..n]);
    }
}
