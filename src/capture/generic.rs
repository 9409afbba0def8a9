use anyhow::{Context, Result, anyhow, bail};
use bytes::Bytes;
use display_info::DisplayInfo as OsDisplayInfo;
use log::{debug, info};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::backend::{CaptureBackend, CaptureRequest, FrameBuffer, FrameCallback};
use crate::assets::RGBA_BPP;
use crate::utils::sos::SignalOfStop;

/// Rate at which the generic backend announces frames.
const REFRESH_RATE: u32 = 60;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenericDisplay {
    pub id: u32,
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub is_primary: bool,
}

struct Running {
    stop: SignalOfStop,
    worker: JoinHandle<()>,
}

#[derive(Default)]
struct Shared {
    current: Option<FrameBuffer>,
    checked_out: bool,
}

fn lock_shared(shared: &Mutex<Shared>) -> std::sync::MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Portable fallback backend.
///
/// Reads the display geometry through `display_info` and announces a
/// neutral gray frame at a fixed refresh rate. Useful wherever no native
/// screen grabber is available.
pub struct GenericScreenCapture {
    shared: Arc<Mutex<Shared>>,
    running: Mutex<Option<Running>>,
}

impl GenericScreenCapture {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared::default())),
            running: Mutex::new(None),
        }
    }

    fn load_displays() -> Result<Vec<GenericDisplay>> {
        let displays =
            OsDisplayInfo::all().map_err(|e| anyhow!("Failed to enumerate displays: {}", e))?;

        let out: Vec<GenericDisplay> = displays
            .into_iter()
            .map(|d| GenericDisplay {
                id: d.id,
                name: format!("{} ({} x {})", d.name, d.width, d.height),
                width: d.width,
                height: d.height,
                is_primary: d.is_primary,
            })
            .collect();

        if out.is_empty() {
            return Err(anyhow!("No displays found"));
        }
        Ok(out)
    }

    fn gray_frame(width: u32, height: u32) -> Bytes {
        let mut pixels = vec![0x80u8; width as usize * height as usize * RGBA_BPP];
        for alpha in pixels.iter_mut().skip(RGBA_BPP - 1).step_by(RGBA_BPP) {
            *alpha = 0xff;
        }
        Bytes::from(pixels)
    }
}

impl Default for GenericScreenCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for GenericScreenCapture {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn init(&self) -> Result<()> {
        Ok(())
    }

    fn fini(&self) {
        self.destroy();
    }

    fn display_info(&self) -> Result<(u32, u32)> {
        let displays = Self::load_displays()?;
        let display = displays
            .iter()
            .find(|d| d.is_primary)
            .unwrap_or(&displays[0]);
        debug!("Using display {}", display.name);
        Ok((display.width, display.height))
    }

    fn create(&self, request: CaptureRequest, on_frame: FrameCallback) -> Result<()> {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.is_some() {
            bail!("Capture already running");
        }

        let width = request.width;
        let height = request
            .height
            .checked_sub(request.padding_top.saturating_add(request.padding_bottom))
            .filter(|h| *h > 0)
            .with_context(|| {
                format!(
                    "padding {}+{} leaves no rows of {}",
                    request.padding_top, request.padding_bottom, request.height
                )
            })?;
        if width == 0 {
            bail!("Capture width must be positive");
        }

        let pixels = Self::gray_frame(width, height);
        let stop = SignalOfStop::new();
        let worker_stop = stop.clone();
        let shared = self.shared.clone();

        let worker = std::thread::Builder::new()
            .name("capture-generic".into())
            .spawn(move || {
                let period = Duration::from_secs(1) / REFRESH_RATE;
                let started = Instant::now();
                let mut frame_number = 0u64;

                while !worker_stop.wait_cancellation_timeout(period) {
                    frame_number += 1;
                    let timestamp = started.elapsed().as_nanos() as i64;
                    {
                        let mut shared = lock_shared(&shared);
                        // a checked-out buffer stays stable until released
                        if !shared.checked_out {
                            shared.current = Some(FrameBuffer {
                                data: pixels.clone(),
                                stride: width,
                                width,
                                height,
                                frame_number,
                                timestamp,
                            });
                        }
                    }
                    // announced with the buffer lock released
                    on_frame(frame_number, timestamp);
                }
            })
            .context("Failed to spawn capture thread")?;

        info!("Generic capture started at {}x{}", width, height);
        *running = Some(Running { stop, worker });
        Ok(())
    }

    fn destroy(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(Running { stop, worker }) = running {
            stop.cancel();
            let _ = worker.join();
            lock_shared(&self.shared).current = None;
            info!("Generic capture stopped");
        }
    }

    fn acquire_frame_buffer(&self) -> Result<FrameBuffer> {
        let mut shared = lock_shared(&self.shared);
        let frame = shared.current.clone().context("No frame available")?;
        shared.checked_out = true;
        Ok(frame)
    }

    fn release_frame_buffer(&self) {
        lock_shared(&self.shared).checked_out = false;
    }
}
