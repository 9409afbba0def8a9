//! Refcounted sinks shared by every stream writing to the same target

use super::framing;
use log::{info, warn};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub type BoxedWriter = Box<dyn Write + Send>;

static GLOBAL_SINKS: Lazy<SinkRegistry> = Lazy::new(SinkRegistry::new);

/// Open/close bookkeeping of one target
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SinkStats {
    pub refs: usize,
    pub opened: u64,
    pub closed: u64,
}

#[derive(Default)]
struct SinkState {
    writer: Option<BoxedWriter>,
    stats: SinkStats,
}

/// One target. Its mutex guards the count, the open/close transitions and
/// every write.
struct SharedSink {
    key: String,
    state: Mutex<SinkState>,
}

impl SharedSink {
    fn lock(&self) -> MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Table of shared sinks keyed by target.
pub struct SinkRegistry {
    sinks: Mutex<HashMap<String, Arc<SharedSink>>>,
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self {
            sinks: Mutex::new(HashMap::new()),
        }
    }

    /// Process-wide registry used by the consumer stages
    pub fn global() -> &'static SinkRegistry {
        &GLOBAL_SINKS
    }

    fn entry(&self, key: &str) -> Arc<SharedSink> {
        self.sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_insert_with(|| {
                Arc::new(SharedSink {
                    key: key.to_string(),
                    state: Mutex::new(SinkState::default()),
                })
            })
            .clone()
    }

    /// Take a reference on `key`, opening it with `open` if nobody holds it.
    pub fn acquire<F>(&self, key: &str, open: F) -> io::Result<SinkHandle>
    where
        F: FnOnce() -> io::Result<BoxedWriter>,
    {
        let sink = self.entry(key);
        {
            let mut state = sink.lock();
            if state.stats.refs == 0 {
                state.writer = Some(open()?);
                state.stats.opened += 1;
                info!("Opened output {}", sink.key);
            }
            state.stats.refs += 1;
        }

        Ok(SinkHandle {
            sink,
            released: false,
        })
    }

    pub fn stats(&self, key: &str) -> Option<SinkStats> {
        let sinks = self.sinks.lock().unwrap_or_else(PoisonError::into_inner);
        sinks.get(key).map(|sink| sink.lock().stats)
    }
}

impl Default for SinkRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A counted reference on a shared sink. Dropping it releases the reference.
pub struct SinkHandle {
    sink: Arc<SharedSink>,
    released: bool,
}

impl SinkHandle {
    pub fn key(&self) -> &str {
        &self.sink.key
    }

    /// Write a packet (side record, then every payload record) as one atomic
    /// unit with respect to the other holders.
    pub fn write_packet<B: AsRef<[u8]>>(
        &self,
        side: Option<&[u8]>,
        records: &[B],
        packetize: bool,
    ) -> io::Result<usize> {
        if self.released {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "sink handle released"));
        }

        let mut state = self.sink.lock();
        let writer = state
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "sink closed"))?;
        framing::write_packet(writer, side, records, packetize)
    }

    /// Drop this reference, closing the sink on the last one.
    pub fn release(&mut self) {
        if std::mem::replace(&mut self.released, true) {
            return;
        }

        let mut state = self.sink.lock();
        state.stats.refs -= 1;
        if state.stats.refs == 0 {
            if let Some(mut writer) = state.writer.take() {
                if let Err(e) = writer.flush() {
                    warn!("Flushing {} failed: {}", self.sink.key, e);
                }
                state.stats.closed += 1;
                info!("Closed output {}", self.sink.key);
            }
        }
    }
}

impl Drop for SinkHandle {
    fn drop(&mut self) {
        self.release();
    }
}
