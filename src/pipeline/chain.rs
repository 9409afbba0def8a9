//! A built chain and its per-tick protocol

use log::{debug, error};

use super::stage::{Filter, StageRole};
use super::types::{MediaKind, Packet};
use crate::error::Result;
use crate::output::OutputTarget;

/// What one tick achieved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The consumer accepted a packet carrying this many payload bytes
    Delivered { bytes: usize },
    /// A stage had nothing to hand downstream
    Idle,
}

pub(crate) struct StageSlot {
    pub filter: Box<dyn Filter>,
    pub role: StageRole,
}

/// An initialized chain: one producer, zero or more transforms, one consumer.
///
/// Stages are finalized exactly once, by [`Chain::finalize`] or on drop.
pub struct Chain {
    slots: Vec<StageSlot>,
    spec: String,
    target: Option<OutputTarget>,
    kind: MediaKind,
    finalized: bool,
}

impl Chain {
    pub(crate) fn new(
        slots: Vec<StageSlot>,
        spec: String,
        target: Option<OutputTarget>,
        kind: MediaKind,
    ) -> Self {
        Self {
            slots,
            spec,
            target,
            kind,
            finalized: false,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The stage list as resolved by the builder, e.g. `cap:av:file`
    pub fn spec(&self) -> &str {
        &self.spec
    }

    pub fn target(&self) -> Option<&OutputTarget> {
        self.target.as_ref()
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.slots.iter().map(|s| s.filter.name()).collect()
    }

    pub fn roles(&self) -> Vec<StageRole> {
        self.slots.iter().map(|s| s.role).collect()
    }

    /// Run every stage once on `packet`.
    ///
    /// A retry from a stage ends the tick unless a later stage resumes after
    /// retries, in which case the tick continues there with the sentinel
    /// packet. Retry never escapes this call; any other error does.
    pub fn tick(&mut self, packet: &mut Packet) -> Result<TickOutcome> {
        let mut index = 0;

        while let Some(slot) = self.slots.get_mut(index) {
            let bytes = packet.size() + packet.side_data().map_or(0, |s| s.len());
            let consumer = slot.role.is_consumer();

            match slot.filter.apply(packet) {
                Ok(()) if consumer => return Ok(TickOutcome::Delivered { bytes }),
                Ok(()) => index += 1,
                Err(e) if e.is_retry() => {
                    let resume = self.slots[index + 1..]
                        .iter()
                        .position(|s| s.filter.resumes_after_retry());
                    match resume {
                        Some(offset) => {
                            packet.clear();
                            index += offset + 1;
                        }
                        None => return Ok(TickOutcome::Idle),
                    }
                }
                Err(e) => {
                    error!("Stage '{}' failed: {}", slot.filter.name(), e);
                    return Err(e);
                }
            }
        }

        Ok(TickOutcome::Idle)
    }

    /// Finalize every stage in order. Every stage is attempted; the first
    /// error is returned.
    pub fn finalize(&mut self) -> Result<()> {
        if std::mem::replace(&mut self.finalized, true) {
            return Ok(());
        }

        let mut first_error = None;
        for slot in &mut self.slots {
            debug!("Finalizing stage '{}'", slot.filter.name());
            if let Err(e) = slot.filter.fini() {
                error!("Stage '{}' failed to finalize: {}", slot.filter.name(), e);
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for Chain {
    fn drop(&mut self) {
        let _ = self.finalize();
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("stages", &self.stage_names())
            .field("target", &self.target)
            .field("kind", &self.kind)
            .finish()
    }
}
