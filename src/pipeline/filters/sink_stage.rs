//! `file`, `pipe` and `tcp`: consumers writing to an output target

use log::{debug, info};

use crate::error::{PipelineError, Result};
use crate::output::{self, SinkHandle, SinkRegistry};
use crate::pipeline::stage::{Filter, StageContext, StageRole};
use crate::pipeline::types::Packet;

/// Writes each packet (side data first) to a shared sink.
///
/// The three consumer stages only differ by the target scheme they accept.
/// Streams naming the same target share one underlying writer.
pub struct SinkStage {
    scheme: &'static str,
    registry: &'static SinkRegistry,
    handle: Option<SinkHandle>,
    packetize: bool,
    records: u64,
}

impl SinkStage {
    fn with_scheme(scheme: &'static str) -> Self {
        Self {
            scheme,
            registry: SinkRegistry::global(),
            handle: None,
            packetize: false,
            records: 0,
        }
    }

    pub fn file() -> Self {
        Self::with_scheme("file")
    }

    pub fn pipe() -> Self {
        Self::with_scheme("pipe")
    }

    pub fn tcp() -> Self {
        Self::with_scheme("tcp")
    }

    #[cfg(test)]
    pub(crate) fn in_registry(mut self, registry: &'static SinkRegistry) -> Self {
        self.registry = registry;
        self
    }
}

impl Filter for SinkStage {
    fn name(&self) -> &'static str {
        self.scheme
    }

    fn init(&mut self, ctx: &StageContext<'_>, role: StageRole) -> Result<()> {
        role.require_consumer(self.scheme)?;

        let target = ctx.require_target(self.scheme)?;
        if target.scheme() != self.scheme {
            return Err(PipelineError::configuration(format!(
                "stage '{}' cannot write to {}",
                self.scheme, target
            )));
        }

        let handle = self.registry.acquire(&target.key(), || output::open(target))?;
        debug!("Stage '{}' attached to {}", self.scheme, handle.key());

        self.handle = Some(handle);
        self.packetize = ctx.params.packetize;
        self.records = 0;
        Ok(())
    }

    fn fini(&mut self) -> Result<()> {
        if let Some(mut handle) = self.handle.take() {
            info!("Wrote {} records to {}", self.records, handle.key());
            handle.release();
        }
        Ok(())
    }

    fn apply(&mut self, packet: &mut Packet) -> Result<()> {
        let Some(handle) = self.handle.as_ref() else {
            return Err(PipelineError::configuration(format!(
                "stage '{}' used before init",
                self.scheme
            )));
        };
        if packet.is_empty() {
            return Err(PipelineError::Retry);
        }

        handle.write_packet(
            packet.side_data().map(|s| s.as_ref()),
            packet.records(),
            self.packetize,
        )?;
        self.records += packet.records().len() as u64;
        packet.clear();
        Ok(())
    }
}
