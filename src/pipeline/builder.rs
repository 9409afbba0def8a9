//! Chain construction from a declarative spec string

use log::{debug, error, info};

use super::chain::{Chain, StageSlot};
use super::registry::{FilterDescriptor, FilterRegistry};
use super::stage::{Backends, StageContext, StageRole};
use super::types::MediaKind;
use crate::assets::MAX_STAGES;
use crate::config::TranscodeParams;
use crate::error::{PipelineError, Result};
use crate::output::OutputTarget;
use crate::utils::sos::SignalOfStop;

/// A parsed chain spec: stage names plus an optional inline output target.
///
/// `cap:repeat:av:file` names four stages. In `cap:av:file:///tmp/out.bin`
/// the token right before `://` is the consumer and the text from that token
/// on is the output target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSpec {
    pub stages: Vec<String>,
    pub target: Option<OutputTarget>,
}

impl ChainSpec {
    pub fn parse(spec: &str) -> Result<Self> {
        let (stage_part, target) = match spec.find("://") {
            Some(at) => {
                let start = spec[..at].rfind(':').map_or(0, |colon| colon + 1);
                let target = OutputTarget::parse(&spec[start..])?;
                (&spec[..at], Some(target))
            }
            None => (spec, None),
        };

        let stages: Vec<String> = stage_part
            .split(':')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .collect();

        if stages.is_empty() {
            return Err(PipelineError::configuration(format!(
                "chain '{spec}' names no stages"
            )));
        }
        if stages.len() > MAX_STAGES {
            return Err(PipelineError::configuration(format!(
                "chain '{spec}' has {} stages, at most {MAX_STAGES} allowed",
                stages.len()
            )));
        }

        Ok(Self { stages, target })
    }

    /// Stage names joined back with `:`
    pub fn stage_list(&self) -> String {
        self.stages.join(":")
    }
}

/// Builds initialized chains against a registry and a set of backends.
pub struct ChainBuilder<'r> {
    registry: &'r FilterRegistry,
    backends: Backends,
    kind: MediaKind,
    stop: SignalOfStop,
}

impl<'r> ChainBuilder<'r> {
    /// `stop` is the signal that will end the stream; stages hook their
    /// blocking waits onto it, so it must be the one the executor watches.
    pub fn new(registry: &'r FilterRegistry, backends: Backends, stop: &SignalOfStop) -> Self {
        Self {
            registry,
            backends,
            kind: MediaKind::Video,
            stop: stop.clone(),
        }
    }

    /// Stream kind handed to every stage
    pub fn kind(mut self, kind: MediaKind) -> Self {
        self.kind = kind;
        self
    }

    /// Resolve, instantiate and initialize a chain.
    ///
    /// Configuration problems are reported before any stage is created:
    /// unknown or too many stages, a malformed or conflicting target, a
    /// consumer that does not match the target scheme, bad parameters. If a stage fails to initialize, the stages before it are
    /// finalized in reverse order and the error is returned.
    pub fn build(
        &self,
        spec: &str,
        target: Option<OutputTarget>,
        params: &TranscodeParams,
    ) -> Result<Chain> {
        let parsed = ChainSpec::parse(spec)?;
        let target = match (parsed.target.clone(), target) {
            (Some(inline), Some(explicit)) if inline != explicit => {
                return Err(PipelineError::configuration(format!(
                    "chain target {inline} conflicts with output {explicit}"
                )));
            }
            (inline, explicit) => inline.or(explicit),
        };

        let descriptors = parsed
            .stages
            .iter()
            .map(|name| {
                self.registry.lookup(name).ok_or_else(|| {
                    let known: Vec<&str> = self.registry.names().collect();
                    PipelineError::configuration(format!(
                        "unknown stage '{name}' (known: {})",
                        known.join(", ")
                    ))
                })
            })
            .collect::<Result<Vec<&FilterDescriptor>>>()?;

        check_consumer(&parsed.stages, target.as_ref())?;
        params.validate()?;

        let list = parsed.stage_list();
        debug!("Building chain {list} with {:?}", self.backends);

        let ctx = StageContext {
            kind: self.kind,
            params,
            target: target.as_ref(),
            backends: &self.backends,
            stop: &self.stop,
        };

        let len = descriptors.len();
        let mut slots: Vec<StageSlot> = Vec::with_capacity(len);
        for (index, descriptor) in descriptors.into_iter().enumerate() {
            let role = StageRole::from_position(index, len);
            let mut filter = descriptor.instantiate();

            if let Err(e) = filter.init(&ctx, role) {
                error!("Stage '{}' failed to initialize: {}", descriptor.name(), e);
                for slot in slots.iter_mut().rev() {
                    if let Err(fini) = slot.filter.fini() {
                        error!("Stage '{}' failed to finalize: {}", slot.filter.name(), fini);
                    }
                }
                return Err(PipelineError::StageInit {
                    stage: descriptor.name().to_string(),
                    source: Box::new(e),
                });
            }

            debug!("Stage '{}' initialized as {:?}", descriptor.name(), role);
            slots.push(StageSlot { filter, role });
        }

        info!(
            "Chain {} ready{}",
            list,
            target
                .as_ref()
                .map(|t| format!(" -> {t}"))
                .unwrap_or_default()
        );

        Ok(Chain::new(slots, list, target, self.kind))
    }
}

/// The last stage must serve the target's scheme, and a scheme-named
/// consumer needs a target.
fn check_consumer(stages: &[String], target: Option<&OutputTarget>) -> Result<()> {
    let last = stages.last().map(String::as_str).unwrap_or_default();
    match target {
        Some(target) if target.scheme() != last => Err(PipelineError::configuration(format!(
            "output {target} needs '{}' as the last stage, chain ends with '{last}'",
            target.scheme()
        ))),
        None if OutputTarget::SCHEMES.contains(&last) => Err(PipelineError::configuration(
            format!("stage '{last}' needs an output target"),
        )),
        _ => Ok(()),
    }
}
