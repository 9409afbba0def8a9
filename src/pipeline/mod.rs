//! Filter-chain engine
//!
//! A chain is an ordered list of stages built from a spec string such as
//! `cap:repeat:av:stat:file`:
//! - the registry maps stage names to factories,
//! - the builder resolves a spec, assigns positional roles and initializes
//!   every stage (rolling back on failure),
//! - the executor ticks the chain on a dedicated thread until cancelled or
//!   until a stage fails, then finalizes it.
//!
//! Each tick runs `produce → transform* → consume` on one packet. A stage
//! answering [`PipelineError::Retry`](crate::error::PipelineError::Retry)
//! ends the tick early.

pub mod builder;
pub mod chain;
pub mod executor;
pub mod filters;
pub mod health;
pub mod registry;
pub mod stage;
pub mod state;
pub mod types;

pub use builder::{ChainBuilder, ChainSpec};
pub use chain::{Chain, TickOutcome};
pub use executor::{Executor, RunReport, StreamHandle};
pub use health::{HealthSummary, PipelineHealth};
pub use registry::{FilterDescriptor, FilterRegistry};
pub use stage::{Backends, Filter, StageContext, StageRole};
pub use state::PipelineState;
pub use types::{MediaKind, Packet, Timestamp};
