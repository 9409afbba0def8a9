//! Realtime screen capture filter chains.
//!
//! A chain such as `cap:repeat:av:stat:tcp` captures the display at a paced
//! frame rate, encodes it and delivers the records to a file, an inherited
//! pipe or a TCP peer, optionally length-prefixed.

pub mod assets;
pub mod capture;
pub mod config;
pub mod encoder;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod utils;

#[cfg(test)]
mod testing;

pub use error::{PipelineError, Result};
