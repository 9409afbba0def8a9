//! Built-in stages
//!
//! | name     | position    | does                                        |
//! |----------|-------------|---------------------------------------------|
//! | `cap`    | first       | paced screen capture, emits raw I420        |
//! | `repeat` | any         | re-emits the last frame when input stalls   |
//! | `av`     | not first   | encodes raw video                           |
//! | `stat`   | middle      | logs frame count, size and bitrates         |
//! | `file`   | last        | writes to `file://<path>`                   |
//! | `pipe`   | last        | writes to `pipe://<fd>`                     |
//! | `tcp`    | last        | writes to `tcp://<host>:<port>`             |

mod capture_stage;
mod encode_stage;
mod repeat_stage;
mod sink_stage;
mod stat_stage;

pub use capture_stage::CaptureStage;
pub use encode_stage::EncodeStage;
pub use repeat_stage::RepeatStage;
pub use sink_stage::SinkStage;
pub use stat_stage::{StatLine, StatStage};

use super::registry::FilterRegistry;

pub fn register_builtins(registry: &mut FilterRegistry) {
    registry.register("cap", || Box::new(CaptureStage::new()));
    registry.register("repeat", || Box::new(RepeatStage::new()));
    registry.register("av", || Box::new(EncodeStage::new()));
    registry.register("stat", || Box::new(StatStage::new()));
    registry.register("file", || Box::new(SinkStage::file()));
    registry.register("pipe", || Box::new(SinkStage::pipe()));
    registry.register("tcp", || Box::new(SinkStage::tcp()));
}
