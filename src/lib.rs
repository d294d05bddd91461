//! callgen core library: resource-aware call program generation for kernel
//! interface fuzzing, shared by the CLI and embedding fuzzers.

#[path = "modes/balance.rs"]
mod balance;
#[path = "model/catalog.rs"]
mod catalog;
#[path = "cmd/catalog_cmd.rs"]
mod catalog_cmd;
#[path = "model/category.rs"]
mod category;
#[path = "runtime/choice.rs"]
mod choice;
#[path = "platform/config.rs"]
mod config;
#[path = "platform/error.rs"]
mod error;
#[path = "modes/generate.rs"]
mod generation;
#[path = "model/program.rs"]
mod program;
#[path = "runtime/rng.rs"]
mod rng;
#[path = "runtime/state.rs"]
mod state;
#[path = "runtime/synth.rs"]
mod synth;
#[path = "modes/task.rs"]
mod task;

pub use balance::*;
pub use catalog::*;
pub use catalog_cmd::*;
pub use category::*;
pub use choice::*;
pub use config::*;
pub use error::*;
pub use generation::*;
pub use program::*;
pub use rng::*;
pub use state::*;
pub use synth::*;
pub use task::*;
