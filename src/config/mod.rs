//! Settings for the orchestrator.
//!
//! - `types` - `Settings` and its sections
//! - `duration` - human-readable duration strings ("4s", "500ms")
//! - `parser` - YAML loading and default file discovery
//! - `validation` - range checks on maker and buyer settings

mod duration;
mod parser;
mod types;
mod validation;

pub use duration::*;
pub use parser::*;
pub use types::*;
