//! Executable allow-list and path-access policy (spec.md §4.7).
//!
//! Both checks are advisory and in-process: they run at the same privilege
//! as the host and exist to keep embedded scripts and built-in actions from
//! reaching outside the conventions the engine expects, not to provide OS
//! sandboxing.

mod exec;
mod path;

pub use exec::ExecPolicy;
pub use path::{PathDecision, PathPolicy};
