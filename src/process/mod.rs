//! Process execution (spec.md §4.6): foreground runner and the managed
//! background-subprocess API.

mod managed;
mod runner;

pub use managed::{ManagedProcess, ManagedProcessHandle, ManagedStatus, ProcessTable};
pub use runner::{run, RunCallbacks, RunOptions};
