//! Pure data model, placeholder resolver and manifest loader.
//!
//! Everything in this crate is a pure function of its inputs: no I/O beyond
//! reading the manifest file itself, no interior mutability, no async. The
//! engine crate builds the execution machinery (process spawning, script
//! hosts, policy) on top of these types.

#![forbid(unsafe_code)]

pub mod error;
pub mod manifest;
pub mod model;
pub mod placeholder;

pub use error::{CoreError, Result};
pub use model::{
    ModuleDescriptor, ModuleState, Operation, Prompt, PromptType, ScriptType,
};
pub use placeholder::resolve;
