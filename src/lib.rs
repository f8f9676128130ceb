//! remake-engine
//!
//! Module-driven operation orchestrator for game-asset remake pipelines:
//! manifest parsing, placeholder resolution, polymorphic operation dispatch
//! (external processes, embedded Lua/JS script hosts, built-in actions),
//! and a facade API for front-ends to drive.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod builtin;
pub mod cancel;
pub mod cli;
pub mod command;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod facade;
pub mod group;
pub mod policy;
pub mod process;
pub mod registry;
pub mod script;
pub mod sdk;
pub mod tool_resolver;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging for the developer CLI entry point.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
