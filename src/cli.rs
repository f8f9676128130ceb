//! Developer command-line interface (SPEC_FULL.md §2 "Dev CLI (AMBIENT,
//! thin)"): drives the facade directly for manual smoke-testing. Front-ends
//! proper are out of scope (spec.md §1).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Module-driven operation orchestrator for game-asset remake pipelines.
#[derive(Parser, Debug)]
#[command(name = "remake-engine")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the engine project configuration file (JSON).
    #[arg(short, long, env = "REMAKE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "REMAKE_LOG_LEVEL")]
    pub log_level: String,

    /// Log format (text, json).
    #[arg(long, env = "REMAKE_LOG_FORMAT")]
    pub log_format: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List every module discovered under the configured modules directory.
    ListModules,
    /// List only modules whose state is `installed`.
    ListInstalled,
    /// Run a module's `run-all` group, or its first declared group, with
    /// every prompt answered by its declared default.
    RunInstall {
        /// Module name as reported by `list-modules`.
        module: String,
    },
    /// Run one named group from a module's manifest.
    RunGroup {
        /// Module name as reported by `list-modules`.
        module: String,
        /// Group name within the module's operations manifest.
        group: String,
        /// `name=value` prompt answer, repeatable.
        #[arg(long = "answer", value_parser = parse_answer)]
        answers: Vec<(String, String)>,
    },
}

/// Parse a CLI `--answer name=value` pair.
///
/// # Errors
///
/// Returns a descriptive message if `s` has no `=` separator.
pub fn parse_answer(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected `name=value`, got `{s}`"))
}
