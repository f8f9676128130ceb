//! remake-engine developer CLI entry point.

use std::process::ExitCode;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use serde_json::Value;
use tracing::{error, info};

use remake_engine::cancel::CancelToken;
use remake_engine::cli::{Cli, Command};
use remake_engine::command::Answers;
use remake_engine::config::EngineConfig;
use remake_engine::event::{Event, Stream};
use remake_engine::facade::Engine;
use remake_engine::process::RunCallbacks;
use remake_engine::setup_tracing;

/// Streams a run's output and events to stdout/stderr; never supplies
/// stdin, so an interactive `prompt` event blocks until the front-end this
/// CLI stands in for would normally answer it (spec.md §4.8: unanswered
/// prompts have no default reply defined for a non-interactive caller).
struct StdioCallbacks;

#[async_trait]
impl RunCallbacks for StdioCallbacks {
    async fn on_output(&self, line: &str, stream: Stream) {
        match stream {
            Stream::Stdout => println!("{line}"),
            Stream::Stderr => eprintln!("{line}"),
        }
    }

    async fn on_event(&self, event: Event) {
        eprintln!("{}", event.to_line());
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::from(2);
    }

    let config = match EngineConfig::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::from(2);
        }
    };

    let engine = match Engine::new(config) {
        Ok(e) => e,
        Err(e) => {
            error!("Failed to construct engine: {e}");
            return ExitCode::from(2);
        }
    };

    match cli.command {
        Command::ListModules => match engine.list_modules() {
            Ok(modules) => {
                for (name, descriptor) in modules {
                    println!("{name}\t{:?}", descriptor.state);
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("Failed to list modules: {e}");
                ExitCode::from(2)
            }
        },
        Command::ListInstalled => match engine.list_installed() {
            Ok(modules) => {
                for name in modules.keys() {
                    println!("{name}");
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("Failed to list installed modules: {e}");
                ExitCode::from(2)
            }
        },
        Command::RunInstall { module } => {
            let modules = match engine.list_modules() {
                Ok(m) => m,
                Err(e) => {
                    error!("Failed to list modules: {e}");
                    return ExitCode::from(2);
                }
            };
            info!(module = %module, "running install");
            match engine
                .run_install_checked(&module, &modules, Arc::new(StdioCallbacks), CancelToken::never())
                .await
            {
                Ok(true) => ExitCode::SUCCESS,
                Ok(false) => ExitCode::from(1),
                Err(e) => {
                    error!("Install failed: {e}");
                    ExitCode::from(2)
                }
            }
        }
        Command::RunGroup { module, group, answers } => {
            let modules = match engine.list_modules() {
                Ok(m) => m,
                Err(e) => {
                    error!("Failed to list modules: {e}");
                    return ExitCode::from(2);
                }
            };
            let Some(descriptor) = modules.get(&module) else {
                error!("Unknown module '{module}'");
                return ExitCode::from(2);
            };
            let ops_path = descriptor
                .ops_file
                .clone()
                .unwrap_or_else(|| descriptor.root.join(remake_engine::registry::OPS_FILE_NAME));
            let groups = match engine.load_ops(&ops_path) {
                Ok(g) => g,
                Err(e) => {
                    error!("Failed to load operations: {e}");
                    return ExitCode::from(2);
                }
            };
            let Some(operations) = groups.get(&group) else {
                error!("Unknown group '{group}' in module '{module}'");
                return ExitCode::from(2);
            };

            let answers: Answers = answers
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect();

            info!(module = %module, group = %group, "running group");
            match engine
                .run_group_checked(&module, &modules, operations, &answers, Arc::new(StdioCallbacks), CancelToken::never())
                .await
            {
                Ok(true) => ExitCode::SUCCESS,
                Ok(false) => ExitCode::from(1),
                Err(e) => {
                    error!("Group run failed: {e}");
                    ExitCode::from(2)
                }
            }
        }
    }
}
