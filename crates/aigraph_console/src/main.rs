// SPDX-License-Identifier: MIT OR Apache-2.0
//! `aigraph` - text console for building and compiling node graphs
//!
//! Reads commands from stdin, one per line, and applies them to a single
//! editing session. Command output goes to stdout; logs go to stderr.

mod config;
mod console;

use aigraph_graph::{Catalog, GraphEditor};
use clap::Parser;
use config::{ConfigError, ConsoleConfig, CONFIG_FILE_NAME};
use console::Console;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(name = "aigraph", version, about = "Edit and compile aigraph node graphs")]
struct Cli {
    /// Console configuration file (RON).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Node type catalog (JSON).
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Graph to open at startup.
    #[arg(long)]
    load: Option<PathBuf>,

    /// Write the effective configuration to the config path and exit.
    #[arg(long, default_value_t = false)]
    init_config: bool,
}

fn main() {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
    let (mut config, config_error) = match ConsoleConfig::load(&config_path) {
        Ok(config) => (config, None),
        Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound && cli.config.is_none() => {
            (ConsoleConfig::default(), None)
        }
        Err(e) => (ConsoleConfig::default(), Some(e)),
    };
    if let Some(catalog) = cli.catalog {
        config.catalog = Some(catalog);
    }
    if let Some(load) = cli.load {
        config.autoload = Some(load);
    }

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting aigraph console v{}", env!("CARGO_PKG_VERSION"));
    if let Some(e) = config_error {
        tracing::warn!("Ignoring {}: {e}", config_path.display());
    }

    if cli.init_config {
        if let Err(e) = config.save(&config_path) {
            tracing::error!("Failed to write {}: {e}", config_path.display());
            std::process::exit(1);
        }
        tracing::info!("Wrote {}", config_path.display());
        return;
    }

    if let Err(e) = run(config) {
        tracing::error!("Console failed: {e}");
        std::process::exit(1);
    }
}

fn run(config: ConsoleConfig) -> std::io::Result<()> {
    let catalog = match &config.catalog {
        Some(path) => match Catalog::load(path) {
            Ok(catalog) => {
                for diagnostic in catalog.diagnostics() {
                    println!("warning: {diagnostic}");
                }
                catalog
            }
            Err(e) => {
                tracing::error!("Failed to load catalog {}: {e}", path.display());
                println!("error: {e}; using built-in catalog");
                Catalog::builtin()
            }
        },
        None => Catalog::builtin(),
    };

    let mut editor = GraphEditor::new(Arc::new(catalog), |line: &str| println!("{line}"));
    if let Some(path) = &config.autoload {
        // Failures are reported to the console and the session starts empty
        let _ = editor.load(path);
    }

    let mut console = Console::new(editor, config);
    let stdin = std::io::stdin();
    console.run(stdin.lock(), std::io::stdout())?;
    tracing::info!(
        "Exiting with {} nodes",
        console.editor().graph().node_count()
    );
    Ok(())
}
