//! lofi command line tool
//!
//! Opens a local workspace and runs commands against it, either once or in
//! an interactive REPL.
//!
//! # Usage
//!
//! ```bash
//! # In-memory workspace
//! lofi --package package.json
//!
//! # Persistent workspace
//! lofi --package package.json --db ~/.lofi/workspace.db
//!
//! # Execute single command
//! lofi --package package.json --db workspace.db -c "DOCS todos"
//!
//! # With configuration file
//! lofi --config /etc/lofi/lofi.toml
//! ```

mod commands;
mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use config::Config;
use lofi_sdk::Sdk;

/// lofi - local-first replicated documents
#[derive(Parser, Debug)]
#[command(name = "lofi")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// SQLite workspace path (default: in-memory only)
    #[arg(long, env = "LOFI_DB")]
    db: Option<PathBuf>,

    /// JSON package descriptor with the document schemas
    #[arg(short, long, env = "LOFI_PACKAGE")]
    package: Option<PathBuf>,

    /// Configuration file path
    #[arg(long, env = "LOFI_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOFI_LOG_LEVEL")]
    log_level: Option<String>,

    /// Execute command and exit
    #[arg(short, long)]
    command: Option<String>,

    /// Quiet mode (no banner)
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    // Initialize logging
    let log_level = args
        .log_level
        .or(config.log_level)
        .unwrap_or_else(|| "warn".to_string());
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let package_path = args
        .package
        .or(config.package)
        .context("No package descriptor given (use --package or LOFI_PACKAGE)")?;
    let package = std::fs::read(&package_path)
        .with_context(|| format!("Failed to read package {}", package_path.display()))?;

    let db = args.db.or(config.db);
    let sdk = match &db {
        Some(path) => Sdk::create_persistent(path, &package)
            .with_context(|| format!("Failed to open workspace {}", path.display()))?,
        None => {
            info!("Running in-memory only (no --db specified)");
            Sdk::create_memory(&package)?
        }
    };

    // Single command mode
    if let Some(cmd) = args.command {
        let reply = commands::execute(&sdk, &cmd)?;
        println!("{}", reply.render());
        return Ok(());
    }

    if !args.quiet {
        print_banner(&sdk, db.as_deref());
    }

    // Interactive mode
    let mut rl = DefaultEditor::new()?;
    let history_path = home_dir()
        .map(|p| p.join(".lofi_history"))
        .unwrap_or_default();

    let _ = rl.load_history(&history_path);

    loop {
        let prompt = format!("{}> ", "lofi".green());
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                match line.to_uppercase().as_str() {
                    "QUIT" | "EXIT" => break,
                    "HELP" => {
                        commands::print_help();
                        continue;
                    }
                    "CLEAR" => {
                        print!("\x1B[2J\x1B[1;1H");
                        continue;
                    }
                    _ => {}
                }

                match commands::execute(&sdk, line) {
                    Ok(reply) => println!("{}", reply.render()),
                    Err(e) => eprintln!("{} {:#}", "Error:".red(), e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    let _ = rl.save_history(&history_path);
    Ok(())
}

fn print_banner(sdk: &Sdk, db: Option<&std::path::Path>) {
    let storage = db
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "in-memory".to_string());
    println!(
        "{}",
        format!(
            r#"
  lofi {}
  Peer {}
  Workspace {}
  Type 'help' for commands, 'quit' to exit
"#,
            env!("CARGO_PKG_VERSION"),
            sdk.peer_id(),
            storage
        )
        .cyan()
    );
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}
