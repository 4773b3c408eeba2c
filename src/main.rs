//! Ticketwatch CLI - live support-ticket dashboard.

use std::process;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use ticketwatch::Error;
use ticketwatch::cli::{Cli, Commands, ConfigCommands};
use ticketwatch::commands::{self, Output, WatchOptions};
use ticketwatch::config::{self, OutputFormat};

fn main() {
    let cli = Cli::parse();
    let human = cli.human_readable;

    // The dashboard owns the terminal and logs to a file instead.
    if !owns_terminal(&cli.command) {
        init_logging(&cli.log_level, cli.log_json);
    }

    if let Err(e) = run(cli) {
        if human {
            eprintln!("Error: {}", e);
        } else {
            eprintln!("{}", serde_json::json!({ "error": e.to_string() }));
        }
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Error> {
    let dir = config::config_dir(cli.config_dir.as_deref())?;
    let path = config::config_path(&dir);
    let overrides = cli.overrides();

    // Path and set must work even when the current file does not resolve.
    if let Commands::Config { command } = &cli.command {
        match command {
            ConfigCommands::Path => {
                output(&commands::config_path(&path), cli.human_readable);
                return Ok(());
            }
            ConfigCommands::Set { key, value } => {
                let result = commands::config_set(&path, key, value)?;
                output(&result, cli.human_readable);
                return Ok(());
            }
            ConfigCommands::Show => {}
        }
    }

    let file = config::load_config(&path)?;
    let resolved = config::resolve_config(&file, &overrides)?;
    let human = resolved.output_format() == OutputFormat::Human;
    tracing::debug!(config = %path.display(), api = %resolved.api_base.value, "configuration resolved");

    match cli.command {
        Commands::Config { .. } => {
            output(&commands::config_show(&path, &resolved), human);
        }
        Commands::Tickets { category, limit } => {
            let list = block_on(commands::tickets(&resolved, category.as_deref(), limit))??;
            output(&list, human);
        }
        Commands::Show { id } => {
            let detail = block_on(commands::show(&resolved, &id))??;
            output(&detail, human);
        }
        Commands::Watch {
            max_events,
            duration_secs,
        } => {
            let options = WatchOptions {
                max_events,
                duration: duration_secs.map(Duration::from_secs),
            };
            let summary = block_on(commands::watch(&resolved, options, |line| {
                output(line, human)
            }))??;
            output(&summary, human);
        }
        #[cfg(feature = "tui")]
        Commands::Tui => {
            let notifier = commands::notifier_for(resolved.notifications.value);
            block_on(ticketwatch::tui::run_tui(
                resolved.session_config(),
                notifier,
                &cli.log_level,
            ))??;
        }
    }

    Ok(())
}

fn owns_terminal(command: &Commands) -> bool {
    match command {
        #[cfg(feature = "tui")]
        Commands::Tui => true,
        _ => false,
    }
}

/// Install the stderr subscriber.
fn init_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

/// Run a future to completion on a fresh multi-threaded runtime.
fn block_on<F: Future>(future: F) -> Result<F::Output, Error> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Other(format!("Failed to create runtime: {}", e)))?;
    Ok(runtime.block_on(future))
}

/// Print output in JSON or human-readable format.
fn output<T: Output>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}
