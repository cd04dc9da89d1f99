mod cli;
mod error;
mod exporter;
mod fmt;
mod marker;
mod models;
mod parser;
mod settings;
mod tui;
mod workbook;

use std::io::stderr;

use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use cli::{Cli, Commands, ConfigCommands};

fn main() {
    let cli = Cli::parse();

    // The interactive screen owns the terminal, so it logs nothing unless asked.
    let default_level = if cli.is_interactive() {
        LevelFilter::OFF
    } else {
        LevelFilter::WARN
    };
    let level = cli
        .log_level
        .as_deref()
        .map(|l| parse_log_level(l, default_level))
        .unwrap_or(default_level);
    setup_logging(level);

    let result = match cli.command {
        Commands::Mark {
            file,
            sheet,
            output,
            cutoff,
        } => cli::mark::run(file, &sheet, output, cutoff),
        Commands::Convert {
            input,
            output,
            config,
            no_gui,
            no_summary,
        } => cli::convert::run(input, output, config, no_gui, no_summary),
        Commands::Config { command } => match command {
            ConfigCommands::Init { path } => cli::config::init(&path),
            ConfigCommands::Show { config } => cli::config::show(config.as_deref()),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn parse_log_level(level: &str, fallback: LevelFilter) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "info" => LevelFilter::INFO,
        "warn" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        "off" => LevelFilter::OFF,
        _ => {
            eprintln!("Invalid log level '{level}', defaulting to '{fallback}'");
            fallback
        }
    }
}

fn setup_logging(level: LevelFilter) {
    let terminal_log = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(stderr)
        .with_filter(level);

    tracing_subscriber::registry().with(terminal_log).init();
}
