pub mod config;
pub mod convert;
pub mod convert_manager;
pub mod mark;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "ledgerkit",
    about = "Order register marker and markdown ledger converter."
)]
pub struct Cli {
    /// Diagnostic log level on stderr: error, warn, info, debug, trace
    #[arg(long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// True when the command will take over the terminal.
    pub fn is_interactive(&self) -> bool {
        matches!(
            &self.command,
            Commands::Convert { input, no_gui, .. } if !(*no_gui && input.is_some())
        )
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Mark order rows as new (新增) or existing (存量) customers.
    Mark {
        /// Workbook to process (default: the .xlsx file in the current directory)
        file: Option<String>,
        /// Worksheet name
        #[arg(short, long, default_value = "Sheet1")]
        sheet: String,
        /// Output path (default: overwrite the input)
        #[arg(short, long)]
        output: Option<String>,
        /// First day of the new-customer window: YYYY-MM-DD
        #[arg(long)]
        cutoff: Option<String>,
    },
    /// Convert a markdown transaction log into a workbook.
    Convert {
        /// Markdown file to convert
        input: Option<String>,
        /// Output workbook path (interactive mode: output directory)
        #[arg(short, long)]
        output: Option<String>,
        /// Configuration file (JSON)
        #[arg(short, long)]
        config: Option<String>,
        /// Run without the interactive screen (requires INPUT)
        #[arg(long = "no-gui")]
        no_gui: bool,
        /// Skip the summary sheets
        #[arg(long = "no-summary")]
        no_summary: bool,
    },
    /// Manage converter configuration files.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write the built-in configuration to a file.
    Init {
        /// Destination path, e.g. converter.json
        path: String,
    },
    /// Print the effective configuration.
    Show {
        /// Configuration file to load (default: built-in)
        #[arg(short, long)]
        config: Option<String>,
    },
}
