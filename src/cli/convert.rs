use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use colored::Colorize;

use crate::cli::convert_manager;
use crate::error::{LedgerError, Result};
use crate::exporter::export_records;
use crate::models::TransactionRecord;
use crate::parser::parse_markdown;
use crate::settings::{load_config, ConverterConfig};

#[derive(Debug)]
pub struct ConvertReport {
    pub records: usize,
    pub output: PathBuf,
}

pub fn run(
    input: Option<String>,
    output: Option<String>,
    config: Option<String>,
    no_gui: bool,
    no_summary: bool,
) -> Result<()> {
    let mut cfg = match &config {
        Some(path) => load_config(Path::new(path))?,
        None => ConverterConfig::default(),
    };
    if no_summary {
        cfg.output_settings.include_summary = false;
    }

    match input {
        Some(input) if no_gui => {
            let input = PathBuf::from(input);
            let output = output
                .map(PathBuf::from)
                .unwrap_or_else(|| default_output(&input, &cfg, chrono::Local::now().naive_local()));
            let report = convert(&input, &output, &cfg)?;
            println!("{} Converted {}", "\u{2713}".green(), report.output.display());
            println!("{} records", report.records);
            Ok(())
        }
        input => convert_manager::run(cfg, input, output, config),
    }
}

/// Parse a markdown file with the given configuration.
pub fn preview(input: &Path, config: &ConverterConfig) -> Result<Vec<TransactionRecord>> {
    let content = std::fs::read_to_string(input)?;
    parse_markdown(&content, config)
}

/// Parse and export in one step. Nothing is written when no record survives.
pub fn convert(input: &Path, output: &Path, config: &ConverterConfig) -> Result<ConvertReport> {
    let records = preview(input, config)?;
    if records.is_empty() {
        return Err(LedgerError::NoData);
    }
    export_records(&records, config, output)?;
    Ok(ConvertReport {
        records: records.len(),
        output: output.to_path_buf(),
    })
}

/// Output next to the input, named by the configured file name template.
pub fn default_output(input: &Path, config: &ConverterConfig, now: NaiveDateTime) -> PathBuf {
    let dir = input.parent().unwrap_or_else(|| Path::new(""));
    dir.join(config.output_file_name(now))
}
