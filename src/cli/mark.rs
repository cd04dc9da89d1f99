use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::error::{LedgerError, Result};
use crate::fmt::column_letter;
use crate::marker::{default_cutoff, mark_sheet, MarkSummary, SheetLayout};
use crate::models::CustomerType;
use crate::workbook::{read_workbook, write_back_column};

pub fn run(
    file: Option<String>,
    sheet: &str,
    output: Option<String>,
    cutoff: Option<String>,
) -> Result<()> {
    let cutoff = parse_cutoff(cutoff.as_deref())?;
    let path = match file {
        Some(f) => PathBuf::from(f),
        None => {
            let dir = std::env::current_dir()?;
            let candidates = find_workbooks(&dir)?;
            let stdin = std::io::stdin();
            choose_workbook(&dir, candidates, &mut stdin.lock(), &mut std::io::stdout())?
        }
    };
    let output = output.map(PathBuf::from).unwrap_or_else(|| path.clone());
    let layout = SheetLayout::default();

    let marked = mark_file(&path, &output, sheet, &layout, cutoff)?;
    println!("{} Loaded {}", "\u{2713}".green(), path.display());
    println!("  Sheet: {sheet}  Data rows: {}", marked.data_rows);
    println!("{} Saved {}", "\u{2713}".green(), output.display());

    let summary = &marked.summary;
    let mut table = Table::new();
    table.set_header(vec!["Mark", "Fill", "Orders"]);
    table.add_row(vec![
        Cell::new(CustomerType::New.label()),
        Cell::new(format!("#{:06X}", CustomerType::New.fill())),
        Cell::new(summary.new),
    ]);
    table.add_row(vec![
        Cell::new(CustomerType::Existing.label()),
        Cell::new(format!("#{:06X}", CustomerType::Existing.fill())),
        Cell::new(summary.existing),
    ]);
    table.add_row(vec![Cell::new("(unmarked)"), Cell::new(""), Cell::new(summary.unlabeled)]);

    let column = match marked.mark_header.as_str() {
        "" => column_letter(layout.mark_col),
        header => format!("{} ({header})", column_letter(layout.mark_col)),
    };
    println!(
        "\nColumn {column}, customers before {}: {}\n{table}",
        cutoff.format("%Y-%m-%d"),
        summary.prior_customers
    );
    Ok(())
}

#[derive(Debug)]
pub struct MarkedFile {
    pub summary: MarkSummary,
    pub data_rows: u32,
    /// Header text above the mark column, empty when the sheet has none.
    pub mark_header: String,
}

/// Classify the orders of one sheet and write the mark column into `output`.
/// Only the mark column changes; the rest of the workbook is saved as found.
pub fn mark_file(
    input: &Path,
    output: &Path,
    sheet: &str,
    layout: &SheetLayout,
    cutoff: NaiveDateTime,
) -> Result<MarkedFile> {
    require_xlsx(input)?;
    require_xlsx(output)?;

    let mut sheets = read_workbook(input)?;
    let target = sheets
        .iter_mut()
        .find(|s| s.name == sheet)
        .ok_or_else(|| LedgerError::SheetNotFound(sheet.to_string()))?;

    let summary = mark_sheet(target, layout, cutoff)?;
    write_back_column(input, output, target, layout.mark_col, layout.first_data_row)?;

    Ok(MarkedFile {
        summary,
        data_rows: target.height().saturating_sub(layout.first_data_row),
        mark_header: target.get(layout.header_row, layout.mark_col).display(),
    })
}

fn require_xlsx(path: &Path) -> Result<()> {
    let is_xlsx = path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("xlsx"));
    if !is_xlsx {
        return Err(LedgerError::UnsupportedFormat(path.display().to_string()));
    }
    Ok(())
}

fn parse_cutoff(raw: Option<&str>) -> Result<NaiveDateTime> {
    let Some(raw) = raw else {
        return Ok(default_cutoff());
    };
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| LedgerError::InvalidDate(raw.to_string()))
}

/// `.xlsx` files in `dir`, skipping Excel lock files (`~$...`) and test
/// copies (`测试...`), sorted by name.
pub fn find_workbooks(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_xlsx = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("xlsx"));
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if is_xlsx && path.is_file() && !name.starts_with('~') && !name.starts_with("测试") {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

/// Pick one workbook: a single candidate is used directly, several are
/// offered as a numbered list read from `input`.
pub fn choose_workbook<R: BufRead, W: Write>(
    dir: &Path,
    mut candidates: Vec<PathBuf>,
    input: &mut R,
    out: &mut W,
) -> Result<PathBuf> {
    match candidates.len() {
        0 => Err(LedgerError::NoWorkbook(dir.display().to_string())),
        1 => {
            let path = candidates.remove(0);
            writeln!(out, "Using {}\n", path.display())?;
            Ok(path)
        }
        n => {
            writeln!(out, "Several workbooks found:")?;
            for (i, path) in candidates.iter().enumerate() {
                let name = path.file_name().map(|s| s.to_string_lossy()).unwrap_or_default();
                writeln!(out, "  {}. {name}", i + 1)?;
            }
            write!(out, "\nSelect 1-{n}: ")?;
            out.flush()?;

            let mut line = String::new();
            input.read_line(&mut line)?;
            let choice: usize = line.trim().parse().map_err(|_| LedgerError::Cancelled)?;
            if !(1..=n).contains(&choice) {
                return Err(LedgerError::Cancelled);
            }
            let path = candidates.swap_remove(choice - 1);
            writeln!(out, "Selected {}\n", path.display())?;
            Ok(path)
        }
    }
}
