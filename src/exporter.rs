use std::collections::BTreeMap;
use std::path::Path;

use tracing::info;
use unicode_width::UnicodeWidthStr;

use crate::error::{LedgerError, Result};
use crate::fmt::first_decimal;
use crate::models::{TransactionRecord, AMOUNT_FIELD, AMOUNT_VALUE_COLUMN, DATE_FIELD, NAME_FIELD, PAYMENT_FIELD};
use crate::settings::{ConverterConfig, OutputSettings};
use crate::workbook::{save_workbook, CellValue, Sheet};

const MAX_COLUMN_WIDTH: usize = 50;
const COUNT_HEADER: &str = "交易笔数";
const TOTAL_HEADER: &str = "总金额";

/// Numeric value of an amount string: commas removed, first decimal number,
/// 0.0 when there is none.
pub fn clean_amount(raw: &str) -> f64 {
    first_decimal(&raw.replace(',', "")).unwrap_or(0.0)
}

/// Column names in first-seen order across all records.
pub fn columns(records: &[TransactionRecord]) -> Vec<String> {
    let mut cols: Vec<String> = Vec::new();
    for name in records.iter().flat_map(|r| r.field_names()) {
        if !cols.iter().any(|c| c == name) {
            cols.push(name.to_string());
        }
    }
    cols
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupTotal {
    pub key: String,
    pub count: usize,
    pub total: f64,
}

/// Count and amount sum per distinct value of `field`, keys sorted.
pub fn summarize_by(records: &[TransactionRecord], field: &str) -> Vec<GroupTotal> {
    let mut groups: BTreeMap<&str, (usize, f64)> = BTreeMap::new();
    for record in records {
        let entry = groups.entry(record.value(field)).or_default();
        entry.0 += 1;
        entry.1 += clean_amount(record.value(AMOUNT_FIELD));
    }
    groups
        .into_iter()
        .map(|(key, (count, total))| GroupTotal {
            key: key.to_string(),
            count,
            total,
        })
        .collect()
}

fn text_cell(s: &str) -> CellValue {
    if s.is_empty() {
        CellValue::Empty
    } else {
        CellValue::Text(s.to_string())
    }
}

pub fn build_primary_sheet(records: &[TransactionRecord], settings: &OutputSettings) -> Sheet {
    let cols = columns(records);
    let with_amount = cols.iter().any(|c| c == AMOUNT_FIELD);

    let mut sheet = Sheet::new(&settings.sheet_name);
    let mut header: Vec<CellValue> = cols.iter().map(|c| text_cell(c)).collect();
    if with_amount {
        header.push(text_cell(AMOUNT_VALUE_COLUMN));
    }
    sheet.push_row(header);
    sheet.set_header_row(0);

    for record in records {
        let mut row: Vec<CellValue> = cols.iter().map(|c| text_cell(record.value(c))).collect();
        if with_amount {
            row.push(CellValue::Number(clean_amount(record.value(AMOUNT_FIELD))));
        }
        sheet.push_row(row);
    }

    if settings.auto_resize_columns {
        autosize_columns(&mut sheet);
    }
    sheet
}

/// Widest displayed value per column plus padding, capped.
fn autosize_columns(sheet: &mut Sheet) {
    let width = sheet.width();
    for col in 0..width as u16 {
        let longest = (0..sheet.height())
            .map(|row| sheet.get(row, col).display().width())
            .max()
            .unwrap_or(0);
        let chars = (longest + 2).min(MAX_COLUMN_WIDTH);
        sheet.set_column_width(col, chars as f64);
    }
}

fn summary_sheet(name: &str, key_header: &str, groups: &[GroupTotal]) -> Sheet {
    let mut sheet = Sheet::new(name);
    sheet.push_row(vec![
        text_cell(key_header),
        text_cell(COUNT_HEADER),
        text_cell(TOTAL_HEADER),
    ]);
    sheet.set_header_row(0);
    for g in groups {
        sheet.push_row(vec![
            text_cell(&g.key),
            CellValue::Number(g.count as f64),
            CellValue::Number(g.total),
        ]);
    }
    sheet
}

/// Build every output sheet. Fails with `NoData` when there is nothing to export.
pub fn build_sheets(records: &[TransactionRecord], config: &ConverterConfig) -> Result<Vec<Sheet>> {
    if records.is_empty() {
        return Err(LedgerError::NoData);
    }
    let settings = &config.output_settings;
    let cols = columns(records);
    let has = |name: &str| cols.iter().any(|c| c == name);

    let mut sheets = vec![build_primary_sheet(records, settings)];

    if settings.include_summary && has(AMOUNT_FIELD) {
        let groupings = [
            ("按日期汇总", DATE_FIELD, DATE_FIELD),
            ("按支付方式汇总", PAYMENT_FIELD, PAYMENT_FIELD),
            ("按客户汇总", NAME_FIELD, "客户姓名"),
        ];
        for (sheet_name, field, key_header) in groupings {
            if has(field) {
                sheets.push(summary_sheet(sheet_name, key_header, &summarize_by(records, field)));
            }
        }
    }
    Ok(sheets)
}

pub fn export_records(records: &[TransactionRecord], config: &ConverterConfig, path: &Path) -> Result<()> {
    let sheets = build_sheets(records, config)?;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    save_workbook(&sheets, path)?;
    info!(path = %path.display(), records = records.len(), sheets = sheets.len(), "exported records");
    Ok(())
}
