use std::collections::HashSet;

use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, info};

use crate::error::{LedgerError, Result};
use crate::fmt::excel_serial_to_datetime;
use crate::models::CustomerType;
use crate::workbook::{CellValue, Sheet};

/// Fixed positions of the order register (0-based rows and columns).
#[derive(Debug, Clone, Copy)]
pub struct SheetLayout {
    pub header_row: u32,
    pub first_data_row: u32,
    pub date_col: u16,
    pub id_col: u16,
    pub mark_col: u16,
    pub min_columns: usize,
}

impl Default for SheetLayout {
    fn default() -> Self {
        // Row 1 title, row 2 headers; C = created, G = customer ID, T = mark.
        Self {
            header_row: 1,
            first_data_row: 2,
            date_col: 2,
            id_col: 6,
            mark_col: 19,
            min_columns: 20,
        }
    }
}

pub fn default_cutoff() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRow {
    pub row: u32,
    pub created: Option<NaiveDateTime>,
    pub customer_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkSummary {
    pub new: usize,
    pub existing: usize,
    pub unlabeled: usize,
    pub prior_customers: usize,
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%Y年%m月%d日"];

/// Interpret an order creation cell. Anything unparseable is treated as missing.
pub fn parse_order_date(value: &CellValue) -> Option<NaiveDateTime> {
    match value {
        CellValue::DateTime(serial) | CellValue::Number(serial) => excel_serial_to_datetime(*serial),
        CellValue::Text(s) => parse_date_text(s),
        CellValue::Empty | CellValue::Bool(_) => None,
    }
}

fn parse_date_text(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Normalize an identifier cell; numbers lose a trailing `.0`.
pub fn parse_customer_id(value: &CellValue) -> Option<String> {
    let id = match value {
        CellValue::Empty => return None,
        CellValue::Text(s) => s.trim().to_string(),
        CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
        other => other.display(),
    };
    (!id.is_empty()).then_some(id)
}

pub fn validate_columns(sheet: &Sheet, layout: &SheetLayout) -> Result<()> {
    let found = sheet.width();
    if found < layout.min_columns {
        return Err(LedgerError::InsufficientColumns {
            found,
            required: layout.min_columns,
        });
    }
    Ok(())
}

pub fn read_orders(sheet: &Sheet, layout: &SheetLayout) -> Vec<OrderRow> {
    (layout.first_data_row..sheet.height())
        .map(|row| OrderRow {
            row,
            created: parse_order_date(sheet.get(row, layout.date_col)),
            customer_id: parse_customer_id(sheet.get(row, layout.id_col)),
        })
        .collect()
}

/// Identifiers seen on any order dated strictly before the cutoff.
pub fn prior_customers(rows: &[OrderRow], cutoff: NaiveDateTime) -> HashSet<&str> {
    rows.iter()
        .filter(|r| r.created.is_some_and(|d| d < cutoff))
        .filter_map(|r| r.customer_id.as_deref())
        .collect()
}

/// Label every row. Rows without a date or an identifier get `None`.
pub fn classify(rows: &[OrderRow], cutoff: NaiveDateTime) -> Vec<Option<CustomerType>> {
    let prior = prior_customers(rows, cutoff);
    rows.iter()
        .map(|r| {
            let (Some(created), Some(id)) = (r.created, r.customer_id.as_deref()) else {
                return None;
            };
            if created < cutoff || prior.contains(id) {
                Some(CustomerType::Existing)
            } else {
                Some(CustomerType::New)
            }
        })
        .collect()
}

/// Write labels and fills into the mark column. Unlabeled rows lose any
/// stale label text but keep whatever fill the cell already had.
pub fn apply_labels(
    sheet: &mut Sheet,
    layout: &SheetLayout,
    rows: &[OrderRow],
    labels: &[Option<CustomerType>],
) {
    for (order, label) in rows.iter().zip(labels) {
        match label {
            Some(t) => {
                sheet.set(order.row, layout.mark_col, CellValue::Text(t.label().to_string()));
                sheet.set_fill(order.row, layout.mark_col, Some(t.fill()));
            }
            None => sheet.set(order.row, layout.mark_col, CellValue::Empty),
        }
    }
}

/// Validate, classify and label one order sheet in place.
pub fn mark_sheet(sheet: &mut Sheet, layout: &SheetLayout, cutoff: NaiveDateTime) -> Result<MarkSummary> {
    validate_columns(sheet, layout)?;

    let rows = read_orders(sheet, layout);
    let prior_count = prior_customers(&rows, cutoff).len();
    info!(rows = rows.len(), prior_customers = prior_count, "classifying orders");

    let labels = classify(&rows, cutoff);
    apply_labels(sheet, layout, &rows, &labels);

    let mut summary = MarkSummary {
        prior_customers: prior_count,
        ..MarkSummary::default()
    };
    for (order, label) in rows.iter().zip(&labels) {
        match label {
            Some(CustomerType::New) => summary.new += 1,
            Some(CustomerType::Existing) => summary.existing += 1,
            None => {
                debug!(row = order.row + 1, "missing date or customer id, left unlabeled");
                summary.unlabeled += 1;
            }
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    fn order_sheet(rows: &[(Option<&str>, Option<&str>)]) -> Sheet {
        let layout = SheetLayout::default();
        let mut sheet = Sheet::new("Sheet1");
        sheet.set(0, 0, CellValue::Text("租机登记表".into()));
        for col in 0..20u16 {
            sheet.set(1, col, CellValue::Text(format!("列{col}")));
        }
        for (i, (date, id)) in rows.iter().enumerate() {
            let row = layout.first_data_row + i as u32;
            sheet.set(row, 0, CellValue::Number(i as f64 + 1.0));
            if let Some(d) = date {
                sheet.set(row, layout.date_col, CellValue::Text(d.to_string()));
            }
            if let Some(id) = id {
                sheet.set(row, layout.id_col, CellValue::Text(id.to_string()));
            }
        }
        sheet
    }

    fn mark_at(sheet: &Sheet, i: u32) -> &CellValue {
        let layout = SheetLayout::default();
        sheet.get(layout.first_data_row + i, layout.mark_col)
    }

    #[test]
    fn test_rows_before_cutoff_are_existing() {
        let rows = vec![
            OrderRow { row: 2, created: Some(dt(2024, 12, 31)), customer_id: Some("A".into()) },
            OrderRow { row: 3, created: Some(dt(2023, 1, 1)), customer_id: Some("B".into()) },
        ];
        let labels = classify(&rows, default_cutoff());
        assert_eq!(labels, vec![Some(CustomerType::Existing); 2]);
    }

    #[test]
    fn test_returning_customer_is_existing_and_fresh_is_new() {
        let rows = vec![
            OrderRow { row: 2, created: Some(dt(2024, 6, 1)), customer_id: Some("A".into()) },
            OrderRow { row: 3, created: Some(dt(2025, 2, 1)), customer_id: Some("A".into()) },
            OrderRow { row: 4, created: Some(dt(2025, 1, 1)), customer_id: Some("B".into()) },
            OrderRow { row: 5, created: Some(dt(2025, 3, 1)), customer_id: Some("B".into()) },
        ];
        let labels = classify(&rows, default_cutoff());
        assert_eq!(
            labels,
            vec![
                Some(CustomerType::Existing),
                Some(CustomerType::Existing),
                Some(CustomerType::New),
                Some(CustomerType::New),
            ]
        );
    }

    #[test]
    fn test_missing_date_or_id_is_unlabeled() {
        let rows = vec![
            OrderRow { row: 2, created: None, customer_id: Some("A".into()) },
            OrderRow { row: 3, created: Some(dt(2025, 2, 1)), customer_id: None },
        ];
        assert_eq!(classify(&rows, default_cutoff()), vec![None, None]);
    }

    #[test]
    fn test_undated_row_does_not_seed_prior_set() {
        let rows = vec![
            OrderRow { row: 2, created: None, customer_id: Some("A".into()) },
            OrderRow { row: 3, created: Some(dt(2025, 2, 1)), customer_id: Some("A".into()) },
        ];
        assert!(prior_customers(&rows, default_cutoff()).is_empty());
        assert_eq!(classify(&rows, default_cutoff())[1], Some(CustomerType::New));
    }

    #[test]
    fn test_eighty_existing_twenty_new() {
        let mut data: Vec<(String, String)> = Vec::new();
        for i in 0..50 {
            data.push((format!("2024-{:02}-15", i % 12 + 1), format!("OLD{i:03}")));
        }
        for i in 0..30 {
            data.push((format!("2025-{:02}-10", i % 12 + 1), format!("OLD{:03}", i)));
        }
        for i in 0..20 {
            data.push((format!("2025-{:02}-20", i % 12 + 1), format!("NEW{i:03}")));
        }
        let rows: Vec<(Option<&str>, Option<&str>)> = data
            .iter()
            .map(|(d, id)| (Some(d.as_str()), Some(id.as_str())))
            .collect();
        let mut sheet = order_sheet(&rows);

        let summary = mark_sheet(&mut sheet, &SheetLayout::default(), default_cutoff()).unwrap();
        assert_eq!(summary.existing, 80);
        assert_eq!(summary.new, 20);
        assert_eq!(summary.unlabeled, 0);
        assert_eq!(summary.prior_customers, 50);

        let new_cells = (0..100)
            .filter(|i| mark_at(&sheet, *i) == &CellValue::Text("新增".into()))
            .count();
        assert_eq!(new_cells, 20);
    }

    #[test]
    fn test_mark_sheet_writes_fills_and_clears_stale_text() {
        let mut sheet = order_sheet(&[
            (Some("2024-05-01"), Some("A")),
            (Some("2025-05-01"), Some("Z")),
            (None, Some("A")),
        ]);
        let layout = SheetLayout::default();
        sheet.set(4, layout.mark_col, CellValue::Text("存量".into()));
        sheet.set_fill(4, layout.mark_col, Some(CustomerType::Existing.fill()));

        let summary = mark_sheet(&mut sheet, &layout, default_cutoff()).unwrap();
        assert_eq!(summary, MarkSummary { new: 1, existing: 1, unlabeled: 1, prior_customers: 1 });

        assert_eq!(mark_at(&sheet, 0), &CellValue::Text("存量".into()));
        assert_eq!(sheet.fill(2, layout.mark_col), Some(0xFFEB9C));
        assert_eq!(mark_at(&sheet, 1), &CellValue::Text("新增".into()));
        assert_eq!(sheet.fill(3, layout.mark_col), Some(0xC6EFCE));
        assert_eq!(mark_at(&sheet, 2), &CellValue::Empty);
        // unlabeled rows are not recolored
        assert_eq!(sheet.fill(4, layout.mark_col), Some(0xFFEB9C));
    }

    #[test]
    fn test_marking_is_idempotent() {
        let mut sheet = order_sheet(&[
            (Some("2024-05-01"), Some("A")),
            (Some("2025-05-01"), Some("A")),
            (Some("2025-06-01"), Some("B")),
            (Some("not a date"), Some("C")),
        ]);
        let layout = SheetLayout::default();
        let first = mark_sheet(&mut sheet, &layout, default_cutoff()).unwrap();
        let once: Vec<CellValue> = (0..4).map(|i| mark_at(&sheet, i).clone()).collect();
        let second = mark_sheet(&mut sheet, &layout, default_cutoff()).unwrap();
        let twice: Vec<CellValue> = (0..4).map(|i| mark_at(&sheet, i).clone()).collect();
        assert_eq!(first, second);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_insufficient_columns() {
        let mut sheet = Sheet::new("Sheet1");
        sheet.set(1, 5, CellValue::Text("only six".into()));
        let err = mark_sheet(&mut sheet, &SheetLayout::default(), default_cutoff()).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientColumns { found: 6, required: 20 }));
    }

    #[test]
    fn test_parse_order_date_variants() {
        let expect = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
        for raw in ["2025-01-10", "2025/01/10", "2025.01.10", "2025年01月10日", "2025-01-10 08:15:00"] {
            let parsed = parse_order_date(&CellValue::Text(raw.into())).unwrap();
            assert_eq!(parsed.date(), expect, "{raw}");
        }
        assert_eq!(parse_order_date(&CellValue::DateTime(45667.0)).unwrap().date(), expect);
        assert_eq!(parse_order_date(&CellValue::Text("soon".into())), None);
        assert_eq!(parse_order_date(&CellValue::Text("  ".into())), None);
        assert_eq!(parse_order_date(&CellValue::Empty), None);
    }

    #[test]
    fn test_parse_customer_id() {
        assert_eq!(parse_customer_id(&CellValue::Text(" 110101 ".into())), Some("110101".into()));
        assert_eq!(parse_customer_id(&CellValue::Number(42.0)), Some("42".into()));
        assert_eq!(parse_customer_id(&CellValue::Text("".into())), None);
        assert_eq!(parse_customer_id(&CellValue::Empty), None);
    }
}
