use std::collections::BTreeMap;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Range, Reader};
use rust_xlsxwriter::{Color, Format, FormatPattern, Workbook, Worksheet};
use tracing::{debug, info};

use crate::error::{LedgerError, Result};

const DATE_FORMAT: &str = "yyyy-mm-dd";
const DATETIME_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    /// Excel serial date-time (days since 1899-12-30).
    DateTime(f64),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Text shown for the cell, used for display widths and previews.
    pub fn display(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Text(s) => s.clone(),
            Self::Number(n) => n.to_string(),
            Self::Bool(b) => b.to_string().to_uppercase(),
            Self::DateTime(serial) => crate::fmt::excel_serial_to_datetime(*serial)
                .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default(),
        }
    }
}

impl From<&Data> for CellValue {
    fn from(data: &Data) -> Self {
        match data {
            Data::Int(i) => Self::Number(*i as f64),
            Data::Float(f) => Self::Number(*f),
            Data::String(s) => Self::Text(s.clone()),
            Data::Bool(b) => Self::Bool(*b),
            Data::DateTime(dt) => Self::DateTime(dt.as_f64()),
            Data::DateTimeIso(s) | Data::DurationIso(s) => Self::Text(s.clone()),
            _ => Self::Empty,
        }
    }
}

static EMPTY_CELL: CellValue = CellValue::Empty;

/// In-memory worksheet: a dense value grid plus the formatting this tool
/// writes (solid fills, a bold header row, column widths).
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    pub name: String,
    rows: Vec<Vec<CellValue>>,
    fills: BTreeMap<(u32, u16), u32>,
    header_row: Option<u32>,
    column_widths: BTreeMap<u16, f64>,
}

impl Sheet {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn height(&self) -> u32 {
        self.rows.len() as u32
    }

    /// Number of columns spanned by the widest row.
    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn get(&self, row: u32, col: u16) -> &CellValue {
        self.rows
            .get(row as usize)
            .and_then(|r| r.get(col as usize))
            .unwrap_or(&EMPTY_CELL)
    }

    pub fn set(&mut self, row: u32, col: u16, value: CellValue) {
        let (r, c) = (row as usize, col as usize);
        if self.rows.len() <= r {
            self.rows.resize_with(r + 1, Vec::new);
        }
        let cells = &mut self.rows[r];
        if cells.len() <= c {
            cells.resize(c + 1, CellValue::Empty);
        }
        cells[c] = value;
    }

    /// Append a row below the current last row.
    pub fn push_row(&mut self, values: Vec<CellValue>) {
        self.rows.push(values);
    }

    pub fn set_fill(&mut self, row: u32, col: u16, rgb: Option<u32>) {
        match rgb {
            Some(rgb) => self.fills.insert((row, col), rgb),
            None => self.fills.remove(&(row, col)),
        };
    }

    pub fn fill(&self, row: u32, col: u16) -> Option<u32> {
        self.fills.get(&(row, col)).copied()
    }

    pub fn set_header_row(&mut self, row: u32) {
        self.header_row = Some(row);
    }

    pub fn set_column_width(&mut self, col: u16, width: f64) {
        self.column_widths.insert(col, width);
    }

    pub fn column_width(&self, col: u16) -> Option<f64> {
        self.column_widths.get(&col).copied()
    }

    fn cell_format(&self, row: u32, col: u16, value: &CellValue) -> Option<Format> {
        let mut format = match value {
            CellValue::DateTime(serial) if serial.fract() == 0.0 => {
                Some(Format::new().set_num_format(DATE_FORMAT))
            }
            CellValue::DateTime(_) => Some(Format::new().set_num_format(DATETIME_FORMAT)),
            _ => None,
        };
        if let Some(rgb) = self.fill(row, col) {
            format = Some(
                format
                    .unwrap_or_else(Format::new)
                    .set_background_color(Color::RGB(rgb))
                    .set_pattern(FormatPattern::Solid),
            );
        }
        if self.header_row == Some(row) {
            format = Some(format.unwrap_or_else(Format::new).set_bold());
        }
        format
    }
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Read the values of every worksheet of an `.xlsx`/`.xls`/`.ods` file,
/// keeping absolute cell positions so row and column indexes match the
/// spreadsheet.
pub fn read_workbook(path: &Path) -> Result<Vec<Sheet>> {
    let mut workbook = open_workbook_auto(path)?;
    let names: Vec<String> = workbook.sheet_names().to_vec();
    let mut sheets = Vec::with_capacity(names.len());

    for name in &names {
        let range = workbook.worksheet_range(name)?;
        let mut sheet = Sheet::new(name);
        for_each_cell(&range, |row, col, data| {
            let value = CellValue::from(data);
            if !value.is_empty() {
                sheet.set(row, col, value);
            }
        });
        debug!(sheet = %name, rows = sheet.height(), cols = sheet.width(), "read sheet");
        sheets.push(sheet);
    }

    info!(path = %path.display(), sheets = sheets.len(), "loaded workbook");
    Ok(sheets)
}

fn for_each_cell<F>(range: &Range<Data>, mut f: F)
where
    F: FnMut(u32, u16, &Data),
{
    let (Some((start_row, start_col)), Some((end_row, end_col))) = (range.start(), range.end())
    else {
        return;
    };
    for row in start_row..=end_row {
        for col in start_col..=end_col {
            if let Some(value) = range.get_value((row, col)) {
                f(row, col as u16, value);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

pub fn save_workbook(sheets: &[Sheet], path: &Path) -> Result<()> {
    let mut workbook = Workbook::new();
    for sheet in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(&sheet.name)?;
        write_sheet(worksheet, sheet)?;
    }
    workbook.save(path)?;
    info!(path = %path.display(), sheets = sheets.len(), "saved workbook");
    Ok(())
}

fn write_sheet(worksheet: &mut Worksheet, sheet: &Sheet) -> Result<()> {
    for col in 0..sheet.width() as u16 {
        if let Some(width) = sheet.column_width(col) {
            worksheet.set_column_width(col, width)?;
        }
    }

    for (r, cells) in sheet.rows.iter().enumerate() {
        let row = r as u32;
        for (c, value) in cells.iter().enumerate() {
            let col = c as u16;
            let format = sheet.cell_format(row, col, value);
            match (value, format.as_ref()) {
                (CellValue::Empty, Some(f)) => {
                    worksheet.write_blank(row, col, f)?;
                }
                (CellValue::Empty, None) => {}
                (CellValue::Text(s), Some(f)) => {
                    worksheet.write_string_with_format(row, col, s, f)?;
                }
                (CellValue::Text(s), None) => {
                    worksheet.write_string(row, col, s)?;
                }
                (CellValue::Number(n) | CellValue::DateTime(n), Some(f)) => {
                    worksheet.write_number_with_format(row, col, *n, f)?;
                }
                (CellValue::Number(n) | CellValue::DateTime(n), None) => {
                    worksheet.write_number(row, col, *n)?;
                }
                (CellValue::Bool(b), Some(f)) => {
                    worksheet.write_boolean_with_format(row, col, *b, f)?;
                }
                (CellValue::Bool(b), None) => {
                    worksheet.write_boolean(row, col, *b)?;
                }
            }
        }
    }

    // Fills on cells that hold no value.
    for (&(row, col), _) in sheet.fills.iter() {
        if sheet.get(row, col).is_empty() {
            if let Some(f) = sheet.cell_format(row, col, &CellValue::Empty) {
                worksheet.write_blank(row, col, &f)?;
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// In-place editing
// ---------------------------------------------------------------------------

/// Copy one column of `sheet` into the workbook at `source` and save it to
/// `dest`. Everything else in the file (merges, widths, fonts, borders,
/// number formats, formulas, other sheets) is kept as it was. Empty values
/// clear the cell; cells without a fill in `sheet` keep their own fill.
pub fn write_back_column(
    source: &Path,
    dest: &Path,
    sheet: &Sheet,
    col: u16,
    first_row: u32,
) -> Result<()> {
    let mut book = umya_spreadsheet::reader::xlsx::read(source)?;
    let target = book
        .get_sheet_by_name_mut(&sheet.name)
        .ok_or_else(|| LedgerError::SheetNotFound(sheet.name.clone()))?;

    let x = col as u32 + 1;
    for row in first_row..sheet.height() {
        let y = row + 1;
        target
            .get_cell_mut((x, y))
            .set_value(sheet.get(row, col).display());
        if let Some(rgb) = sheet.fill(row, col) {
            target
                .get_style_mut((x, y))
                .set_background_color(format!("FF{rgb:06X}"));
        }
    }

    umya_spreadsheet::writer::xlsx::write(&book, dest)?;
    info!(path = %dest.display(), sheet = %sheet.name, column = col, "wrote column back");
    Ok(())
}
