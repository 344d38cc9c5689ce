//! Excel workbook reader
//!
//! Reads `.xlsx`, `.xlsm`, `.xls` and `.ods` files. Values are the cached
//! results stored in the file; formulas are never evaluated. Workbooks
//! exported without recalculation can carry formula cells whose cached value
//! is missing or zero, so [`formula_warnings`] reports them and
//! [`Workbook::summary`] attaches a warning when any sheet has some.

use anyhow::{Context, Result};
use calamine::{open_workbook_auto, Data, DataType, Range, Reader, Sheets};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

use crate::error::ToolError;

/// Formula samples kept per sheet
const MAX_FORMULA_SAMPLES: usize = 5;

pub const FORMULA_WARNING: &str = "FORMULA WARNING: Some cells contain formulas without cached results. \
Values may be missing or incorrect. Consider opening in Excel and saving to refresh cached values.";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellInfo {
    pub reference: String,
    pub value: Value,
    pub formula: Option<String>,
}

/// Used range, 1-based and inclusive
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetRange {
    pub start_row: u32,
    pub start_col: u32,
    pub end_row: u32,
    pub end_col: u32,
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormulaSample {
    pub cell: String,
    pub formula: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaWarnings {
    pub has_issues: bool,
    pub total_formulas: usize,
    pub unresolved_formulas: usize,
    pub samples: Vec<FormulaSample>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetSummary {
    pub name: String,
    pub rows: u32,
    pub cols: u32,
    pub formulas: usize,
    pub unresolved_formulas: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkbookSummary {
    pub sheet_count: usize,
    pub sheets: Vec<SheetSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

// ============================================================
// Cell Helpers
// ============================================================

/// Column letters for a 0-based column index (0 → A, 26 → AA)
pub fn column_name(col: u32) -> String {
    let mut n = col + 1;
    let mut name = Vec::new();
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        name.push(b'A' + rem);
        n = (n - 1) / 26;
    }
    name.reverse();
    String::from_utf8_lossy(&name).into_owned()
}

/// A1 reference for 0-based coordinates
pub fn cell_reference(row: u32, col: u32) -> String {
    format!("{}{}", column_name(col), row + 1)
}

/// Parse an A1 reference into 0-based `(row, col)`
pub fn parse_cell_reference(reference: &str) -> Result<(u32, u32), ToolError> {
    let invalid = || ToolError::InvalidArgument(format!("Invalid cell reference: {}", reference));
    let reference = reference.trim().replace('$', "");

    let split = reference
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(invalid)?;
    let (letters, digits) = reference.split_at(split);
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(invalid());
    }

    let row: u32 = digits.parse().map_err(|_| invalid())?;
    if row == 0 {
        return Err(invalid());
    }

    let col = letters
        .to_ascii_uppercase()
        .bytes()
        .try_fold(0u32, |acc, b| acc.checked_mul(26)?.checked_add(u32::from(b - b'A' + 1)))
        .ok_or_else(invalid)?;

    Ok((row - 1, col - 1))
}

/// JSON rendering of a cell; empty cells become null
pub fn cell_value(data: &Data) -> Value {
    match data {
        Data::Empty => Value::Null,
        Data::Int(i) => Value::from(*i),
        Data::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Data::String(s) => Value::String(s.clone()),
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(_) => data
            .as_datetime()
            .map(|dt| Value::String(dt.format("%Y-%m-%dT%H:%M:%S").to_string()))
            .unwrap_or(Value::Null),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::String(s.clone()),
        Data::Error(e) => Value::String(format!("#{:?}", e)),
    }
}

fn header_name(data: &Data, index: usize) -> String {
    match data {
        Data::Empty => {
            if index == 0 {
                "__EMPTY".to_string()
            } else {
                format!("__EMPTY_{}", index)
            }
        }
        Data::String(s) => s.clone(),
        other => match cell_value(other) {
            Value::String(s) => s,
            value => value.to_string(),
        },
    }
}

fn is_blank_row(row: &[Data]) -> bool {
    row.iter().all(|c| matches!(c, Data::Empty))
}

// ============================================================
// Sheet Functions
// ============================================================

/// Rows keyed by the first row's headers. Blank rows are skipped.
pub fn sheet_rows(range: &Range<Data>) -> Vec<Map<String, Value>> {
    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Vec::new();
    };
    let headers: Vec<String> = header_row
        .iter()
        .enumerate()
        .map(|(i, cell)| header_name(cell, i))
        .collect();

    rows.filter(|row| !is_blank_row(row))
        .map(|row| {
            headers
                .iter()
                .zip(row.iter())
                .map(|(header, cell)| (header.clone(), cell_value(cell)))
                .collect()
        })
        .collect()
}

/// Every non-blank row as an array of values
pub fn sheet_array(range: &Range<Data>) -> Vec<Vec<Value>> {
    range
        .rows()
        .filter(|row| !is_blank_row(row))
        .map(|row| row.iter().map(cell_value).collect())
        .collect()
}

pub fn used_range(range: &Range<Data>) -> Option<SheetRange> {
    let (start, end) = (range.start()?, range.end()?);
    Some(SheetRange {
        start_row: start.0 + 1,
        start_col: start.1 + 1,
        end_row: end.0 + 1,
        end_col: end.1 + 1,
        reference: format!("{}:{}", cell_reference(start.0, start.1), cell_reference(end.0, end.1)),
    })
}

/// Value and formula at an A1 reference; cells outside the range are null
pub fn cell_at(values: &Range<Data>, formulas: &Range<String>, reference: &str) -> Result<CellInfo, ToolError> {
    let position = parse_cell_reference(reference)?;
    let value = values.get_value(position).map(cell_value).unwrap_or(Value::Null);
    let formula = formulas
        .get_value(position)
        .filter(|f| !f.is_empty())
        .cloned();

    Ok(CellInfo {
        reference: cell_reference(position.0, position.1),
        value,
        formula,
    })
}

/// A formula cell whose cached value is empty or zero
fn is_unresolved(value: Option<&Data>) -> bool {
    match value {
        None | Some(Data::Empty) | Some(Data::Int(0)) => true,
        Some(Data::Float(f)) => *f == 0.0,
        Some(_) => false,
    }
}

/// Count formula cells and sample the ones without a usable cached value
pub fn formula_warnings(values: &Range<Data>, formulas: &Range<String>) -> FormulaWarnings {
    let Some((row0, col0)) = formulas.start() else {
        return FormulaWarnings::default();
    };

    let mut warnings = FormulaWarnings::default();
    for (row, col, formula) in formulas.used_cells() {
        if formula.is_empty() {
            continue;
        }
        let position = (row0 + row as u32, col0 + col as u32);
        warnings.total_formulas += 1;

        if is_unresolved(values.get_value(position)) {
            warnings.unresolved_formulas += 1;
            if warnings.samples.len() < MAX_FORMULA_SAMPLES {
                warnings.samples.push(FormulaSample {
                    cell: cell_reference(position.0, position.1),
                    formula: formula.clone(),
                });
            }
        }
    }
    warnings.has_issues = warnings.unresolved_formulas > 0;
    warnings
}

pub fn summarize_sheets(sheets: Vec<SheetSummary>) -> WorkbookSummary {
    let has_issues = sheets.iter().any(|s| s.unresolved_formulas > 0);
    WorkbookSummary {
        sheet_count: sheets.len(),
        sheets,
        warning: has_issues.then(|| FORMULA_WARNING.to_string()),
    }
}

// ============================================================
// Workbook
// ============================================================

/// An open workbook
pub struct Workbook {
    sheets: Sheets<BufReader<File>>,
}

impl Workbook {
    pub fn open(path: &Path) -> Result<Self> {
        let sheets = open_workbook_auto(path)
            .with_context(|| format!("Failed to open workbook {}", path.display()))?;
        debug!(path = %path.display(), "Opened workbook");
        Ok(Self { sheets })
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.sheet_names()
    }

    fn check_sheet(&self, name: &str) -> Result<(), ToolError> {
        let names = self.sheet_names();
        if names.iter().any(|n| n == name) {
            Ok(())
        } else {
            Err(ToolError::InvalidArgument(format!(
                "Sheet \"{}\" not found. Available: {}",
                name,
                names.join(", ")
            )))
        }
    }

    pub fn values(&mut self, sheet: &str) -> Result<Range<Data>> {
        self.check_sheet(sheet)?;
        self.sheets
            .worksheet_range(sheet)
            .with_context(|| format!("Failed to read sheet {}", sheet))
    }

    /// Formula text per cell. Formats without formula support yield an empty range.
    pub fn formulas(&mut self, sheet: &str) -> Result<Range<String>> {
        self.check_sheet(sheet)?;
        Ok(self
            .sheets
            .worksheet_formula(sheet)
            .unwrap_or_else(|err| {
                debug!(sheet = %sheet, error = %err, "No formula data");
                Range::empty()
            }))
    }

    pub fn sheet_data(&mut self, sheet: &str) -> Result<Vec<Map<String, Value>>> {
        Ok(sheet_rows(&self.values(sheet)?))
    }

    pub fn sheet_as_array(&mut self, sheet: &str) -> Result<Vec<Vec<Value>>> {
        Ok(sheet_array(&self.values(sheet)?))
    }

    pub fn cell(&mut self, sheet: &str, reference: &str) -> Result<CellInfo> {
        let values = self.values(sheet)?;
        let formulas = self.formulas(sheet)?;
        Ok(cell_at(&values, &formulas, reference)?)
    }

    pub fn sheet_range(&mut self, sheet: &str) -> Result<Option<SheetRange>> {
        Ok(used_range(&self.values(sheet)?))
    }

    pub fn formula_warnings(&mut self, sheet: &str) -> Result<FormulaWarnings> {
        let values = self.values(sheet)?;
        let formulas = self.formulas(sheet)?;
        Ok(formula_warnings(&values, &formulas))
    }

    /// Sheet sizes and formula counts, with a warning if any cached values look stale
    pub fn summary(&mut self) -> Result<WorkbookSummary> {
        let mut sheets = Vec::new();
        for name in self.sheet_names() {
            let values = self.values(&name)?;
            let formulas = self.formulas(&name)?;
            let warnings = formula_warnings(&values, &formulas);
            let (rows, cols) = values.end().map(|(r, c)| (r + 1, c + 1)).unwrap_or((0, 0));

            sheets.push(SheetSummary {
                name,
                rows,
                cols,
                formulas: warnings.total_formulas,
                unresolved_formulas: warnings.unresolved_formulas,
            });
        }
        Ok(summarize_sheets(sheets))
    }
}
