use csv::Writer;
use rust_decimal::prelude::ToPrimitive;
use rust_xlsxwriter::{Format, Workbook};
use tracing::info;

use crate::errors::CoreError;
use crate::gateway::traits::ExportRow;
use crate::models::budget::BudgetSnapshot;
use crate::models::month::MonthKey;

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";

/// Worksheet holding the exported expenses.
pub const SHEET_NAME: &str = "Kiadások";

const SNAPSHOT_HEADER: [&str; 6] = ["Id", "Date", "Description", "Category", "Amount", "Currency"];

/// Spreadsheet flavour of an export. Excel workbooks are the default;
/// CSV is kept for tools that cannot read them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExportFormat {
    #[default]
    Xlsx,
    Csv,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Csv => "csv",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Xlsx => XLSX_CONTENT_TYPE,
            ExportFormat::Csv => CSV_CONTENT_TYPE,
        }
    }
}

/// A generated spreadsheet, ready to be written or shared by the host app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFile {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl Cell {
    fn from_json(value: Option<&serde_json::Value>) -> Self {
        match value {
            None | Some(serde_json::Value::Null) => Cell::Empty,
            Some(serde_json::Value::String(s)) => Cell::Text(s.clone()),
            Some(serde_json::Value::Bool(b)) => Cell::Bool(*b),
            Some(serde_json::Value::Number(n)) => match n.as_f64() {
                Some(f) => Cell::Number(f),
                None => Cell::Text(n.to_string()),
            },
            Some(other) => Cell::Text(other.to_string()),
        }
    }
}

/// Header plus rows, independent of the output format. CSV cells keep
/// the exact text they were built from.
struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<(Cell, String)>>,
}

/// Turns month data into downloadable spreadsheets.
///
/// Pure consumer: reads a finished snapshot (or server rows) and never
/// touches controller or cache state.
#[derive(Debug, Default)]
pub struct ExportService;

impl ExportService {
    pub fn new() -> Self {
        Self
    }

    /// e.g. `April_koltsegek.xlsx`
    pub fn file_name(month: MonthKey, format: ExportFormat) -> String {
        format!("{}_koltsegek.{}", month.name(), format.extension())
    }

    /// One row per expense, in list order. Amounts are numeric cells in
    /// the workbook and the exact decimal text in CSV.
    pub fn export_snapshot(
        &self,
        snapshot: &BudgetSnapshot,
        format: ExportFormat,
    ) -> Result<ExportFile, CoreError> {
        if snapshot.expenses.is_empty() {
            return Err(CoreError::Export("no expenses to export".into()));
        }

        let rows = snapshot
            .expenses
            .iter()
            .map(|expense| {
                let date = expense
                    .created_at
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_default();
                let amount = match expense.amount.to_f64() {
                    Some(f) => Cell::Number(f),
                    None => Cell::Text(expense.amount.to_string()),
                };
                vec![
                    (Cell::Number(expense.id as f64), expense.id.to_string()),
                    text_cell(date),
                    text_cell(expense.title().to_string()),
                    text_cell(expense.category.clone().unwrap_or_default()),
                    (amount, expense.amount.to_string()),
                    text_cell(expense.currency.to_string()),
                ]
            })
            .collect();
        let table = Table {
            columns: SNAPSHOT_HEADER.iter().map(|c| c.to_string()).collect(),
            rows,
        };

        let file = render(&table, snapshot.month_key, format)?;
        info!(
            month = %snapshot.month_key,
            rows = snapshot.expenses.len(),
            file = %file.file_name,
            "expenses exported"
        );
        Ok(file)
    }

    /// Flatten the server's export rows. Columns are the union of all keys
    /// in first-seen order; nested values are written as JSON text.
    pub fn export_rows(
        &self,
        month: MonthKey,
        rows: &[ExportRow],
        format: ExportFormat,
    ) -> Result<ExportFile, CoreError> {
        if rows.is_empty() {
            return Err(CoreError::Export("no expenses to export".into()));
        }

        let mut columns: Vec<String> = Vec::new();
        for row in rows {
            for key in row.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
        let rows = rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|c| {
                        let value = row.get(c);
                        (Cell::from_json(value), csv_text(value))
                    })
                    .collect()
            })
            .collect();

        let file = render(&Table { columns, rows }, month, format)?;
        info!(month = %month, file = %file.file_name, "server rows exported");
        Ok(file)
    }

    pub fn snapshot_to_xlsx(&self, snapshot: &BudgetSnapshot) -> Result<ExportFile, CoreError> {
        self.export_snapshot(snapshot, ExportFormat::Xlsx)
    }

    pub fn snapshot_to_csv(&self, snapshot: &BudgetSnapshot) -> Result<ExportFile, CoreError> {
        self.export_snapshot(snapshot, ExportFormat::Csv)
    }

    pub fn rows_to_xlsx(&self, month: MonthKey, rows: &[ExportRow]) -> Result<ExportFile, CoreError> {
        self.export_rows(month, rows, ExportFormat::Xlsx)
    }

    pub fn rows_to_csv(&self, month: MonthKey, rows: &[ExportRow]) -> Result<ExportFile, CoreError> {
        self.export_rows(month, rows, ExportFormat::Csv)
    }
}

fn text_cell(s: String) -> (Cell, String) {
    (Cell::Text(s.clone()), s)
}

fn csv_text(value: Option<&serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn render(table: &Table, month: MonthKey, format: ExportFormat) -> Result<ExportFile, CoreError> {
    let bytes = match format {
        ExportFormat::Xlsx => write_xlsx(table)?,
        ExportFormat::Csv => write_csv(table)?,
    };
    Ok(ExportFile {
        file_name: ExportService::file_name(month, format),
        content_type: format.content_type(),
        bytes,
    })
}

fn write_xlsx(table: &Table) -> Result<Vec<u8>, CoreError> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    for (col, name) in table.columns.iter().enumerate() {
        sheet.write_string_with_format(0, column_index(col)?, name, &header)?;
    }
    for (i, row) in table.rows.iter().enumerate() {
        // Row 0 is the header.
        let r = u32::try_from(i + 1)
            .map_err(|_| CoreError::Export("too many rows for one worksheet".into()))?;
        for (col, (cell, _)) in row.iter().enumerate() {
            let c = column_index(col)?;
            match cell {
                Cell::Empty => {}
                Cell::Text(s) => {
                    sheet.write_string(r, c, s)?;
                }
                Cell::Number(n) => {
                    sheet.write_number(r, c, *n)?;
                }
                Cell::Bool(b) => {
                    sheet.write_boolean(r, c, *b)?;
                }
            }
        }
    }
    sheet.autofit();

    Ok(workbook.save_to_buffer()?)
}

fn column_index(col: usize) -> Result<u16, CoreError> {
    u16::try_from(col).map_err(|_| CoreError::Export("too many columns for one worksheet".into()))
}

fn write_csv(table: &Table) -> Result<Vec<u8>, CoreError> {
    let mut writer = Writer::from_writer(Vec::new());
    writer.write_record(&table.columns)?;
    for row in &table.rows {
        writer.write_record(row.iter().map(|(_, text)| text.as_str()))?;
    }
    writer
        .into_inner()
        .map_err(|e| CoreError::Export(format!("Failed to flush CSV: {e}")))
}
