//! Spreadsheet query tool.
//!
//! The "query" is not executed against the sheet; the tool serializes the
//! first worksheet (bounded) together with the echoed query, and the model
//! does the reasoning over the returned rows.

use calamine::{open_workbook_auto, Data, Reader};
use serde_json::{json, Value};

use super::{ErrorKind, Observation};

/// Rows serialized into a single observation. Larger sheets are truncated.
const MAX_ROWS: usize = 50;

/// Open a workbook and return its first worksheet alongside the query.
pub fn xlsx_query(path: &str, query: &str) -> Observation {
    let mut workbook = match open_workbook_auto(path) {
        Ok(workbook) => workbook,
        Err(e) => {
            return Observation::err(ErrorKind::Xlsx, format!("failed to open workbook: {e}"));
        }
    };

    let sheet_name = match workbook.sheet_names().first() {
        Some(name) => name.clone(),
        None => return Observation::err(ErrorKind::Xlsx, "workbook has no sheets"),
    };

    let range = match workbook.worksheet_range(&sheet_name) {
        Ok(range) => range,
        Err(e) => {
            return Observation::err(
                ErrorKind::Xlsx,
                format!("failed to read sheet {sheet_name}: {e}"),
            );
        }
    };

    let rows: Vec<Vec<Value>> = range
        .rows()
        .take(MAX_ROWS)
        .map(|row| row.iter().map(cell_to_json).collect())
        .collect();

    Observation::ok(json!({
        "sheet": sheet_name,
        "rows_total": range.height(),
        "columns": range.width(),
        "truncated": range.height() > MAX_ROWS,
        "rows": rows,
        "query": query,
    }))
}

fn cell_to_json(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::Int(i) => json!(i),
        Data::Float(f) => json!(f),
        Data::Bool(b) => json!(b),
        Data::String(s) => json!(s),
        other => json!(other.to_string()),
    }
}
