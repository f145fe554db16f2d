//! Wire shapes of the query API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::PlatformError;

/// `apiDataFormat` of a report request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataFormat {
    #[default]
    Raw,
    Formatted,
}

impl DataFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataFormat::Raw => "Raw",
            DataFormat::Formatted => "Formatted",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportData {
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<ReportRow>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRow {
    #[serde(default)]
    pub record_id: Option<i64>,
    #[serde(default)]
    pub cells: Vec<Value>,
}

impl ReportData {
    /// First cell of the first row.
    pub fn first_cell(&self) -> Option<&Value> {
        self.rows.first().and_then(|row| row.cells.first())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordData {
    #[serde(default)]
    pub app_id: i64,
    #[serde(default)]
    pub record_id: i64,
    #[serde(default)]
    pub field_data: Vec<FieldValue>,
}

impl RecordData {
    pub fn field(&self, field_id: i64) -> Option<&FieldValue> {
        self.field_data.iter().find(|f| f.field_id == field_id)
    }
}

/// One `fieldData` entry; `type` names the value's shape (`String`,
/// `Decimal`, `Integer`, `Guid`, ...).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldValue {
    #[serde(rename = "type")]
    pub value_type: String,
    pub field_id: i64,
    #[serde(default)]
    pub value: Value,
}

impl FieldValue {
    pub fn is_string(&self) -> bool {
        self.value_type.eq_ignore_ascii_case("string")
    }
}

/// Display text of a cell the way the platform renders it.
pub fn cell_text(cell: &Value) -> String {
    match cell {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// Integer value of a cell holding either a number or numeric text.
pub fn cell_int(cell: &Value, what: &str) -> Result<i64, PlatformError> {
    let text = cell_text(cell);
    text.trim()
        .parse::<i64>()
        .map_err(|_| PlatformError::shape(format!("expected {what} to be an integer, got '{text}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integer_cells_accept_numbers_and_text() {
        assert_eq!(cell_int(&json!(12), "id").unwrap(), 12);
        assert_eq!(cell_int(&json!(12.0), "id").unwrap(), 12);
        assert_eq!(cell_int(&json!(" 7 "), "id").unwrap(), 7);
        assert!(cell_int(&json!(12.5), "id").is_err());
        assert!(cell_int(&json!("AC-1"), "id").is_err());
        assert!(cell_int(&Value::Null, "id").is_err());
    }

    #[test]
    fn record_fields_are_found_by_id() {
        let record: RecordData = serde_json::from_value(json!({
            "appId": 14,
            "recordId": 120,
            "fieldData": [
                {"type": "Decimal", "fieldId": 585, "value": 120.0},
                {"type": "String", "fieldId": 586, "value": "1, 2"}
            ]
        }))
        .unwrap();
        assert_eq!(record.field(585).unwrap().value, json!(120.0));
        assert!(record.field(586).unwrap().is_string());
        assert!(record.field(183).is_none());
    }
}
