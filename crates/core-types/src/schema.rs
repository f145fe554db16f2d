//! Inferred tabular schema for an import sample.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::CoreError;

/// The four column type tags the record platform can provision.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
pub enum ColumnType {
    Text,
    Number,
    Date,
    List,
}

impl ColumnType {
    pub const ALL: [ColumnType; 4] = [
        ColumnType::Text,
        ColumnType::Number,
        ColumnType::Date,
        ColumnType::List,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Text => "Text",
            ColumnType::Number => "Number",
            ColumnType::Date => "Date",
            ColumnType::List => "List",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = CoreError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        ColumnType::ALL
            .into_iter()
            .find(|tag| tag.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| CoreError::UnknownColumnType(trimmed.to_string()))
    }
}

impl<'de> Deserialize<'de> for ColumnType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// One inferred column. Order inside [`ImportAnalysisResult::columns`] mirrors the
/// source file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ColumnSchema {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl ColumnSchema {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        column_type: ColumnType,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            column_type,
        }
    }
}

impl<'de> Deserialize<'de> for ColumnSchema {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut fields = folded_object(deserializer)?;
        let name = take_string::<D::Error>(&mut fields, "name")?
            .ok_or_else(|| de::Error::missing_field("name"))?;
        let description =
            take_string::<D::Error>(&mut fields, "description")?.unwrap_or_default();
        let column_type = match fields.remove("type") {
            Some(value) => ColumnType::deserialize(value).map_err(de::Error::custom)?,
            None => return Err(de::Error::missing_field("type")),
        };
        Ok(Self {
            name,
            description,
            column_type,
        })
    }
}

/// Complete artifact of the inference phase.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportAnalysisResult {
    pub application_name: String,
    pub columns: Vec<ColumnSchema>,
}

impl ImportAnalysisResult {
    pub fn new(application_name: impl Into<String>, columns: Vec<ColumnSchema>) -> Self {
        Self {
            application_name: application_name.into(),
            columns,
        }
    }

    /// Degenerate result handed back when inference could not produce a schema.
    pub fn empty(application_name: impl Into<String>) -> Self {
        Self::new(application_name, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Provisioning refuses to run against an empty schema.
    pub fn ensure_columns(&self) -> Result<(), CoreError> {
        if self.columns.is_empty() {
            return Err(CoreError::EmptySchema(self.application_name.clone()));
        }
        Ok(())
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.name.as_str())
    }
}

impl<'de> Deserialize<'de> for ImportAnalysisResult {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut fields = folded_object(deserializer)?;
        let application_name = take_string::<D::Error>(&mut fields, "applicationname")?
            .ok_or_else(|| de::Error::missing_field("applicationName"))?;
        let columns = match fields.remove("columns") {
            Some(Value::Null) | None => Vec::new(),
            Some(value) => Vec::<ColumnSchema>::deserialize(value).map_err(de::Error::custom)?,
        };
        Ok(Self {
            application_name,
            columns,
        })
    }
}

fn folded_object<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeMap<String, Value>, D::Error> {
    let raw = Map::<String, Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(key, value)| (key.to_ascii_lowercase(), value))
        .collect())
}

fn take_string<E: de::Error>(
    fields: &mut BTreeMap<String, Value>,
    key: &str,
) -> Result<Option<String>, E> {
    match fields.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value)),
        Some(other) => Err(E::custom(format!(
            "field '{key}' must be a string, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ImportAnalysisResult {
        ImportAnalysisResult::new(
            "People",
            vec![
                ColumnSchema::new("name", "Given name", ColumnType::Text),
                ColumnSchema::new("age", "Age in years", ColumnType::Number),
                ColumnSchema::new("city", "Home city", ColumnType::List),
            ],
        )
    }

    #[test]
    fn serializes_with_camel_case_field_names() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["applicationName"], "People");
        assert_eq!(value["columns"][1]["type"], "Number");
        assert_eq!(value["columns"][0]["description"], "Given name");
    }

    #[test]
    fn round_trips_through_json() {
        let original = sample();
        let text = serde_json::to_string(&original).unwrap();
        let parsed: ImportAnalysisResult = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn reads_field_names_case_insensitively() {
        let text = r#"{
            "APPLICATIONNAME": "People",
            "Columns": [
                { "Name": "name", "DESCRIPTION": "Given name", "Type": "text" },
                { "name": "age", "description": "Age in years", "TYPE": "NUMBER" },
                { "NAME": "city", "Description": "Home city", "type": "List" }
            ]
        }"#;
        let parsed: ImportAnalysisResult = serde_json::from_str(text).unwrap();
        assert_eq!(parsed, sample());
    }

    #[test]
    fn rejects_unknown_type_tags() {
        let text = r#"{ "name": "age", "description": "", "type": "integer" }"#;
        let err = serde_json::from_str::<ColumnSchema>(text).unwrap_err();
        assert!(err.to_string().contains("integer"));
    }

    #[test]
    fn missing_description_defaults_to_empty() {
        let column: ColumnSchema =
            serde_json::from_str(r#"{ "name": "when", "type": "Date" }"#).unwrap();
        assert_eq!(column.description, "");
        assert_eq!(column.column_type, ColumnType::Date);
    }

    #[test]
    fn empty_schema_fails_validation() {
        let result = ImportAnalysisResult::empty("People");
        assert!(result.is_empty());
        assert_eq!(
            result.ensure_columns(),
            Err(CoreError::EmptySchema("People".to_string()))
        );
        assert!(sample().ensure_columns().is_ok());
    }
}
