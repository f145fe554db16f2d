//! Compliance reference records pulled from the record platform.

use serde::{Deserialize, Serialize};

/// A guidance snippet identified by a numeric id.
///
/// The on-disk cache stores `{ "id": number, "guidance": string }`; the
/// capitalised aliases keep caches written by the earlier service readable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    #[serde(alias = "Id")]
    pub id: i64,
    #[serde(alias = "Guidance")]
    pub guidance: String,
}

impl Citation {
    pub fn new(id: i64, guidance: impl Into<String>) -> Self {
        Self {
            id,
            guidance: guidance.into(),
        }
    }
}

/// A compliance requirement record and the citations it is known to map to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Control {
    pub id: f64,
    pub name: String,
    #[serde(default)]
    pub citation_ids: Vec<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn citation_accepts_legacy_capitalised_keys() {
        let parsed: Vec<Citation> =
            serde_json::from_str(r#"[{"Id": 4, "Guidance": "Encrypt data at rest"}]"#).unwrap();
        assert_eq!(parsed, vec![Citation::new(4, "Encrypt data at rest")]);
    }

    #[test]
    fn control_serializes_citation_ids_in_camel_case() {
        let control = Control {
            id: 12.0,
            name: "Check restricted data".into(),
            citation_ids: vec![1, 2],
        };
        let value = serde_json::to_value(&control).unwrap();
        assert_eq!(value["citationIds"], serde_json::json!([1, 2]));
    }
}
