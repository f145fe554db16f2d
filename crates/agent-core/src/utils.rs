use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::errors::AgentError;

/// First JSON object in a model reply: bare, fenced or inline.
pub fn extract_json_object(raw: &str) -> Option<String> {
    extract_balanced(raw, '{', '}')
}

/// First JSON array in a model reply: bare, fenced or inline.
pub fn extract_json_array(raw: &str) -> Option<String> {
    extract_balanced(raw, '[', ']')
}

fn extract_balanced(raw: &str, open: char, close: char) -> Option<String> {
    if raw.trim_start().starts_with(open) {
        if let Some(found) = scan(raw.trim_start(), open, close) {
            return Some(found);
        }
    }

    let fence = "```";
    if let Some(start) = raw.find(fence) {
        let after_fence = &raw[start + fence.len()..];
        let after_lang = after_fence.trim_start_matches(|c: char| c.is_alphanumeric() || c == '_');
        if let Some(end) = after_lang.find(fence) {
            let block = &after_lang[..end];
            if let Some(offset) = block.find(open) {
                if let Some(found) = scan(&block[offset..], open, close) {
                    return Some(found);
                }
            }
        }
    }

    raw.find(open).and_then(|offset| scan(&raw[offset..], open, close))
}

/// Balanced span starting at the first char of `text`, skipping delimiters
/// inside string literals.
fn scan(text: &str, open: char, close: char) -> Option<String> {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (idx, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[..idx + ch.len_utf8()].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Deserialises a JSON object after lower-casing its top-level keys, so
/// `{"Completion": ..}` and `{"completion": ..}` read the same.
pub fn parse_folded<T: DeserializeOwned>(json: &str) -> Result<T, AgentError> {
    let value: Value =
        serde_json::from_str(json).map_err(|err| AgentError::decode(err.to_string()))?;
    let folded = match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (key.to_ascii_lowercase(), value))
                .collect::<Map<String, Value>>(),
        ),
        other => other,
    };
    serde_json::from_value(folded).map_err(|err| AgentError::decode(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn extracts_from_fenced_block() {
        let input = "Here is the result:\n```json\n{\"completion\":\"and more\"}\n```";
        let extracted = extract_json_object(input).expect("json");
        assert_eq!(extracted, "{\"completion\":\"and more\"}");
    }

    #[test]
    fn extracts_from_inline_object() {
        let input = "text { \"foo\": 1 } more";
        let extracted = extract_json_object(input).expect("json");
        assert_eq!(extracted, "{ \"foo\": 1 }");
    }

    #[test]
    fn array_extraction_ignores_brackets_inside_strings() {
        let input = "Sure!\n[{\"name\":\"a]b\",\"type\":\"Text\"}] trailing";
        let extracted = extract_json_array(input).expect("array");
        assert_eq!(extracted, "[{\"name\":\"a]b\",\"type\":\"Text\"}]");
    }

    #[test]
    fn returns_none_when_missing() {
        assert!(extract_json_object("no braces").is_none());
        assert!(extract_json_array("[unterminated").is_none());
    }

    #[test]
    fn folded_parse_accepts_any_key_case() {
        #[derive(Deserialize)]
        struct Reply {
            mappings: Option<Vec<i64>>,
        }
        let reply: Reply = parse_folded(r#"{"Mappings": [3, 4]}"#).unwrap();
        assert_eq!(reply.mappings, Some(vec![3, 4]));
        let empty: Reply = parse_folded(r#"{"MAPPINGS": null}"#).unwrap();
        assert_eq!(empty.mappings, None);
    }
}
