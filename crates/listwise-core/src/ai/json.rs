//! Lenient JSON extraction from model text
//!
//! Models wrap JSON in prose or markdown fences. Callers that need a
//! structured answer take the outermost object and treat anything else as a
//! parse failure to recover from locally.

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Pull the first `{ ... }` object out of `text`.
pub fn extract_json_object(text: &str) -> Option<Value> {
    let stripped = strip_code_fence(text.trim());
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(stripped) {
        return Some(value);
    }

    let start = stripped.find('{')?;
    let end = stripped.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&stripped[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

/// Extract and deserialize in one go.
pub fn parse_json_object<T: DeserializeOwned>(text: &str) -> Option<T> {
    extract_json_object(text).and_then(|v| serde_json::from_value(v).ok())
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the language tag line
    let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or(rest);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_object() {
        let v = extract_json_object(r#"{"name_en": "Mug"}"#).unwrap();
        assert_eq!(v["name_en"], "Mug");
    }

    #[test]
    fn test_fenced_object() {
        let text = "```json\n{\"confidence\": \"high\"}\n```";
        assert_eq!(extract_json_object(text).unwrap()["confidence"], "high");
    }

    #[test]
    fn test_object_inside_prose() {
        let text = "Sure! Here it is: {\"a\": {\"b\": 1}} Let me know.";
        assert_eq!(extract_json_object(text).unwrap()["a"]["b"], 1);
    }

    #[test]
    fn test_garbage_is_none() {
        assert!(extract_json_object("no json here").is_none());
        assert!(extract_json_object("} backwards {").is_none());
        assert!(extract_json_object("[1, 2, 3]").is_none());
    }
}
