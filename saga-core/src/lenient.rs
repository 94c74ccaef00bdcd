//! Forgiving deserializers for fields the narrator model writes.
//!
//! Save files carry whatever the model emitted, so a `uses` of `"many"` or a
//! quest status of `"abandoned"` must load as "absent" rather than failing the
//! whole file.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::str::FromStr;

/// A number, or a string that parses as one. Anything else is `None`.
pub(crate) fn number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_as_number))
}

/// A boolean, or the strings `"true"` / `"false"`. Anything else is `None`.
pub(crate) fn flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Bool(b)) => Some(b),
        Some(Value::String(s)) => parse_flag(&s),
        _ => None,
    })
}

/// A string accepted by `T::from_str`. Anything else is `None`.
pub(crate) fn parsed<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    })
}

/// Like [`parsed`], falling back to `T::default()`.
pub(crate) fn parsed_or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr + Default,
{
    parsed(deserializer).map(Option::unwrap_or_default)
}

/// A list of strings, or a single comma-separated string.
pub(crate) fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) => split_list(&s),
        _ => Vec::new(),
    })
}

/// A string, or any scalar rendered as one.
pub(crate) fn text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

pub(crate) fn value_as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn parse_flag(s: &str) -> Option<bool> {
    if s.eq_ignore_ascii_case("true") {
        Some(true)
    } else if s.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Split a comma-separated list, trimming entries and dropping blanks.
pub(crate) fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Fields {
        #[serde(default, deserialize_with = "number")]
        uses: Option<f64>,
        #[serde(default, deserialize_with = "flag")]
        usable: Option<bool>,
        #[serde(default, deserialize_with = "string_list")]
        skills: Vec<String>,
    }

    #[test]
    fn test_lenient_fields() {
        let fields: Fields =
            serde_json::from_str(r#"{"uses": "3", "usable": "TRUE", "skills": "a, b,"}"#).unwrap();
        assert_eq!(fields.uses, Some(3.0));
        assert_eq!(fields.usable, Some(true));
        assert_eq!(fields.skills, vec!["a", "b"]);
    }

    #[test]
    fn test_garbage_becomes_absent() {
        let fields: Fields =
            serde_json::from_str(r#"{"uses": "many", "usable": 7, "skills": null}"#).unwrap();
        assert_eq!(fields.uses, None);
        assert_eq!(fields.usable, None);
        assert!(fields.skills.is_empty());
    }
}
