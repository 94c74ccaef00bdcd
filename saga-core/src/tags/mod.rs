//! Inline command tags embedded in narrator output.
//!
//! The narrator writes world changes directly into its prose as bracketed
//! directives such as `[ITEM_AQUIRED: name="Rusty Key", usable="true"]`.
//! [`scan`] finds them, [`strip`] removes them from the text the player
//! reads, and [`reduce_narrative`] applies each one to the game state in
//! order of appearance.

mod lexer;
mod reducer;

pub use lexer::{scan, strip, Tag};
pub use reducer::{apply_tag, handler_for, reduce_narrative, Reduction, TagHandler};

use crate::quest::Objective;
use serde_json::Value;
use std::collections::BTreeMap;

/// Attributes always coerced to booleans.
pub const FLAG_ATTRIBUTES: &[&str] = &["isMainQuest", "usable", "equippable", "consumable", "learnable"];

/// Attributes coerced to numbers when their text parses as one.
pub const NUMERIC_ATTRIBUTES: &[&str] = &["uses", "durability", "damage", "amount"];

/// A single coerced attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Text(String),
    Flag(bool),
    Number(f64),
    Objectives(Vec<Objective>),
}

impl AttrValue {
    /// Coerce raw attribute text according to the attribute's name.
    pub fn coerce(key: &str, raw: &str) -> Self {
        if FLAG_ATTRIBUTES.contains(&key) {
            return AttrValue::Flag(raw.eq_ignore_ascii_case("true"));
        }
        if key == "objectives" {
            return AttrValue::Objectives(
                raw.split(';')
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(Objective::new)
                    .collect(),
            );
        }
        if NUMERIC_ATTRIBUTES.contains(&key) {
            if let Some(n) = parse_number(raw) {
                return AttrValue::Number(n);
            }
        }
        AttrValue::Text(raw.to_string())
    }

    /// Text form of scalar values; objective lists have none.
    pub fn as_text(&self) -> Option<String> {
        match self {
            AttrValue::Text(s) => Some(s.clone()),
            AttrValue::Flag(b) => Some(b.to_string()),
            AttrValue::Number(n) => Some(n.to_string()),
            AttrValue::Objectives(_) => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            AttrValue::Text(s) => Value::String(s.clone()),
            AttrValue::Flag(b) => Value::Bool(*b),
            AttrValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            AttrValue::Objectives(list) => serde_json::to_value(list).unwrap_or(Value::Null),
        }
    }
}

/// Blank text counts as zero; `NaN` and infinities are not numbers.
fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Some(0.0);
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// The attribute list of one tag. A repeated key keeps its last value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes(BTreeMap<String, AttrValue>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a raw attribute, applying name-based coercion.
    pub fn insert_raw(&mut self, key: &str, raw: &str) {
        self.0.insert(key.to_string(), AttrValue::coerce(key, raw));
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.0.get(key)
    }

    /// Non-empty text value.
    pub fn text(&self, key: &str) -> Option<&str> {
        match self.0.get(key) {
            Some(AttrValue::Text(s)) if !s.is_empty() => Some(s.as_str()),
            _ => None,
        }
    }

    /// Numeric value, only when coercion produced a number.
    pub fn number(&self, key: &str) -> Option<f64> {
        match self.0.get(key) {
            Some(AttrValue::Number(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn flag(&self, key: &str) -> Option<bool> {
        match self.0.get(key) {
            Some(AttrValue::Flag(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn objectives(&self) -> Vec<Objective> {
        match self.0.get("objectives") {
            Some(AttrValue::Objectives(list)) => list.clone(),
            _ => Vec::new(),
        }
    }

    /// All attributes except the listed keys.
    pub fn iter_except<'a>(
        &'a self,
        skip: &'a [&'a str],
    ) -> impl Iterator<Item = (&'a str, &'a AttrValue)> + 'a {
        self.0
            .iter()
            .filter(move |(k, _)| !skip.contains(&k.as_str()))
            .map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
