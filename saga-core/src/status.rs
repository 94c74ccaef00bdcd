//! Status effects and the status ledger.

use crate::lenient;
use crate::tags::Attributes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Classification of a status effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Buff,
    Debuff,
    Injury,
    Neutral,
}

impl FromStr for StatusKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "buff" => StatusKind::Buff,
            "debuff" => StatusKind::Debuff,
            "injury" => StatusKind::Injury,
            "neutral" => StatusKind::Neutral,
            _ => return Err(()),
        })
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StatusKind::Buff => "buff",
            StatusKind::Debuff => "debuff",
            StatusKind::Injury => "injury",
            StatusKind::Neutral => "neutral",
        })
    }
}

/// A condition attached to the player (`owner == "pc"`) or an NPC.
///
/// `duration` is narrative text; nothing here counts it down. The narrator
/// removes a status by emitting a cure tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub name: String,
    pub owner: String,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::parsed")]
    pub kind: Option<StatusKind>,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub source: String,

    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub duration: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub effects: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub cure_conditions: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Status {
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
            kind: None,
            description: String::new(),
            source: String::new(),
            duration: None,
            effects: None,
            cure_conditions: None,
            extra: BTreeMap::new(),
        }
    }

    /// Merge tag attributes. The key fields (`name`, owner) never change.
    pub fn merge_attributes(&mut self, attrs: &Attributes) {
        for (key, value) in attrs.iter_except(&["name", "owner", "npcName"]) {
            let text = value.as_text();
            match key {
                "type" => {
                    if let Some(kind) = text.and_then(|s| s.parse().ok()) {
                        self.kind = Some(kind);
                    }
                }
                "description" => self.description = text.unwrap_or_default(),
                "source" => self.source = text.unwrap_or_default(),
                "duration" => self.duration = text,
                "effects" => self.effects = text,
                "cureConditions" => self.cure_conditions = text,
                _ => {
                    self.extra.insert(key.to_string(), value.to_json());
                }
            }
        }
    }
}

/// Every active status, at most one per (name, owner).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusLedger(Vec<Status>);

impl StatusLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a status: merge into the existing (name, owner) entry or append.
    pub fn apply(&mut self, name: &str, owner: &str, attrs: &Attributes) {
        match self.0.iter_mut().find(|s| s.name == name && s.owner == owner) {
            Some(existing) => existing.merge_attributes(attrs),
            None => {
                let mut status = Status::new(name, owner);
                status.merge_attributes(attrs);
                self.0.push(status);
            }
        }
    }

    /// Remove the (name, owner) entry. Returns whether one was removed.
    pub fn cure(&mut self, name: &str, owner: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|s| !(s.name == name && s.owner == owner));
        self.0.len() != before
    }

    /// Re-point statuses after an entity rename.
    pub fn rename_owner(&mut self, old: &str, new: &str) {
        for status in self.0.iter_mut().filter(|s| s.owner == old) {
            status.owner = new.to_string();
        }
    }

    pub fn get(&self, name: &str, owner: &str) -> Option<&Status> {
        self.0.iter().find(|s| s.name == name && s.owner == owner)
    }

    pub fn for_owner<'a>(&'a self, owner: &'a str) -> impl Iterator<Item = &'a Status> + 'a {
        self.0.iter().filter(move |s| s.owner == owner)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Status> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> Attributes {
        let mut attrs = Attributes::new();
        for (k, v) in pairs {
            attrs.insert_raw(k, v);
        }
        attrs
    }

    #[test]
    fn test_apply_then_merge() {
        let mut ledger = StatusLedger::new();
        ledger.apply("Poison", "Lan", &attrs(&[("type", "debuff"), ("description", "weak")]));
        ledger.apply("Poison", "Lan", &attrs(&[("description", "very weak"), ("npcName", "Lan")]));

        assert_eq!(ledger.len(), 1);
        let status = ledger.get("Poison", "Lan").unwrap();
        assert_eq!(status.description, "very weak");
        assert_eq!(status.kind, Some(StatusKind::Debuff));
        assert!(status.extra.is_empty());
    }

    #[test]
    fn test_same_name_different_owner() {
        let mut ledger = StatusLedger::new();
        ledger.apply("Blessed", "pc", &Attributes::new());
        ledger.apply("Blessed", "Lan", &Attributes::new());
        assert_eq!(ledger.len(), 2);

        assert!(ledger.cure("Blessed", "pc"));
        assert!(!ledger.cure("Blessed", "pc"));
        assert_eq!(ledger.for_owner("Lan").count(), 1);
    }

    #[test]
    fn test_unknown_kind_ignored() {
        let mut ledger = StatusLedger::new();
        ledger.apply("Odd", "pc", &attrs(&[("type", "curse")]));
        assert_eq!(ledger.get("Odd", "pc").unwrap().kind, None);
    }

    #[test]
    fn test_status_json_layout() {
        let mut ledger = StatusLedger::new();
        ledger.apply(
            "Burn",
            "pc",
            &attrs(&[("type", "injury"), ("cureConditions", "cold water")]),
        );
        let json = serde_json::to_value(&ledger).unwrap();
        assert_eq!(json[0]["type"], "injury");
        assert_eq!(json[0]["cureConditions"], "cold water");
        assert_eq!(json[0]["owner"], "pc");
    }
}
