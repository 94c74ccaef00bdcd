//! Player-authored standing rules.
//!
//! Active rules are injected into every prompt. Editing the rule set is
//! diffed against the previous set so the narrator can react to exactly
//! what changed.

use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Id of the rule every new game starts with.
pub const LIVING_WORLD_RULE_ID: &str = "default_living_world_rule_v1";

/// Id given to a rule imported from an old save's free-text knowledge field.
pub const IMPORTED_RULE_ID: &str = "imported_knowledge";

const LIVING_WORLD_RULE: &str = "Living World Principle: this world is not static. Events, \
environmental changes and newly introduced laws can and SHOULD cause matching statuses on \
characters (PC and NPCs). Reason logically about which buffs, debuffs, injuries or neutral \
conditions apply so that characters feel alive and react to the world around them. You are \
free to author the statuses, their effects and any related details to keep the story \
consistent and deep.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomRule {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub is_active: bool,
}

impl CustomRule {
    /// A new active rule with a fresh id.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            is_active: true,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn living_world() -> Self {
        Self::new(LIVING_WORLD_RULE).with_id(LIVING_WORLD_RULE_ID)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleBook(Vec<CustomRule>);

impl RuleBook {
    pub fn new(rules: Vec<CustomRule>) -> Self {
        Self(rules)
    }

    /// Set `is_active = false` on the rule with this id.
    pub fn deactivate(&mut self, id: &str) -> bool {
        match self.0.iter_mut().find(|r| r.id == id) {
            Some(rule) => {
                rule.is_active = false;
                true
            }
            None => false,
        }
    }

    pub fn activate(&mut self, id: &str) -> bool {
        match self.0.iter_mut().find(|r| r.id == id) {
            Some(rule) => {
                rule.is_active = true;
                true
            }
            None => false,
        }
    }

    pub fn push(&mut self, rule: CustomRule) {
        self.0.push(rule);
    }

    /// Append rules loaded from a file. A rule whose id is already taken
    /// gets a fresh one. Returns how many were added.
    pub fn import(&mut self, rules: Vec<CustomRule>) -> usize {
        let count = rules.len();
        for mut rule in rules {
            if self.get(&rule.id).is_some() {
                rule.id = uuid::Uuid::new_v4().to_string();
            }
            self.0.push(rule);
        }
        count
    }

    pub fn get(&self, id: &str) -> Option<&CustomRule> {
        self.0.iter().find(|r| r.id == id)
    }

    pub fn active(&self) -> impl Iterator<Item = &CustomRule> {
        self.0.iter().filter(|r| r.is_active)
    }

    /// Content of every active rule, one per line.
    pub fn active_text(&self) -> String {
        self.active()
            .map(|r| r.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn iter(&self) -> impl Iterator<Item = &CustomRule> {
        self.0.iter()
    }

    pub fn to_vec(&self) -> Vec<CustomRule> {
        self.0.clone()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// An active rule whose content was edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleUpdate {
    pub old_rule: CustomRule,
    pub new_rule: CustomRule,
}

/// What changed between two rule sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuleDiff {
    /// Active now, and not active (or absent) before.
    pub activated: Vec<CustomRule>,
    /// Active before, and not active (or absent) now.
    pub deactivated: Vec<CustomRule>,
    /// Active in both, with different content.
    pub updated: Vec<RuleUpdate>,
}

impl RuleDiff {
    pub fn between(old: &RuleBook, new: &RuleBook) -> Self {
        let was_active = |id: &str| old.get(id).is_some_and(|r| r.is_active);
        let is_active = |id: &str| new.get(id).is_some_and(|r| r.is_active);

        let activated = new
            .active()
            .filter(|r| !was_active(&r.id))
            .cloned()
            .collect();

        let deactivated = old
            .active()
            .filter(|r| !is_active(&r.id))
            .cloned()
            .collect();

        let updated = new
            .active()
            .filter_map(|nr| {
                old.get(&nr.id)
                    .filter(|or| or.is_active && or.content != nr.content)
                    .map(|or| RuleUpdate {
                        old_rule: or.clone(),
                        new_rule: nr.clone(),
                    })
            })
            .collect();

        Self {
            activated,
            deactivated,
            updated,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.activated.is_empty() && self.deactivated.is_empty() && self.updated.is_empty()
    }

    /// Directive block handed to the context compiler.
    pub fn to_directive(&self) -> String {
        let mut out = String::from("--- WORLD RULE UPDATES ---\n");
        let json = serde_json::to_string(self).unwrap_or_default();
        let _ = writeln!(out, "{json}");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(rules: &[(&str, &str, bool)]) -> RuleBook {
        RuleBook::new(
            rules
                .iter()
                .map(|(id, content, active)| CustomRule {
                    id: id.to_string(),
                    content: content.to_string(),
                    is_active: *active,
                })
                .collect(),
        )
    }

    #[test]
    fn test_activation_only() {
        let old = book(&[("a", "Spawn a dragon", false), ("b", "No magic", true)]);
        let new = book(&[("a", "Spawn a dragon", true), ("b", "No magic", true)]);

        let diff = RuleDiff::between(&old, &new);
        assert_eq!(diff.activated.len(), 1);
        assert_eq!(diff.activated[0].id, "a");
        assert!(diff.deactivated.is_empty());
        assert!(diff.updated.is_empty());
    }

    #[test]
    fn test_update_compares_matching_ids() {
        let old = book(&[("a", "Rain", true), ("b", "Snow", true)]);
        let new = book(&[("a", "Rain", true), ("b", "Blizzard", true)]);

        let diff = RuleDiff::between(&old, &new);
        assert_eq!(diff.updated.len(), 1);
        assert_eq!(diff.updated[0].old_rule.content, "Snow");
        assert_eq!(diff.updated[0].new_rule.content, "Blizzard");
        assert!(diff.activated.is_empty());
    }

    #[test]
    fn test_removed_rule_is_deactivated() {
        let old = book(&[("a", "Rain", true)]);
        let new = book(&[]);
        let diff = RuleDiff::between(&old, &new);
        assert_eq!(diff.deactivated.len(), 1);
        assert!(!diff.is_empty());
    }

    #[test]
    fn test_no_changes() {
        let rules = book(&[("a", "Rain", true), ("b", "Off", false)]);
        assert!(RuleDiff::between(&rules, &rules.clone()).is_empty());
    }

    #[test]
    fn test_deactivate_by_id() {
        let mut rules = RuleBook::new(vec![CustomRule::living_world()]);
        assert!(rules.deactivate(LIVING_WORLD_RULE_ID));
        assert_eq!(rules.active().count(), 0);
        assert!(!rules.deactivate("missing"));
    }

    #[test]
    fn test_import_renames_conflicting_ids() {
        let mut book = RuleBook::new(vec![CustomRule::new("a").with_id("r1")]);
        let added = book.import(vec![
            CustomRule::new("b").with_id("r1"),
            CustomRule::new("c").with_id("r2"),
        ]);
        assert_eq!(added, 2);
        assert_eq!(book.len(), 3);
        assert_eq!(book.get("r1").unwrap().content, "a");
        assert_eq!(book.get("r2").unwrap().content, "c");
        assert!(book.iter().any(|r| r.content == "b" && r.id != "r1"));
    }

    #[test]
    fn test_directive_lists_changes() {
        let old = book(&[("a", "Spawn a dragon", false)]);
        let new = book(&[("a", "Spawn a dragon", true)]);
        let directive = RuleDiff::between(&old, &new).to_directive();
        assert!(directive.starts_with("--- WORLD RULE UPDATES ---\n"));
        assert!(directive.contains(r#""activated":[{"id":"a""#));
        assert!(directive.contains(r#""deactivated":[]"#));
    }
}
