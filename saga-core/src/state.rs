//! The game-state aggregate.
//!
//! [`GameState`] is everything a save file holds. One session owns exactly
//! one of these; the tag reducer is the only code that writes the world
//! model inside it.

use crate::chronicle::Chronicle;
use crate::entity::{Entity, EntityStore, EntityType};
use crate::memory::MemoryLog;
use crate::narrator::extract_json;
use crate::quest::QuestLog;
use crate::rules::{CustomRule, RuleBook};
use crate::status::StatusLedger;
use crate::world::WorldData;
use serde::{Deserialize, Serialize};

const DEFAULT_PC_REALM: &str = "Mortal";
const DEFAULT_SKILL_REALM: &str = "Novice";

/// Placeholder description for skills the narrator did not describe.
pub const NO_DESCRIPTION: &str = "No description yet.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryRole {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPart {
    pub text: String,
}

/// One exchange with the narrator, stored in the model's own turn format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: HistoryRole,
    #[serde(default)]
    pub parts: Vec<HistoryPart>,
}

impl HistoryEntry {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: HistoryRole::User,
            parts: vec![HistoryPart { text: text.into() }],
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: HistoryRole::Model,
            parts: vec![HistoryPart { text: text.into() }],
        }
    }

    /// Text of the first part.
    pub fn text(&self) -> &str {
        self.parts.first().map(|p| p.text.as_str()).unwrap_or("")
    }

    pub fn to_content(&self) -> gemini::Content {
        match self.role {
            HistoryRole::User => gemini::Content::user(self.text()),
            HistoryRole::Model => gemini::Content::model(self.text()),
        }
    }
}

/// Complete state of one play-through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub world_data: WorldData,
    /// Display lines. Player actions are prefixed with `> `.
    #[serde(default)]
    pub story_log: Vec<String>,
    #[serde(default)]
    pub choices: Vec<String>,
    #[serde(default)]
    pub known_entities: EntityStore,
    #[serde(default)]
    pub statuses: StatusLedger,
    #[serde(default)]
    pub quests: QuestLog,
    pub game_history: Vec<HistoryEntry>,
    #[serde(default)]
    pub memories: MemoryLog,
    #[serde(default)]
    pub party: Vec<Entity>,
    #[serde(default)]
    pub custom_rules: RuleBook,
    #[serde(default)]
    pub system_instruction: String,
    #[serde(default)]
    pub turn_count: u32,
    #[serde(default)]
    pub total_tokens_used: u64,
    #[serde(default)]
    pub last_call_tokens: u64,
    #[serde(default)]
    pub chronicle: Chronicle,
}

impl GameState {
    /// Fresh state for a newly created world: the player character and
    /// starting skills, a party of one, and the living-world rule.
    pub fn new_game(world: WorldData) -> Self {
        let skills: Vec<_> = world
            .start_skills
            .iter()
            .filter(|s| !s.name.trim().is_empty())
            .collect();

        let mut pc = Entity::new(world.pc_name(), EntityType::Pc).with_description(world.bio.clone());
        if world.gender_decided() {
            pc.gender = Some(world.gender.trim().to_string());
        }
        pc.personality = world.personality().map(str::to_string);
        pc.personality_mbti = Some(world.personality_mbti.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        pc.realm = Some(DEFAULT_PC_REALM.to_string());
        pc.learned_skills = skills.iter().map(|s| s.name.trim().to_string()).collect();

        let mut known_entities = EntityStore::new();
        known_entities.upsert(pc.clone());
        for skill in &skills {
            let description = match skill.description.trim() {
                "" => NO_DESCRIPTION,
                d => d,
            };
            let mut entity = Entity::new(skill.name.trim(), EntityType::Skill).with_description(description);
            entity.realm = Some(DEFAULT_SKILL_REALM.to_string());
            known_entities.upsert(entity);
        }

        Self {
            system_instruction: world.system_instruction(),
            world_data: world,
            story_log: Vec::new(),
            choices: Vec::new(),
            known_entities,
            statuses: StatusLedger::new(),
            quests: QuestLog::new(),
            game_history: Vec::new(),
            memories: MemoryLog::new(),
            party: vec![pc],
            custom_rules: RuleBook::new(vec![CustomRule::living_world()]),
            turn_count: 0,
            total_tokens_used: 0,
            last_call_tokens: 0,
            chronicle: Chronicle::new(),
        }
    }

    /// Name of the player character: the party's `pc` member, or failing
    /// that the first `pc` entity in the store.
    pub fn pc_name(&self) -> Option<&str> {
        self.party
            .iter()
            .find(|e| e.kind == EntityType::Pc)
            .or_else(|| self.known_entities.first_of_kind(EntityType::Pc))
            .map(|e| e.name.as_str())
    }

    /// The player character, preferring the entity store's record.
    pub fn pc(&self) -> Option<&Entity> {
        let name = self.pc_name()?;
        self.known_entities
            .get(name)
            .or_else(|| self.party.iter().find(|e| e.name == name))
    }

    /// Party members, each resolved through the entity store when present.
    pub fn party_members(&self) -> Vec<&Entity> {
        self.party
            .iter()
            .map(|member| self.known_entities.get(&member.name).unwrap_or(member))
            .collect()
    }

    /// Add or replace a party member by name.
    pub fn upsert_party_member(&mut self, entity: Entity) {
        self.party.retain(|e| e.name != entity.name);
        self.party.push(entity);
    }

    /// Refresh the party copy of `name` from the entity store.
    pub fn sync_party_member(&mut self, name: &str) {
        let Some(fresh) = self.known_entities.get(name) else {
            return;
        };
        if let Some(member) = self.party.iter_mut().find(|e| e.name == name) {
            *member = fresh.clone();
        }
    }

    /// Follow an entity rename into the party and the status ledger.
    pub fn rename_references(&mut self, old: &str, new: &str) {
        for member in self.party.iter_mut().filter(|e| e.name == old) {
            member.name = new.to_string();
        }
        self.statuses.rename_owner(old, new);
    }

    /// Add a skill to the player character's learned list, in both the
    /// entity store and the party. Duplicates are ignored.
    pub fn learn_skill_for_pc(&mut self, skill: &str) {
        if let Some(pc) = self
            .known_entities
            .first_of_kind(EntityType::Pc)
            .map(|e| e.name.clone())
            .and_then(|name| self.known_entities.get_mut(&name))
        {
            pc.learn_skill(skill);
        }
        for member in self.party.iter_mut().filter(|e| e.kind == EntityType::Pc) {
            member.learn_skill(skill);
        }
    }

    /// The choices of the most recent model reply in history that still
    /// parses. Used to restore choices after a failed turn.
    pub fn last_known_choices(&self) -> Vec<String> {
        self.game_history
            .iter()
            .rev()
            .find(|e| e.role == HistoryRole::Model)
            .and_then(|e| serde_json::from_str::<serde_json::Value>(extract_json(e.text())).ok())
            .and_then(|json| {
                json.get("choices")?.as_array().map(|choices| {
                    choices
                        .iter()
                        .filter_map(|c| c.as_str().map(str::to_string))
                        .collect()
                })
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::LIVING_WORLD_RULE_ID;

    fn sample_world() -> WorldData {
        WorldData::new("Wuxia", "Minh")
            .with_bio("A wandering swordsman")
            .with_personality("Calm", "INTJ")
            .with_skill("Wind Step", "")
            .with_skill("  ", "ignored")
    }

    #[test]
    fn test_new_game_builds_pc_and_skills() {
        let state = GameState::new_game(sample_world());

        let pc = state.pc().unwrap();
        assert_eq!(pc.name, "Minh");
        assert_eq!(pc.description, "A wandering swordsman");
        assert_eq!(pc.personality_mbti.as_deref(), Some("INTJ"));
        assert_eq!(pc.gender, None);
        assert_eq!(pc.learned_skills, vec!["Wind Step"]);

        let skill = state.known_entities.get("Wind Step").unwrap();
        assert_eq!(skill.kind, EntityType::Skill);
        assert_eq!(skill.description, NO_DESCRIPTION);
        assert_eq!(state.known_entities.len(), 2);

        assert_eq!(state.party.len(), 1);
        assert!(state.custom_rules.get(LIVING_WORLD_RULE_ID).is_some_and(|r| r.is_active));
        assert!(!state.system_instruction.is_empty());
        assert_eq!(state.turn_count, 0);
    }

    #[test]
    fn test_learn_skill_updates_store_and_party() {
        let mut state = GameState::new_game(sample_world());
        state.learn_skill_for_pc("Iron Palm");
        state.learn_skill_for_pc("Iron Palm");

        assert_eq!(state.party[0].learned_skills, vec!["Wind Step", "Iron Palm"]);
        assert_eq!(state.pc().unwrap().learned_skills, vec!["Wind Step", "Iron Palm"]);
    }

    #[test]
    fn test_party_members_resolve_through_store() {
        let mut state = GameState::new_game(sample_world());
        if let Some(pc) = state.known_entities.get_mut("Minh") {
            pc.realm = Some("Foundation".into());
        }
        assert_eq!(state.party_members()[0].realm.as_deref(), Some("Foundation"));
        assert_eq!(state.party[0].realm.as_deref(), Some(DEFAULT_PC_REALM));

        state.sync_party_member("Minh");
        assert_eq!(state.party[0].realm.as_deref(), Some("Foundation"));
    }

    #[test]
    fn test_last_known_choices() {
        let mut state = GameState::new_game(sample_world());
        assert!(state.last_known_choices().is_empty());

        state
            .game_history
            .push(HistoryEntry::model(r#"{"story": "s", "choices": ["Run", "Hide"]}"#));
        state.game_history.push(HistoryEntry::user("--- PLAYER ACTION ---\n\"jump\""));
        assert_eq!(state.last_known_choices(), vec!["Run", "Hide"]);

        state.game_history.push(HistoryEntry::model("not json"));
        assert!(state.last_known_choices().is_empty());
    }

    #[test]
    fn test_history_entry_layout() {
        let json = serde_json::to_value(HistoryEntry::model("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "model", "parts": [{"text": "hi"}]}));
    }
}
