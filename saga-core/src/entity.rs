//! Entities and the entity store.
//!
//! An entity is anything with a name the narrator can refer to: the player
//! character, NPCs, companions, items, skills, places, factions and concepts.
//! The store maps each unique name to exactly one entity.

use crate::lenient;
use crate::tags::{AttrValue, Attributes};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Owner value marking an item as carried by the player character.
pub const PC_OWNER: &str = "pc";

/// Kind of entity. Types the engine does not know load as concepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Pc,
    Npc,
    Location,
    Faction,
    Item,
    Skill,
    StatusEffect,
    Companion,
    #[default]
    Concept,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Pc => "pc",
            EntityType::Npc => "npc",
            EntityType::Location => "location",
            EntityType::Faction => "faction",
            EntityType::Item => "item",
            EntityType::Skill => "skill",
            EntityType::StatusEffect => "status_effect",
            EntityType::Companion => "companion",
            EntityType::Concept => "concept",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "pc" => EntityType::Pc,
            "npc" => EntityType::Npc,
            "location" => EntityType::Location,
            "faction" => EntityType::Faction,
            "item" => EntityType::Item,
            "skill" => EntityType::Skill,
            "status_effect" => EntityType::StatusEffect,
            "companion" => EntityType::Companion,
            "concept" => EntityType::Concept,
            _ => return Err(()),
        })
    }
}

/// Lifecycle state. Values the narrator invents are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityState {
    Alive,
    Dead,
    Destroyed,
    Intact,
    Broken,
    Other(String),
}

impl From<String> for EntityState {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "alive" => EntityState::Alive,
            "dead" => EntityState::Dead,
            "destroyed" => EntityState::Destroyed,
            "intact" => EntityState::Intact,
            "broken" => EntityState::Broken,
            _ => EntityState::Other(s),
        }
    }
}

impl From<EntityState> for String {
    fn from(state: EntityState) -> Self {
        match state {
            EntityState::Alive => "alive".into(),
            EntityState::Dead => "dead".into(),
            EntityState::Destroyed => "destroyed".into(),
            EntityState::Intact => "intact".into(),
            EntityState::Broken => "broken".into(),
            EntityState::Other(s) => s,
        }
    }
}

/// A named thing in the world.
///
/// Fields the engine reads are typed; anything else the narrator attaches
/// is kept in `extra` and written back out unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub name: String,

    #[serde(rename = "type", default, deserialize_with = "lenient::parsed_or_default")]
    pub kind: EntityType,

    #[serde(default)]
    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<EntityState>,

    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub gender: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub personality: Option<String>,

    /// Personality archetype code such as `INTJ`.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub personality_mbti: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub relationship: Option<String>,

    /// Power tier or cultivation realm.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub realm: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub owner: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::number")]
    pub uses: Option<f64>,

    /// 0 to 100.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::number")]
    pub durability: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::flag")]
    pub usable: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::flag")]
    pub equippable: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::flag")]
    pub consumable: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::flag")]
    pub learnable: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::flag")]
    pub equipped: Option<bool>,

    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "lenient::string_list")]
    pub skills: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "lenient::string_list")]
    pub learned_skills: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::text")]
    pub skill_type: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Entity {
    pub fn new(name: impl Into<String>, kind: EntityType) -> Self {
        Self {
            name: name.into(),
            kind,
            description: String::new(),
            state: None,
            gender: None,
            personality: None,
            personality_mbti: None,
            relationship: None,
            realm: None,
            owner: None,
            uses: None,
            durability: None,
            usable: None,
            equippable: None,
            consumable: None,
            learnable: None,
            equipped: None,
            skills: Vec::new(),
            learned_skills: Vec::new(),
            skill_type: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Merge tag attributes into this entity.
    ///
    /// Known fields are set from the coerced value when it has the right
    /// shape and left alone otherwise. Unknown keys land in `extra`.
    pub fn merge_attributes(&mut self, attrs: &Attributes, skip: &[&str]) {
        for (key, value) in attrs.iter_except(skip) {
            self.set_attribute(key, value);
        }
    }

    fn set_attribute(&mut self, key: &str, value: &AttrValue) {
        let text = value.as_text();
        match key {
            "name" => {
                if let Some(name) = text.filter(|s| !s.is_empty()) {
                    self.name = name;
                }
            }
            "type" => {
                if let Some(kind) = text.and_then(|s| s.parse().ok()) {
                    self.kind = kind;
                }
            }
            "description" => self.description = text.unwrap_or_default(),
            "state" => self.state = text.map(EntityState::from),
            "gender" => self.gender = text,
            "personality" => self.personality = text,
            "personalityMbti" => self.personality_mbti = text,
            "relationship" => self.relationship = text,
            "realm" => self.realm = text,
            "owner" => self.owner = text,
            "skillType" => self.skill_type = text,
            "uses" | "durability" => {
                let number = match value {
                    AttrValue::Number(n) => Some(*n),
                    _ => None,
                };
                if let Some(n) = number {
                    if key == "uses" {
                        self.uses = Some(n);
                    } else {
                        self.durability = Some(n);
                    }
                }
            }
            "usable" | "equippable" | "consumable" | "learnable" | "equipped" => {
                let flag = match value {
                    AttrValue::Flag(b) => Some(*b),
                    AttrValue::Text(s) => lenient::parse_flag(s),
                    _ => None,
                };
                if let Some(b) = flag {
                    match key {
                        "usable" => self.usable = Some(b),
                        "equippable" => self.equippable = Some(b),
                        "consumable" => self.consumable = Some(b),
                        "learnable" => self.learnable = Some(b),
                        _ => self.equipped = Some(b),
                    }
                }
            }
            "skills" => self.skills = text.map(|s| lenient::split_list(&s)).unwrap_or_default(),
            "learnedSkills" => {
                self.learned_skills = text.map(|s| lenient::split_list(&s)).unwrap_or_default()
            }
            _ => {
                self.extra.insert(key.to_string(), value.to_json());
            }
        }
    }

    /// Dead or destroyed.
    pub fn is_gone(&self) -> bool {
        matches!(self.state, Some(EntityState::Dead) | Some(EntityState::Destroyed))
    }

    pub fn is_broken(&self) -> bool {
        self.state == Some(EntityState::Broken)
    }

    pub fn is_equipped(&self) -> bool {
        self.equipped == Some(true)
    }

    /// Owned by the player character, either through the `"pc"` marker or
    /// the character's own name.
    pub fn is_player_owned(&self, pc_name: Option<&str>) -> bool {
        match self.owner.as_deref() {
            Some(PC_OWNER) => true,
            Some(owner) => pc_name == Some(owner),
            None => false,
        }
    }

    /// Record a learned skill. Returns false if it was already known.
    pub fn learn_skill(&mut self, skill: &str) -> bool {
        if self.learned_skills.iter().any(|s| s == skill) {
            return false;
        }
        self.learned_skills.push(skill.to_string());
        true
    }
}

/// Unique-name index of every entity in the world.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityStore(BTreeMap<String, Entity>);

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entity stored under its name.
    pub fn upsert(&mut self, entity: Entity) {
        self.0.insert(entity.name.clone(), entity);
    }

    pub fn get(&self, name: &str) -> Option<&Entity> {
        self.0.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Entity> {
        self.0.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Entity> {
        self.0.remove(name)
    }

    /// Move an entity to a new key. An entity already stored under the new
    /// name is replaced.
    pub fn rename(&mut self, old: &str, new: &str) -> bool {
        match self.0.remove(old) {
            Some(mut entity) => {
                entity.name = new.to_string();
                self.0.insert(new.to_string(), entity);
                true
            }
            None => false,
        }
    }

    /// First entity of the given kind, in name order.
    pub fn first_of_kind(&self, kind: EntityType) -> Option<&Entity> {
        self.0.values().find(|e| e.kind == kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.0.values()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Entity> for EntityStore {
    fn from_iter<I: IntoIterator<Item = Entity>>(iter: I) -> Self {
        let mut store = Self::new();
        for entity in iter {
            store.upsert(entity);
        }
        store
    }
}
