//! Tag handlers and the narrative reducer.
//!
//! Each tag name maps to one handler with the same signature. Handlers
//! never fail: a tag missing the attributes it needs, or pointing at
//! something that does not exist, does nothing.

use super::{scan, strip, Attributes};
use crate::entity::{Entity, EntityState, EntityType, PC_OWNER};
use crate::quest::{Quest, QuestStatus};
use crate::state::{GameState, NO_DESCRIPTION};
use lazy_static::lazy_static;
use log::debug;
use std::collections::HashMap;

/// Applies one tag's attributes to the game state.
pub type TagHandler = fn(&Attributes, &mut GameState);

const MAX_DURABILITY: f64 = 100.0;

lazy_static! {
    static ref HANDLERS: HashMap<&'static str, TagHandler> = {
        let mut m: HashMap<&'static str, TagHandler> = HashMap::new();
        m.insert("MEMORY_ADD", memory_add);
        m.insert("STATUS_APPLIED_SELF", status_applied_self);
        m.insert("STATUS_APPLIED_NPC", status_applied_npc);
        m.insert("STATUS_CURED_SELF", status_cured_self);
        m.insert("STATUS_CURED_NPC", status_cured_npc);
        m.insert("SKILL_LEARNED", skill_learned);
        m.insert("LORE_NPC", lore_npc);
        m.insert("LORE_ITEM", lore_item);
        m.insert("LORE_SKILL", lore_skill);
        m.insert("LORE_LOCATION", lore_location);
        m.insert("LORE_FACTION", lore_faction);
        m.insert("LORE_CONCEPT", lore_concept);
        m.insert("ENTITY_UPDATE", entity_update);
        m.insert("ENTITY_SET_STATE", entity_update);
        m.insert("ITEM_AQUIRED", item_acquired);
        m.insert("ITEM_DAMAGED", item_damaged);
        m.insert("ITEM_REPAIRED", item_repaired);
        m.insert("ITEM_CONSUMED", item_consumed);
        m.insert("ITEM_EQUIPPED", item_equipped);
        m.insert("ITEM_UNEQUIPPED", item_unequipped);
        m.insert("QUEST_ASSIGNED", quest_assigned);
        m.insert("QUEST_UPDATED", quest_updated);
        m.insert("QUEST_OBJECTIVE_COMPLETED", quest_objective_completed);
        m.insert("COMPANION", companion);
        m.insert("RULE_DEACTIVATE", rule_deactivate);
        m
    };
}

/// Handler registered for a tag name.
pub fn handler_for(name: &str) -> Option<TagHandler> {
    HANDLERS.get(name).copied()
}

/// Apply a single tag. Returns false if the tag name has no handler.
pub fn apply_tag(name: &str, attrs: &Attributes, state: &mut GameState) -> bool {
    match handler_for(name) {
        Some(handler) => {
            debug!("Applying tag {} ({} attributes)", name, attrs.len());
            handler(attrs, state);
            true
        }
        None => {
            debug!("Ignoring unknown tag {}", name);
            false
        }
    }
}

/// Result of reducing one piece of narrator text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reduction {
    /// The text with every tag span removed.
    pub display: String,
    /// Names of tags that had a handler, in order.
    pub applied: Vec<String>,
    /// Names of tag-shaped spans with no handler.
    pub ignored: Vec<String>,
}

/// Apply every tag in `text` to `state` in order of appearance and return
/// the cleaned display text.
pub fn reduce_narrative(text: &str, state: &mut GameState) -> Reduction {
    let mut reduction = Reduction::default();
    for tag in scan(text) {
        if apply_tag(&tag.name, &tag.attributes, state) {
            reduction.applied.push(tag.name);
        } else {
            reduction.ignored.push(tag.name);
        }
    }
    reduction.display = strip(text);
    reduction
}

// ============================================================================
// Memories and statuses
// ============================================================================

fn memory_add(attrs: &Attributes, state: &mut GameState) {
    if let Some(text) = attrs.text("text") {
        state.memories.add(text);
    }
}

fn status_applied_self(attrs: &Attributes, state: &mut GameState) {
    if let Some(name) = attrs.text("name") {
        state.statuses.apply(name, PC_OWNER, attrs);
    }
}

fn status_applied_npc(attrs: &Attributes, state: &mut GameState) {
    if let (Some(name), Some(owner)) = (attrs.text("name"), attrs.text("npcName")) {
        state.statuses.apply(name, owner, attrs);
    }
}

fn status_cured_self(attrs: &Attributes, state: &mut GameState) {
    if let Some(name) = attrs.text("name") {
        state.statuses.cure(name, PC_OWNER);
    }
}

fn status_cured_npc(attrs: &Attributes, state: &mut GameState) {
    if let (Some(name), Some(owner)) = (attrs.text("name"), attrs.text("npcName")) {
        state.statuses.cure(name, owner);
    }
}

// ============================================================================
// Skills and lore
// ============================================================================

fn skill_learned(attrs: &Attributes, state: &mut GameState) {
    let Some(name) = attrs.text("name") else {
        return;
    };

    let mut skill = Entity::new(name, EntityType::Skill)
        .with_description(attrs.text("description").unwrap_or(NO_DESCRIPTION));
    skill.realm = attrs.text("realm").map(str::to_string);
    skill.skill_type = attrs.text("skillType").map(str::to_string);
    state.known_entities.upsert(skill);

    state.learn_skill_for_pc(name);
}

fn lore(kind: EntityType, attrs: &Attributes, state: &mut GameState) {
    let Some(name) = attrs.text("name") else {
        return;
    };
    let mut entity = Entity::new(name, kind);
    entity.merge_attributes(attrs, &["name", "type"]);
    state.known_entities.upsert(entity);
    state.sync_party_member(name);
}

fn lore_npc(attrs: &Attributes, state: &mut GameState) {
    lore(EntityType::Npc, attrs, state);
}

fn lore_item(attrs: &Attributes, state: &mut GameState) {
    lore(EntityType::Item, attrs, state);
}

fn lore_skill(attrs: &Attributes, state: &mut GameState) {
    lore(EntityType::Skill, attrs, state);
}

fn lore_location(attrs: &Attributes, state: &mut GameState) {
    lore(EntityType::Location, attrs, state);
}

fn lore_faction(attrs: &Attributes, state: &mut GameState) {
    lore(EntityType::Faction, attrs, state);
}

fn lore_concept(attrs: &Attributes, state: &mut GameState) {
    lore(EntityType::Concept, attrs, state);
}

// ============================================================================
// Entity updates
// ============================================================================

fn entity_update(attrs: &Attributes, state: &mut GameState) {
    let Some(name) = attrs.text("name") else {
        return;
    };
    let Some(entity) = state.known_entities.get_mut(name) else {
        return;
    };

    entity.merge_attributes(attrs, &["name", "newName", "newDescription"]);
    if let Some(description) = attrs.text("newDescription") {
        entity.description = description.to_string();
    }

    let mut current = name;
    if let Some(new_name) = attrs.text("newName").filter(|n| *n != name) {
        state.known_entities.rename(name, new_name);
        state.rename_references(name, new_name);
        current = new_name;
    }
    state.sync_party_member(current);
}

// ============================================================================
// Items
// ============================================================================

fn item_acquired(attrs: &Attributes, state: &mut GameState) {
    let Some(name) = attrs.text("name") else {
        return;
    };
    let mut item = Entity::new(name, EntityType::Item);
    item.merge_attributes(attrs, &["name", "type"]);
    item.owner = Some(PC_OWNER.to_string());
    state.known_entities.upsert(item);
}

/// Mutable access to an item entity by the tag's `name` attribute.
fn item_mut<'a>(attrs: &Attributes, state: &'a mut GameState) -> Option<&'a mut Entity> {
    let name = attrs.text("name")?;
    state
        .known_entities
        .get_mut(name)
        .filter(|e| e.kind == EntityType::Item)
}

fn item_damaged(attrs: &Attributes, state: &mut GameState) {
    let Some(damage) = attrs.number("damage").filter(|d| *d != 0.0) else {
        return;
    };
    let Some(item) = item_mut(attrs, state) else {
        return;
    };
    let Some(durability) = item.durability else {
        return;
    };

    let remaining = (durability - damage).max(0.0);
    item.durability = Some(remaining);
    if remaining == 0.0 {
        item.state = Some(EntityState::Broken);
        item.equipped = Some(false);
    }
}

fn item_repaired(attrs: &Attributes, state: &mut GameState) {
    let Some(amount) = attrs.number("amount").filter(|a| *a != 0.0) else {
        return;
    };
    let Some(item) = item_mut(attrs, state) else {
        return;
    };
    let Some(durability) = item.durability else {
        return;
    };

    let repaired = (durability + amount).min(MAX_DURABILITY);
    item.durability = Some(repaired);
    if item.is_broken() && repaired > 0.0 {
        item.state = Some(EntityState::Intact);
    }
}

fn item_consumed(attrs: &Attributes, state: &mut GameState) {
    let pc_name = state.pc_name().map(str::to_string);
    let Some(item) = item_mut(attrs, state) else {
        return;
    };
    if !item.is_player_owned(pc_name.as_deref()) {
        return;
    }

    match item.uses {
        Some(uses) if uses > 1.0 => item.uses = Some(uses - 1.0),
        _ => {
            let name = item.name.clone();
            state.known_entities.remove(&name);
        }
    }
}

fn item_equipped(attrs: &Attributes, state: &mut GameState) {
    let pc_name = state.pc_name().map(str::to_string);
    let Some(item) = item_mut(attrs, state) else {
        return;
    };
    if item.is_player_owned(pc_name.as_deref()) && item.equippable == Some(true) && !item.is_broken() {
        item.equipped = Some(true);
    }
}

fn item_unequipped(attrs: &Attributes, state: &mut GameState) {
    let pc_name = state.pc_name().map(str::to_string);
    let Some(item) = item_mut(attrs, state) else {
        return;
    };
    if item.is_player_owned(pc_name.as_deref()) {
        item.equipped = Some(false);
    }
}

// ============================================================================
// Quests
// ============================================================================

fn quest_assigned(attrs: &Attributes, state: &mut GameState) {
    let (Some(title), Some(description)) = (attrs.text("title"), attrs.text("description")) else {
        return;
    };
    let mut quest = Quest::new(title, description).with_objectives(attrs.objectives());
    quest.giver = attrs.text("giver").map(str::to_string);
    quest.reward = attrs.text("reward").map(str::to_string);
    quest.is_main_quest = attrs.flag("isMainQuest").unwrap_or(false);
    state.quests.assign(quest);
}

fn quest_updated(attrs: &Attributes, state: &mut GameState) {
    let Some(title) = attrs.text("title") else {
        return;
    };
    let Some(status) = attrs.text("status").and_then(|s| s.parse::<QuestStatus>().ok()) else {
        debug!("QUEST_UPDATED for {:?} without a known status", title);
        return;
    };
    if let Some(quest) = state.quests.get_mut(title) {
        quest.status = status;
    }
}

fn quest_objective_completed(attrs: &Attributes, state: &mut GameState) {
    let (Some(title), Some(objective)) = (attrs.text("questTitle"), attrs.text("objectiveDescription")) else {
        return;
    };
    if let Some(quest) = state.quests.get_mut(title) {
        quest.complete_objective(objective);
    }
}

// ============================================================================
// Party and rules
// ============================================================================

fn companion(attrs: &Attributes, state: &mut GameState) {
    let Some(name) = attrs.text("name") else {
        return;
    };
    let mut entity = Entity::new(name, EntityType::Companion);
    entity.merge_attributes(attrs, &["name", "type"]);
    state.known_entities.upsert(entity.clone());
    state.upsert_party_member(entity);
}

fn rule_deactivate(attrs: &Attributes, state: &mut GameState) {
    if let Some(id) = attrs.text("id") {
        state.custom_rules.deactivate(id);
    }
}
