//! Context compiler.
//!
//! Builds the user prompt for one narrator call from the current state.
//! Everything here is read-only over [`GameState`].
//!
//! Retrieval works in two passes. The direct set is the player character,
//! the party, every entity named in the action, and every equipped item the
//! player owns. Then one hop out: entities named in the description of a
//! direct entity become indirect context. The hop is not repeated.

use super::client::extract_json;
use crate::archetype;
use crate::entity::{Entity, EntityState, EntityType, PC_OWNER};
use crate::rules::{RuleBook, RuleDiff};
use crate::state::{GameState, HistoryEntry, HistoryRole};
use crate::tags;
use std::collections::HashSet;
use std::fmt::Write;

/// Marker line that precedes the quoted player action in every prompt.
pub const ACTION_MARKER: &str = "--- PLAYER ACTION ---";

/// History entries rendered into the prompt.
pub const HISTORY_WINDOW: usize = 10;

const SECTION_RULE: &str = "-------------------------------------\n\n";
const MATURE_DIRECTIVE: &str = "\nNSFW NOTE: 18+ mode is active for this turn.\n";
const CLOSING_INSTRUCTION: &str =
    "REQUEST: Based on the player's action and ALL of the retrieved knowledge, continue the story logically.";

/// Entities selected for a prompt.
#[derive(Debug, Default)]
pub struct Retrieval<'a> {
    pub direct: Vec<&'a Entity>,
    pub indirect: Vec<&'a Entity>,
}

impl<'a> Retrieval<'a> {
    pub fn contains(&self, name: &str) -> bool {
        self.direct.iter().chain(&self.indirect).any(|e| e.name == name)
    }
}

/// Select the entities relevant to `action`.
pub fn retrieve<'a>(action: &str, state: &'a GameState) -> Retrieval<'a> {
    let action = action.to_lowercase();
    let pc_name = state.pc_name();
    let mut seen = HashSet::new();
    let mut retrieval = Retrieval::default();

    let mut add_direct = |entity: &'a Entity, retrieval: &mut Retrieval<'a>| {
        if seen.insert(entity.name.as_str()) {
            retrieval.direct.push(entity);
        }
    };

    if let Some(pc) = state.pc() {
        add_direct(pc, &mut retrieval);
    }
    for member in state.party_members() {
        add_direct(member, &mut retrieval);
    }
    for entity in state.known_entities.iter() {
        let named = !entity.name.is_empty() && action.contains(&entity.name.to_lowercase());
        let equipped = entity.kind == EntityType::Item
            && entity.is_equipped()
            && entity.is_player_owned(pc_name);
        if named || equipped {
            add_direct(entity, &mut retrieval);
        }
    }

    let direct_descriptions: Vec<String> = retrieval
        .direct
        .iter()
        .map(|e| e.description.to_lowercase())
        .filter(|d| !d.is_empty())
        .collect();
    for description in &direct_descriptions {
        for entity in state.known_entities.iter() {
            if entity.name.is_empty() || seen.contains(entity.name.as_str()) {
                continue;
            }
            if description.contains(&entity.name.to_lowercase()) {
                seen.insert(entity.name.as_str());
                retrieval.indirect.push(entity);
            }
        }
    }

    retrieval
}

/// Dead or destroyed entities are hidden unless they are companions.
/// Broken entities are hidden.
fn is_interactable(entity: &Entity) -> bool {
    if entity.is_gone() {
        return entity.kind == EntityType::Companion;
    }
    !entity.is_broken()
}

/// One prompt line describing an entity.
pub fn format_entity(entity: &Entity, state: &GameState) -> String {
    let mut details = Vec::new();

    let state_text = match entity.state {
        Some(EntityState::Dead) => Some("DEAD"),
        Some(EntityState::Broken) => Some("BROKEN"),
        Some(EntityState::Destroyed) => Some("DESTROYED"),
        _ => None,
    };
    if let Some(state_text) = state_text {
        details.push(format!("State: {state_text}"));
    }
    if !entity.description.is_empty() {
        details.push(format!("Description: {}", entity.description));
    }
    if let Some(personality) = &entity.personality {
        details.push(format!("Personality (surface): {personality}"));
    }
    if let Some(arch) = entity.personality_mbti.as_deref().and_then(archetype::lookup) {
        details.push(format!("Personality (core - {}): {}", arch.code, arch.description));
    }
    if let Some(realm) = &entity.realm {
        details.push(format!("Realm: {realm}"));
    }
    if entity.kind == EntityType::Item {
        if entity.is_equipped() {
            details.push("State: Equipped".to_string());
        }
        if let Some(uses) = entity.uses {
            details.push(format!("Uses: {uses}"));
        }
        if let Some(durability) = entity.durability {
            details.push(format!("Durability: {durability}/100"));
        }
    }
    let statuses: Vec<&str> = state
        .statuses
        .for_owner(&entity.name)
        .map(|s| s.name.as_str())
        .collect();
    if !statuses.is_empty() {
        details.push(format!("Effects: {}", statuses.join(", ")));
    }
    if let Some(relationship) = &entity.relationship {
        details.push(format!("Relationship: {relationship}"));
    }

    format!("- {} ({}): {}", entity.name, entity.kind, details.join("; "))
}

/// The quoted action from a prompt or compact history entry.
pub fn extract_action(text: &str) -> Option<&str> {
    let start = text.find(ACTION_MARKER)? + ACTION_MARKER.len();
    let rest = text[start..].strip_prefix("\n\"")?;
    let end = rest.find('"')?;
    (end > 0).then(|| &rest[..end])
}

/// The action block stored in history for a player turn.
pub fn action_block(action: &str) -> String {
    format!("{ACTION_MARKER}\n\"{action}\"")
}

/// Display text of a history entry: the player's action, or the tag-free
/// story of a model reply.
pub fn render_history_entry(entry: &HistoryEntry) -> String {
    match entry.role {
        HistoryRole::User => format!("> {}", extract_action(entry.text()).unwrap_or("An action...")),
        HistoryRole::Model => tags::strip(&model_story(entry.text())),
    }
}

/// The `story` field of a raw model reply, or the raw text when it does not
/// parse.
pub fn model_story(raw: &str) -> String {
    serde_json::from_str::<serde_json::Value>(extract_json(raw))
        .ok()
        .and_then(|json| json.get("story")?.as_str().map(str::to_string))
        .unwrap_or_else(|| raw.to_string())
}

fn write_rules(out: &mut String, rules: &RuleBook) {
    let text = rules.active_text();
    if !text.is_empty() {
        let _ = writeln!(out, "--- CUSTOM WORLD RULES (ALWAYS APPLY) ---\n{text}\n--- END OF RULES ---\n");
    }
}

fn write_pc(out: &mut String, pc: &Entity, state: &GameState) {
    out.push_str("--- PLAYER CHARACTER (PC) ---\n");
    let _ = writeln!(out, "Name: {}", pc.name);
    if let Some(gender) = &pc.gender {
        let _ = writeln!(out, "Gender: {gender}");
    }
    if let Some(personality) = &pc.personality {
        let _ = writeln!(out, "Personality (surface): {personality}");
    }
    if let Some(arch) = pc.personality_mbti.as_deref().and_then(archetype::lookup) {
        let _ = writeln!(out, "Personality (core - {}): {} {}", arch.code, arch.name, arch.title);
    }
    if let Some(realm) = &pc.realm {
        let _ = writeln!(out, "Realm: {realm}");
    }
    if !pc.description.is_empty() {
        let _ = writeln!(out, "Bio: {}", pc.description);
    }
    let statuses: Vec<&str> = state
        .statuses
        .iter()
        .filter(|s| s.owner == PC_OWNER || s.owner == pc.name)
        .map(|s| s.name.as_str())
        .collect();
    if !statuses.is_empty() {
        let _ = writeln!(out, "Current PC statuses: {}", statuses.join(", "));
    }
    out.push_str(SECTION_RULE);

    let skills: Vec<&Entity> = pc
        .learned_skills
        .iter()
        .filter_map(|name| state.known_entities.get(name))
        .filter(|skill| !skill.is_broken() && skill.state != Some(EntityState::Destroyed))
        .collect();
    if !skills.is_empty() {
        out.push_str("--- LEARNED SKILLS (ready for use) ---\n");
        for skill in skills {
            if skill.description.is_empty() {
                let _ = writeln!(out, "- {}", skill.name);
            } else {
                let _ = writeln!(out, "- {}: {}", skill.name, skill.description);
            }
        }
        out.push_str(SECTION_RULE);
    }
}

fn write_knowledge(out: &mut String, retrieval: &Retrieval<'_>, state: &GameState) {
    out.push_str("--- RELEVANT KNOWLEDGE (retrieved for this action) ---\n");
    let _ = writeln!(out, "Current turn: {}\n", state.turn_count);

    out.push_str("**Related entities & items (direct):**\n");
    let direct: Vec<&&Entity> = retrieval
        .direct
        .iter()
        .filter(|e| e.kind != EntityType::Pc && is_interactable(e))
        .collect();
    if direct.is_empty() {
        out.push_str("None.\n");
    }
    for entity in direct {
        let _ = writeln!(out, "{}", format_entity(entity, state));
    }

    let indirect: Vec<&&Entity> = retrieval.indirect.iter().filter(|e| is_interactable(e)).collect();
    if !indirect.is_empty() {
        out.push_str("\n**Related entities & items (indirect):**\n");
        for entity in indirect {
            let _ = writeln!(out, "{}", format_entity(entity, state));
        }
    }

    if !state.statuses.is_empty() {
        out.push_str("\n**GLOBAL STATUS LIST (IMPORTANT):**\n");
        for status in state.statuses.iter() {
            let mut details = vec![
                format!("Target: {}", status.owner),
                format!("Duration: {}", status.duration.as_deref().unwrap_or("Unknown")),
            ];
            if let Some(cure) = &status.cure_conditions {
                details.push(format!("Cure: {cure}"));
            }
            let _ = writeln!(out, "- {}: {}", status.name, details.join("; "));
        }
    }

    let quests: Vec<_> = state.quests.active().collect();
    if !quests.is_empty() {
        out.push_str("\n**Active quests:**\n");
        for quest in quests {
            let pending: Vec<&str> = quest.pending_objectives().map(|o| o.description.as_str()).collect();
            let _ = writeln!(out, "- {}: (Objectives: {})", quest.title, pending.join(", "));
        }
    }
    out.push_str("--- END OF KNOWLEDGE ---\n");
}

fn write_chronicle(out: &mut String, state: &GameState) {
    if state.chronicle.is_empty() {
        return;
    }
    let (memoir, chapter, turn) = state.chronicle.excerpt();
    out.push_str("\n--- CHRONICLE (HISTORY SUMMARY) ---\n");
    for (heading, entries) in [
        ("**Memoir (the greatest events):**", memoir),
        ("**Chapters (recent events):**", chapter),
        ("**Turns (what just happened):**", turn),
    ] {
        if entries.is_empty() {
            continue;
        }
        let _ = writeln!(out, "{heading}");
        for entry in entries {
            let _ = writeln!(out, "- {entry}");
        }
    }
    out.push_str("--- END OF CHRONICLE ---\n");
}

fn write_recent_history(out: &mut String, history: &[HistoryEntry]) {
    out.push_str("--- RECENT EVENTS ---\n");
    let window = &history[history.len().saturating_sub(HISTORY_WINDOW)..];
    if window.is_empty() {
        out.push_str("This is the first turn.\n");
    } else {
        let rendered: Vec<String> = window.iter().map(render_history_entry).collect();
        let _ = writeln!(out, "{}", rendered.join("\n\n"));
    }
    out.push_str("--- END OF EVENTS ---\n");
}

fn write_pinned_memories(out: &mut String, state: &GameState) {
    let pinned: Vec<String> = state.memories.pinned().map(|m| format!("- {}", m.text)).collect();
    if !pinned.is_empty() {
        let _ = writeln!(out, "\n--- PINNED MEMORIES (IMPORTANT) ---\n{}", pinned.join("\n"));
    }
}

/// Compile the prompt for a player turn.
///
/// `rule_directive` is placed first when non-empty. `mature` adds the
/// 18+ directive after the action.
pub fn compile_prompt(action: &str, state: &GameState, rule_directive: &str, mature: bool) -> String {
    let retrieval = retrieve(action, state);
    let mut out = String::new();

    out.push_str(rule_directive);
    write_rules(&mut out, &state.custom_rules);
    if let Some(pc) = state.pc() {
        write_pc(&mut out, pc, state);
    }

    out.push_str("--- WORLD (CORE) ---\n");
    if !state.world_data.genre.is_empty() {
        let _ = writeln!(out, "Genre: {}", state.world_data.genre);
    }
    if !state.world_data.world_detail.is_empty() {
        let _ = writeln!(out, "Detail: {}", state.world_data.world_detail);
    }
    out.push_str(SECTION_RULE);

    write_knowledge(&mut out, &retrieval, state);
    write_chronicle(&mut out, state);
    write_recent_history(&mut out, &state.game_history);
    write_pinned_memories(&mut out, state);

    let _ = writeln!(out, "\n{}", action_block(action));
    if mature {
        out.push_str(MATURE_DIRECTIVE);
    }
    out.push_str(CLOSING_INSTRUCTION);
    out
}

/// Compile the prompt for a rule-change system turn. The narrator is asked
/// for tags only.
pub fn compile_rule_update_prompt(diff: &RuleDiff, rules: &RuleBook) -> String {
    let mut out = diff.to_directive();
    write_rules(&mut out, rules);
    out.push_str(
        "--- SYSTEM REQUEST ---\n\
         Process the rule updates above. Emit only the command tags needed to update the world. Do NOT narrate any story.\n\
         --- END OF REQUEST ---",
    );
    out
}
