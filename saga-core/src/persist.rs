//! Save files.
//!
//! A save is the whole [`GameState`] as camelCase JSON. Loading goes through
//! a `serde_json::Value` first so that saves written by older versions can
//! be brought up to the current layout before they are deserialized.

use crate::rules::{CustomRule, IMPORTED_RULE_ID};
use crate::state::GameState;
use crate::world::BASE_INSTRUCTION;
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid save format")]
    InvalidFormat,
}

/// Write the game state as pretty-printed JSON.
pub async fn save_json(state: &GameState, path: impl AsRef<Path>) -> Result<(), PersistError> {
    let content = serde_json::to_string_pretty(state)?;
    fs::write(path.as_ref(), content).await?;
    info!("Saved game to {}", path.as_ref().display());
    Ok(())
}

/// Load a save, accepting older layouts.
pub async fn load_json(path: impl AsRef<Path>) -> Result<GameState, PersistError> {
    let content = fs::read_to_string(path.as_ref()).await?;
    let state = from_json_str(&content)?;
    info!(
        "Loaded game from {} (turn {})",
        path.as_ref().display(),
        state.turn_count
    );
    Ok(state)
}

/// Parse save text, accepting older layouts.
pub fn from_json_str(content: &str) -> Result<GameState, PersistError> {
    let value: Value = serde_json::from_str(content)?;
    let value = upgrade_legacy(value)?;
    Ok(serde_json::from_value(value)?)
}

fn present<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    obj.get(key).filter(|v| !v.is_null())
}

/// Bring an older save up to the current layout.
///
/// `worldData` and `gameHistory` are required. Everything else that later
/// versions added gets a default: the chronicle from the old flat summary
/// list, rules from the old free-text knowledge field, the party from the
/// first `pc` entity, the base instruction, and zeroed counters. Statuses
/// without a name or owner are dropped and nameless entities take their key.
pub fn upgrade_legacy(mut value: Value) -> Result<Value, PersistError> {
    let obj = value.as_object_mut().ok_or(PersistError::InvalidFormat)?;
    if present(obj, "worldData").is_none() || present(obj, "gameHistory").is_none() {
        return Err(PersistError::InvalidFormat);
    }

    let story_summary = obj.remove("storySummary");
    if present(obj, "chronicle").is_none() {
        let turn = story_summary.filter(Value::is_array).unwrap_or_else(|| json!([]));
        debug!("Save has no chronicle, rebuilding from legacy summaries");
        obj.insert("chronicle".into(), json!({ "turn": turn, "chapter": [], "memoir": [] }));
    }

    let knowledge = obj.remove("userKnowledge");
    if present(obj, "customRules").is_none() {
        let rules = match knowledge.as_ref().and_then(Value::as_str).map(str::trim) {
            Some(text) if !text.is_empty() => {
                serde_json::to_value(vec![CustomRule::new(text).with_id(IMPORTED_RULE_ID)])?
            }
            _ => json!([]),
        };
        obj.insert("customRules".into(), rules);
    }

    if present(obj, "party").is_none() {
        let pc = obj
            .get("knownEntities")
            .and_then(Value::as_object)
            .and_then(|entities| {
                entities
                    .values()
                    .find(|e| e.get("type").and_then(Value::as_str) == Some("pc"))
            })
            .cloned();
        obj.insert("party".into(), Value::Array(pc.into_iter().collect()));
    }

    let has_instruction = obj
        .get("systemInstruction")
        .and_then(Value::as_str)
        .is_some_and(|s| !s.is_empty());
    if !has_instruction {
        obj.insert("systemInstruction".into(), Value::String(BASE_INSTRUCTION.to_string()));
    }

    if let Some(statuses) = obj.get_mut("statuses").and_then(Value::as_array_mut) {
        let before = statuses.len();
        statuses.retain(|s| {
            s.get("name").is_some_and(Value::is_string) && s.get("owner").is_some_and(Value::is_string)
        });
        if statuses.len() < before {
            warn!("Dropped {} statuses without a name or owner", before - statuses.len());
        }
    }

    if let Some(entities) = obj.get_mut("knownEntities").and_then(Value::as_object_mut) {
        for (name, entity) in entities.iter_mut() {
            if let Some(fields) = entity.as_object_mut() {
                if !fields.get("name").is_some_and(Value::is_string) {
                    fields.insert("name".into(), Value::String(name.clone()));
                }
            }
        }
    }

    for counter in ["turnCount", "totalTokensUsed", "lastCallTokens"] {
        if !obj.get(counter).is_some_and(Value::is_u64) {
            obj.insert(counter.into(), json!(0));
        }
    }

    Ok(value)
}

/// File name for a new save: `saga-<name>-<unix secs>.json`, with runs of
/// whitespace in the name turned into underscores.
pub fn save_file_name(character_name: &str) -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    let name = character_name.split_whitespace().collect::<Vec<_>>().join("_");
    let name = if name.is_empty() { "Save".to_string() } else { name };
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("saga-{name}-{secs}.json")
}

/// Information about a save file.
#[derive(Debug, Clone)]
pub struct SaveInfo {
    pub path: PathBuf,
    pub character_name: String,
    pub turn_count: u32,
}

/// List the saves in a directory, newest file name first. Files that are
/// not saves are skipped.
pub async fn list_saves(dir: impl AsRef<Path>) -> Result<Vec<SaveInfo>, PersistError> {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Peek {
        world_data: PeekWorld,
        #[serde(default)]
        turn_count: u32,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct PeekWorld {
        #[serde(default)]
        character_name: String,
    }

    let mut saves = Vec::new();
    let mut entries = fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.extension().is_some_and(|e| e == "json") {
            continue;
        }
        let Ok(content) = fs::read_to_string(&path).await else {
            continue;
        };
        if let Ok(peek) = serde_json::from_str::<Peek>(&content) {
            saves.push(SaveInfo {
                path,
                character_name: peek.world_data.character_name,
                turn_count: peek.turn_count,
            });
        }
    }

    saves.sort_by(|a, b| b.path.cmp(&a.path));
    Ok(saves)
}

/// Write a rule set on its own, for sharing between worlds.
pub async fn save_rules_json(rules: &[CustomRule], path: impl AsRef<Path>) -> Result<(), PersistError> {
    let content = serde_json::to_string_pretty(rules)?;
    fs::write(path, content).await?;
    Ok(())
}

/// Read a rule file written by [`save_rules_json`]. Every entry must carry
/// `id`, `content` and `isActive`.
pub async fn load_rules_json(path: impl AsRef<Path>) -> Result<Vec<CustomRule>, PersistError> {
    let content = fs::read_to_string(path).await?;
    let value: Value = serde_json::from_str(&content)?;
    let entries = value.as_array().ok_or(PersistError::InvalidFormat)?;
    let well_formed = entries.iter().all(|r| {
        r.as_object()
            .is_some_and(|o| ["id", "content", "isActive"].iter().all(|k| o.contains_key(*k)))
    });
    if !well_formed {
        return Err(PersistError::InvalidFormat);
    }
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chronicle::Chronicle;
    use crate::world::WorldData;
    use tempfile::TempDir;

    fn legacy_save() -> Value {
        json!({
            "worldData": { "genre": "Wuxia", "characterName": "Minh" },
            "storyLog": ["The mist parts."],
            "choices": ["Walk on"],
            "knownEntities": {
                "Minh": { "name": "Minh", "type": "pc", "description": "A swordsman" },
                "Old Well": { "name": "Old Well", "type": "location", "description": "Dry" }
            },
            "gameHistory": [],
            "storySummary": ["Minh left the village."],
            "userKnowledge": "Magic is rare."
        })
    }

    #[test]
    fn test_upgrade_legacy_fills_defaults() {
        let state: GameState = serde_json::from_value(upgrade_legacy(legacy_save()).unwrap()).unwrap();

        assert_eq!(state.chronicle, Chronicle::from_legacy_summary(vec!["Minh left the village.".into()]));
        let rules = state.custom_rules.to_vec();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].id, IMPORTED_RULE_ID);
        assert_eq!(rules[0].content, "Magic is rare.");
        assert!(rules[0].is_active);
        assert_eq!(state.party.len(), 1);
        assert_eq!(state.party[0].name, "Minh");
        assert_eq!(state.system_instruction, BASE_INSTRUCTION);
        assert_eq!(state.turn_count, 0);
        assert_eq!(state.total_tokens_used, 0);
    }

    #[test]
    fn test_upgrade_keeps_current_fields() {
        let mut save = legacy_save();
        save["chronicle"] = json!({ "turn": [], "chapter": ["c"], "memoir": [] });
        save["customRules"] = json!([]);
        save["turnCount"] = json!(7);

        let state: GameState = serde_json::from_value(upgrade_legacy(save).unwrap()).unwrap();
        assert_eq!(state.chronicle.chapter, vec!["c"]);
        assert!(state.custom_rules.is_empty());
        assert_eq!(state.turn_count, 7);
    }

    #[test]
    fn test_missing_required_fields() {
        let mut save = legacy_save();
        save.as_object_mut().unwrap().remove("gameHistory");
        assert!(matches!(upgrade_legacy(save), Err(PersistError::InvalidFormat)));
        assert!(matches!(upgrade_legacy(json!([1, 2])), Err(PersistError::InvalidFormat)));
    }

    #[test]
    fn test_save_file_name() {
        let name = save_file_name("Lý  Tiểu Long");
        assert!(name.starts_with("saga-Lý_Tiểu_Long-"));
        assert!(name.ends_with(".json"));
        assert!(save_file_name("  ").starts_with("saga-Save-"));
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("game.json");

        let mut state = GameState::new_game(WorldData::new("Wuxia", "Minh"));
        state.turn_count = 12;
        state.chronicle.record_turn("Something happened.");
        state.memories.add("A promise was made.");

        save_json(&state, &path).await.expect("Save should succeed");
        let loaded = load_json(&path).await.expect("Load should succeed");
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn test_list_saves() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let state = GameState::new_game(WorldData::new("Wuxia", "Minh"));
        save_json(&state, temp_dir.path().join("saga-Minh-1.json")).await.unwrap();
        std::fs::write(temp_dir.path().join("notes.json"), "[1, 2, 3]").unwrap();
        std::fs::write(temp_dir.path().join("readme.txt"), "hello").unwrap();

        let saves = list_saves(temp_dir.path()).await.expect("List should succeed");
        assert_eq!(saves.len(), 1);
        assert_eq!(saves[0].character_name, "Minh");
        assert_eq!(saves[0].turn_count, 0);
    }

    #[tokio::test]
    async fn test_rule_file_round_trip() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("rules.json");
        let rules = vec![CustomRule::new("No flying").with_id("r1").inactive()];

        save_rules_json(&rules, &path).await.unwrap();
        assert_eq!(load_rules_json(&path).await.unwrap(), rules);

        std::fs::write(&path, r#"[{"id": "x", "content": "y"}]"#).unwrap();
        assert!(matches!(load_rules_json(&path).await, Err(PersistError::InvalidFormat)));
    }
}
