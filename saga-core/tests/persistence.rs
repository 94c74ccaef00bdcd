//! Save/load through a session, including saves from older versions.

use saga_core::chronicle::Chronicle;
use saga_core::entity::EntityType;
use saga_core::persist::{self, list_saves, save_file_name, PersistError};
use saga_core::rules::IMPORTED_RULE_ID;
use saga_core::testing::{MockModel, TestHarness};
use saga_core::world::BASE_INSTRUCTION;
use saga_core::{GameSession, SessionConfig, SessionError, WorldData};
use tempfile::TempDir;

#[tokio::test]
async fn test_session_save_and_resume() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let save_path = temp_dir.path().join(save_file_name("Aria Vale"));

    let mut harness = TestHarness::with_world(
        WorldData::new("Fantasy", "Aria Vale")
            .with_bio("A ranger")
            .with_skill("Tracking", "Read the land"),
    );
    harness.expect_turn(
        "Wolves circle. [COMPANION: name=\"Ash\", description=\"A grey hound\"] \
         [STATUS_APPLIED_NPC: name=\"Frightened\", npcName=\"Ash\", type=\"debuff\"] \
         [QUEST_ASSIGNED: title=\"The Pack\", description=\"Drive off the wolves\", objectives=\"Find the den\"] \
         [ITEM_AQUIRED: name=\"Bone Whistle\", usable=\"true\", uses=\"3\"] \
         [MEMORY_ADD: text=\"Ash trusts Aria\"]",
        &["Fight", "Climb a tree"],
    );
    harness.input("follow the tracks").await.unwrap();
    harness.session.toggle_memory_pin(0);
    harness.session.save(&save_path).await.expect("Save should succeed");

    let model = MockModel::new().turn("The wolves scatter.", &["Rest"]);
    let mut resumed = GameSession::load(model, &save_path, SessionConfig::new().with_enrichment(false))
        .await
        .expect("Load should succeed");

    assert_eq!(resumed.state(), harness.state());
    assert_eq!(resumed.choices(), ["Fight", "Climb a tree"]);
    assert_eq!(resumed.state().party_members().len(), 2);
    assert!(resumed.state().memories.iter().next().unwrap().pinned);

    resumed.choose(0).await.unwrap();
    assert_eq!(resumed.state().turn_count, 2);
    // The resumed session sends the saved history.
    assert_eq!(resumed.client().last_request().unwrap().contents.len(), 3);

    let saves = list_saves(temp_dir.path()).await.expect("List should succeed");
    assert_eq!(saves.len(), 1);
    assert_eq!(saves[0].character_name, "Aria Vale");
    assert_eq!(saves[0].turn_count, 1);
}

#[tokio::test]
async fn test_load_legacy_save() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("old.json");
    std::fs::write(
        &path,
        r#"{
            "worldData": { "genre": "Tiên hiệp", "characterName": "Lâm", "allowNsfw": false },
            "storyLog": ["> đi", "Gió thổi."],
            "choices": ["Tiếp tục"],
            "knownEntities": {
                "Lâm": { "name": "Lâm", "type": "pc", "description": "Đệ tử", "learnedSkills": "Phong Bộ" },
                "Kiếm Gỗ": { "name": "Kiếm Gỗ", "type": "item", "owner": "pc", "durability": 80 }
            },
            "statuses": [],
            "quests": [],
            "gameHistory": [
                { "role": "user", "parts": [{ "text": "--- PLAYER ACTION ---\n\"đi\"" }] },
                { "role": "model", "parts": [{ "text": "{\"story\": \"Gió thổi.\", \"choices\": [\"Tiếp tục\"]}" }] }
            ],
            "memories": [],
            "storySummary": ["Lâm rời làng."],
            "userKnowledge": "Linh khí cạn kiệt."
        }"#,
    )
    .unwrap();

    let state = persist::load_json(&path).await.expect("Legacy save should load");

    assert_eq!(state.chronicle, Chronicle::from_legacy_summary(vec!["Lâm rời làng.".into()]));
    let rule = state.custom_rules.get(IMPORTED_RULE_ID).unwrap();
    assert_eq!(rule.content, "Linh khí cạn kiệt.");
    assert!(rule.is_active);
    assert_eq!(state.pc_name(), Some("Lâm"));
    assert_eq!(state.party.len(), 1);
    assert_eq!(state.system_instruction, BASE_INSTRUCTION);
    assert_eq!(state.turn_count, 0);
    assert_eq!(state.last_known_choices(), vec!["Tiếp tục"]);
    assert_eq!(state.known_entities.get("Kiếm Gỗ").unwrap().durability, Some(80.0));
}

#[tokio::test]
async fn test_load_rejects_non_saves() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("notes.json");
    std::fs::write(&path, r#"{"storyLog": []}"#).unwrap();

    let result = GameSession::load(MockModel::new(), &path, SessionConfig::new()).await;
    assert!(matches!(
        result,
        Err(SessionError::Persist(PersistError::InvalidFormat))
    ));
}

#[test]
fn test_unknown_entity_type_loads_as_concept() {
    let state = persist::from_json_str(
        r#"{
            "worldData": { "genre": "Fantasy", "characterName": "Aria" },
            "knownEntities": {
                "Aria": { "name": "Aria", "type": "pc" },
                "Beast": { "name": "Beast", "type": "monster", "description": "Teeth" },
                "Shade": { "type": 7 }
            },
            "gameHistory": []
        }"#,
    )
    .expect("Save with odd entity types should load");

    let beast = state.known_entities.get("Beast").unwrap();
    assert_eq!(beast.kind, EntityType::Concept);
    assert_eq!(beast.description, "Teeth");
    let shade = state.known_entities.get("Shade").unwrap();
    assert_eq!(shade.name, "Shade");
    assert_eq!(shade.kind, EntityType::Concept);
    assert_eq!(state.pc_name(), Some("Aria"));
}

#[test]
fn test_statuses_without_name_are_dropped() {
    let state = persist::from_json_str(
        r#"{
            "worldData": { "genre": "Fantasy", "characterName": "Aria" },
            "statuses": [
                { "owner": "pc", "type": "buff", "description": "A nameless glow" },
                { "name": "Poisoned", "type": "debuff" },
                { "name": "Blessed", "owner": "pc", "type": "buff" }
            ],
            "gameHistory": []
        }"#,
    )
    .expect("Save with broken statuses should load");

    let names: Vec<&str> = state.statuses.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Blessed"]);
}
