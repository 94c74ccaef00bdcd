//! Rule-change system turns, chronicle rollover and retrieval, end to end
//! through a session.

use saga_core::chronicle::{Tier, CHAPTER_ROLLOVER, TURN_ROLLOVER};
use saga_core::rules::LIVING_WORLD_RULE_ID;
use saga_core::testing::{assert_has_entity, MockModel, TestHarness};
use saga_core::{CustomRule, GameSession, GameState, RuleBook, SessionConfig, SessionError, WorldData};
use std::sync::Arc;

// =============================================================================
// Rule changes
// =============================================================================

#[tokio::test]
async fn test_activating_rule_makes_one_system_call() {
    let mut harness = TestHarness::new();
    harness
        .expect_turn("The market bustles.", &["Buy", "Sell"])
        .expect_reply("Dragons now soar over the city. [LORE_CONCEPT: name=\"Dragonflight\", description=\"Dragons rule the skies\"]");
    harness.input("visit the market").await.unwrap();

    let mut rules = RuleBook::new(vec![
        CustomRule::living_world(),
        CustomRule::new("Dragons exist").with_id("dragons").inactive(),
    ]);
    harness.session.save_rules(rules.clone()).await.unwrap();
    // Adding an inactive rule is not a change the narrator hears about.
    assert_eq!(harness.model().request_count(), 1);

    rules.activate("dragons");
    let line = harness.session.save_rules(rules).await.unwrap();

    assert_eq!(harness.model().request_count(), 2);
    let prompt = harness.last_prompt().unwrap();
    assert!(prompt.contains(r#""activated":[{"id":"dragons","content":"Dragons exist","isActive":true}]"#));
    assert!(prompt.contains(r#""deactivated":[]"#));
    assert!(prompt.contains(r#""updated":[]"#));
    assert!(prompt.contains("Do NOT narrate any story."));

    // Free-form: no JSON contract on the rule turn.
    assert!(harness.model().last_request().unwrap().output.is_none());

    assert_eq!(line.as_deref(), Some("**⭐ Dragons now soar over the city. ⭐**"));
    assert_has_entity(&harness, "Dragonflight");
    let state = harness.state();
    assert_eq!(state.choices, vec!["Buy", "Sell"]);
    assert_eq!(state.turn_count, 1);
    assert_eq!(state.story_log.last(), line.as_ref());
}

#[tokio::test]
async fn test_rule_turn_with_tags_only_uses_default_line() {
    let mut harness = TestHarness::new();
    harness.expect_reply("[RULE_DEACTIVATE: id=\"default_living_world_rule_v1\"]");

    let rules = RuleBook::new(vec![CustomRule::living_world(), CustomRule::new("No magic")]);
    let line = harness.session.save_rules(rules).await.unwrap().unwrap();

    assert!(line.starts_with("**⭐"));
    assert!(!line.contains("RULE_DEACTIVATE"));
    assert!(!harness.state().custom_rules.get(LIVING_WORLD_RULE_ID).unwrap().is_active);
}

#[tokio::test]
async fn test_rule_turn_failure_keeps_choices() {
    let mut harness = TestHarness::new();
    harness
        .expect_turn("Night falls.", &["Sleep"])
        .expect_error(gemini::Error::Network("timeout".into()));
    harness.input("make camp").await.unwrap();

    let mut rules = harness.state().custom_rules.clone();
    rules.deactivate(LIVING_WORLD_RULE_ID);
    let err = harness.session.save_rules(rules).await.unwrap_err();

    assert!(matches!(err, SessionError::Turn(_)));
    let state = harness.state();
    assert_eq!(state.choices, vec!["Sleep"]);
    assert!(state.story_log.last().unwrap().starts_with("Error while applying the new rules"));
    // The new rule set is kept even though the announcement failed.
    assert!(!state.custom_rules.get(LIVING_WORLD_RULE_ID).unwrap().is_active);
}

// =============================================================================
// Chronicle
// =============================================================================

fn chronicle_session(state: GameState, interval: u32) -> (Arc<MockModel>, GameSession<Arc<MockModel>>) {
    let model = Arc::new(MockModel::new());
    let config = SessionConfig::new()
        .with_enrichment(false)
        .with_summary_interval(interval);
    let session = GameSession::from_state(Arc::clone(&model), state, config);
    (model, session)
}

#[tokio::test]
async fn test_summary_written_every_interval() {
    let state = GameState::new_game(WorldData::new("Fantasy", "Aria"));
    let (model, mut session) = chronicle_session(state, 2);
    model.push_turn("You enter the inn. [LORE_NPC: name=\"Barkeep\"]", &["Drink"]);
    model.push_turn("The ale is sour.", &["Leave"]);
    model.push_reply("Aria visited the inn and drank sour ale.");

    let first = session.player_action("enter the inn").await.unwrap();
    assert!(first.chronicle_grown.is_empty());
    let second = session.player_action("drink").await.unwrap();

    assert_eq!(second.chronicle_grown, vec![Tier::Turn]);
    assert_eq!(session.state().chronicle.turn, vec!["Aria visited the inn and drank sour ale."]);
    assert_eq!(model.request_count(), 3);

    let summary_prompt = model.requests()[2].last_user_text().unwrap().to_string();
    assert!(summary_prompt.contains("Player: enter the inn"));
    assert!(summary_prompt.contains("Narrator: You enter the inn."));
    assert!(!summary_prompt.contains("LORE_NPC"));
}

#[tokio::test]
async fn test_chronicle_rolls_over_into_chapter() {
    let mut state = GameState::new_game(WorldData::new("Fantasy", "Aria"));
    state.chronicle.turn = (0..TURN_ROLLOVER - 1).map(|i| format!("turn {i}")).collect();
    state.chronicle.chapter = vec!["an earlier chapter".to_string()];
    let (model, mut session) = chronicle_session(state, 1);
    model.push_turn("The storm passes.", &["Go"]);
    model.push_reply("turn 9");
    model.push_reply("The long road north.");

    let outcome = session.player_action("wait out the storm").await.unwrap();

    assert_eq!(outcome.chronicle_grown, vec![Tier::Turn, Tier::Chapter]);
    let chronicle = &session.state().chronicle;
    assert!(chronicle.turn.is_empty());
    assert_eq!(chronicle.chapter, vec!["an earlier chapter", "The long road north."]);
    assert!(chronicle.chapter.len() < CHAPTER_ROLLOVER);

    let chapter_prompt = model.requests()[2].last_user_text().unwrap().to_string();
    assert!(chapter_prompt.contains("turn 0"));
    assert!(chapter_prompt.contains("turn 9"));
}

#[tokio::test]
async fn test_failed_summary_does_not_fail_turn() {
    let state = GameState::new_game(WorldData::new("Fantasy", "Aria"));
    let (model, mut session) = chronicle_session(state, 1);
    model.push_turn("Birds sing.", &["Listen"]);
    model.push_error(gemini::Error::EmptyResponse("SAFETY".into()));

    let outcome = session.player_action("listen").await.unwrap();
    assert!(outcome.chronicle_grown.is_empty());
    assert!(session.state().chronicle.is_empty());
    assert_eq!(session.state().turn_count, 1);
}

// =============================================================================
// Retrieval
// =============================================================================

#[tokio::test]
async fn test_attack_retrieves_beast_and_its_treasure() {
    let mut harness = TestHarness::with_world(WorldData::new("Tiên hiệp", "Lâm"));
    harness
        .expect_turn(
            "A beast blocks the path. [LORE_NPC: name=\"yêu thú\", description=\"A beast guarding the Huyết Ngọc\"] \
             [LORE_ITEM: name=\"Huyết Ngọc\", description=\"A blood-red jade\"] \
             [LORE_LOCATION: name=\"Vực Sâu\", description=\"Far away\"]",
            &["Attack", "Flee"],
        )
        .expect_turn("You strike.", &["Again"]);

    harness.input("đi lên núi").await.unwrap();
    harness.input("tấn công yêu thú").await.unwrap();

    let prompt = harness.last_prompt().unwrap();
    let direct = prompt.find("**Related entities & items (direct):**").unwrap();
    let indirect = prompt.find("**Related entities & items (indirect):**").unwrap();
    let beast = prompt.find("- yêu thú (npc)").unwrap();
    let jade = prompt.find("- Huyết Ngọc (item)").unwrap();
    assert!(direct < beast && beast < indirect);
    assert!(indirect < jade);
    assert!(!prompt.contains("- Vực Sâu"));
}
