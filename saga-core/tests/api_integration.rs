//! Live tests against the Gemini API.
//!
//! Run with: `cargo test -p saga-core --test api_integration -- --ignored --nocapture`
//!
//! These tests require GEMINI_API_KEY (or GEMINI_API_KEYS) to be set.

use saga_core::{GameSession, SessionConfig, WorldData};

/// Load environment variables from .env file
fn setup() {
    let _ = dotenvy::dotenv();
}

fn has_api_key() -> bool {
    std::env::var("GEMINI_API_KEY").is_ok() || std::env::var("GEMINI_API_KEYS").is_ok()
}

#[tokio::test]
#[ignore]
async fn test_opening_and_one_turn() {
    setup();
    if !has_api_key() {
        eprintln!("Skipping test: GEMINI_API_KEY not set");
        return;
    }

    let world = WorldData::new("Dark fantasy", "Kael")
        .with_bio("A disgraced knight looking for redemption")
        .with_goal(true);
    let mut session = GameSession::from_env(world, SessionConfig::new()).expect("Failed to create session");

    let opening = session.begin().await.expect("Opening scene failed");
    println!("=== OPENING ===\n{}\n{:?}", opening.story, opening.choices);
    assert!(!opening.story.is_empty());
    assert!(!opening.choices.is_empty());

    let turn = session.choose(0).await.expect("Turn failed");
    println!("=== TURN ===\n{}\n{:?}\napplied: {:?}", turn.story, turn.choices, turn.applied_tags);
    assert_eq!(session.state().turn_count, 1);
    assert!(session.state().total_tokens_used > 0);

    for line in session.story_log() {
        assert!(
            saga_core::tags::scan(line).is_empty(),
            "tag leaked into the story: {line}"
        );
    }
}

#[tokio::test]
#[ignore]
async fn test_suggest_action() {
    setup();
    if !has_api_key() {
        eprintln!("Skipping test: GEMINI_API_KEY not set");
        return;
    }

    let world = WorldData::new("Cyberpunk", "Vex");
    let session = GameSession::from_env(world, SessionConfig::new()).expect("Failed to create session");
    let suggestion = session.suggest_action().await.expect("Suggestion failed");
    println!("Suggested: {suggestion}");
    assert!(!suggestion.is_empty());
}
