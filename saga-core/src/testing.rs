//! Testing utilities.
//!
//! This module provides tools for integration testing:
//! - `MockModel` for deterministic sessions without API calls
//! - `TestHarness` for scripted game scenarios
//! - Assertion helpers for verifying game state

use crate::config::SessionConfig;
use crate::entity::{Entity, PC_OWNER};
use crate::narrator::ModelClient;
use crate::quest::QuestStatus;
use crate::session::{GameSession, SessionError, TurnOutcome};
use crate::state::GameState;
use crate::world::WorldData;
use async_trait::async_trait;
use gemini::{Request, Response, Usage};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A model client that answers from a script.
///
/// Replies are returned in the order they were queued; every request is
/// recorded. Once the script runs out, calls fail with
/// [`gemini::Error::EmptyResponse`].
#[derive(Debug, Default)]
pub struct MockModel {
    script: Mutex<VecDeque<Result<Response, gemini::Error>>>,
    requests: Mutex<Vec<Request>>,
}

impl MockModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a plain text reply.
    pub fn reply(self, text: impl Into<String>) -> Self {
        self.push_reply(text);
        self
    }

    /// Queue a well-formed turn reply.
    pub fn turn(self, story: &str, choices: &[&str]) -> Self {
        self.push_turn(story, choices);
        self
    }

    /// Queue a failure.
    pub fn fail(self, error: gemini::Error) -> Self {
        self.push_error(error);
        self
    }

    pub fn push_reply(&self, text: impl Into<String>) {
        self.push_response(Response::from_text(text));
    }

    pub fn push_turn(&self, story: &str, choices: &[&str]) {
        let body = json!({ "story": story, "choices": choices });
        self.push_response(Response::from_text(body.to_string()).with_usage(Usage {
            prompt_tokens: 100,
            candidates_tokens: 20,
            total_tokens: 120,
        }));
    }

    pub fn push_response(&self, response: Response) {
        lock(&self.script).push_back(Ok(response));
    }

    pub fn push_error(&self, error: gemini::Error) {
        lock(&self.script).push_back(Err(error));
    }

    /// Every request received so far, oldest first.
    pub fn requests(&self) -> Vec<Request> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }

    pub fn last_request(&self) -> Option<Request> {
        lock(&self.requests).last().cloned()
    }

    /// Replies still queued.
    pub fn remaining(&self) -> usize {
        lock(&self.script).len()
    }
}

#[async_trait]
impl ModelClient for MockModel {
    async fn complete(&self, request: Request) -> Result<Response, gemini::Error> {
        lock(&self.requests).push(request);
        lock(&self.script)
            .pop_front()
            .unwrap_or_else(|| Err(gemini::Error::EmptyResponse("mock script exhausted".into())))
    }
}

/// Test harness for running game scenarios.
///
/// Enrichment and chronicle summaries are off unless a config turns them
/// on, so only the calls a test queues are made.
pub struct TestHarness {
    model: Arc<MockModel>,
    pub session: GameSession<Arc<MockModel>>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_world(WorldData::new("Fantasy", "Aria"))
    }

    pub fn with_world(world: WorldData) -> Self {
        Self::with_config(
            world,
            SessionConfig::new().with_enrichment(false).with_summary_interval(0),
        )
    }

    pub fn with_config(world: WorldData, config: SessionConfig) -> Self {
        let model = Arc::new(MockModel::new());
        let session = GameSession::new(Arc::clone(&model), world, config);
        Self { model, session }
    }

    /// Queue a turn reply.
    pub fn expect_turn(&mut self, story: &str, choices: &[&str]) -> &mut Self {
        self.model.push_turn(story, choices);
        self
    }

    /// Queue a raw reply.
    pub fn expect_reply(&mut self, text: impl Into<String>) -> &mut Self {
        self.model.push_reply(text);
        self
    }

    pub fn expect_error(&mut self, error: gemini::Error) -> &mut Self {
        self.model.push_error(error);
        self
    }

    pub async fn input(&mut self, text: &str) -> Result<TurnOutcome, SessionError> {
        self.session.player_action(text).await
    }

    pub fn model(&self) -> &MockModel {
        &self.model
    }

    pub fn state(&self) -> &GameState {
        self.session.state()
    }

    /// The prompt text of the most recent model call.
    pub fn last_prompt(&self) -> Option<String> {
        self.model
            .last_request()
            .and_then(|r| r.last_user_text().map(str::to_string))
    }

    pub fn entity(&self, name: &str) -> Option<&Entity> {
        self.state().known_entities.get(name)
    }

    pub fn has_entity(&self, name: &str) -> bool {
        self.state().known_entities.contains(name)
    }

    pub fn last_story(&self) -> Option<&str> {
        self.state().story_log.last().map(String::as_str)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert that the entity store holds an entity with the given name.
#[track_caller]
pub fn assert_has_entity(harness: &TestHarness, name: &str) {
    assert!(
        harness.has_entity(name),
        "Expected entity '{name}' to exist, known: {:?}",
        harness.state().known_entities.iter().map(|e| &e.name).collect::<Vec<_>>()
    );
}

/// Assert that the entity store does NOT hold an entity with the given name.
#[track_caller]
pub fn assert_no_entity(harness: &TestHarness, name: &str) {
    assert!(!harness.has_entity(name), "Expected entity '{name}' NOT to exist");
}

/// Assert that `owner` (`"pc"` for the player) has the status `name`.
#[track_caller]
pub fn assert_status(harness: &TestHarness, name: &str, owner: &str) {
    assert!(
        harness.state().statuses.get(name, owner).is_some(),
        "Expected status '{name}' on '{owner}', ledger: {:?}",
        harness.state().statuses.iter().map(|s| (&s.name, &s.owner)).collect::<Vec<_>>()
    );
}

/// Assert that the player has no status called `name`.
#[track_caller]
pub fn assert_no_pc_status(harness: &TestHarness, name: &str) {
    assert!(
        harness.state().statuses.get(name, PC_OWNER).is_none(),
        "Expected no status '{name}' on the player"
    );
}

#[track_caller]
pub fn assert_quest_status(harness: &TestHarness, title: &str, status: QuestStatus) {
    let quest = harness
        .state()
        .quests
        .get(title)
        .unwrap_or_else(|| panic!("Expected quest '{title}' to exist"));
    assert_eq!(quest.status, status, "Quest '{title}' has the wrong status");
}

/// Assert that no line of the story log contains a tag.
#[track_caller]
pub fn assert_story_clean(harness: &TestHarness) {
    for line in &harness.state().story_log {
        assert!(
            crate::tags::scan(line).is_empty(),
            "Story line still carries a tag: {line}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_model_script_order() {
        let model = MockModel::new().reply("one").fail(gemini::Error::NoApiKey);

        let first = model.complete(Request::prompt("a")).await.unwrap();
        assert_eq!(first.text, "one");
        assert!(matches!(
            model.complete(Request::prompt("b")).await,
            Err(gemini::Error::NoApiKey)
        ));
        assert!(matches!(
            model.complete(Request::prompt("c")).await,
            Err(gemini::Error::EmptyResponse(_))
        ));
        assert_eq!(model.request_count(), 3);
        assert_eq!(model.requests()[1].last_user_text(), Some("b"));
        assert_eq!(model.remaining(), 0);
    }

    #[tokio::test]
    async fn test_harness_turn() {
        let mut harness = TestHarness::new();
        harness.expect_turn(
            "A wolf bites you. [STATUS_APPLIED_SELF: name=\"Bleeding\", type=\"injury\"] [LORE_NPC: name=\"Grey Wolf\", description=\"Hungry\"]",
            &["Fight", "Flee"],
        );

        harness.input("enter the forest").await.unwrap();

        assert_has_entity(&harness, "Grey Wolf");
        assert_no_entity(&harness, "Red Wolf");
        assert_status(&harness, "Bleeding", "pc");
        assert_story_clean(&harness);
        assert_eq!(harness.last_story(), Some("A wolf bites you."));
        assert!(harness.last_prompt().unwrap().contains("enter the forest"));
    }
}
