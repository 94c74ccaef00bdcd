//! Game session management.
//!
//! [`GameSession`] owns the [`GameState`] and runs every exchange with the
//! narrator: player turns, the opening scene, rule-change announcements,
//! retries and suggestions. It is the only place that calls the tag
//! reducer, so every state change goes through one `&mut self` method at a
//! time.

use crate::chronicle::Tier;
use crate::config::SessionConfig;
use crate::narrator::chronicler;
use crate::narrator::context::action_block;
use crate::narrator::{
    compile_prompt, compile_rule_update_prompt, enrich_action, extract_json, turn_response_schema,
    ModelClient,
};
use crate::persist::{self, PersistError};
use crate::rules::{RuleBook, RuleDiff};
use crate::state::{GameState, HistoryEntry};
use crate::tags::reduce_narrative;
use crate::world::WorldData;
use gemini::{Content, Gemini, Response};
use log::{info, warn};
use serde_json::Value;
use std::path::Path;
use thiserror::Error;

const OPENING_ACTION: &str = "Begin the adventure. Describe the opening scene and my situation.";

const RULES_ACKNOWLEDGED: &str = "**⭐ The world rules have been updated. ⭐**";

const UNKNOWN_SCENE: &str = "The story has not started yet.";

/// Why a turn was rejected. Each variant rolls the turn back and leaves it
/// available to [`GameSession::retry`].
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("Model call failed: {0}")]
    Model(#[from] gemini::Error),

    #[error("The narrator returned an invalid response format: {0}")]
    MalformedJson(String),

    #[error("The narrator returned an inconsistent response (missing story or choices)")]
    InconsistentResponse,
}

/// Errors from session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Turn failed: {0}")]
    Turn(#[from] TurnError),

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    #[error("Model error: {0}")]
    Model(gemini::Error),

    #[error("Action is empty")]
    EmptyAction,

    #[error("There is no failed action to retry")]
    NothingToRetry,

    #[error("No choice at index {0}")]
    NoSuchChoice(usize),

    #[error("Custom actions are locked by a world rule")]
    CustomActionsLocked,

    #[error("The story has already begun")]
    AlreadyStarted,

    #[error("No API key configured - set GEMINI_API_KEY or GEMINI_API_KEYS")]
    NoApiKey,
}

/// Where the session is in the turn cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    ActionSubmitted,
    ActionEnrichment,
    PromptCompiled,
    AwaitingModel,
    Applying,
    /// The last turn failed. New input and [`GameSession::retry`] are both
    /// accepted.
    ErrorDisplayed,
}

impl TurnPhase {
    /// Whether a turn is in flight.
    pub fn is_busy(&self) -> bool {
        !matches!(self, TurnPhase::Idle | TurnPhase::ErrorDisplayed)
    }
}

/// A turn that failed and can be resubmitted as is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedAction {
    /// What the player typed, without the mature-content suffix.
    pub action: String,
    /// The action as sent to the narrator.
    pub enriched: String,
    pub mature: bool,
}

/// What a successful turn produced.
#[derive(Debug, Clone, Default)]
pub struct TurnOutcome {
    /// The story with every tag removed.
    pub story: String,
    pub choices: Vec<String>,
    /// Tags that changed the world, in order.
    pub applied_tags: Vec<String>,
    /// Tokens reported for the narrator call.
    pub tokens: u64,
    /// Chronicle tiers that gained an entry after this turn.
    pub chronicle_grown: Vec<Tier>,
}

/// A validated `{story, choices}` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReply {
    pub story: String,
    pub choices: Vec<String>,
}

/// Validate a normal-turn reply: it must be JSON (a markdown fence is
/// tolerated) with a non-empty `story` string and a non-empty `choices`
/// array of strings.
pub fn parse_turn_reply(text: &str) -> Result<TurnReply, TurnError> {
    let json: Value =
        serde_json::from_str(extract_json(text)).map_err(|e| TurnError::MalformedJson(e.to_string()))?;

    let story = json
        .get("story")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or(TurnError::InconsistentResponse)?;
    let choices: Vec<String> = json
        .get("choices")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(|c| c.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    if choices.is_empty() {
        return Err(TurnError::InconsistentResponse);
    }

    Ok(TurnReply {
        story: story.to_string(),
        choices,
    })
}

/// Split a trailing ` nsfw` marker (any case, after whitespace) off the
/// input.
fn split_mature_suffix(input: &str) -> (&str, bool) {
    let trimmed = input.trim();
    if trimmed.to_ascii_lowercase().ends_with("nsfw") {
        let head = &trimmed[..trimmed.len() - 4];
        if head.ends_with(char::is_whitespace) {
            return (head.trim_end(), true);
        }
    }
    (trimmed, false)
}

/// A game session: the state of one play-through plus the narrator it talks to.
pub struct GameSession<C: ModelClient> {
    client: C,
    config: SessionConfig,
    state: GameState,
    phase: TurnPhase,
    last_error: Option<String>,
    failed: Option<FailedAction>,
    /// Echo line of the turn in flight.
    in_flight: Option<String>,
}

impl GameSession<Gemini> {
    /// Start a new game against the Gemini API, with keys from the
    /// environment.
    pub fn from_env(world: WorldData, config: SessionConfig) -> Result<Self, SessionError> {
        let client = Gemini::from_env().map_err(|_| SessionError::NoApiKey)?;
        Ok(Self::new(client.with_model(&config.model), world, config))
    }
}

impl<C: ModelClient> GameSession<C> {
    /// Start a new game for `world`.
    pub fn new(client: C, world: WorldData, config: SessionConfig) -> Self {
        Self::from_state(client, GameState::new_game(world), config)
    }

    /// Resume from an existing state.
    pub fn from_state(client: C, state: GameState, config: SessionConfig) -> Self {
        Self {
            client,
            config,
            state,
            phase: TurnPhase::Idle,
            last_error: None,
            failed: None,
            in_flight: None,
        }
    }

    /// Load a saved game.
    pub async fn load(client: C, path: impl AsRef<Path>, config: SessionConfig) -> Result<Self, SessionError> {
        let state = persist::load_json(path).await?;
        Ok(Self::from_state(client, state, config))
    }

    /// Save the game.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        persist::save_json(&self.state, path).await?;
        Ok(())
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// Message of the last failed turn, cleared by the next submission.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn failed_action(&self) -> Option<&FailedAction> {
        self.failed.as_ref()
    }

    pub fn story_log(&self) -> &[String] {
        &self.state.story_log
    }

    pub fn choices(&self) -> &[String] {
        &self.state.choices
    }

    /// Whether an active rule forbids free-text actions.
    pub fn custom_actions_locked(&self) -> bool {
        self.state
            .custom_rules
            .active()
            .any(|rule| self.config.lexicon.locks_actions(&rule.content))
    }

    /// Flip the pinned flag of a memory. False when out of range.
    pub fn toggle_memory_pin(&mut self, index: usize) -> bool {
        self.state.memories.toggle_pin(index)
    }

    // ========================================================================
    // Turns
    // ========================================================================

    /// Narrate the opening scene. Only allowed before anything else has
    /// been played.
    pub async fn begin(&mut self) -> Result<TurnOutcome, SessionError> {
        self.recover_abandoned_turn();
        if !self.state.game_history.is_empty() {
            return Err(SessionError::AlreadyStarted);
        }

        let mut action = OPENING_ACTION.to_string();
        if self.state.world_data.add_goal {
            action.push_str(
                " Also give me a first quest that fits the setting and my background, recorded with the QUEST_ASSIGNED tag.",
            );
        }
        if let Some(pc) = self.state.pc().filter(|pc| pc.gender.is_none()) {
            action.push_str(&format!(
                " {}'s gender has not been decided: choose one that fits and record it with an ENTITY_UPDATE tag for {} that sets gender.",
                pc.name, pc.name
            ));
        }
        let mature = self.state.world_data.allow_nsfw;

        self.last_error = None;
        self.phase = TurnPhase::PromptCompiled;
        let prompt = compile_prompt(&action, &self.state, "", mature);

        self.phase = TurnPhase::AwaitingModel;
        match self.request_turn(prompt).await {
            Ok((raw, reply)) => {
                self.phase = TurnPhase::Applying;
                let reduction = reduce_narrative(&reply.story, &mut self.state);
                self.state.story_log = vec![reduction.display.clone()];
                self.state.choices = reply.choices.clone();
                self.state.game_history.push(HistoryEntry::user(action_block(&action)));
                self.state.game_history.push(HistoryEntry::model(raw));
                self.phase = TurnPhase::Idle;
                info!("Opening scene written ({} tags applied)", reduction.applied.len());

                Ok(TurnOutcome {
                    story: reduction.display,
                    choices: reply.choices,
                    applied_tags: reduction.applied,
                    tokens: self.state.last_call_tokens,
                    chronicle_grown: Vec::new(),
                })
            }
            Err(e) => {
                warn!("Opening scene failed: {}", e);
                self.state.story_log.push(format!("Error: {e}"));
                self.last_error = Some(e.to_string());
                self.phase = TurnPhase::ErrorDisplayed;
                Err(e.into())
            }
        }
    }

    /// Play a free-text action. A trailing ` nsfw` asks for mature content
    /// for this turn, honoured only when the world allows it.
    pub async fn player_action(&mut self, input: &str) -> Result<TurnOutcome, SessionError> {
        if self.custom_actions_locked() {
            return Err(SessionError::CustomActionsLocked);
        }
        self.submit(input, true).await
    }

    /// Play the pending choice at `index`.
    pub async fn choose(&mut self, index: usize) -> Result<TurnOutcome, SessionError> {
        let choice = self
            .state
            .choices
            .get(index)
            .cloned()
            .ok_or(SessionError::NoSuchChoice(index))?;
        self.submit(&choice, true).await
    }

    /// Resubmit the last failed action exactly as it was sent.
    pub async fn retry(&mut self) -> Result<TurnOutcome, SessionError> {
        self.recover_abandoned_turn();
        let failed = self.failed.take().ok_or(SessionError::NothingToRetry)?;
        info!("Retrying: {}", failed.action);

        self.phase = TurnPhase::ActionSubmitted;
        self.last_error = None;
        self.state.choices.clear();
        self.push_echo(&failed.action);
        self.play(failed.action, failed.enriched, failed.mature).await
    }

    /// Switch the narrator's style guide and let the narrator show the
    /// change in a turn of its own.
    pub async fn change_writing_style(&mut self, style: &str) -> Result<TurnOutcome, SessionError> {
        self.recover_abandoned_turn();
        let style = style.trim();
        self.state.world_data.ai_writing_style = style.to_string();
        self.state.system_instruction = self.state.world_data.system_instruction();

        let label = if style.is_empty() || style == "default" {
            "the default balanced style"
        } else {
            style
        };
        let action = format!(
            "System: the narration style is now {label}. Continue the scene in the new style and offer new choices."
        );
        self.submit(&action, false).await
    }

    async fn submit(&mut self, input: &str, enrich: bool) -> Result<TurnOutcome, SessionError> {
        self.recover_abandoned_turn();
        let (action, mature_requested) = split_mature_suffix(input);
        if action.is_empty() {
            return Err(SessionError::EmptyAction);
        }
        let action = action.to_string();
        let mature = mature_requested && self.state.world_data.allow_nsfw;

        self.phase = TurnPhase::ActionSubmitted;
        self.last_error = None;
        self.failed = None;
        self.state.choices.clear();
        self.push_echo(&action);

        let enriched = if enrich {
            self.phase = TurnPhase::ActionEnrichment;
            enrich_action(&self.client, &self.config, &action, &self.state).await
        } else {
            action.clone()
        };
        self.play(action, enriched, mature).await
    }

    async fn play(&mut self, action: String, enriched: String, mature: bool) -> Result<TurnOutcome, SessionError> {
        self.phase = TurnPhase::PromptCompiled;
        let prompt = compile_prompt(&enriched, &self.state, "", mature);

        self.phase = TurnPhase::AwaitingModel;
        match self.request_turn(prompt).await {
            Ok((raw, reply)) => Ok(self.apply_turn(&enriched, raw, reply).await),
            Err(e) => {
                self.roll_back(action, enriched, mature, &e);
                Err(e.into())
            }
        }
    }

    /// One narrator call with the JSON contract. The reply is validated
    /// before anything in the world changes.
    async fn request_turn(&mut self, prompt: String) -> Result<(String, TurnReply), TurnError> {
        let history = &self.state.game_history;
        let window = &history[history.len().saturating_sub(self.config.history_window)..];
        let mut contents: Vec<Content> = window.iter().map(HistoryEntry::to_content).collect();
        contents.push(Content::user(prompt));

        let request = self
            .config
            .request(contents)
            .with_system(self.state.system_instruction.as_str())
            .with_json_schema(turn_response_schema());
        let response = self.client.complete(request).await?;
        self.record_usage(&response);

        let reply = parse_turn_reply(&response.text)?;
        Ok((response.text, reply))
    }

    async fn apply_turn(&mut self, enriched: &str, raw: String, reply: TurnReply) -> TurnOutcome {
        self.phase = TurnPhase::Applying;
        let reduction = reduce_narrative(&reply.story, &mut self.state);

        self.state.turn_count += 1;
        self.in_flight = None;
        self.state.story_log.push(reduction.display.clone());
        self.state.choices = reply.choices.clone();
        self.state.game_history.push(HistoryEntry::user(action_block(enriched)));
        self.state.game_history.push(HistoryEntry::model(raw));
        info!(
            "Turn {} applied ({} tags, {} ignored)",
            self.state.turn_count,
            reduction.applied.len(),
            reduction.ignored.len()
        );

        let interval = self.config.summary_interval;
        let chronicle_grown = if interval > 0 && self.state.turn_count % interval == 0 {
            chronicler::advance(
                &self.client,
                &self.config,
                &mut self.state.chronicle,
                &self.state.game_history,
            )
            .await
        } else {
            Vec::new()
        };
        self.phase = TurnPhase::Idle;

        TurnOutcome {
            story: reduction.display,
            choices: reply.choices,
            applied_tags: reduction.applied,
            tokens: self.state.last_call_tokens,
            chronicle_grown,
        }
    }

    fn roll_back(&mut self, action: String, enriched: String, mature: bool, error: &TurnError) {
        warn!("Turn failed: {}", error);
        self.pop_echo();
        self.state.choices = self.state.last_known_choices();
        self.last_error = Some(error.to_string());
        self.failed = Some(FailedAction {
            action,
            enriched,
            mature,
        });
        self.phase = TurnPhase::ErrorDisplayed;
    }

    fn push_echo(&mut self, action: &str) {
        let echo = format!("> {action}");
        self.state.story_log.push(echo.clone());
        self.in_flight = Some(echo);
    }

    fn pop_echo(&mut self) {
        if let Some(echo) = self.in_flight.take() {
            if self.state.story_log.last() == Some(&echo) {
                self.state.story_log.pop();
            }
        }
    }

    /// `&mut self` rules out two turns at once, so a busy phase on entry
    /// means the previous call's future was dropped before it finished.
    /// Undo what it left behind: the echo line and the cleared choices.
    fn recover_abandoned_turn(&mut self) {
        if !self.phase.is_busy() {
            return;
        }
        warn!("Previous turn was abandoned in {:?}, recovering", self.phase);
        self.pop_echo();
        self.state.choices = self.state.last_known_choices();
        self.phase = TurnPhase::Idle;
    }

    fn record_usage(&mut self, response: &Response) {
        if let Some(total) = response.total_tokens() {
            self.state.last_call_tokens = u64::from(total);
            self.state.total_tokens_used += u64::from(total);
        }
    }

    // ========================================================================
    // Side calls
    // ========================================================================

    /// Replace the rule set. When any rule was activated, deactivated or
    /// edited, the narrator is asked to announce the change in a free-form
    /// system turn; its tags are applied and its text is added to the story
    /// log. Pending choices are the same afterwards. Returns the line that
    /// was added, or `None` when nothing changed.
    pub async fn save_rules(&mut self, rules: RuleBook) -> Result<Option<String>, SessionError> {
        self.recover_abandoned_turn();
        let diff = RuleDiff::between(&self.state.custom_rules, &rules);
        self.state.custom_rules = rules;
        if diff.is_empty() {
            return Ok(None);
        }
        info!(
            "Rules changed: {} activated, {} deactivated, {} updated",
            diff.activated.len(),
            diff.deactivated.len(),
            diff.updated.len()
        );

        let pending = std::mem::take(&mut self.state.choices);
        self.phase = TurnPhase::AwaitingModel;
        let prompt = compile_rule_update_prompt(&diff, &self.state.custom_rules);
        let request = self
            .config
            .request(vec![Content::user(prompt)])
            .with_system(self.state.system_instruction.as_str());

        let result = match self.client.complete(request).await {
            Ok(response) => {
                self.record_usage(&response);
                self.phase = TurnPhase::Applying;
                let reduction = reduce_narrative(&response.text, &mut self.state);
                let text = reduction.display.trim();
                let line = if text.is_empty() {
                    RULES_ACKNOWLEDGED.to_string()
                } else {
                    format!("**⭐ {text} ⭐**")
                };
                self.state.story_log.push(line.clone());
                Ok(Some(line))
            }
            Err(e) => {
                warn!("Rule update call failed: {}", e);
                self.state.story_log.push(format!("Error while applying the new rules: {e}"));
                Err(SessionError::Turn(TurnError::Model(e)))
            }
        };

        self.state.choices = pending;
        self.phase = TurnPhase::Idle;
        result
    }

    /// Ask the narrator for one sensible next action. Nothing in the state
    /// changes.
    pub async fn suggest_action(&self) -> Result<String, SessionError> {
        let scene = self
            .state
            .story_log
            .iter()
            .rev()
            .find(|line| !line.starts_with("> "))
            .map(String::as_str)
            .unwrap_or(UNKNOWN_SCENE);
        let personality = self.state.world_data.personality().unwrap_or("not specified");
        let quests: Vec<&str> = self.state.quests.active().map(|q| q.title.as_str()).collect();
        let quests = if quests.is_empty() {
            "none".to_string()
        } else {
            quests.join(", ")
        };

        let prompt = format!(
            "You are assisting the player of a role-playing game.\n\
             Current scene: {scene}\n\
             Character personality: {personality}\n\
             Active quests: {quests}\n\n\
             REQUEST: Suggest ONE short, creative and sensible next action for the character, written as the player would type it. Return only the action."
        );
        let response = self
            .client
            .complete(self.config.request(vec![Content::user(prompt)]))
            .await
            .map_err(SessionError::Model)?;
        Ok(response.text.trim().to_string())
    }
}
