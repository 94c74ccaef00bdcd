//! Action enrichment.
//!
//! Before a risky action is narrated, a short side call asks the model to
//! restate it with explicit odds and consequences. The restatement is used
//! only when it actually carries odds; otherwise the player's words stand.

use super::client::ModelClient;
use crate::config::SessionConfig;
use crate::entity::PC_OWNER;
use crate::state::GameState;
use log::{debug, warn};

const UNKNOWN_SCENE: &str = "The scene is not yet clear.";

fn enrichment_prompt(action: &str, scene: &str, pc_statuses: &str) -> String {
    format!(
        r#"You are an action analyst for a role-playing game. Using the scene and the character's condition, turn the player's action below into a structured choice. If the action carries no risk (talking, checking inventory), return the original action unchanged.

Scene: "{scene}"
Character condition: {pc_statuses}
Player action: "{action}"

REQUEST: If there is risk, answer in the form: "Action (Success X%: [outcome]. | Risk: [risk]. | Failure: [failure].)". Return ONE line only."#
    )
}

/// Expand `action` into a risk/reward statement when the model judges it
/// risky. Any failure falls back to the original action.
pub async fn enrich_action<C: ModelClient + ?Sized>(
    client: &C,
    config: &SessionConfig,
    action: &str,
    state: &GameState,
) -> String {
    if !config.enrich_actions || config.lexicon.is_command(action) {
        return action.to_string();
    }

    // The player's own echo line is not the scene.
    let scene = state
        .story_log
        .iter()
        .rev()
        .find(|line| !line.starts_with("> "))
        .map(String::as_str)
        .unwrap_or(UNKNOWN_SCENE);
    let pc_name = state.pc_name();
    let statuses: Vec<&str> = state
        .statuses
        .iter()
        .filter(|s| s.owner == PC_OWNER || Some(s.owner.as_str()) == pc_name)
        .map(|s| s.name.as_str())
        .collect();
    let condition = if statuses.is_empty() {
        "Normal".to_string()
    } else {
        statuses.join(", ")
    };

    let request = config.request(vec![gemini::Content::user(enrichment_prompt(action, scene, &condition))]);
    match client.complete(request).await {
        Ok(response) => {
            let analyzed = response.text.trim();
            if !analyzed.is_empty() && config.lexicon.signals_stakes(analyzed) {
                debug!("Enriched action: {}", analyzed);
                analyzed.to_string()
            } else {
                action.to_string()
            }
        }
        Err(e) => {
            warn!("Action analysis failed, using the original action: {}", e);
            action.to_string()
        }
    }
}
