//! Chronicle maintenance.
//!
//! Every few turns the recent history is condensed into a turn summary,
//! and full tiers are folded upward (see [`crate::chronicle`]). Summaries
//! are best effort: a failed call leaves the chronicle as it was for that
//! tier and stops the cascade.

use super::client::ModelClient;
use super::context::{extract_action, model_story};
use crate::chronicle::{Chronicle, Tier};
use crate::config::SessionConfig;
use crate::state::{HistoryEntry, HistoryRole};
use crate::tags;
use log::{info, warn};

fn summary_prompt(events: &str) -> String {
    format!(
        "YOU ARE A CHRONICLER. Read the following events carefully, then summarize them as a single coherent paragraph, written as one chapter of a chronicle.\n\n\
         Events:\n---\n{events}\n---\n\n\
         REQUEST: Return only the summary paragraph. Do not add any commentary or introduction."
    )
}

/// Render history as `Player:` / `Narrator:` lines with tags removed.
pub fn history_digest(history: &[HistoryEntry]) -> String {
    history
        .iter()
        .map(|entry| match entry.role {
            HistoryRole::User => format!("Player: {}", extract_action(entry.text()).unwrap_or(entry.text())),
            HistoryRole::Model => format!("Narrator: {}", tags::strip(&model_story(entry.text()))),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Ask the model for a one-paragraph summary. `None` on failure or an
/// empty reply.
pub async fn summarize<C: ModelClient + ?Sized>(
    client: &C,
    config: &SessionConfig,
    text: &str,
    tier: Tier,
) -> Option<String> {
    if text.trim().is_empty() {
        return None;
    }
    info!("Writing {} summary", tier.as_str());
    let request = config.request(vec![gemini::Content::user(summary_prompt(text))]);
    match client.complete(request).await {
        Ok(response) => Some(response.text.trim().to_string()).filter(|s| !s.is_empty()),
        Err(e) => {
            warn!("{} summary failed: {}", tier.as_str(), e);
            None
        }
    }
}

/// Summarize the newest history slice into the turn tier, then roll full
/// tiers upward. Returns the tiers that gained an entry.
pub async fn advance<C: ModelClient + ?Sized>(
    client: &C,
    config: &SessionConfig,
    chronicle: &mut Chronicle,
    history: &[HistoryEntry],
) -> Vec<Tier> {
    let mut grown = Vec::new();
    let slice = &history[history.len().saturating_sub(config.summary_slice)..];

    let Some(turn) = summarize(client, config, &history_digest(slice), Tier::Turn).await else {
        return grown;
    };
    chronicle.record_turn(turn);
    grown.push(Tier::Turn);

    let Some(source) = chronicle.chapter_source() else {
        return grown;
    };
    let Some(chapter) = summarize(client, config, &source, Tier::Chapter).await else {
        return grown;
    };
    chronicle.roll_chapter(chapter);
    grown.push(Tier::Chapter);

    let Some(source) = chronicle.memoir_source() else {
        return grown;
    };
    if let Some(memoir) = summarize(client, config, &source, Tier::Memoir).await {
        chronicle.roll_memoir(memoir);
        grown.push(Tier::Memoir);
    }
    grown
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chronicle::{CHAPTER_ROLLOVER, TURN_ROLLOVER};
    use crate::narrator::context::action_block;
    use crate::testing::MockModel;

    #[test]
    fn test_history_digest() {
        let history = vec![
            HistoryEntry::user(action_block("draw the sword")),
            HistoryEntry::model(r#"{"story": "Steel sings. [MEMORY_ADD: text=\"x\"]", "choices": ["a"]}"#),
        ];
        assert_eq!(history_digest(&history), "Player: draw the sword\n\nNarrator: Steel sings.");
    }

    #[tokio::test]
    async fn test_advance_records_turn() {
        let model = MockModel::new().reply(" The hero arrived. ");
        let mut chronicle = Chronicle::new();
        let history = vec![HistoryEntry::user(action_block("arrive"))];

        let grown = advance(&model, &SessionConfig::default(), &mut chronicle, &history).await;
        assert_eq!(grown, vec![Tier::Turn]);
        assert_eq!(chronicle.turn, vec!["The hero arrived."]);
    }

    #[tokio::test]
    async fn test_advance_cascades_to_memoir() {
        let model = MockModel::new().reply("turn").reply("chapter").reply("memoir");
        let mut chronicle = Chronicle {
            turn: vec!["t".to_string(); TURN_ROLLOVER - 1],
            chapter: vec!["c".to_string(); CHAPTER_ROLLOVER - 1],
            memoir: Vec::new(),
        };
        let history = vec![HistoryEntry::user(action_block("act"))];

        let grown = advance(&model, &SessionConfig::default(), &mut chronicle, &history).await;
        assert_eq!(grown, vec![Tier::Turn, Tier::Chapter, Tier::Memoir]);
        assert!(chronicle.turn.is_empty());
        assert!(chronicle.chapter.is_empty());
        assert_eq!(chronicle.memoir, vec!["memoir"]);
    }

    #[tokio::test]
    async fn test_failed_summary_leaves_chronicle() {
        let model = MockModel::new().fail(gemini::Error::EmptyResponse("SAFETY".into()));
        let mut chronicle = Chronicle::new();
        let history = vec![HistoryEntry::user(action_block("act"))];

        let grown = advance(&model, &SessionConfig::default(), &mut chronicle, &history).await;
        assert!(grown.is_empty());
        assert!(chronicle.is_empty());
    }
}
