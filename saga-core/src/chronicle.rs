//! Tiered narrative summaries.
//!
//! Every few turns the recent history is summarized into a `turn` entry.
//! When enough turn entries pile up they are folded into one `chapter`
//! entry, and chapters fold into `memoir` entries the same way. Prompt size
//! stays bounded while the distant past survives at lower fidelity.

use serde::{Deserialize, Serialize};

/// Turn summaries folded into one chapter.
pub const TURN_ROLLOVER: usize = 10;

/// Chapter summaries folded into one memoir entry.
pub const CHAPTER_ROLLOVER: usize = 5;

/// Which tier a summary is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Turn,
    Chapter,
    Memoir,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Turn => "turn",
            Tier::Chapter => "chapter",
            Tier::Memoir => "memoir",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chronicle {
    #[serde(default)]
    pub turn: Vec<String>,
    #[serde(default)]
    pub chapter: Vec<String>,
    #[serde(default)]
    pub memoir: Vec<String>,
}

impl Chronicle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Old saves kept a flat list of summaries; they become the turn tier.
    pub fn from_legacy_summary(summaries: Vec<String>) -> Self {
        Self {
            turn: summaries,
            ..Self::default()
        }
    }

    pub fn record_turn(&mut self, summary: impl Into<String>) {
        self.turn.push(summary.into());
    }

    pub fn is_empty(&self) -> bool {
        self.turn.is_empty() && self.chapter.is_empty() && self.memoir.is_empty()
    }

    /// Source text for the next chapter, if the turn tier is full.
    pub fn chapter_source(&self) -> Option<String> {
        rollover_source(&self.turn, TURN_ROLLOVER)
    }

    /// Source text for the next memoir entry, if the chapter tier is full.
    pub fn memoir_source(&self) -> Option<String> {
        rollover_source(&self.chapter, CHAPTER_ROLLOVER)
    }

    /// Replace the newest `TURN_ROLLOVER` turn entries with one chapter.
    pub fn roll_chapter(&mut self, summary: impl Into<String>) {
        let keep = self.turn.len().saturating_sub(TURN_ROLLOVER);
        self.turn.truncate(keep);
        self.chapter.push(summary.into());
    }

    /// Replace the newest `CHAPTER_ROLLOVER` chapters with one memoir entry.
    pub fn roll_memoir(&mut self, summary: impl Into<String>) {
        let keep = self.chapter.len().saturating_sub(CHAPTER_ROLLOVER);
        self.chapter.truncate(keep);
        self.memoir.push(summary.into());
    }

    /// The excerpt shown to the narrator: newest 2 memoir, 3 chapter and
    /// 3 turn entries, oldest first within each tier.
    pub fn excerpt(&self) -> (&[String], &[String], &[String]) {
        (
            tail(&self.memoir, 2),
            tail(&self.chapter, 3),
            tail(&self.turn, 3),
        )
    }
}

fn rollover_source(entries: &[String], threshold: usize) -> Option<String> {
    (entries.len() >= threshold).then(|| tail(entries, threshold).join("\n"))
}

fn tail<T>(items: &[T], n: usize) -> &[T] {
    &items[items.len().saturating_sub(n)..]
}
