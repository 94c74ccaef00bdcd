//! Quests and the quest log.

use crate::lenient;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestStatus {
    #[default]
    Active,
    Completed,
    Failed,
}

impl FromStr for QuestStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "active" => QuestStatus::Active,
            "completed" => QuestStatus::Completed,
            "failed" => QuestStatus::Failed,
            _ => return Err(()),
        })
    }
}

impl fmt::Display for QuestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QuestStatus::Active => "active",
            QuestStatus::Completed => "completed",
            QuestStatus::Failed => "failed",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Objective {
    pub description: String,
    #[serde(default)]
    pub completed: bool,
}

impl Objective {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            completed: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub objectives: Vec<Objective>,
    #[serde(default, deserialize_with = "quest_status")]
    pub status: QuestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub giver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward: Option<String>,
    #[serde(default)]
    pub is_main_quest: bool,
}

fn quest_status<'de, D>(deserializer: D) -> Result<QuestStatus, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(lenient::parsed::<_, QuestStatus>(deserializer)?.unwrap_or_default())
}

impl Quest {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            objectives: Vec::new(),
            status: QuestStatus::Active,
            giver: None,
            reward: None,
            is_main_quest: false,
        }
    }

    pub fn with_objectives(mut self, objectives: Vec<Objective>) -> Self {
        self.objectives = objectives;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == QuestStatus::Active
    }

    pub fn pending_objectives(&self) -> impl Iterator<Item = &Objective> {
        self.objectives.iter().filter(|o| !o.completed)
    }

    /// Mark the objective with this description done, preferring one not yet
    /// completed. An active quest whose objectives are now all done becomes
    /// completed. Returns whether an objective matched.
    pub fn complete_objective(&mut self, description: &str) -> bool {
        let description = description.trim();
        let position = self
            .objectives
            .iter()
            .position(|o| !o.completed && o.description.trim() == description)
            .or_else(|| {
                self.objectives
                    .iter()
                    .position(|o| o.description.trim() == description)
            });

        let Some(index) = position else {
            return false;
        };
        self.objectives[index].completed = true;

        if self.is_active() && self.objectives.iter().all(|o| o.completed) {
            self.status = QuestStatus::Completed;
        }
        true
    }
}

/// All quests, unique by title.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestLog(Vec<Quest>);

impl QuestLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a quest, replacing any quest with the same title.
    pub fn assign(&mut self, quest: Quest) {
        self.0.retain(|q| q.title != quest.title);
        self.0.push(quest);
    }

    pub fn get(&self, title: &str) -> Option<&Quest> {
        self.0.iter().find(|q| q.title == title)
    }

    pub fn get_mut(&mut self, title: &str) -> Option<&mut Quest> {
        self.0.iter_mut().find(|q| q.title == title)
    }

    pub fn active(&self) -> impl Iterator<Item = &Quest> {
        self.0.iter().filter(|q| q.is_active())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Quest> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
