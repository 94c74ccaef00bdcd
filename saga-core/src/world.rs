//! World creation parameters and the narrator's system instruction.

use serde::{Deserialize, Serialize};

/// Base narrator instruction shared by every game.
pub const BASE_INSTRUCTION: &str = include_str!("prompts/narrator.txt");

/// Gender value meaning "let the narrator decide".
pub const GENDER_UNDECIDED: &str = "ai_decides";

const DEFAULT_PC_NAME: &str = "Nameless";

/// A skill the player character starts with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartingSkill {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Everything chosen on the world-creation screen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorldData {
    pub genre: String,
    pub world_detail: String,
    /// Narration person: `first_person`, anything else narrates in second person.
    pub writing_style: String,
    /// `easy`, `hard`, anything else is normal.
    pub difficulty: String,
    pub allow_nsfw: bool,
    pub character_name: String,
    pub custom_personality: String,
    pub personality_from_list: String,
    pub personality_mbti: String,
    pub gender: String,
    pub bio: String,
    pub start_skills: Vec<StartingSkill>,
    /// Ask the narrator for a starting quest in the opening scene.
    pub add_goal: bool,
    /// Free-text style guide appended to the system instruction.
    pub ai_writing_style: String,
}

impl WorldData {
    pub fn new(genre: impl Into<String>, character_name: impl Into<String>) -> Self {
        Self {
            genre: genre.into(),
            character_name: character_name.into(),
            ..Self::default()
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.world_detail = detail.into();
        self
    }

    pub fn with_bio(mut self, bio: impl Into<String>) -> Self {
        self.bio = bio.into();
        self
    }

    pub fn with_gender(mut self, gender: impl Into<String>) -> Self {
        self.gender = gender.into();
        self
    }

    pub fn with_personality(mut self, personality: impl Into<String>, mbti: impl Into<String>) -> Self {
        self.custom_personality = personality.into();
        self.personality_mbti = mbti.into();
        self
    }

    pub fn with_skill(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.start_skills.push(StartingSkill {
            name: name.into(),
            description: description.into(),
        });
        self
    }

    pub fn with_nsfw(mut self, allow: bool) -> Self {
        self.allow_nsfw = allow;
        self
    }

    pub fn with_goal(mut self, add_goal: bool) -> Self {
        self.add_goal = add_goal;
        self
    }

    /// The player character's name, with a fallback for a blank field.
    pub fn pc_name(&self) -> &str {
        let name = self.character_name.trim();
        if name.is_empty() {
            DEFAULT_PC_NAME
        } else {
            name
        }
    }

    /// Custom personality text wins over the list choice.
    pub fn personality(&self) -> Option<&str> {
        [&self.custom_personality, &self.personality_from_list]
            .into_iter()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
    }

    pub fn gender_decided(&self) -> bool {
        let gender = self.gender.trim();
        !gender.is_empty() && gender != GENDER_UNDECIDED
    }

    /// Compose the full narrator system instruction for this world.
    pub fn system_instruction(&self) -> String {
        let mut instruction = String::from(BASE_INSTRUCTION.trim_end());

        if self.writing_style == "first_person" {
            instruction.push_str(
                "\n\nADDITIONAL RULE - NARRATION: narrate in the first person, from the PC's own point of view.",
            );
        } else {
            instruction.push_str(
                "\n\nADDITIONAL RULE - NARRATION: narrate in the second person, addressing the PC as \"you\".",
            );
        }

        let style = self.ai_writing_style.trim();
        if !style.is_empty() && style != "default" {
            instruction.push_str("\n\n--- WRITING STYLE GUIDE ---\n");
            instruction.push_str(style);
            instruction.push_str("\n--- END OF GUIDE ---");
        }

        let difficulty = match self.difficulty.as_str() {
            "easy" => "Easy (favour the player's success)",
            "hard" => "Hard (challenging, with harsher consequences)",
            _ => "Normal",
        };
        instruction.push_str(&format!(
            "\n\nADDITIONAL RULE - DIFFICULTY: the game difficulty is \"{difficulty}\". Scale success odds, risk and the severity of events accordingly."
        ));

        if self.allow_nsfw {
            instruction.push_str(
                "\n\nADDITIONAL RULE - ATMOSPHERE (18+): mature mode is enabled. The world is darker and more dangerous, NPCs may be selfish or cruel, and violence is described frankly. Explicit scenes are written only when the player's action ends with 'nsfw'.",
            );
        }

        instruction
    }
}
