//! Session configuration.

/// Default model for every narrator call.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Words the session looks for in player input and model replies.
///
/// Prompts are written in English, but the player may well type in the
/// story's own language, so these are configurable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionLexicon {
    /// Actions starting with one of these (case-insensitive) skip enrichment.
    pub command_prefixes: Vec<String>,
    /// An enrichment reply is accepted only if it contains this word.
    pub success_keyword: String,
    /// An active rule containing this phrase locks free-text actions.
    pub action_lock_phrase: String,
}

impl Default for ActionLexicon {
    fn default() -> Self {
        Self {
            command_prefixes: ["use", "learn", "equip", "unequip", "system:"]
                .into_iter()
                .map(String::from)
                .collect(),
            success_keyword: "success".to_string(),
            action_lock_phrase: "LOCK CUSTOM ACTIONS".to_string(),
        }
    }
}

impl ActionLexicon {
    /// Vietnamese player input.
    pub fn vietnamese() -> Self {
        Self {
            command_prefixes: ["sử dụng", "học công pháp", "trang bị", "tháo", "hệ thống:"]
                .into_iter()
                .map(String::from)
                .collect(),
            success_keyword: "thành công".to_string(),
            action_lock_phrase: "KHÓA HÀNH ĐỘNG TÙY Ý".to_string(),
        }
    }

    pub fn is_command(&self, action: &str) -> bool {
        let action = action.to_lowercase();
        self.command_prefixes.iter().any(|p| action.starts_with(&p.to_lowercase()))
    }

    /// Whether an enrichment reply signals raised stakes.
    pub fn signals_stakes(&self, reply: &str) -> bool {
        reply.to_lowercase().contains(&self.success_keyword.to_lowercase())
    }

    pub fn locks_actions(&self, rule: &str) -> bool {
        rule.to_uppercase().contains(&self.action_lock_phrase.to_uppercase())
    }
}

/// Configuration for a [`GameSession`](crate::GameSession).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Model used for every call.
    pub model: String,

    /// Temperature for narrator generation.
    pub temperature: Option<f32>,

    /// History entries sent with each turn.
    pub history_window: usize,

    /// A chronicle summary is written every this many turns.
    pub summary_interval: u32,

    /// History entries read when writing a turn summary.
    pub summary_slice: usize,

    /// Ask the model to expand risky actions before the turn.
    pub enrich_actions: bool,

    pub lexicon: ActionLexicon,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: None,
            history_window: 10,
            summary_interval: 10,
            summary_slice: 20,
            enrich_actions: true,
            lexicon: ActionLexicon::default(),
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn with_history_window(mut self, entries: usize) -> Self {
        self.history_window = entries;
        self
    }

    /// Set the summary interval. Zero disables summaries.
    pub fn with_summary_interval(mut self, turns: u32) -> Self {
        self.summary_interval = turns;
        self
    }

    pub fn with_enrichment(mut self, enabled: bool) -> Self {
        self.enrich_actions = enabled;
        self
    }

    pub fn with_lexicon(mut self, lexicon: ActionLexicon) -> Self {
        self.lexicon = lexicon;
        self
    }

    /// A request for the configured model.
    pub(crate) fn request(&self, contents: Vec<gemini::Content>) -> gemini::Request {
        let request = gemini::Request::new(contents).with_model(&self.model);
        match self.temperature {
            Some(t) => request.with_temperature(t),
            None => request,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_prefixes() {
        let lexicon = ActionLexicon::default();
        assert!(lexicon.is_command("Equip the sword"));
        assert!(lexicon.is_command("System: change the style"));
        assert!(!lexicon.is_command("attack the guard"));

        let vi = ActionLexicon::vietnamese();
        assert!(vi.is_command("Trang bị kiếm sắt"));
        assert!(!vi.is_command("tấn công yêu thú"));
    }

    #[test]
    fn test_stakes_keyword() {
        assert!(ActionLexicon::default().signals_stakes("Leap (Success 60%: ...)"));
        assert!(ActionLexicon::vietnamese().signals_stakes("Nhảy (Thành công 60%: ...)"));
        assert!(!ActionLexicon::default().signals_stakes("Leap"));
    }

    #[test]
    fn test_action_lock() {
        let vi = ActionLexicon::vietnamese();
        assert!(vi.locks_actions("Luật: khóa hành động tùy ý trong ngục"));
        assert!(!ActionLexicon::default().locks_actions("No magic"));
    }

    #[test]
    fn test_config_builder() {
        let config = SessionConfig::new()
            .with_model("gemini-2.5-pro")
            .with_summary_interval(0)
            .with_enrichment(false);
        assert_eq!(config.model, "gemini-2.5-pro");
        assert_eq!(config.history_window, 10);
        assert!(!config.enrich_actions);

        let request = config.request(vec![gemini::Content::user("hi")]);
        assert_eq!(request.model.as_deref(), Some("gemini-2.5-pro"));
        assert_eq!(request.temperature, None);
    }
}
