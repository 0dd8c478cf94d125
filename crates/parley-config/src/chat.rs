use serde::Deserialize;

/// Prompt enrichment switches
///
/// Read once at startup and passed by reference into every assembly call,
/// so tests can build a variant per case.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChatConfig {
    /// Strip SillyTavern control placeholders such as `[Start a new Chat]`
    pub scrub_meta_brackets: bool,
    /// Drop the caller's own system text from the instruction
    pub strict_drop_persona: bool,
    /// Inject a reply-language directive for Chinese locales
    pub language_directive: bool,
    /// Inject the character card brief
    pub character_card: bool,
    /// Inject the world-info brief
    pub world_info: bool,
    /// Maximum world-info entries rendered
    pub world_max_entries: usize,
    /// Character clamp for the whole world-info block
    pub world_max_chars: usize,
    /// Inject the roleplay enforcer directive
    pub roleplay_enforcer: bool,
    /// Inject the "answer the latest message" directive
    pub user_priority: bool,
    /// Inject math/story intent rules
    pub intent_rules: bool,
    /// Inject the anchor directive
    pub intent_anchor: bool,
    /// Character clamp for the anchor copy
    pub anchor_max_chars: usize,
    /// Append a synthetic user turn restating the anchor
    pub hard_append: bool,
    /// Text appended after the anchor in the synthetic turn
    pub hard_append_suffix: String,
    /// Collapse the outgoing list to the anchor alone
    pub strict_latest: bool,
    /// Turn pairs kept in the history window
    pub history_turns: usize,
    /// Forward the caller's message array with minimal changes
    pub preserve_structure: bool,
    /// Answer pure arithmetic locally
    pub math_short_circuit: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            scrub_meta_brackets: true,
            strict_drop_persona: false,
            language_directive: true,
            character_card: true,
            world_info: true,
            world_max_entries: 3,
            world_max_chars: 800,
            roleplay_enforcer: true,
            user_priority: true,
            intent_rules: true,
            intent_anchor: true,
            anchor_max_chars: 400,
            hard_append: false,
            hard_append_suffix: "\n\n(Reply to the message above directly.)".to_owned(),
            strict_latest: false,
            history_turns: 6,
            preserve_structure: false,
            math_short_circuit: true,
        }
    }
}

impl ChatConfig {
    /// Number of non-system turns kept in the history window
    pub fn history_window(&self) -> usize {
        self.history_turns.saturating_mul(2).max(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_table_uses_defaults() {
        let config: ChatConfig = toml::from_str("").unwrap();
        assert_eq!(config, ChatConfig::default());
        assert_eq!(config.world_max_entries, 3);
        assert_eq!(config.world_max_chars, 800);
        assert_eq!(config.anchor_max_chars, 400);
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let config: ChatConfig = toml::from_str(
            r"
            hard_append = true
            history_turns = 2
            ",
        )
        .unwrap();

        assert!(config.hard_append);
        assert_eq!(config.history_window(), 4);
        assert!(config.scrub_meta_brackets);
    }

    #[test]
    fn history_window_has_floor_of_two() {
        let config = ChatConfig {
            history_turns: 0,
            ..ChatConfig::default()
        };
        assert_eq!(config.history_window(), 2);
    }

    #[test]
    fn unknown_field_rejected() {
        let result: Result<ChatConfig, _> = toml::from_str("hard_apend = true");
        assert!(result.is_err());
    }
}
