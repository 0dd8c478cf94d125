use std::path::Path;

use crate::Config;

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::parse(&raw)
    }

    /// Parse and validate configuration text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing or validation fails
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error describing the first inconsistent setting
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_chat()?;
        self.validate_upstream()?;
        self.validate_store()?;
        Ok(())
    }

    fn validate_chat(&self) -> anyhow::Result<()> {
        let chat = &self.chat;

        if chat.history_turns == 0 {
            anyhow::bail!("chat.history_turns must be greater than 0");
        }

        if chat.world_info && (chat.world_max_chars == 0 || chat.world_max_entries == 0) {
            anyhow::bail!("chat.world_max_chars and chat.world_max_entries must be greater than 0 when world_info is enabled");
        }

        if chat.intent_anchor && chat.anchor_max_chars == 0 {
            anyhow::bail!("chat.anchor_max_chars must be greater than 0 when intent_anchor is enabled");
        }

        Ok(())
    }

    fn validate_upstream(&self) -> anyhow::Result<()> {
        let upstream = &self.upstream;

        if upstream.stream_chunk_chars == 0 {
            anyhow::bail!("upstream.stream_chunk_chars must be greater than 0");
        }

        if !(upstream.temperature_ceiling.is_finite() && upstream.temperature_ceiling > 0.0) {
            anyhow::bail!("upstream.temperature_ceiling must be a positive number");
        }

        if upstream.default_max_output_tokens > upstream.max_output_tokens {
            anyhow::bail!(
                "upstream.default_max_output_tokens ({}) exceeds upstream.max_output_tokens ({})",
                upstream.default_max_output_tokens,
                upstream.max_output_tokens
            );
        }

        if upstream.gemini_model_prefix.trim().is_empty() {
            anyhow::bail!("upstream.gemini_model_prefix must not be empty");
        }

        Ok(())
    }

    fn validate_store(&self) -> anyhow::Result<()> {
        if self.store.guest_user.trim().is_empty() {
            anyhow::bail!("store.guest_user must not be empty");
        }

        if self.store.guest_user.contains(['/', '\\']) {
            anyhow::bail!("store.guest_user must not contain path separators");
        }

        if !self.store.data_root.exists() {
            tracing::warn!(
                data_root = %self.store.data_root.display(),
                "store data root does not exist, lookups will miss"
            );
        }

        Ok(())
    }
}
