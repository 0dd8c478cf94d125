use std::time::Duration;

use serde::{Deserialize, Deserializer};

/// Limits and retry policy applied to every upstream call
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpstreamConfig {
    /// Ceiling applied to the caller's requested output tokens
    pub max_output_tokens: u32,
    /// Used when the caller does not request a value
    pub default_max_output_tokens: u32,
    /// Upper bound for sampling temperature
    pub temperature_ceiling: f64,
    /// Additional attempts after the first one
    pub max_retries: u32,
    /// Delay before the first retry, doubled per attempt (e.g. "400ms")
    #[serde(deserialize_with = "deserialize_duration")]
    pub retry_base_delay: Duration,
    /// Per-attempt request timeout (e.g. "60s")
    #[serde(deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
    /// Characters per re-emitted stream segment
    pub stream_chunk_chars: usize,
    /// Model names with this prefix always use the Gemini adapter
    pub gemini_model_prefix: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            max_output_tokens: 4096,
            default_max_output_tokens: 1024,
            temperature_ceiling: 2.0,
            max_retries: 2,
            retry_base_delay: Duration::from_millis(400),
            timeout: Duration::from_secs(60),
            stream_chunk_chars: 120,
            gemini_model_prefix: "gemini-".to_owned(),
        }
    }
}

impl UpstreamConfig {
    /// Effective output token budget for a caller request
    pub fn clamp_max_tokens(&self, requested: Option<u32>) -> u32 {
        requested
            .filter(|n| *n > 0)
            .unwrap_or(self.default_max_output_tokens)
            .min(self.max_output_tokens)
    }

    /// Clamp a caller temperature into `[0, temperature_ceiling]`
    pub fn clamp_temperature(&self, requested: Option<f64>) -> Option<f64> {
        requested
            .filter(|t| t.is_finite())
            .map(|t| t.clamp(0.0, self.temperature_ceiling))
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    duration_str::parse(&raw).map_err(|e| serde::de::Error::custom(format!("invalid duration '{raw}': {e}")))
}
