//! The `config` module contains the [TrackerConfig].

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use std::{path::Path, time::Duration};

/// The [TrackerConfig] struct contains the tunables shared by every edge tracker and the
/// challenge confirmation job. Durations are given in milliseconds when loaded from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// How often each tracker wakes up to take its next action.
    #[serde(deserialize_with = "millis")]
    pub act_interval: Duration,
    /// How long a tracker may keep failing before its failures are logged as errors rather
    /// than warnings.
    #[serde(deserialize_with = "millis")]
    pub stuck_threshold: Duration,
    /// The name of the validator, attached to every log line.
    pub validator_name: String,
    /// The delay before the first retry of a failed external call.
    #[serde(deserialize_with = "millis")]
    pub retry_initial_backoff: Duration,
    /// The upper bound of the exponential retry delay.
    #[serde(deserialize_with = "millis")]
    pub retry_max_backoff: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            act_interval: Duration::from_secs(1),
            stuck_threshold: Duration::from_secs(10 * 60),
            validator_name: String::from("bold-challenger"),
            retry_initial_backoff: Duration::from_secs(1),
            retry_max_backoff: Duration::from_secs(60),
        }
    }
}

impl TrackerConfig {
    /// Loads a [TrackerConfig] from the JSON file at `path`. Missing fields take their default
    /// values.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("could not read tracker config at {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("could not parse tracker config at {}", path.display()))
    }

    /// The delay before retry number `attempt` (starting at 0): the initial backoff doubled
    /// once per attempt, capped at the maximum backoff.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        1u32.checked_shl(attempt)
            .and_then(|factor| self.retry_initial_backoff.checked_mul(factor))
            .unwrap_or(self.retry_max_backoff)
            .min(self.retry_max_backoff)
    }
}

fn millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}
