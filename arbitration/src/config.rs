//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::agents::DEFAULT_SOURCE_TIMEOUT;

/// Runtime knobs for [`crate::ArbitrationEngine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Per-call timeout applied to opinion-source backends
    pub source_timeout: Duration,

    /// Fan out independent calls within a phase concurrently
    pub parallel_phases: bool,

    /// Run the advisory plausibility checks on final votes
    pub run_plausibility: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            source_timeout: DEFAULT_SOURCE_TIMEOUT,
            parallel_phases: true,
            run_plausibility: true,
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(secs) = lookup("ARBITER_SOURCE_TIMEOUT_SECS") {
            if let Ok(n) = secs.trim().parse::<u64>() {
                if n > 0 {
                    config.source_timeout = Duration::from_secs(n);
                }
            }
        }
        if let Some(val) = lookup("ARBITER_PARALLEL_PHASES") {
            config.parallel_phases = parse_flag(&val);
        }
        if let Some(val) = lookup("ARBITER_PLAUSIBILITY") {
            config.run_plausibility = parse_flag(&val);
        }

        config
    }
}

fn parse_flag(val: &str) -> bool {
    val.to_lowercase() == "true" || val == "1"
}
