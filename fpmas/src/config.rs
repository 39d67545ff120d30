//! Ambient configuration for a `Context`.
//!
//! Spec §6 reads no environment variables; the only configuration surface
//! the core exposes is this structure, loadable from a TOML file the way
//! other crates in this corpus (`the-dagwood`) load their process config.

use serde::{Deserialize, Serialize};

/// Tunables that are not derived from the cluster topology itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Seed for the `Runtime`'s job-shuffling PRNG. Fixed by default so a
    /// run is reproducible; spec §4.L requires the shuffle be "deterministic
    /// given the Runtime seed", not that the seed itself be random.
    pub seed: u64,
    /// Default sub-step assigned to a job scheduled without one.
    pub default_sub_step: f64,
    /// Log level passed to `fpmas::logging::init`, e.g. `"info"` or
    /// `"fpmas=debug"`.
    pub log_filter: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            seed: 0,
            default_sub_step: 0.0,
            log_filter: "info".to_string(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_toml() {
        let config = RuntimeConfig::default();
        let text = config.to_toml_string().unwrap();
        let back = RuntimeConfig::from_toml_str(&text).unwrap();
        assert_eq!(back.seed, config.seed);
        assert_eq!(back.log_filter, config.log_filter);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config = RuntimeConfig::from_toml_str("seed = 42\n").unwrap();
        assert_eq!(config.seed, 42);
        assert_eq!(config.default_sub_step, 0.0);
    }
}
