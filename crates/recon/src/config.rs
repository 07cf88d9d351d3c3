//! Dataset configuration.

use serde::{Deserialize, Serialize};

/// Configuration for a [`Dataset`](crate::Dataset).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Also write `.recon/example_store.jsonl` on `to_disk`.
    pub save_example_store: bool,
    /// Replay the stored operations when loaded data no longer matches the stored commit hash.
    pub replay_on_mismatch: bool,
    /// Warn when an operation that ignores tokens runs over tokenized examples.
    pub warn_on_tokens: bool,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            save_example_store: true,
            replay_on_mismatch: false,
            warn_on_tokens: true,
        }
    }
}

impl DatasetConfig {
    pub fn with_save_example_store(mut self, save: bool) -> Self {
        self.save_example_store = save;
        self
    }

    pub fn with_replay_on_mismatch(mut self, replay: bool) -> Self {
        self.replay_on_mismatch = replay;
        self
    }

    pub fn with_warn_on_tokens(mut self, warn: bool) -> Self {
        self.warn_on_tokens = warn;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: DatasetConfig =
            serde_json::from_str(r#"{"replay_on_mismatch": true}"#).unwrap();
        assert!(config.replay_on_mismatch);
        assert!(config.save_example_store);
        assert!(config.warn_on_tokens);
    }
}
