use std::time::Duration;

use crate::content::ContentExtractor;
use crate::errors::StreamingError;
use crate::identifier::IdStrategy;

/// Correlator behavior options.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CorrelatorConfig {
    /// Strategy for requests that do not pin their own identifier.
    pub id_strategy: IdStrategy,
    /// How message fragments are turned into accumulated text.
    pub content: ContentExtractor,
}

impl CorrelatorConfig {
    /// Builds a config from `STREAMING_HTTP_ID_STRATEGY` (default `random`).
    pub fn from_env() -> Result<Self, StreamingError> {
        let mut config = Self::default();
        if let Some(raw) = env_value("STREAMING_HTTP_ID_STRATEGY") {
            config.id_strategy = raw.parse()?;
        }
        Ok(config)
    }

    /// Overrides the identifier strategy.
    pub fn id_strategy(mut self, strategy: IdStrategy) -> Self {
        self.id_strategy = strategy;
        self
    }

    /// Overrides the content extractor.
    pub fn content(mut self, content: ContentExtractor) -> Self {
        self.content = content;
        self
    }
}

/// Reads a non-empty environment variable.
pub(crate) fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Reads a whole number of seconds from the environment.
pub(crate) fn env_secs(key: &str) -> Result<Option<Duration>, StreamingError> {
    env_value(key)
        .map(|raw| parse_secs(key, &raw))
        .transpose()
}

pub(crate) fn parse_secs(key: &str, raw: &str) -> Result<Duration, StreamingError> {
    raw.parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| StreamingError::Config(format!("{key} must be a number of seconds: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_random_ids() {
        let config = CorrelatorConfig::default();
        assert_eq!(config.id_strategy, IdStrategy::Random);
        assert_eq!(config.content, ContentExtractor::default());
    }

    #[test]
    fn parse_secs_rejects_garbage() {
        assert_eq!(parse_secs("K", "15").ok(), Some(Duration::from_secs(15)));
        assert!(matches!(
            parse_secs("K", "soon"),
            Err(StreamingError::Config(msg)) if msg.starts_with("K must be")
        ));
    }
}
