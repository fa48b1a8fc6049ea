// config.rs — level loading options

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_GAMMA: f32 = 2.2;

/// Below this many records a lump is decoded sequentially.
pub const PARALLEL_LUMP_THRESHOLD: usize = 64;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelConfig {
    /// Display gamma used to encode ambient probe colours.
    pub gamma: f32,
    /// When off, every cluster is treated as visible from every other.
    pub want_visibility: bool,
    pub parallel_lump_threshold: usize,
}

impl Default for LevelConfig {
    fn default() -> Self {
        LevelConfig {
            gamma: DEFAULT_GAMMA,
            want_visibility: true,
            parallel_lump_threshold: PARALLEL_LUMP_THRESHOLD,
        }
    }
}

impl LevelConfig {
    /// Parse a JSON document; missing keys keep their defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: LevelConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.gamma.is_finite() || self.gamma <= 0.0 {
            return Err(ConfigError::BadGamma(self.gamma));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = LevelConfig::default();
        assert_eq!(c.gamma, 2.2);
        assert!(c.want_visibility);
        assert_eq!(c.parallel_lump_threshold, 64);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let c = LevelConfig::from_json(r#"{ "want_visibility": false }"#).unwrap();
        assert!(!c.want_visibility);
        assert_eq!(c.gamma, DEFAULT_GAMMA, "unspecified gamma should default");
    }

    #[test]
    fn test_empty_object_is_default() {
        assert_eq!(LevelConfig::from_json("{}").unwrap(), LevelConfig::default());
    }

    #[test]
    fn test_rejects_bad_gamma() {
        let err = LevelConfig::from_json(r#"{ "gamma": 0.0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::BadGamma(_)));
    }

    #[test]
    fn test_rejects_malformed_json() {
        let err = LevelConfig::from_json("{ gamma: ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
