//! Loader configuration, deserialized from RON.
//!
//! Wraps the engine's [`WorldConfig`] with the parsing-side knobs the
//! engine itself has no use for. Every field defaults, so an empty config
//! (`()` is not valid RON for a struct; use `(world: ())`) loads fine.

use railworld_core::context::WorldConfig;
use serde::{Deserialize, Serialize};

use crate::error::SceneError;

fn default_alpha_suffixes() -> Vec<String> {
    vec!["-a".into(), "_a".into()]
}

/// Scene-loader settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Engine configuration handed to the world on construction.
    pub world: WorldConfig,

    /// Texture-name stem suffixes marking an alpha-channel texture; the
    /// legacy format carries no explicit alpha flag, so the convention in
    /// the texture names decides the render pass.
    pub alpha_suffixes: Vec<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            world: WorldConfig::default(),
            alpha_suffixes: default_alpha_suffixes(),
        }
    }
}

impl LoaderConfig {
    pub fn from_ron(text: &str) -> Result<Self, SceneError> {
        Ok(ron::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_ron_config_fills_defaults() {
        let cfg = LoaderConfig::from_ron("(world: (join_events: true, seed: 7))").unwrap();
        assert!(cfg.world.join_events);
        assert_eq!(cfg.world.seed, 7);
        assert_eq!(cfg.world.sectors_per_square, 5);
        assert_eq!(cfg.alpha_suffixes, vec!["-a", "_a"]);
    }

    #[test]
    fn bad_config_is_an_error() {
        assert!(LoaderConfig::from_ron("(world: (join_events: 3))").is_err());
    }
}
