//! Edit engine configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::tracks::vector;

/// How far a drag edit (`move_pos` / `move_vec`) spreads to neighboring frames.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DragFalloff {
    /// Linear decay out to the nearest control point on each side.
    #[default]
    ToControlPoints,
    /// Cubic decay over a fixed number of frames on each side.
    Window { radius: usize },
}

/// Low-pass settings used when a caller does not pick its own.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterSettings {
    pub cutoff_hz: f64,
    pub order: usize,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            cutoff_hz: 2.0,
            order: 2,
        }
    }
}

/// Configuration shared by every track in a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackConfig {
    /// Maximum number of undo (and redo) snapshots kept per track.
    pub undo_depth: usize,
    /// Heading assigned when nothing better is known. Normalized on use.
    pub default_heading: [f64; 3],
    pub drag_falloff: DragFalloff,
    pub filter: FilterSettings,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            undo_depth: 10,
            default_heading: [1.0, 0.0, 0.0],
            drag_falloff: DragFalloff::default(),
            filter: FilterSettings::default(),
        }
    }
}

impl TrackConfig {
    /// Check the invariants the edit engine relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.undo_depth == 0 {
            return Err(ConfigError::Invalid("undo_depth must be at least 1".into()));
        }
        if vector::norm(&self.default_heading) < vector::ZERO_LENGTH {
            return Err(ConfigError::Invalid(
                "default_heading must be a non-zero vector".into(),
            ));
        }
        if self.filter.order == 0 {
            return Err(ConfigError::Invalid("filter order must be at least 1".into()));
        }
        if self.filter.cutoff_hz.is_nan() || self.filter.cutoff_hz <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "filter cutoff must be positive, got {}",
                self.filter.cutoff_hz
            )));
        }
        Ok(())
    }

    /// The default heading as a unit vector. A zero heading falls back to +X.
    pub fn unit_default_heading(&self) -> [f64; 3] {
        vector::normalize_or(self.default_heading, [1.0, 0.0, 0.0])
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let cfg = TrackConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.undo_depth, 10);
        assert_eq!(cfg.unit_default_heading(), [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_rejects_zero_depth_and_heading() {
        let cfg = TrackConfig {
            undo_depth: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));

        let cfg = TrackConfig {
            default_heading: [0.0, 0.0, 0.0],
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_json_roundtrip_with_partial_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixtrack.json");
        std::fs::write(
            &path,
            r#"{ "undo_depth": 4, "drag_falloff": { "kind": "window", "radius": 6 } }"#,
        )
        .unwrap();

        let cfg = TrackConfig::from_json_file(&path).unwrap();
        assert_eq!(cfg.undo_depth, 4);
        assert_eq!(cfg.drag_falloff, DragFalloff::Window { radius: 6 });
        assert_eq!(cfg.filter, FilterSettings::default());

        cfg.to_json_file(&path).unwrap();
        assert_eq!(TrackConfig::from_json_file(&path).unwrap(), cfg);
    }
}
