use crate::error::EngineError;
use crate::types::{Config, CountingConfig};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.counting.validate()?;
        Ok(config)
    }
}

impl CountingConfig {
    pub fn validate(&self) -> std::result::Result<(), EngineError> {
        if !(0.0..=1.0).contains(&self.line_position) {
            return Err(EngineError::config(format!(
                "line_position must be within [0, 1], got {}",
                self.line_position
            )));
        }
        if !(self.band_half_width > 0.0) {
            return Err(EngineError::config(format!(
                "band_half_width must be positive, got {}",
                self.band_half_width
            )));
        }
        if !(self.max_match_distance > 0.0) {
            return Err(EngineError::config(format!(
                "max_match_distance must be positive, got {}",
                self.max_match_distance
            )));
        }
        if self.lane_count == 0 {
            return Err(EngineError::InvalidLaneCount(self.lane_count));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_counting_config_is_valid() {
        assert!(CountingConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_line_outside_frame() {
        let cfg = CountingConfig {
            line_position: 1.5,
            ..CountingConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(EngineError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_zero_lanes() {
        let cfg = CountingConfig {
            lane_count: 0,
            ..CountingConfig::default()
        };
        assert_eq!(cfg.validate(), Err(EngineError::InvalidLaneCount(0)));
    }

    #[test]
    fn test_load_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "counting:\n  line_position: 0.6\nstorage:\n  backend: memory\n"
        )
        .unwrap();

        let cfg = Config::load(file.path()).unwrap();
        assert_eq!(cfg.counting.line_position, 0.6);
        assert_eq!(cfg.storage.backend, crate::types::StorageBackend::Memory);
        assert_eq!(cfg.replay.frame_width, 1280);
    }

    #[test]
    fn test_load_rejects_invalid_counting_section() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "counting:\n  max_match_distance: -1.0\n").unwrap();
        assert!(Config::load(file.path()).is_err());
    }
}
