/// Configuration loading from gradebox.json
use crate::config::types::{GradeError, GradeLimits, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "gradebox.json";

/// Full gradebox.json structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraderConfig {
    pub limits: GradeLimits,
    /// Replaces the built-in problem bank when set.
    pub problems_file: Option<PathBuf>,
}

impl GraderConfig {
    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GradeError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let config: GraderConfig = serde_json::from_str(&content)
            .map_err(|e| GradeError::Config(format!("Failed to parse config JSON: {}", e)))?;

        log::debug!("loaded grader config from {}", path.display());
        Ok(config)
    }

    /// Load ./gradebox.json when present, otherwise the defaults
    pub fn load_default() -> Result<Self> {
        let config_path = std::env::current_dir()
            .map_err(|e| GradeError::Config(format!("Failed to get current directory: {}", e)))?
            .join(DEFAULT_CONFIG_FILE);

        if config_path.exists() {
            Self::load_from_file(config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Explicit path wins; otherwise fall back to [`GraderConfig::load_default`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Self::load_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_config(contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("gradebox-config-{}.json", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_partial_file() {
        let path = temp_config(r#"{"limits": {"mem_limit_mb": 256}, "problems_file": "bank.json"}"#);
        let config = GraderConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.limits.mem_limit_mb, 256);
        assert_eq!(config.limits.time_limit, 2.0);
        assert_eq!(config.problems_file, Some(PathBuf::from("bank.json")));
    }

    #[test]
    fn malformed_file_is_config_error() {
        let path = temp_config("{not json");
        let err = GraderConfig::load_from_file(&path).unwrap_err();
        std::fs::remove_file(&path).ok();

        assert!(matches!(err, GradeError::Config(_)));
        assert!(err.to_string().contains("Failed to parse config JSON"));
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = GraderConfig::load(Some(Path::new("/nonexistent/gradebox.json"))).unwrap_err();
        assert!(matches!(err, GradeError::Config(_)));
    }
}
