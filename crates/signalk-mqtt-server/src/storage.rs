//! File-backed rule storage and configuration loading.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use signalk_mqtt_core::{ConfigError, ImportConfig, ImportRule, RuleStorage};

/// Rules persisted as a pretty-printed JSON array in a single file.
#[derive(Debug, Clone)]
pub struct FileRuleStorage {
    path: PathBuf,
}

impl FileRuleStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Storage at the rule file location named by `config`.
    pub fn from_config(config: &ImportConfig) -> Self {
        Self::new(config.rules_file())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RuleStorage for FileRuleStorage {
    fn load_rules(&self) -> Result<Option<Vec<ImportRule>>, ConfigError> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ConfigError::ReadError(format!(
                    "{}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let rules = serde_json::from_str(&data)
            .map_err(|e| ConfigError::InvalidData(format!("{}: {}", self.path.display(), e)))?;
        debug!(path = %self.path.display(), "rules loaded");
        Ok(Some(rules))
    }

    fn save_rules(&self, rules: &[ImportRule]) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(rules)
            .map_err(|e| ConfigError::WriteError(e.to_string()))?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| {
                ConfigError::StorageUnavailable(format!("{}: {}", dir.display(), e))
            })?;
        }

        // Write next to the target and rename so readers never see a torn file.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .map_err(|e| ConfigError::WriteError(format!("{}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| ConfigError::WriteError(format!("{}: {}", self.path.display(), e)))?;

        info!(path = %self.path.display(), rules = rules.len(), "rules saved");
        Ok(())
    }
}

/// Load the configuration file. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<ImportConfig, ConfigError> {
    match fs::read_to_string(path) {
        Ok(data) => ImportConfig::from_json(&data),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!(path = %path.display(), "no configuration file, using defaults");
            Ok(ImportConfig::default())
        }
        Err(e) => Err(ConfigError::ReadError(format!("{}: {}", path.display(), e))),
    }
}
