use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming a configuration file
pub const CONFIG_ENV: &str = "VUID_CONFIG";

/// Configuration file picked up from the working directory
pub const LOCAL_CONFIG_FILE: &str = "vuid.yaml";

/// Settings for extraction, output naming and file locations.
///
/// Every field has a default, so a config file only needs the values it
/// changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Online spec, also the base of every link embedded in messages
    pub spec_url: String,
    /// Local copy of the spec, used offline or when the fetch fails
    pub spec_file: PathBuf,
    /// Generated header
    pub header_file: PathBuf,
    /// Identifier database
    pub database_file: PathBuf,
    /// Identifier prefix, followed by the 5-digit sequence
    pub id_prefix: String,
    /// Text leading every message, before the section heading
    pub message_prefix: String,
    /// Name of the generated enum
    pub enum_name: String,
    /// Name of the generated id to message map
    pub map_name: String,
    pub fetch_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            spec_url: "https://www.khronos.org/registry/vulkan/specs/1.0-extensions/html/vkspec.html"
                .to_string(),
            spec_file: PathBuf::from("vkspec.html"),
            header_file: PathBuf::from("vk_validation_error_messages.h"),
            database_file: PathBuf::from("vk_validation_error_database.txt"),
            id_prefix: "VALIDATION_ERROR_".to_string(),
            message_prefix: "For more information refer to Vulkan Spec Section ".to_string(),
            enum_name: "UNIQUE_VALIDATION_ERROR_CODE".to_string(),
            map_name: "validation_error_map".to_string(),
            fetch_timeout_secs: 1,
        }
    }
}

impl Config {
    /// Loads a configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))
    }

    /// Saves the configuration to the specified path
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(&self)?;

        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        fs::write(&path, content)
            .with_context(|| format!("Failed to write config to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Writes a default configuration file unless one already exists.
    /// Returns true when a file was written.
    pub fn create_default<P: AsRef<Path>>(path: P) -> Result<bool> {
        if path.as_ref().exists() {
            return Ok(false);
        }
        Config::default().save(path)?;
        Ok(true)
    }

    /// Loads the configuration from the first location that applies:
    /// explicit path, `VUID_CONFIG`, `./vuid.yaml`, then the user config
    /// directory. Falls back to defaults when none exists.
    ///
    /// Returns the path the configuration came from, if any.
    pub fn resolve(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Config::load(path)?, Some(path.to_path_buf())));
        }

        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(path);
            return Ok((Config::load(&path)?, Some(path)));
        }

        let candidates = [
            Some(PathBuf::from(LOCAL_CONFIG_FILE)),
            get_config_dir().map(|dir| dir.join("config.yaml")),
        ];
        for path in candidates.into_iter().flatten() {
            if path.exists() {
                log::info!("Using configuration from {:?}", path);
                return Ok((Config::load(&path)?, Some(path)));
            }
        }

        Ok((Config::default(), None))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// Per-user configuration directory (`<config dir>/vuid`)
pub fn get_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("vuid"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_config_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("vuid.yaml");
        fs::write(&path, "id_prefix: ERR_\nfetch_timeout_secs: 5\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.id_prefix, "ERR_");
        assert_eq!(config.fetch_timeout(), Duration::from_secs(5));
        assert_eq!(config.enum_name, Config::default().enum_name);
        assert_eq!(config.database_file, PathBuf::from("vk_validation_error_database.txt"));
    }

    #[test]
    fn test_create_default_does_not_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.yaml");

        assert!(Config::create_default(&path).unwrap());
        assert_eq!(Config::load(&path).unwrap(), Config::default());

        fs::write(&path, "map_name: custom_map\n").unwrap();
        assert!(!Config::create_default(&path).unwrap());
        assert_eq!(Config::load(&path).unwrap().map_name, "custom_map");
    }

    #[test]
    fn test_resolve_explicit_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("custom.yaml");
        fs::write(&path, "enum_name: MY_CODES\n").unwrap();

        let (config, origin) = Config::resolve(Some(&path)).unwrap();
        assert_eq!(config.enum_name, "MY_CODES");
        assert_eq!(origin, Some(path));
    }

    #[test]
    fn test_resolve_missing_explicit_path_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("absent.yaml");
        assert!(Config::resolve(Some(&path)).is_err());
    }

    #[test]
    fn test_invalid_yaml_reports_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.yaml");
        fs::write(&path, "fetch_timeout_secs: [not a number\n").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
