//! Runner configuration (moonbridge.toml)
//!
//! ```toml
//! [state]
//! libraries = ["base", "string", "table", "math"]
//! traceback = true
//! sandbox = false
//!
//! [gc]
//! pause = 200
//! step_mul = 100
//! mode = "generational"
//! ```
//!
//! Every key is optional. Command-line flags override file values.

use moonbridge_engine::{lib_by_name, GcMode, GcSettings, Libraries, StateOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File looked up in the working directory when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "moonbridge.toml";

/// Errors that can occur while loading the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the file
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Library name not in the standard set
    #[error("Unknown library: {0}")]
    UnknownLibrary(String),
}

/// Runner configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CliConfig {
    #[serde(default)]
    pub state: StateSection,

    #[serde(default)]
    pub gc: GcSection,
}

/// `[state]`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StateSection {
    /// Libraries to open; all standard libraries when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub libraries: Option<Vec<String>>,

    /// Append stack tracebacks to runtime errors
    #[serde(default)]
    pub traceback: bool,

    /// Run scripts against a restricted environment
    #[serde(default)]
    pub sandbox: bool,
}

/// `[gc]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GcSection {
    #[serde(default = "default_pause")]
    pub pause: i32,

    #[serde(default = "default_step_mul")]
    pub step_mul: i32,

    #[serde(default)]
    pub mode: GcModeName,
}

fn default_pause() -> i32 {
    GcSettings::default().pause
}

fn default_step_mul() -> i32 {
    GcSettings::default().step_mul
}

impl Default for GcSection {
    fn default() -> Self {
        Self {
            pause: default_pause(),
            step_mul: default_step_mul(),
            mode: GcModeName::default(),
        }
    }
}

/// Collector mode as written in the file
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GcModeName {
    #[default]
    Incremental,
    Generational,
}

impl From<GcModeName> for GcMode {
    fn from(mode: GcModeName) -> Self {
        match mode {
            GcModeName::Incremental => GcMode::Incremental,
            GcModeName::Generational => GcMode::Generational,
        }
    }
}

impl CliConfig {
    /// Parse a configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse configuration text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load `explicit` if given, else `moonbridge.toml` from `dir` if it
    /// exists, else defaults.
    pub fn discover(explicit: Option<&Path>, dir: &Path) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let candidate = dir.join(DEFAULT_CONFIG_FILE);
                if candidate.is_file() {
                    Self::from_file(&candidate)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Engine options described by this configuration.
    pub fn state_options(&self) -> Result<StateOptions, ConfigError> {
        let libraries = match &self.state.libraries {
            None => Libraries::Standard,
            Some(names) if names.is_empty() => Libraries::None,
            Some(names) => Libraries::Custom(
                names
                    .iter()
                    .map(|name| {
                        lib_by_name(name).ok_or_else(|| ConfigError::UnknownLibrary(name.clone()))
                    })
                    .collect::<Result<_, _>>()?,
            ),
        };
        Ok(StateOptions {
            libraries,
            traceback: self.state.traceback,
            gc: GcSettings {
                pause: self.gc.pause,
                step_mul: self.gc.step_mul,
                mode: self.gc.mode.into(),
            },
            error_handler: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_is_default() {
        let config = CliConfig::parse("").unwrap();
        assert_eq!(config, CliConfig::default());
        let options = config.state_options().unwrap();
        assert!(matches!(options.libraries, Libraries::Standard));
        assert_eq!(options.gc, GcSettings::default());
    }

    #[test]
    fn test_parse_full_config() {
        let config = CliConfig::parse(
            r#"
            [state]
            libraries = ["base", "string"]
            traceback = true
            sandbox = true

            [gc]
            pause = 150
            mode = "generational"
            "#,
        )
        .unwrap();
        assert!(config.state.traceback);
        assert!(config.state.sandbox);
        assert_eq!(config.gc.step_mul, 100);

        let options = config.state_options().unwrap();
        match options.libraries {
            Libraries::Custom(libs) => {
                let names: Vec<_> = libs.iter().map(|l| l.name().to_string()).collect();
                assert_eq!(names, ["_G", "string"]);
            }
            other => panic!("unexpected libraries: {:?}", other),
        }
        assert_eq!(options.gc.pause, 150);
        assert_eq!(options.gc.mode, GcMode::Generational);
    }

    #[test]
    fn test_empty_library_list_opens_nothing() {
        let config = CliConfig::parse("[state]\nlibraries = []").unwrap();
        assert!(matches!(
            config.state_options().unwrap().libraries,
            Libraries::None
        ));
    }

    #[test]
    fn test_unknown_library_rejected() {
        let config = CliConfig::parse("[state]\nlibraries = [\"socket\"]").unwrap();
        assert!(matches!(
            config.state_options(),
            Err(ConfigError::UnknownLibrary(name)) if name == "socket"
        ));
    }

    #[test]
    fn test_bad_mode_rejected() {
        assert!(matches!(
            CliConfig::parse("[gc]\nmode = \"sometimes\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_discover() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            CliConfig::discover(None, dir.path()).unwrap(),
            CliConfig::default()
        );

        std::fs::write(dir.path().join(DEFAULT_CONFIG_FILE), "[state]\ntraceback = true").unwrap();
        assert!(CliConfig::discover(None, dir.path()).unwrap().state.traceback);

        let missing = dir.path().join("other.toml");
        assert!(matches!(
            CliConfig::discover(Some(&missing), dir.path()),
            Err(ConfigError::Io { .. })
        ));
    }
}
