use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_CLIP_SECONDS: u64 = 60;

const ENV_STORE_DIR: &str = "PASSWORD_STORE_DIR";
const ENV_STORE_KEY: &str = "PASSWORD_STORE_KEY";
const ENV_CLIP_TIME: &str = "PASSWORD_STORE_CLIP_TIME";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub store_dir: Option<PathBuf>,
    pub default_recipient: Option<String>,
    pub clip_seconds: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_dir: None,
            default_recipient: None,
            clip_seconds: DEFAULT_CLIP_SECONDS,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let mut settings = match config_file_path() {
            Some(path) => Self::load_file(&path)?.unwrap_or_default(),
            None => Self::default(),
        };
        settings.apply_env_from(std::env::vars())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Returns `Ok(None)` when the file does not exist.
    pub fn load_file(path: &Path) -> Result<Option<Self>, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let mut settings =
            toml::from_str::<Self>(&content).map_err(|source| ConfigError::Parse {
                origin: path.display().to_string(),
                source,
            })?;
        settings.expand_paths_with(home_dir().as_deref());
        debug!(path = %path.display(), "loaded config file");
        Ok(Some(settings))
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut settings = toml::from_str::<Self>(content).map_err(|source| ConfigError::Parse {
            origin: "<inline>".to_string(),
            source,
        })?;
        settings.expand_paths_with(home_dir().as_deref());
        Ok(settings)
    }

    fn expand_paths_with(&mut self, home: Option<&Path>) {
        if let Some(dir) = self.store_dir.take() {
            self.store_dir = Some(match dir.to_str() {
                Some(raw) => expand_home_with(raw, home),
                None => dir,
            });
        }
    }

    pub fn apply_env_from<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let value = value.trim();
            match key.as_str() {
                ENV_STORE_DIR if !value.is_empty() => {
                    self.store_dir = Some(expand_home(value));
                }
                ENV_STORE_KEY if !value.is_empty() => {
                    self.default_recipient = Some(value.to_string());
                }
                ENV_CLIP_TIME if !value.is_empty() => {
                    self.clip_seconds =
                        value
                            .parse::<u64>()
                            .map_err(|_| ConfigError::InvalidValue {
                                key: ENV_CLIP_TIME,
                                value: value.to_string(),
                            })?;
                }
                _ => {}
            }
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.clip_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                key: "clip_seconds",
                value: "0".to_string(),
            });
        }

        Ok(())
    }

    pub fn clip_duration(&self) -> Duration {
        Duration::from_secs(self.clip_seconds)
    }
}

pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map(PathBuf::from)
}

pub fn expand_home(raw: &str) -> PathBuf {
    expand_home_with(raw, home_dir().as_deref())
}

fn expand_home_with(raw: &str, home: Option<&Path>) -> PathBuf {
    let Some(home) = home else {
        return PathBuf::from(raw);
    };

    if raw == "~" {
        return home.to_path_buf();
    }

    match raw.strip_prefix("~/") {
        Some(rest) => home.join(rest),
        None => PathBuf::from(raw),
    }
}

fn config_file_path() -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(|| home_dir().map(|home| home.join(".config")))?;
    Some(base.join("xpass").join("config.toml"))
}
