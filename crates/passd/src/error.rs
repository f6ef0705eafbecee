use std::path::PathBuf;

use passcore_config::ConfigError;
use passcore_index::IndexError;
use passcore_shell::ShellError;
use passcore_watch::WatchError;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("no Tokio runtime available")]
    NoRuntime,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Watch(#[from] WatchError),
    #[error(transparent)]
    Shell(#[from] ShellError),
    #[error("invalid entry name {0:?}")]
    InvalidName(String),
    #[error("failed to decrypt {path}: {source}")]
    Decrypt {
        path: PathBuf,
        #[source]
        source: ShellError,
    },
    #[error("failed to encrypt {path}: {source}")]
    Encrypt {
        path: PathBuf,
        #[source]
        source: ShellError,
    },
    #[error("field not found: {0:?}")]
    FieldNotFound(Vec<String>),
}
