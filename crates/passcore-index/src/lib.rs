use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub const ENTRY_SUFFIX: &str = ".gpg";
pub const RECIPIENTS_FILE: &str = ".gpg-id";
pub const MAX_NAME_CHARS: usize = 40;

const ELLIPSIS: &str = "...";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entry {
    pub name: String,
    pub path: PathBuf,
}

impl Entry {
    pub fn from_path(root: &Path, path: PathBuf) -> Option<Self> {
        if !is_entry_path(&path) {
            return None;
        }

        Some(Self {
            name: display_name(root, &path),
            path,
        })
    }

    pub fn raw_base64(&self) -> String {
        match std::fs::read(&self.path) {
            Ok(bytes) => STANDARD.encode(bytes),
            Err(err) => {
                debug!(path = %self.path.display(), error = %err, "raw read failed");
                String::new()
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Index {
    root: PathBuf,
    entries: Vec<Entry>,
}

impl Index {
    pub fn new(root: PathBuf, entries: Vec<Entry>) -> Self {
        Self { root, entries }
    }

    pub fn empty(root: PathBuf) -> Self {
        Self::new(root, Vec::new())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Entry> {
        self.entries.get(idx)
    }

    pub fn find_by_path(&self, path: &Path) -> Option<&Entry> {
        self.entries.iter().find(|entry| entry.path == path)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("couldn't find a valid password store (tried {tried:?})")]
    StoreNotFound { tried: Vec<PathBuf> },
    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub trait IndexSource {
    fn build_index(&self) -> Result<Index, IndexError>;
}

#[derive(Debug, Clone)]
pub struct StoreWalker {
    root: PathBuf,
}

impl StoreWalker {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl IndexSource for StoreWalker {
    /// Unreadable paths below the root are skipped; only a failure on the root
    /// itself is an error.
    fn build_index(&self) -> Result<Index, IndexError> {
        let mut entries = Vec::new();

        for item in WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
        {
            let item = match item {
                Ok(item) => item,
                Err(source) if source.depth() == 0 => {
                    return Err(IndexError::Walk {
                        path: self.root.clone(),
                        source,
                    });
                }
                Err(err) => {
                    warn!(
                        path = ?err.path(),
                        error = %err,
                        "skipping unreadable path during index walk"
                    );
                    continue;
                }
            };

            let is_file = item.file_type().is_file()
                || (item.path_is_symlink() && item.path().is_file());
            if !is_file {
                continue;
            }

            if let Some(entry) = Entry::from_path(&self.root, item.into_path()) {
                entries.push(entry);
            }
        }

        debug!(root = %self.root.display(), entries = entries.len(), "index walk finished");
        Ok(Index::new(self.root.clone(), entries))
    }
}

pub fn is_entry_path(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(ENTRY_SUFFIX))
}

pub fn display_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let raw = relative.to_string_lossy();
    let name = raw.strip_suffix(ENTRY_SUFFIX).unwrap_or(&raw);
    let name = name.trim_start_matches(std::path::MAIN_SEPARATOR);
    truncate_front(name, MAX_NAME_CHARS)
}

fn truncate_front(input: &str, max_chars: usize) -> String {
    let count = input.chars().count();
    if count <= max_chars {
        return input.to_string();
    }

    let tail: String = input.chars().skip(count - max_chars).collect();
    format!("{}{}", ELLIPSIS, tail)
}

pub fn resolve_store_root(
    configured: Option<&Path>,
    home: Option<&Path>,
) -> Result<PathBuf, IndexError> {
    let mut candidates = Vec::new();
    if let Some(configured) = configured.filter(|p| !p.as_os_str().is_empty()) {
        candidates.push(configured.to_path_buf());
    }
    if let Some(home) = home {
        candidates.push(home.join(".password-store"));
        candidates.push(home.join("password-store"));
    }

    for candidate in &candidates {
        match std::fs::canonicalize(candidate) {
            Ok(resolved) if resolved.exists() => {
                info!(root = %resolved.display(), "using password store");
                return Ok(resolved);
            }
            Ok(_) => continue,
            Err(err) => {
                debug!(candidate = %candidate.display(), error = %err, "store candidate rejected");
            }
        }
    }

    Err(IndexError::StoreNotFound { tried: candidates })
}

/// Recipients listed in the store's `.gpg-id`; a missing file yields none.
pub fn read_recipients(root: &Path) -> Result<Vec<String>, IndexError> {
    let path = root.join(RECIPIENTS_FILE);
    match std::fs::read_to_string(&path) {
        Ok(content) => Ok(parse_recipients(&content)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(source) => Err(IndexError::Io { path, source }),
    }
}

pub fn parse_recipients(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}
