use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use passcore_config::{home_dir, Settings};
use passcore_index::{
    display_name, is_entry_path, read_recipients, resolve_store_root, Entry, Index, IndexSource,
    StoreWalker, ENTRY_SUFFIX,
};
use passcore_query::QueryEngine;
use passcore_shell::{Cipher, ShellError};
use passcore_watch::FileChange;
use tracing::{debug, info, warn};

use crate::cache::DecryptionCache;
use crate::error::ServiceError;
use crate::status::StatusBus;

pub struct Store {
    walker: StoreWalker,
    snapshot: RwLock<Arc<Index>>,
    rebuild_lock: Mutex<()>,
    cache: DecryptionCache,
    status: Arc<StatusBus>,
    cipher: Arc<dyn Cipher>,
    default_recipient: Option<String>,
}

impl Store {
    pub fn open(
        settings: &Settings,
        cipher: Arc<dyn Cipher>,
        status: Arc<StatusBus>,
    ) -> Result<Self, ServiceError> {
        let root = resolve_store_root(settings.store_dir.as_deref(), home_dir().as_deref())?;
        Ok(Self::with_root(
            root,
            settings.default_recipient.clone(),
            cipher,
            status,
        ))
    }

    pub fn with_root(
        root: PathBuf,
        default_recipient: Option<String>,
        cipher: Arc<dyn Cipher>,
        status: Arc<StatusBus>,
    ) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(Index::empty(root.clone()))),
            walker: StoreWalker::new(root),
            rebuild_lock: Mutex::new(()),
            cache: DecryptionCache::new(),
            status,
            cipher,
            default_recipient,
        }
    }

    pub fn root(&self) -> &Path {
        self.walker.root()
    }

    pub fn snapshot(&self) -> Arc<Index> {
        Arc::clone(&self.snapshot.read())
    }

    pub fn cache(&self) -> &DecryptionCache {
        &self.cache
    }

    pub fn status(&self) -> &StatusBus {
        &self.status
    }

    /// Re-walks the root, swaps in the new snapshot and prunes cache entries
    /// for paths that disappeared. A root that cannot be read keeps the
    /// previous snapshot.
    pub fn rebuild(&self) {
        let _serial = self.rebuild_lock.lock();

        let index = match self.walker.build_index() {
            Ok(index) => Arc::new(index),
            Err(err) => {
                warn!(error = %err, "index rebuild failed, keeping previous snapshot");
                self.status.publish(format!("Index refresh failed: {err}"));
                return;
            }
        };

        let live: HashSet<&Path> = index.entries().iter().map(|e| e.path.as_path()).collect();
        let pruned = self.cache.retain_paths(&live);
        *self.snapshot.write() = Arc::clone(&index);

        debug!(entries = index.len(), pruned, "index rebuilt");
        self.status
            .publish(format!("Indexed {} pass entries", index.len()));
    }

    pub fn handle_change(&self, change: &FileChange) {
        if is_entry_path(&change.path) && self.cache.invalidate(&change.path) {
            debug!(path = %change.path.display(), kind = ?change.kind, "cache entry invalidated");
        }
        self.rebuild();
    }

    pub fn query(&self, term: &str) -> Vec<Entry> {
        self.snapshot().search(term)
    }

    pub fn decrypt(&self, entry: &Entry) -> Result<String, ServiceError> {
        self.cache
            .get_or_decrypt(&entry.path, |path| self.cipher.decrypt(path))
            .map_err(|source| {
                warn!(path = %entry.path.display(), error = %source, "decrypt failed");
                ServiceError::Decrypt {
                    path: entry.path.clone(),
                    source,
                }
            })
    }

    pub fn recipients(&self) -> Result<Vec<String>, ShellError> {
        if let Some(recipient) = self.default_recipient.as_ref().filter(|r| !r.is_empty()) {
            return Ok(vec![recipient.clone()]);
        }

        let recipients = read_recipients(self.root()).unwrap_or_else(|err| {
            warn!(error = %err, "could not read recipients file");
            Vec::new()
        });
        if recipients.is_empty() {
            return Err(ShellError::NoRecipients);
        }
        Ok(recipients)
    }

    pub fn save(&self, entry: &Entry, content: &str) -> Result<(), ServiceError> {
        if let Err(err) = self.encrypt_to(&entry.path, content) {
            self.status.publish(format!("Failed to save: {err}"));
            return Err(err);
        }
        self.cache.put(entry.path.clone(), content.to_string());
        info!(entry = %entry.name, "entry saved");
        self.status.publish("Saved successfully");
        Ok(())
    }

    pub fn create(&self, name: &str, content: &str) -> Result<Entry, ServiceError> {
        let target = normalize_entry_name(name)
            .map(|name| self.root().join(format!("{name}{ENTRY_SUFFIX}")))
            .and_then(|target| self.encrypt_to(&target, content).map(|()| target));
        let target = match target {
            Ok(target) => target,
            Err(err) => {
                self.status.publish(format!("Failed to create: {err}"));
                return Err(err);
            }
        };

        self.cache.put(target.clone(), content.to_string());
        self.rebuild();

        let entry = self
            .snapshot()
            .find_by_path(&target)
            .cloned()
            .unwrap_or_else(|| Entry {
                name: display_name(self.root(), &target),
                path: target,
            });
        info!(entry = %entry.name, "entry created");
        self.status.publish("Created successfully");
        Ok(entry)
    }

    fn encrypt_to(&self, target: &Path, content: &str) -> Result<(), ServiceError> {
        let recipients = self.recipients().map_err(|source| ServiceError::Encrypt {
            path: target.to_path_buf(),
            source,
        })?;

        self.cipher
            .encrypt(content, &recipients, target)
            .map_err(|source| ServiceError::Encrypt {
                path: target.to_path_buf(),
                source,
            })
    }
}

impl QueryEngine for Store {
    fn search(&self, term: &str) -> Vec<Entry> {
        self.query(term)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("root", &self.root())
            .field("entries", &self.snapshot().len())
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

fn normalize_entry_name(raw: &str) -> Result<String, ServiceError> {
    let trimmed = raw.trim();
    let name = trimmed.strip_suffix(ENTRY_SUFFIX).unwrap_or(trimmed);
    let invalid = || ServiceError::InvalidName(raw.to_string());

    if name.is_empty() {
        return Err(invalid());
    }

    let stays_inside_root = Path::new(name)
        .components()
        .all(|component| matches!(component, Component::Normal(_)));
    if !stays_inside_root {
        return Err(invalid());
    }

    Ok(name.to_string())
}
