use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

#[derive(Default)]
struct CacheState {
    plaintexts: HashMap<PathBuf, String>,
    // Bumped by every write so an in-flight decrypt can tell it went stale.
    generation: u64,
}

#[derive(Default)]
pub struct DecryptionCache {
    state: RwLock<CacheState>,
    in_flight: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

// Plaintext never goes through `Debug`.
impl std::fmt::Debug for DecryptionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptionCache")
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

impl DecryptionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &Path) -> Option<String> {
        self.state.read().plaintexts.get(path).cloned()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.state.read().plaintexts.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.state.read().plaintexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Failures are never cached.
    pub fn get_or_decrypt<F, E>(&self, path: &Path, decrypt: F) -> Result<String, E>
    where
        F: FnOnce(&Path) -> Result<String, E>,
    {
        if let Some(hit) = self.get(path) {
            return Ok(hit);
        }

        let gate = {
            let mut in_flight = self.in_flight.lock();
            Arc::clone(in_flight.entry(path.to_path_buf()).or_default())
        };

        let result = {
            let _turn = gate.lock();
            match self.get(path) {
                Some(hit) => Ok(hit),
                None => self.decrypt_and_store(path, decrypt),
            }
        };

        // Clones are only taken under `in_flight`, so the count is exact here.
        let mut in_flight = self.in_flight.lock();
        let last_waiter = Arc::strong_count(&gate) == 2
            && in_flight
                .get(path)
                .is_some_and(|current| Arc::ptr_eq(current, &gate));
        if last_waiter {
            in_flight.remove(path);
        }
        drop(gate);
        drop(in_flight);

        result
    }

    fn decrypt_and_store<F, E>(&self, path: &Path, decrypt: F) -> Result<String, E>
    where
        F: FnOnce(&Path) -> Result<String, E>,
    {
        let started_at = self.state.read().generation;
        let plaintext = decrypt(path)?;

        let mut state = self.state.write();
        if state.generation == started_at {
            state
                .plaintexts
                .insert(path.to_path_buf(), plaintext.clone());
        }
        Ok(plaintext)
    }

    pub fn put(&self, path: PathBuf, plaintext: String) {
        let mut state = self.state.write();
        state.generation += 1;
        state.plaintexts.insert(path, plaintext);
    }

    pub fn invalidate(&self, path: &Path) -> bool {
        let mut state = self.state.write();
        state.generation += 1;
        state.plaintexts.remove(path).is_some()
    }

    pub fn retain_paths(&self, live: &HashSet<&Path>) -> usize {
        let mut state = self.state.write();
        state.generation += 1;
        let before = state.plaintexts.len();
        state
            .plaintexts
            .retain(|path, _| live.contains(path.as_path()));
        before - state.plaintexts.len()
    }

    pub fn clear(&self) {
        let mut state = self.state.write();
        state.generation += 1;
        state.plaintexts.clear();
    }
}
