mod cache;
mod countdown;
mod error;
pub mod passcard;
mod status;
mod store;
mod worker;

use std::sync::Arc;

use passcore_config::Settings;
use passcore_index::Entry;
use passcore_shell::{Cipher, Clipboard, Launcher};
use passcore_watch::ChangeNotifier;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, warn};

pub use cache::DecryptionCache;
pub use countdown::{ClipboardCountdown, CountdownState, TICK_INTERVAL};
pub use error::ServiceError;
pub use passcard::{generate_password, Field, Passcard};
pub use status::StatusBus;
pub use store::Store;
pub use worker::{QueryResults, QueryWorker, DEBOUNCE_DELAY};

pub const LOGIN_KEYS: &[&str] = &["login", "user", "username"];
pub const EMAIL_KEYS: &[&str] = &["email", "mail", "e-mail"];
pub const URL_KEYS: &[&str] = &["url", "link"];

pub struct PassService {
    settings: Settings,
    store: Arc<Store>,
    worker: QueryWorker,
    countdown: ClipboardCountdown,
    notifier: Option<ChangeNotifier>,
}

impl PassService {
    pub fn start(
        settings: Settings,
        cipher: Arc<dyn Cipher>,
        clipboard: Arc<dyn Clipboard>,
    ) -> Result<Self, ServiceError> {
        Self::start_with_status(settings, cipher, clipboard, Arc::new(StatusBus::new()))
    }

    pub fn start_with_status(
        settings: Settings,
        cipher: Arc<dyn Cipher>,
        clipboard: Arc<dyn Clipboard>,
        status: Arc<StatusBus>,
    ) -> Result<Self, ServiceError> {
        let handle = Handle::try_current().map_err(|_| ServiceError::NoRuntime)?;
        settings.validate()?;

        let store = Arc::new(Store::open(&settings, cipher, Arc::clone(&status))?);
        store.rebuild();

        let notifier = watch_store(&store);
        let worker = QueryWorker::spawn(Arc::clone(&store), &handle, DEBOUNCE_DELAY);
        let countdown =
            ClipboardCountdown::new(clipboard, status, settings.clip_duration(), handle);

        Ok(Self {
            settings,
            store,
            worker,
            countdown,
            notifier,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.store.status().subscribe(callback);
    }

    pub fn latest_status(&self) -> Option<String> {
        self.store.status().latest()
    }

    pub fn is_watching(&self) -> bool {
        self.notifier.is_some()
    }

    pub fn rebuild(&self) {
        self.store.rebuild();
    }

    pub fn query(&self, term: &str) -> Vec<Entry> {
        self.store.query(term)
    }

    pub fn submit_query(&self, term: impl Into<String>) {
        self.worker.submit(term);
    }

    pub fn query_results(&self) -> watch::Receiver<QueryResults> {
        self.worker.results()
    }

    pub fn decrypt(&self, entry: &Entry) -> Result<String, ServiceError> {
        self.store.decrypt(entry)
    }

    pub fn passcard(&self, entry: &Entry) -> Result<Passcard, ServiceError> {
        self.decrypt(entry).map(|plaintext| Passcard::parse(&plaintext))
    }

    pub fn copy_password(&self, entry: &Entry) -> Result<(), ServiceError> {
        let card = self.passcard(entry)?;
        self.copy_text(&entry.name, card.password())
    }

    pub fn copy_field(&self, entry: &Entry, keys: &[&str]) -> Result<(), ServiceError> {
        let card = self.passcard(entry)?;
        match card.field(keys) {
            Some(value) => self.copy_text(&entry.name, value),
            None => {
                self.store
                    .status()
                    .publish(format!("Field not found: {}", keys.join(", ")));
                Err(field_not_found(keys))
            }
        }
    }

    pub fn copy_login(&self, entry: &Entry) -> Result<(), ServiceError> {
        self.copy_field(entry, LOGIN_KEYS)
    }

    pub fn copy_email(&self, entry: &Entry) -> Result<(), ServiceError> {
        self.copy_field(entry, EMAIL_KEYS)
    }

    pub fn open_url(&self, entry: &Entry, launcher: &dyn Launcher) -> Result<String, ServiceError> {
        let card = self.passcard(entry)?;
        let Some(url) = card.field(URL_KEYS) else {
            self.store.status().publish("No URL found");
            return Err(field_not_found(URL_KEYS));
        };

        self.store.status().publish(format!("Opening {url}"));
        match launcher.open(url) {
            Ok(()) => Ok(url.to_string()),
            Err(err) => {
                warn!(entry = %entry.name, error = %err, "url launch failed");
                self.store
                    .status()
                    .publish(format!("Failed to open URL: {err}"));
                Err(err.into())
            }
        }
    }

    pub fn copy_text(&self, label: &str, value: &str) -> Result<(), ServiceError> {
        match self.countdown.copy(value, label) {
            Ok(()) => {
                self.store.status().publish("Copied to clipboard");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "clipboard write failed");
                self.store.status().publish(format!("Failed to copy: {err}"));
                Err(err.into())
            }
        }
    }

    pub fn countdown_state(&self) -> CountdownState {
        self.countdown.state()
    }

    pub fn save(&self, entry: &Entry, content: &str) -> Result<(), ServiceError> {
        self.store.save(entry, content)
    }

    pub fn create(&self, name: &str, content: &str) -> Result<Entry, ServiceError> {
        self.store.create(name, content)
    }

    /// Stops the watcher, the countdown and the query worker. The clipboard
    /// is left as it is.
    pub async fn shutdown(mut self) {
        drop(self.notifier.take());
        self.countdown.cancel();
        self.worker.shutdown().await;
        debug!("pass service stopped");
    }
}

impl std::fmt::Debug for PassService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassService")
            .field("store", &self.store)
            .field("watching", &self.is_watching())
            .field("countdown", &self.countdown)
            .finish_non_exhaustive()
    }
}

fn field_not_found(keys: &[&str]) -> ServiceError {
    ServiceError::FieldNotFound(keys.iter().map(|key| key.to_string()).collect())
}

fn watch_store(store: &Arc<Store>) -> Option<ChangeNotifier> {
    let target = Arc::clone(store);
    match ChangeNotifier::spawn(store.root(), move |change| target.handle_change(&change)) {
        Ok(notifier) => Some(notifier),
        Err(err) => {
            warn!(root = %store.root().display(), error = %err, "store watching disabled");
            store
                .status()
                .publish(format!("Failed to watch password store: {err}"));
            None
        }
    }
}
