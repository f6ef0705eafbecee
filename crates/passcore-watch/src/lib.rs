use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};

use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Modified,
    Renamed,
    Deleted,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("failed to watch {path}: {source}")]
    Setup {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
    #[error("failed to start watch thread: {0}")]
    Thread(#[source] std::io::Error),
}

pub trait WatchSource {
    fn next_change(&mut self) -> Option<FileChange>;
}

impl ChangeKind {
    /// Read-only access is not a change and maps to `None`.
    pub fn from_event_kind(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Access(_) => None,
            EventKind::Create(_) => Some(Self::Created),
            EventKind::Modify(ModifyKind::Name(_)) => Some(Self::Renamed),
            EventKind::Modify(_) => Some(Self::Modified),
            EventKind::Remove(_) => Some(Self::Deleted),
            EventKind::Any | EventKind::Other => Some(Self::Other),
        }
    }
}

pub fn changes_from_event(event: Event) -> Vec<FileChange> {
    let Some(kind) = ChangeKind::from_event_kind(&event.kind) else {
        return Vec::new();
    };

    event
        .paths
        .into_iter()
        .map(|path| FileChange { path, kind })
        .collect()
}

struct EventSource {
    rx: Receiver<Event>,
    pending: VecDeque<FileChange>,
}

impl WatchSource for EventSource {
    fn next_change(&mut self) -> Option<FileChange> {
        loop {
            if let Some(change) = self.pending.pop_front() {
                return Some(change);
            }

            let event = self.rx.recv().ok()?;
            self.pending.extend(changes_from_event(event));
        }
    }
}

pub fn run_consumer<S, F>(mut source: S, mut handler: F)
where
    S: WatchSource,
    F: FnMut(FileChange),
{
    while let Some(change) = source.next_change() {
        handler(change);
    }
}

/// Dropping the notifier stops the watcher and joins the thread.
pub struct ChangeNotifier {
    root: PathBuf,
    watcher: Option<RecommendedWatcher>,
    worker: Option<JoinHandle<()>>,
}

impl ChangeNotifier {
    pub fn spawn<F>(root: &Path, handler: F) -> Result<Self, WatchError>
    where
        F: FnMut(FileChange) + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<Event>();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(err) => warn!(error = %err, "filesystem watch error"),
            },
            Config::default(),
        )
        .map_err(|source| WatchError::Setup {
            path: root.to_path_buf(),
            source,
        })?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|source| WatchError::Setup {
                path: root.to_path_buf(),
                source,
            })?;

        let source = EventSource {
            rx,
            pending: VecDeque::new(),
        };
        let worker = thread::Builder::new()
            .name("passcore-watch".to_string())
            .spawn(move || run_consumer(source, handler))
            .map_err(WatchError::Thread)?;

        debug!(root = %root.display(), "change notifier started");
        Ok(Self {
            root: root.to_path_buf(),
            watcher: Some(watcher),
            worker: Some(worker),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Drop for ChangeNotifier {
    fn drop(&mut self) {
        // The consumer exits once the watcher (and its sender) is gone.
        self.watcher.take();
        if let Some(worker) = self.worker.take() {
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
        debug!(root = %self.root.display(), "change notifier stopped");
    }
}
