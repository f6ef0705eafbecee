use std::sync::Arc;
use std::time::Duration;

use passcore_index::Entry;
use passcore_query::QueryEngine;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::debug;

pub const DEBOUNCE_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResults {
    pub term: String,
    pub entries: Arc<Vec<Entry>>,
}

pub struct QueryWorker {
    requests: watch::Sender<Option<String>>,
    results: watch::Receiver<QueryResults>,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl QueryWorker {
    pub fn spawn<Q>(engine: Arc<Q>, handle: &Handle, delay: Duration) -> Self
    where
        Q: QueryEngine + Send + Sync + 'static,
    {
        let (requests, request_rx) = watch::channel(None);
        let (result_tx, results) = watch::channel(QueryResults::default());
        let (stop, stop_rx) = oneshot::channel();

        let task = handle.spawn(run_worker(engine, request_rx, result_tx, stop_rx, delay));
        debug!(delay_ms = delay.as_millis() as u64, "query worker started");

        Self {
            requests,
            results,
            stop: Some(stop),
            task: Some(task),
        }
    }

    /// Never blocks; supersedes any term that has not run yet.
    pub fn submit(&self, term: impl Into<String>) {
        self.requests.send_replace(Some(term.into()));
    }

    pub fn results(&self) -> watch::Receiver<QueryResults> {
        self.results.clone()
    }

    pub fn latest(&self) -> QueryResults {
        self.results.borrow().clone()
    }

    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for QueryWorker {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

impl std::fmt::Debug for QueryWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryWorker")
            .field("running", &self.stop.is_some())
            .finish_non_exhaustive()
    }
}

async fn run_worker<Q>(
    engine: Arc<Q>,
    mut requests: watch::Receiver<Option<String>>,
    results: watch::Sender<QueryResults>,
    mut stop: oneshot::Receiver<()>,
    delay: Duration,
) where
    Q: QueryEngine + Send + Sync + 'static,
{
    let deadline = time::sleep(delay);
    tokio::pin!(deadline);
    let mut pending: Option<String> = None;

    loop {
        tokio::select! {
            biased;
            _ = &mut stop => break,
            changed = requests.changed() => {
                if changed.is_err() {
                    break;
                }
                pending = requests.borrow_and_update().clone();
                deadline.as_mut().reset(Instant::now() + delay);
            }
            () = &mut deadline, if pending.is_some() => {
                if let Some(term) = pending.take() {
                    let entries = engine.search(&term);
                    debug!(term_len = term.len(), hits = entries.len(), "debounced query ran");
                    results.send_replace(QueryResults {
                        term,
                        entries: Arc::new(entries),
                    });
                }
            }
        }
    }

    debug!("query worker stopped");
}
