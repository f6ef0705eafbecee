use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use passcore_shell::{Clipboard, ShellError};
use tokio::runtime::Handle;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio::task;
use tokio::time::{self, Instant};
use tracing::{debug, warn};

use crate::status::StatusBus;

pub const TICK_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CountdownState {
    pub active: bool,
    pub remaining: Duration,
    pub fraction: f32,
}

struct RunState {
    state: CountdownState,
    // Identifies the one run allowed to touch the clipboard.
    run_id: u64,
    cancel: Option<oneshot::Sender<()>>,
}

struct Shared {
    clipboard: Arc<dyn Clipboard>,
    status: Arc<StatusBus>,
    total: Duration,
    run: Mutex<RunState>,
    // Orders clipboard writes against the expiry clear. Taken before `run`.
    io: Mutex<()>,
}

/// Clears the clipboard a fixed time after the last copy.
pub struct ClipboardCountdown {
    shared: Arc<Shared>,
    handle: Handle,
}

impl ClipboardCountdown {
    pub fn new(
        clipboard: Arc<dyn Clipboard>,
        status: Arc<StatusBus>,
        total: Duration,
        handle: Handle,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                clipboard,
                status,
                total,
                run: Mutex::new(RunState {
                    state: CountdownState::default(),
                    run_id: 0,
                    cancel: None,
                }),
                io: Mutex::new(()),
            }),
            handle,
        }
    }

    pub fn total(&self) -> Duration {
        self.shared.total
    }

    pub fn copy(&self, text: &str, label: &str) -> Result<(), ShellError> {
        let _io = self.shared.io.lock();
        self.shared.clipboard.set_text(text)?;
        self.arm(label);
        Ok(())
    }

    pub fn arm(&self, label: &str) {
        let mut run = self.shared.run.lock();
        self.arm_locked(&mut run, label);
    }

    pub fn cancel(&self) -> bool {
        let mut run = self.shared.run.lock();
        let was_active = run.state.active;
        if let Some(cancel) = run.cancel.take() {
            let _ = cancel.send(());
        }
        run.run_id += 1;
        run.state = CountdownState::default();
        if was_active {
            debug!("clipboard countdown cancelled");
        }
        was_active
    }

    pub fn state(&self) -> CountdownState {
        self.shared.run.lock().state
    }

    pub fn is_active(&self) -> bool {
        self.state().active
    }

    fn arm_locked(&self, run: &mut RunState, label: &str) {
        if let Some(previous) = run.cancel.take() {
            let _ = previous.send(());
            debug!("clipboard countdown restarted");
        }

        run.run_id += 1;
        run.state = CountdownState {
            active: true,
            remaining: self.shared.total,
            fraction: 1.0,
        };
        let (cancel, cancelled) = oneshot::channel();
        run.cancel = Some(cancel);

        debug!(
            label,
            seconds = self.shared.total.as_secs(),
            "clipboard countdown armed"
        );
        self.handle.spawn(run_countdown(
            Arc::clone(&self.shared),
            run.run_id,
            label.to_string(),
            cancelled,
        ));
    }
}

impl Drop for ClipboardCountdown {
    fn drop(&mut self) {
        if let Some(cancel) = self.shared.run.lock().cancel.take() {
            let _ = cancel.send(());
        }
    }
}

impl std::fmt::Debug for ClipboardCountdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClipboardCountdown")
            .field("total", &self.shared.total)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn fraction(remaining: Duration, total: Duration) -> f32 {
    if total.is_zero() {
        return 0.0;
    }
    (remaining.as_secs_f32() / total.as_secs_f32()).clamp(0.0, 1.0)
}

async fn run_countdown(
    shared: Arc<Shared>,
    run_id: u64,
    label: String,
    mut cancelled: oneshot::Receiver<()>,
) {
    let total = shared.total;
    let mut remaining = total;
    let mut ticker = time::interval_at(Instant::now() + TICK_INTERVAL, TICK_INTERVAL);

    loop {
        ticker.tick().await;
        if !matches!(cancelled.try_recv(), Err(TryRecvError::Empty)) {
            return;
        }

        {
            let mut run = shared.run.lock();
            if run.run_id != run_id {
                return;
            }
            run.state = CountdownState {
                active: true,
                remaining,
                fraction: fraction(remaining, total),
            };
        }
        shared.status.publish(format!(
            "Will clear {label} in {:.0} seconds",
            remaining.as_secs_f64()
        ));

        remaining = remaining.saturating_sub(TICK_INTERVAL);
        if !remaining.is_zero() {
            continue;
        }

        let expiring = Arc::clone(&shared);
        let cleared = match task::spawn_blocking(move || clear_if_current(&expiring, run_id)).await
        {
            Ok(Some(cleared)) => cleared,
            Ok(None) => return,
            Err(err) => {
                warn!(error = %err, "clipboard clear task failed");
                return;
            }
        };
        match cleared {
            Ok(()) => {
                debug!(label = %label, "clipboard cleared");
                shared.status.publish("Clipboard cleared");
            }
            Err(err) => {
                warn!(error = %err, "failed to clear clipboard");
                shared
                    .status
                    .publish(format!("Failed to clear clipboard: {err}"));
            }
        }
        return;
    }
}

/// `None` when a newer copy or a cancel superseded `run_id`.
fn clear_if_current(shared: &Shared, run_id: u64) -> Option<Result<(), ShellError>> {
    let _io = shared.io.lock();
    {
        let mut run = shared.run.lock();
        if run.run_id != run_id {
            return None;
        }
        run.state = CountdownState::default();
        run.cancel = None;
    }
    Some(shared.clipboard.clear())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;

    #[derive(Default)]
    struct RecordingClipboard {
        writes: Mutex<Vec<String>>,
        broken: bool,
    }

    impl Clipboard for RecordingClipboard {
        fn set_text(&self, text: &str) -> Result<(), ShellError> {
            if self.broken {
                return Err(ShellError::Clipboard("no display".into()));
            }
            self.writes.lock().push(text.to_string());
            Ok(())
        }
    }

    fn countdown(
        clipboard: &Arc<RecordingClipboard>,
        total: Duration,
    ) -> (ClipboardCountdown, Arc<StatusBus>) {
        let status = Arc::new(StatusBus::new());
        let countdown = ClipboardCountdown::new(
            clipboard.clone(),
            Arc::clone(&status),
            total,
            Handle::current(),
        );
        (countdown, status)
    }

    fn writes(clipboard: &RecordingClipboard) -> Vec<String> {
        clipboard.writes.lock().clone()
    }

    #[tokio::test(start_paused = true)]
    async fn copy_arms_at_full_fraction() {
        let clipboard = Arc::new(RecordingClipboard::default());
        let (countdown, _) = countdown(&clipboard, Duration::from_secs(1));

        countdown.copy("pw", "a/b").unwrap();

        let state = countdown.state();
        assert!(state.active);
        assert_eq!(state.remaining, Duration::from_secs(1));
        assert_eq!(state.fraction, 1.0);
        assert_eq!(writes(&clipboard), vec!["pw"]);
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_report_progress_then_clear() {
        let clipboard = Arc::new(RecordingClipboard::default());
        let (countdown, status) = countdown(&clipboard, Duration::from_secs(1));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        status.subscribe(move |msg| sink.lock().push(msg.to_string()));

        countdown.copy("pw", "a/b").unwrap();

        time::sleep(Duration::from_millis(500)).await;
        let state = countdown.state();
        assert!(state.active);
        assert_eq!(state.remaining, Duration::from_millis(800));
        assert!((state.fraction - 0.8).abs() < 1e-6);

        time::sleep(Duration::from_millis(600)).await;
        let seen = seen.lock().clone();
        assert_eq!(seen.len(), 6);
        assert_eq!(seen[0], "Will clear a/b in 1 seconds");
        assert_eq!(seen[4], "Will clear a/b in 0 seconds");
        assert_eq!(seen[5], "Clipboard cleared");
        assert_eq!(writes(&clipboard), vec!["pw", ""]);
        assert_eq!(countdown.state(), CountdownState::default());
    }

    #[tokio::test(start_paused = true)]
    async fn second_copy_restarts_instead_of_stacking() {
        let clipboard = Arc::new(RecordingClipboard::default());
        let (countdown, status) = countdown(&clipboard, Duration::from_secs(1));

        countdown.copy("one", "a/b").unwrap();
        time::sleep(Duration::from_millis(500)).await;
        countdown.copy("two", "a/c").unwrap();
        assert_eq!(countdown.state().fraction, 1.0);

        // The first run would have expired here.
        time::sleep(Duration::from_millis(700)).await;
        assert_eq!(writes(&clipboard), vec!["one", "two"]);
        assert!(countdown.is_active());
        assert!(status.latest().unwrap().starts_with("Will clear a/c in"));

        time::sleep(Duration::from_millis(500)).await;
        assert_eq!(writes(&clipboard), vec!["one", "two", ""]);
        assert!(!countdown.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_without_clearing() {
        let clipboard = Arc::new(RecordingClipboard::default());
        let (countdown, _) = countdown(&clipboard, Duration::from_secs(1));

        countdown.copy("pw", "a/b").unwrap();
        assert!(countdown.cancel());
        assert!(!countdown.cancel());

        time::sleep(Duration::from_secs(2)).await;
        assert_eq!(writes(&clipboard), vec!["pw"]);
        assert!(!countdown.is_active());
    }

    struct GatedClipboard {
        entered: Mutex<Option<mpsc::Sender<()>>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl Clipboard for GatedClipboard {
        fn set_text(&self, _text: &str) -> Result<(), ShellError> {
            if let Some(entered) = self.entered.lock().take() {
                entered.send(()).unwrap();
                self.release.lock().recv().unwrap();
            }
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn state_stays_readable_during_a_slow_clipboard_write() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let clipboard = Arc::new(GatedClipboard {
            entered: Mutex::new(Some(entered_tx)),
            release: Mutex::new(release_rx),
        });
        let countdown = Arc::new(ClipboardCountdown::new(
            clipboard,
            Arc::new(StatusBus::new()),
            Duration::from_secs(60),
            Handle::current(),
        ));

        let copier = {
            let countdown = Arc::clone(&countdown);
            thread::spawn(move || countdown.copy("pw", "a/b"))
        };
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let (state_tx, state_rx) = mpsc::channel();
        let reader = Arc::clone(&countdown);
        thread::spawn(move || {
            let _ = state_tx.send(reader.state());
        });
        let state = state_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("state() waited for the clipboard write");
        assert!(!state.active);

        release_tx.send(()).unwrap();
        copier.join().unwrap().unwrap();
        assert!(countdown.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_copy_does_not_arm() {
        let clipboard = Arc::new(RecordingClipboard {
            broken: true,
            ..Default::default()
        });
        let (countdown, _) = countdown(&clipboard, Duration::from_secs(1));

        let err = countdown.copy("pw", "a/b").unwrap_err();
        assert!(matches!(err, ShellError::Clipboard(_)));
        assert!(!countdown.is_active());
    }
}
