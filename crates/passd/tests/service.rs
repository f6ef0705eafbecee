use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use passcore_config::{ConfigError, Settings};
use passcore_shell::{Cipher, Clipboard, Launcher, ShellError};
use passd::{PassService, ServiceError};
use tempfile::TempDir;

#[derive(Default)]
struct PlainCipher {
    decrypts: AtomicUsize,
}

impl PlainCipher {
    fn decrypts(&self) -> usize {
        self.decrypts.load(Ordering::SeqCst)
    }
}

impl Cipher for PlainCipher {
    fn decrypt(&self, path: &Path) -> Result<String, ShellError> {
        self.decrypts.fetch_add(1, Ordering::SeqCst);
        fs::read_to_string(path).map_err(|source| ShellError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    fn encrypt(
        &self,
        plaintext: &str,
        recipients: &[String],
        target: &Path,
    ) -> Result<(), ShellError> {
        if recipients.is_empty() {
            return Err(ShellError::NoRecipients);
        }
        let io_err = |source| ShellError::Io {
            path: target.to_path_buf(),
            source,
        };
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(target, plaintext).map_err(io_err)
    }
}

#[derive(Default)]
struct RecordingClipboard {
    writes: Mutex<Vec<String>>,
}

impl RecordingClipboard {
    fn writes(&self) -> Vec<String> {
        self.writes.lock().clone()
    }
}

impl Clipboard for RecordingClipboard {
    fn set_text(&self, text: &str) -> Result<(), ShellError> {
        self.writes.lock().push(text.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct RecordingLauncher {
    opened: Mutex<Vec<String>>,
    broken: bool,
}

impl Launcher for RecordingLauncher {
    fn open(&self, target: &str) -> Result<(), ShellError> {
        if self.broken {
            return Err(ShellError::Spawn {
                program: "xdg-open".to_string(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }
        self.opened.lock().push(target.to_string());
        Ok(())
    }
}

struct Harness {
    _dir: TempDir,
    root: PathBuf,
    cipher: Arc<PlainCipher>,
    clipboard: Arc<RecordingClipboard>,
    service: PassService,
}

fn store_fixture() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let root = fs::canonicalize(dir.path()).unwrap();
    fs::create_dir_all(root.join("a")).unwrap();
    fs::write(root.join("a/b.gpg"), "pw-b\nlogin: bob\nurl: https://b.example\n").unwrap();
    fs::write(root.join("a/c.gpg"), "pw-c\n").unwrap();
    fs::write(root.join("notes.txt"), "not an entry").unwrap();
    (dir, root)
}

fn settings_for(root: &Path, clip_seconds: u64) -> Settings {
    Settings {
        store_dir: Some(root.to_path_buf()),
        default_recipient: Some("KEY".to_string()),
        clip_seconds,
    }
}

fn start(clip_seconds: u64) -> Harness {
    let (dir, root) = store_fixture();
    let cipher = Arc::new(PlainCipher::default());
    let clipboard = Arc::new(RecordingClipboard::default());
    let service = PassService::start(
        settings_for(&root, clip_seconds),
        cipher.clone(),
        clipboard.clone(),
    )
    .unwrap();
    Harness {
        _dir: dir,
        root,
        cipher,
        clipboard,
        service,
    }
}

#[tokio::test(start_paused = true)]
async fn copy_then_countdown_clears_clipboard() {
    let h = start(1);
    assert_eq!(
        h.service.latest_status().as_deref(),
        Some("Indexed 2 pass entries")
    );

    let hits = h.service.query("b");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].name, "a/b");
    assert_eq!(hits[0].path, h.root.join("a/b.gpg"));

    h.service.copy_password(&hits[0]).unwrap();
    assert_eq!(h.clipboard.writes(), vec!["pw-b"]);
    assert_eq!(h.service.latest_status().as_deref(), Some("Copied to clipboard"));
    let state = h.service.countdown_state();
    assert!(state.active);
    assert_eq!(state.fraction, 1.0);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(h.clipboard.writes(), vec!["pw-b", ""]);
    assert_eq!(h.service.latest_status().as_deref(), Some("Clipboard cleared"));
    assert!(!h.service.countdown_state().active);

    h.service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn copy_field_and_missing_field() {
    let h = start(60);
    let entry = h.service.query("a/b").remove(0);

    h.service.copy_field(&entry, &["URL"]).unwrap();
    assert_eq!(h.clipboard.writes(), vec!["https://b.example"]);

    let err = h.service.copy_field(&entry, &["otp"]).unwrap_err();
    assert!(matches!(err, ServiceError::FieldNotFound(keys) if keys == ["otp"]));
    assert_eq!(h.service.latest_status().as_deref(), Some("Field not found: otp"));
    assert_eq!(h.cipher.decrypts(), 1);

    h.service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn login_and_email_shortcuts_use_their_key_lists() {
    let h = start(60);
    let entry = h.service.query("a/b").remove(0);

    h.service.copy_login(&entry).unwrap();
    assert_eq!(h.clipboard.writes(), vec!["bob"]);

    let err = h.service.copy_email(&entry).unwrap_err();
    assert!(matches!(err, ServiceError::FieldNotFound(keys) if keys == ["email", "mail", "e-mail"]));
    assert_eq!(
        h.service.latest_status().as_deref(),
        Some("Field not found: email, mail, e-mail")
    );
    assert_eq!(h.clipboard.writes(), vec!["bob"]);

    h.service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn open_url_hands_the_field_to_the_launcher() {
    let h = start(60);
    let launcher = RecordingLauncher::default();

    let with_url = h.service.query("a/b").remove(0);
    let url = h.service.open_url(&with_url, &launcher).unwrap();
    assert_eq!(url, "https://b.example");
    assert_eq!(*launcher.opened.lock(), vec!["https://b.example"]);
    assert_eq!(
        h.service.latest_status().as_deref(),
        Some("Opening https://b.example")
    );

    let without_url = h.service.query("a/c").remove(0);
    let err = h.service.open_url(&without_url, &launcher).unwrap_err();
    assert!(matches!(err, ServiceError::FieldNotFound(_)));
    assert_eq!(h.service.latest_status().as_deref(), Some("No URL found"));
    assert_eq!(launcher.opened.lock().len(), 1);
    assert!(h.clipboard.writes().is_empty());

    h.service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failed_launch_is_reported() {
    let h = start(60);
    let launcher = RecordingLauncher {
        broken: true,
        ..Default::default()
    };
    let entry = h.service.query("a/b").remove(0);

    let err = h.service.open_url(&entry, &launcher).unwrap_err();
    assert!(matches!(err, ServiceError::Shell(ShellError::Spawn { .. })));
    let status = h.service.latest_status().unwrap();
    assert!(status.starts_with("Failed to open URL: "), "{status}");

    h.service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn edited_entry_reads_back_new_content() {
    let h = start(60);
    let entry = h.service.query("a/c").remove(0);
    assert_eq!(h.service.decrypt(&entry).unwrap(), "pw-c\n");

    h.service
        .save(&entry, "pw-c2\nlogin: carol\n")
        .unwrap();
    assert_eq!(h.service.latest_status().as_deref(), Some("Saved successfully"));
    assert_eq!(
        fs::read_to_string(h.root.join("a/c.gpg")).unwrap(),
        "pw-c2\nlogin: carol\n"
    );

    let card = h.service.passcard(&entry).unwrap();
    assert_eq!(card.password(), "pw-c2");
    h.service.copy_login(&entry).unwrap();
    assert_eq!(h.clipboard.writes(), vec!["carol"]);

    h.service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn debounced_search_publishes_latest_term() {
    let h = start(60);
    let mut results = h.service.query_results();

    h.service.submit_query("a");
    h.service.submit_query("a c");
    results.changed().await.unwrap();

    let latest = results.borrow().clone();
    assert_eq!(latest.term, "a c");
    let names: Vec<&str> = latest.entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["a/c"]);

    h.service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn created_entry_is_immediately_searchable() {
    let h = start(60);

    let entry = h.service.create("web/site", "generated\nuser: me\n").unwrap();
    assert_eq!(entry.name, "web/site");
    assert!(h.root.join("web/site.gpg").is_file());
    assert_eq!(h.service.query("site"), vec![entry.clone()]);

    let card = h.service.passcard(&entry).unwrap();
    assert_eq!(card.password(), "generated");
    assert_eq!(card.field(&["user"]), Some("me"));

    h.service.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn external_edit_invalidates_cached_plaintext() {
    let h = start(60);
    if !h.service.is_watching() {
        eprintln!("skipping: filesystem watching unavailable");
        return;
    }

    let entry = h.service.query("a/b").remove(0);
    assert!(h.service.decrypt(&entry).unwrap().starts_with("pw-b"));
    assert!(h.service.store().cache().contains(&entry.path));

    fs::write(&entry.path, "rotated\n").unwrap();

    let mut waited = Duration::ZERO;
    while h.service.store().cache().contains(&entry.path) {
        assert!(waited < Duration::from_secs(10), "watcher never invalidated");
        tokio::time::sleep(Duration::from_millis(25)).await;
        waited += Duration::from_millis(25);
    }
    // Let the remaining events of the write drain.
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(h.service.decrypt(&entry).unwrap(), "rotated\n");
    assert_eq!(h.cipher.decrypts(), 2);

    h.service.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn new_file_on_disk_shows_up_in_queries() {
    let h = start(60);
    if !h.service.is_watching() {
        eprintln!("skipping: filesystem watching unavailable");
        return;
    }

    fs::create_dir_all(h.root.join("mail")).unwrap();
    fs::write(h.root.join("mail/work.gpg"), "pw\n").unwrap();

    let mut waited = Duration::ZERO;
    while h.service.query("mail").is_empty() {
        assert!(waited < Duration::from_secs(10), "new entry never indexed");
        tokio::time::sleep(Duration::from_millis(25)).await;
        waited += Duration::from_millis(25);
    }
    assert_eq!(h.service.query("mail")[0].name, "mail/work");

    h.service.shutdown().await;
}

#[test]
fn start_requires_a_runtime() {
    let (_dir, root) = store_fixture();
    let err = PassService::start(
        settings_for(&root, 60),
        Arc::new(PlainCipher::default()),
        Arc::new(RecordingClipboard::default()),
    )
    .unwrap_err();
    assert!(matches!(err, ServiceError::NoRuntime));
}

#[tokio::test]
async fn zero_clip_time_is_rejected() {
    let (_dir, root) = store_fixture();
    let err = PassService::start(
        settings_for(&root, 0),
        Arc::new(PlainCipher::default()),
        Arc::new(RecordingClipboard::default()),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Config(ConfigError::InvalidValue { .. })
    ));
}
