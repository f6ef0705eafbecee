use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use parking_lot::Mutex;
use tracing::{debug, error};

#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    #[error("no GPG key configured")]
    NoRecipients,
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("decrypted content is not valid UTF-8")]
    Utf8,
    #[error("clipboard unavailable: {0}")]
    Clipboard(String),
}

pub trait Cipher: Send + Sync {
    fn decrypt(&self, path: &Path) -> Result<String, ShellError>;

    fn encrypt(
        &self,
        plaintext: &str,
        recipients: &[String],
        target: &Path,
    ) -> Result<(), ShellError>;
}

pub trait Clipboard: Send + Sync {
    fn set_text(&self, text: &str) -> Result<(), ShellError>;

    fn clear(&self) -> Result<(), ShellError> {
        self.set_text("")
    }
}

#[derive(Debug, Clone)]
pub struct GpgCli {
    program: OsString,
    base_args: Vec<OsString>,
}

impl Default for GpgCli {
    fn default() -> Self {
        Self {
            program: OsString::from("gpg"),
            base_args: Vec::new(),
        }
    }
}

impl GpgCli {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            base_args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.base_args.extend(args.into_iter().map(Into::into));
        self
    }

    fn program_label(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.base_args);
        cmd
    }

    fn encrypt_args(recipients: &[String], target: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["--encrypt", "--batch", "--yes", "--output"]
            .into_iter()
            .map(OsString::from)
            .collect();
        args.push(target.as_os_str().to_os_string());
        args.push(OsString::from("--armor"));
        for recipient in recipients {
            args.push(OsString::from("--recipient"));
            args.push(OsString::from(recipient));
        }
        args
    }
}

impl Cipher for GpgCli {
    fn decrypt(&self, path: &Path) -> Result<String, ShellError> {
        let output = self
            .command()
            .args(["--decrypt", "--quiet", "--batch"])
            .arg(path)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .map_err(|source| ShellError::Spawn {
                program: self.program_label(),
                source,
            })?;

        if !output.status.success() {
            debug!(path = %path.display(), status = %output.status, "decrypt failed");
            return Err(ShellError::CommandFailed {
                program: self.program_label(),
                status: output.status,
                stderr: String::new(),
            });
        }

        String::from_utf8(output.stdout).map_err(|_| ShellError::Utf8)
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

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ShellError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut child = self
            .command()
            .args(Self::encrypt_args(recipients, target))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ShellError::Spawn {
                program: self.program_label(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(plaintext.as_bytes())
                .map_err(|source| ShellError::Io {
                    path: target.to_path_buf(),
                    source,
                })?;
        }

        let output = child.wait_with_output().map_err(|source| ShellError::Spawn {
            program: self.program_label(),
            source,
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!(target = %target.display(), status = %output.status, "encrypt failed");
            return Err(ShellError::CommandFailed {
                program: self.program_label(),
                status: output.status,
                stderr,
            });
        }

        Ok(())
    }
}

/// On X11 and Wayland the copying process serves the selection, so the handle
/// is opened on first use and kept for the lifetime of this value.
#[derive(Default)]
pub struct SystemClipboard {
    handle: Mutex<Option<arboard::Clipboard>>,
}

impl SystemClipboard {
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for SystemClipboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemClipboard")
            .field("open", &self.handle.lock().is_some())
            .finish()
    }
}

impl Clipboard for SystemClipboard {
    fn set_text(&self, text: &str) -> Result<(), ShellError> {
        let mut handle = self.handle.lock();
        if handle.is_none() {
            let opened =
                arboard::Clipboard::new().map_err(|err| ShellError::Clipboard(err.to_string()))?;
            debug!("system clipboard opened");
            *handle = Some(opened);
        }

        match handle.as_mut() {
            Some(clipboard) => write_secret(clipboard, text),
            None => Err(ShellError::Clipboard("clipboard handle unavailable".into())),
        }
    }
}

#[cfg(all(
    unix,
    not(any(target_os = "macos", target_os = "android", target_os = "emscripten"))
))]
fn write_secret(clipboard: &mut arboard::Clipboard, text: &str) -> Result<(), ShellError> {
    use arboard::SetExtLinux;

    clipboard
        .set()
        .exclude_from_history()
        .text(text.to_string())
        .map_err(|err| ShellError::Clipboard(err.to_string()))
}

#[cfg(not(all(
    unix,
    not(any(target_os = "macos", target_os = "android", target_os = "emscripten"))
)))]
fn write_secret(clipboard: &mut arboard::Clipboard, text: &str) -> Result<(), ShellError> {
    clipboard
        .set_text(text.to_string())
        .map_err(|err| ShellError::Clipboard(err.to_string()))
}

pub trait Launcher: Send + Sync {
    fn open(&self, target: &str) -> Result<(), ShellError>;
}

#[derive(Debug, Clone)]
pub struct SystemLauncher {
    program: OsString,
}

impl Default for SystemLauncher {
    fn default() -> Self {
        let program = if cfg!(target_os = "macos") {
            "open"
        } else {
            "xdg-open"
        };
        Self {
            program: OsString::from(program),
        }
    }
}

impl SystemLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Launcher for SystemLauncher {
    fn open(&self, target: &str) -> Result<(), ShellError> {
        let mut child = Command::new(&self.program)
            .arg(target)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| ShellError::Spawn {
                program: self.program.to_string_lossy().into_owned(),
                source,
            })?;

        let program = self.program.to_string_lossy().into_owned();
        std::thread::spawn(move || match child.wait() {
            Ok(status) if !status.success() => {
                debug!(program = %program, status = %status, "opener exited");
            }
            Ok(_) => {}
            Err(err) => debug!(program = %program, error = %err, "opener wait failed"),
        });
        Ok(())
    }
}
