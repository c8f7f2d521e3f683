//! Direct PTY host: spawns a child process under a pseudo-terminal and owns it.
//!
//! Grounded on the channel-based reader-task architecture of the teacher's
//! `hostagent::pty::PtySession`, generalized to implement [`Host`] and to report
//! exit status instead of only logging it.

use crate::error::{CoreError, Result};
use crate::terminal::traits::{ExitStatus, Host, TerminalConfig};
use async_trait::async_trait;
use bytes::Bytes;
use portable_pty::{native_pty_system, CommandBuilder, PtySize};
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};

/// Bound on the Host→Fanout channel. Generous because the Fanout's own reader task
/// drains it promptly; this is not where backpressure against clients is applied.
const HOST_OUTPUT_CHANNEL_CAPACITY: usize = 1024;

/// Time to wait after SIGTERM for a killed process to exit on its own before SIGKILL.
const KILL_GRACE: Duration = Duration::from_millis(500);

pub struct DirectPty {
    writer: Mutex<Box<dyn std::io::Write + Send>>,
    master: StdMutex<Box<dyn portable_pty::MasterPty + Send>>,
    /// Shared with the reader task, which is the sole reaper. `kill` only signals.
    child: Arc<StdMutex<Box<dyn portable_pty::Child + Send>>>,
    alive: AtomicBool,
}

/// Reap the child exactly once, deriving a real exit code or signal from the wait
/// status instead of portable-pty's lossy stringly-typed `ExitStatus`.
#[cfg(unix)]
fn reap(child: &StdMutex<Box<dyn portable_pty::Child + Send>>) -> ExitStatus {
    use nix::sys::wait::{waitpid, WaitStatus};
    use nix::unistd::Pid;

    let pid = child.lock().unwrap().process_id();
    if let Some(status) = pid.and_then(|pid| waitpid(Pid::from_raw(pid as i32), None).ok()) {
        return match status {
            WaitStatus::Exited(_, code) => ExitStatus {
                code: Some(code),
                signal: None,
            },
            WaitStatus::Signaled(_, signal, _) => ExitStatus {
                code: None,
                signal: Some(signal as i32),
            },
            _ => ExitStatus::default(),
        };
    }

    // pid already reaped by someone else (or unavailable); fall back to
    // portable-pty's own accounting, which has already cached the status.
    match child.lock().unwrap().wait() {
        Ok(status) => ExitStatus {
            code: Some(status.exit_code() as i32),
            signal: None,
        },
        Err(e) => {
            tracing::warn!("failed to wait on child: {e}");
            ExitStatus::default()
        }
    }
}

#[cfg(not(unix))]
fn reap(child: &StdMutex<Box<dyn portable_pty::Child + Send>>) -> ExitStatus {
    match child.lock().unwrap().wait() {
        Ok(status) => ExitStatus {
            code: Some(status.exit_code() as i32),
            signal: None,
        },
        Err(e) => {
            tracing::warn!("failed to wait on child: {e}");
            ExitStatus::default()
        }
    }
}

#[cfg(unix)]
fn still_running(pid: u32) -> bool {
    nix::sys::signal::kill(
        nix::unistd::Pid::from_raw(pid as i32),
        None::<nix::sys::signal::Signal>,
    )
    .is_ok()
}

// portable-pty's trait objects aren't Sync by default; we only ever touch them
// from behind a lock, so this is sound.
unsafe impl Sync for DirectPty {}

impl DirectPty {
    /// Spawn a child process under a fresh PTY. Returns the live `Host`, a channel
    /// of its stdout/stderr bytes, and a one-shot that fires exactly once on exit.
    pub fn spawn(
        config: TerminalConfig,
    ) -> Result<(Arc<Self>, mpsc::Receiver<Bytes>, oneshot::Receiver<ExitStatus>)> {
        if config.shell.trim().is_empty() {
            return Err(CoreError::Invalid("empty command".into()));
        }
        if config.cols == 0 || config.rows == 0 {
            return Err(CoreError::Invalid("cols and rows must be >= 1".into()));
        }

        let pty_system = native_pty_system();
        let pty_size = PtySize {
            rows: config.rows,
            cols: config.cols,
            pixel_width: 0,
            pixel_height: 0,
        };

        let pty_pair = pty_system
            .openpty(pty_size)
            .map_err(|e| CoreError::Spawn(format!("failed to open pty: {e}")))?;

        let mut cmd = CommandBuilder::new(&config.shell);
        for (key, value) in &config.env {
            cmd.env(key, value);
        }
        if let Some(cwd) = &config.cwd {
            cmd.cwd(cwd);
        }

        let child = pty_pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| CoreError::Spawn(format!("failed to spawn shell: {e}")))?;
        drop(pty_pair.slave);

        let writer = pty_pair
            .master
            .take_writer()
            .map_err(|e| CoreError::Spawn(format!("failed to take pty writer: {e}")))?;

        let (output_tx, output_rx) = mpsc::channel(HOST_OUTPUT_CHANNEL_CAPACITY);
        let (exit_tx, exit_rx) = oneshot::channel();

        let reader = pty_pair
            .master
            .try_clone_reader()
            .map_err(|e| CoreError::Spawn(format!("failed to clone pty reader: {e}")))?;

        let child: Arc<StdMutex<Box<dyn portable_pty::Child + Send>>> =
            Arc::new(StdMutex::new(child));
        let child_for_reader = child.clone();

        tokio::task::spawn_blocking(move || {
            let mut reader = reader;
            let mut buf = [0u8; 8192];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => {
                        tracing::debug!("pty reader eof");
                        break;
                    }
                    Ok(n) => {
                        let data = Bytes::copy_from_slice(&buf[..n]);
                        if output_tx.blocking_send(data).is_err() {
                            tracing::debug!("pty output channel closed, stopping reader");
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("pty read error: {e}");
                        break;
                    }
                }
            }

            let status = reap(&child_for_reader);
            let _ = exit_tx.send(status);
        });

        let host = Arc::new(Self {
            writer: Mutex::new(writer),
            master: StdMutex::new(pty_pair.master),
            child,
            alive: AtomicBool::new(true),
        });

        Ok((host, output_rx, exit_rx))
    }
}

#[async_trait]
impl Host for DirectPty {
    async fn write(&self, data: &[u8]) -> Result<()> {
        if !self.is_alive() {
            return Err(CoreError::Closed("pty writer closed".into()));
        }
        let mut writer = self.writer.lock().await;
        writer
            .write_all(data)
            .map_err(|e| CoreError::Closed(format!("pty write failed: {e}")))?;
        writer
            .flush()
            .map_err(|e| CoreError::Closed(format!("pty flush failed: {e}")))?;
        Ok(())
    }

    async fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        if cols == 0 || rows == 0 {
            return Err(CoreError::Invalid("cols and rows must be >= 1".into()));
        }
        if !self.is_alive() {
            return Err(CoreError::Closed("pty already closed".into()));
        }
        let size = PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        };
        self.master
            .lock()
            .unwrap()
            .resize(size)
            .map_err(|e| CoreError::Closed(format!("pty resize failed: {e}")))?;
        Ok(())
    }

    async fn kill(&self) -> Result<()> {
        if !self.alive.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        #[cfg(unix)]
        {
            let pid = self.child.lock().unwrap().process_id();
            if let Some(pid) = pid {
                let _ = nix::sys::signal::kill(
                    nix::unistd::Pid::from_raw(pid as i32),
                    nix::sys::signal::Signal::SIGTERM,
                );
                tokio::time::sleep(KILL_GRACE).await;
                if still_running(pid) {
                    let _ = nix::sys::signal::kill(
                        nix::unistd::Pid::from_raw(pid as i32),
                        nix::sys::signal::Signal::SIGKILL,
                    );
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = self.child.lock().unwrap().kill();
        }

        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}
