//! Host abstraction: the capability set shared by every byte-pipe backing a window.
//!
//! A `Host` is either a PTY driving a child process directly ([`super::pty_host::DirectPty`])
//! or a PTY driving an external multiplexer's attach command ([`super::session_adapter::MultiplexedPty`]).
//! Callers never match on which; they hold `Arc<dyn Host>` and call the same four methods.

use crate::error::Result;
use async_trait::async_trait;

/// How a child process ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExitStatus {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

/// Runtime operations available on a live window's byte pipe.
///
/// Construction is intentionally not part of this trait: `DirectPty::spawn` and
/// `MultiplexedPty::attach` have different inputs, but both hand back
/// `(Arc<dyn Host>, mpsc::Receiver<Bytes>, oneshot::Receiver<ExitStatus>)`.
#[async_trait]
pub trait Host: Send + Sync {
    /// Write bytes to the process's stdin. Returns `CoreError::Closed` once the pipe is gone.
    async fn write(&self, data: &[u8]) -> Result<()>;

    /// Apply a new viewport size.
    async fn resize(&self, cols: u16, rows: u16) -> Result<()>;

    /// Terminate the process. SIGTERM first, SIGKILL after the grace period. Idempotent.
    async fn kill(&self) -> Result<()>;

    /// Best-effort liveness check; does not guarantee the next `write` will succeed.
    fn is_alive(&self) -> bool;
}

/// Shared spawn-time configuration for a direct PTY.
#[derive(Debug, Clone)]
pub struct TerminalConfig {
    pub rows: u16,
    pub cols: u16,
    pub shell: String,
    pub env: Vec<(String, String)>,
    pub cwd: Option<String>,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            rows: 24,
            cols: 80,
            shell: Self::default_shell(),
            env: vec![("TERM".to_string(), "xterm-256color".to_string())],
            cwd: None,
        }
    }
}

impl TerminalConfig {
    #[cfg(unix)]
    fn default_shell() -> String {
        std::env::var("SHELL").unwrap_or_else(|_| "/bin/bash".to_string())
    }

    #[cfg(windows)]
    fn default_shell() -> String {
        std::env::var("COMSPEC").unwrap_or_else(|_| "cmd.exe".to_string())
    }

    pub fn with_size(rows: u16, cols: u16) -> Self {
        Self {
            rows,
            cols,
            ..Default::default()
        }
    }

    pub fn with_shell(mut self, shell: String) -> Self {
        self.shell = shell;
        self
    }

    pub fn with_env(mut self, key: String, value: String) -> Self {
        self.env.push((key, value));
        self
    }

    pub fn with_cwd(mut self, cwd: String) -> Self {
        self.cwd = Some(cwd);
        self
    }
}

/// In-memory `Host` double for fanout/coordinator tests; never spawns a real process.
pub struct MockHost {
    alive: std::sync::atomic::AtomicBool,
    writes: tokio::sync::Mutex<Vec<Vec<u8>>>,
    size: tokio::sync::Mutex<(u16, u16)>,
}

impl MockHost {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self {
            alive: std::sync::atomic::AtomicBool::new(true),
            writes: tokio::sync::Mutex::new(Vec::new()),
            size: tokio::sync::Mutex::new((cols, rows)),
        }
    }

    pub async fn written(&self) -> Vec<Vec<u8>> {
        self.writes.lock().await.clone()
    }

    pub async fn current_size(&self) -> (u16, u16) {
        *self.size.lock().await
    }
}

#[async_trait]
impl Host for MockHost {
    async fn write(&self, data: &[u8]) -> Result<()> {
        if !self.is_alive() {
            return Err(crate::error::CoreError::Closed("mock host".into()));
        }
        self.writes.lock().await.push(data.to_vec());
        Ok(())
    }

    async fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        if !self.is_alive() {
            return Err(crate::error::CoreError::Closed("mock host".into()));
        }
        *self.size.lock().await = (cols, rows);
        Ok(())
    }

    async fn kill(&self) -> Result<()> {
        self.alive.store(false, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_host_write_and_kill() {
        let host = MockHost::new(80, 24);
        host.write(b"echo hi\n").await.unwrap();
        assert_eq!(host.written().await, vec![b"echo hi\n".to_vec()]);
        host.kill().await.unwrap();
        assert!(!host.is_alive());
        assert!(host.write(b"x").await.is_err());
    }

    #[tokio::test]
    async fn mock_host_resize() {
        let host = MockHost::new(80, 24);
        host.resize(120, 40).await.unwrap();
        assert_eq!(host.current_size().await, (120, 40));
    }

    #[test]
    fn terminal_config_builder() {
        let config = TerminalConfig::with_size(40, 120)
            .with_shell("/bin/zsh".to_string())
            .with_env("TEST".to_string(), "value".to_string())
            .with_cwd("/tmp".to_string());
        assert_eq!(config.rows, 40);
        assert_eq!(config.cols, 120);
        assert_eq!(config.shell, "/bin/zsh");
        assert_eq!(config.env.len(), 2);
        assert_eq!(config.cwd.as_deref(), Some("/tmp"));
    }
}
