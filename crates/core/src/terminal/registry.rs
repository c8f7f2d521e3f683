//! Window Registry: the authoritative in-memory index of live windows.
//!
//! Grounded on `hostagent::session::SessionManager` — the insert/remove/list shape
//! and the periodic dead-session sweep come from there — generalized to the
//! spec's string `WindowId` grammar and to own a `Window` (Fanout + Host) rather
//! than bare PTY sessions.

use crate::error::{CoreError, Result};
use crate::terminal::fanout::{spawn_reader, Fanout};
use crate::terminal::ids::WindowId;
use crate::terminal::pty_host::DirectPty;
use crate::terminal::session_adapter::{MultiplexedPty, TmuxControl};
use crate::terminal::traits::TerminalConfig;
use crate::terminal::window::{Source, Window};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Default scrollback capacity (`SB_CAP`), overridable per [`CreateSpec`].
pub const DEFAULT_SB_CAP: usize = 64 * 1024;

/// How long a terminal window stays in the index (as `Terminal`, distinguishable
/// from an unknown id) before being dropped entirely.
const TERMINAL_RETENTION: std::time::Duration = std::time::Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct CreateSpec {
    pub project_path: String,
    pub cwd: String,
    pub shell: String,
    pub env: Vec<(String, String)>,
    pub cols: u16,
    pub rows: u16,
    pub label: Option<String>,
    pub prefer_multiplexed: bool,
    pub sb_cap: Option<usize>,
}

impl Default for CreateSpec {
    fn default() -> Self {
        Self {
            project_path: String::new(),
            cwd: ".".to_string(),
            shell: TerminalConfig::default().shell,
            env: Vec::new(),
            cols: 80,
            rows: 24,
            label: None,
            prefer_multiplexed: false,
            sb_cap: None,
        }
    }
}

pub struct Registry {
    windows: Mutex<HashMap<WindowId, Arc<Window>>>,
    multiplexer_available: bool,
    default_sb_cap: usize,
}

impl Registry {
    pub fn new(default_sb_cap: usize) -> Arc<Self> {
        Self::with_multiplexer(default_sb_cap, TmuxControl::available())
    }

    /// Construct with the external session adapter forced on or off,
    /// independent of whether `tmux` is actually on `PATH`.
    pub fn with_multiplexer(default_sb_cap: usize, multiplexer_available: bool) -> Arc<Self> {
        let multiplexer_available = multiplexer_available && TmuxControl::available();
        if !multiplexer_available {
            tracing::info!("tmux not available or disabled; external session adapter off");
        }
        Arc::new(Self {
            windows: Mutex::new(HashMap::new()),
            multiplexer_available,
            default_sb_cap,
        })
    }

    pub fn multiplexer_available(&self) -> bool {
        self.multiplexer_available
    }

    pub async fn create(self: &Arc<Self>, spec: CreateSpec) -> Result<Arc<Window>> {
        if spec.cols == 0 || spec.rows == 0 {
            return Err(CoreError::Invalid("cols and rows must be >= 1".into()));
        }
        if spec.shell.trim().is_empty() {
            return Err(CoreError::Invalid("empty command".into()));
        }

        let sb_cap = spec.sb_cap.unwrap_or(self.default_sb_cap);
        let fanout = Arc::new(Fanout::with_defaults(sb_cap));

        let (window_id, source, host, output_rx, exit_rx) = if spec.prefer_multiplexed
            && self.multiplexer_available
        {
            let control = TmuxControl::new();
            let session = WindowId::session_name_for(&spec.project_path);
            control.ensure_session(&session, &spec.cwd)?;
            let index = control.new_window(&session, spec.label.as_deref(), &spec.cwd)?;
            let window_id = WindowId::new_multiplexed(session, index);
            let (host, output_rx, exit_rx) = MultiplexedPty::attach(&window_id, spec.cols, spec.rows)?;
            (window_id, Source::Multiplexed, host as Arc<dyn crate::terminal::traits::Host>, output_rx, exit_rx)
        } else {
            let window_id = WindowId::new_direct();
            let config = TerminalConfig::with_size(spec.rows, spec.cols)
                .with_shell(spec.shell.clone())
                .with_cwd(spec.cwd.clone());
            let config = spec
                .env
                .iter()
                .fold(config, |c, (k, v)| c.with_env(k.clone(), v.clone()));
            let (host, output_rx, exit_rx) = DirectPty::spawn(config)?;
            (window_id, Source::DirectPty, host as Arc<dyn crate::terminal::traits::Host>, output_rx, exit_rx)
        };

        let name = spec
            .label
            .clone()
            .unwrap_or_else(|| window_id.to_string());

        let window = Arc::new(Window::new(
            window_id.clone(),
            name,
            spec.project_path.clone(),
            source,
            spec.cols,
            spec.rows,
            fanout.clone(),
            host,
        ));

        self.windows.lock().await.insert(window_id.clone(), window.clone());

        let registry = self.clone();
        let reader_handle = spawn_reader(fanout, output_rx, exit_rx);
        let finish_id = window_id;
        tokio::spawn(async move {
            let _ = reader_handle.await;
            registry.finish(&finish_id).await;
        });

        Ok(window)
    }

    /// `NotFound` for an id that was never created (or has aged out of the
    /// `Terminal` retention window); `WindowTerminal` for one that exited or was
    /// killed but is still within that window.
    pub async fn get(&self, id: &WindowId) -> Result<Arc<Window>> {
        match self.windows.lock().await.get(id).cloned() {
            Some(w) if w.is_terminal() => Err(CoreError::WindowTerminal(id.to_string())),
            Some(w) => Ok(w),
            None => Err(CoreError::NotFound(id.to_string())),
        }
    }

    pub async fn list(&self) -> Vec<Arc<Window>> {
        self.windows
            .lock()
            .await
            .values()
            .filter(|w| !w.is_terminal())
            .cloned()
            .collect()
    }

    pub async fn list_by_project(&self, project_path: &str) -> Vec<Arc<Window>> {
        self.list()
            .await
            .into_iter()
            .filter(|w| w.project_path == project_path)
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.windows
            .lock()
            .await
            .values()
            .filter(|w| !w.is_terminal())
            .count()
    }

    /// Idempotent: killing an unknown or already-terminal window succeeds silently.
    pub async fn kill(&self, id: &WindowId) -> Result<()> {
        if let Some(window) = self.windows.lock().await.get(id).cloned() {
            window.host.kill().await.ok();
        }
        Ok(())
    }

    /// Called once the reader task observes the Host exiting. Transitions the
    /// window to `Terminal` and clears subscribers, but keeps it in the index for
    /// [`TERMINAL_RETENTION`] so a subsequent `get` can report `WindowTerminal`
    /// rather than `NotFound`; a background task then drops it for good.
    async fn finish(self: &Arc<Self>, id: &WindowId) {
        let window = self.windows.lock().await.get(id).cloned();
        let Some(window) = window else {
            return;
        };
        window.set_state(crate::terminal::window::WindowState::Terminal);
        window.fanout.clear_subscribers().await;
        tracing::info!(window = %id, "window terminal");

        let registry = self.clone();
        let id = id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(TERMINAL_RETENTION).await;
            registry.windows.lock().await.remove(&id);
        });
    }

    /// Re-enumerate external windows and drop registry entries whose backing
    /// `tmux` window has vanished.
    pub async fn reconcile_external(self: &Arc<Self>) {
        if !self.multiplexer_available {
            return;
        }
        let control = TmuxControl::new();
        let live: std::collections::HashSet<(String, u32)> = control.list_windows().into_iter().collect();

        let gone: Vec<WindowId> = self
            .windows
            .lock()
            .await
            .iter()
            .filter_map(|(id, w)| match (&w.source, id) {
                (Source::Multiplexed, WindowId::Multiplexed { session, index }) => {
                    if live.contains(&(session.clone(), *index)) {
                        None
                    } else {
                        Some(id.clone())
                    }
                }
                _ => None,
            })
            .collect();

        for id in gone {
            self.finish(&id).await;
        }
    }

    pub fn spawn_reconcile_task(self: Arc<Self>, interval: std::time::Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.reconcile_external().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> CreateSpec {
        CreateSpec {
            shell: "/bin/sh".to_string(),
            project_path: "/tmp/proj".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_rejects_zero_dimensions() {
        let registry = Registry::new(DEFAULT_SB_CAP);
        let mut s = spec();
        s.cols = 0;
        assert!(matches!(registry.create(s).await, Err(CoreError::Invalid(_))));
    }

    #[tokio::test]
    async fn create_rejects_empty_command() {
        let registry = Registry::new(DEFAULT_SB_CAP);
        let mut s = spec();
        s.shell = String::new();
        assert!(matches!(registry.create(s).await, Err(CoreError::Invalid(_))));
    }

    #[tokio::test]
    async fn create_then_get_then_kill() {
        let registry = Registry::new(DEFAULT_SB_CAP);
        let window = registry.create(spec()).await.unwrap();
        assert_eq!(registry.len().await, 1);

        let fetched = registry.get(&window.id).await.unwrap();
        assert_eq!(fetched.id, window.id);

        registry.kill(&window.id).await.unwrap();
        // Kill is idempotent regardless of how quickly the reader task reaps it.
        registry.kill(&window.id).await.unwrap();
    }

    #[tokio::test]
    async fn get_unknown_id_not_found() {
        let registry = Registry::new(DEFAULT_SB_CAP);
        let id = WindowId::new_direct();
        assert!(matches!(registry.get(&id).await, Err(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn get_after_kill_is_window_terminal() {
        let registry = Registry::new(DEFAULT_SB_CAP);
        let window = registry.create(spec()).await.unwrap();
        registry.kill(&window.id).await.unwrap();

        for _ in 0..20 {
            match registry.get(&window.id).await {
                Err(CoreError::WindowTerminal(_)) => return,
                _ => tokio::time::sleep(std::time::Duration::from_millis(50)).await,
            }
        }
        panic!("killed window never settled into WindowTerminal");
    }
}
