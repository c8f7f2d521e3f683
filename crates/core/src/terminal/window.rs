//! A single multiplexed window: metadata, state machine, and the Fanout/Host pair
//! that back it.

use crate::terminal::fanout::Fanout;
use crate::terminal::ids::WindowId;
use crate::terminal::traits::Host;
use std::sync::atomic::{AtomicU16, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

/// Where a window's bytes come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Source {
    DirectPty,
    Multiplexed,
}

/// `Idle` (no subscribers) <-> `Active` (>=1 subscriber); either terminates into
/// `Terminal` on kill or process exit, from which there is no return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum WindowState {
    Idle = 0,
    Active = 1,
    Terminal = 2,
}

impl From<u8> for WindowState {
    fn from(v: u8) -> Self {
        match v {
            0 => WindowState::Idle,
            1 => WindowState::Active,
            _ => WindowState::Terminal,
        }
    }
}

pub struct Window {
    pub id: WindowId,
    pub name: String,
    pub project_path: String,
    pub source: Source,
    pub created_at: u64,
    cols: AtomicU16,
    rows: AtomicU16,
    state: AtomicU8,
    pub fanout: Arc<Fanout>,
    pub host: Arc<dyn Host>,
    /// Serializes concurrent `Write` calls onto a single input stream.
    pub writer_guard: Mutex<()>,
}

impl Window {
    pub fn new(
        id: WindowId,
        name: String,
        project_path: String,
        source: Source,
        cols: u16,
        rows: u16,
        fanout: Arc<Fanout>,
        host: Arc<dyn Host>,
    ) -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            id,
            name,
            project_path,
            source,
            created_at,
            cols: AtomicU16::new(cols),
            rows: AtomicU16::new(rows),
            state: AtomicU8::new(WindowState::Idle as u8),
            fanout,
            host,
            writer_guard: Mutex::new(()),
        }
    }

    pub fn state(&self) -> WindowState {
        WindowState::from(self.state.load(Ordering::SeqCst))
    }

    pub fn set_state(&self, state: WindowState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Flip to `Active` if currently `Idle`. A window already `Terminal` stays put.
    pub fn mark_active(&self) {
        let _ = self.state.compare_exchange(
            WindowState::Idle as u8,
            WindowState::Active as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// Flip to `Idle` if currently `Active` (called once the last subscriber
    /// detaches). A window already `Terminal` stays put.
    pub fn mark_idle_if_active(&self) {
        let _ = self.state.compare_exchange(
            WindowState::Active as u8,
            WindowState::Idle as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    pub fn dimensions(&self) -> (u16, u16) {
        (self.cols.load(Ordering::SeqCst), self.rows.load(Ordering::SeqCst))
    }

    pub fn set_dimensions(&self, cols: u16, rows: u16) {
        self.cols.store(cols, Ordering::SeqCst);
        self.rows.store(rows, Ordering::SeqCst);
    }

    pub fn is_terminal(&self) -> bool {
        self.state() == WindowState::Terminal
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct WindowSummary {
    pub id: String,
    pub name: String,
    pub project_path: String,
    pub source: Source,
    pub cols: u16,
    pub rows: u16,
    pub created_at: u64,
    pub state: WindowState,
}

impl From<&Window> for WindowSummary {
    fn from(w: &Window) -> Self {
        let (cols, rows) = w.dimensions();
        Self {
            id: w.id.to_string(),
            name: w.name.clone(),
            project_path: w.project_path.clone(),
            source: w.source,
            cols,
            rows,
            created_at: w.created_at,
            state: w.state(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::traits::MockHost;

    fn test_window() -> Window {
        Window::new(
            WindowId::new_direct(),
            "shell".into(),
            "/tmp".into(),
            Source::DirectPty,
            80,
            24,
            Arc::new(Fanout::with_defaults(1024)),
            Arc::new(MockHost::new(80, 24)),
        )
    }

    #[test]
    fn starts_idle() {
        let w = test_window();
        assert_eq!(w.state(), WindowState::Idle);
    }

    #[test]
    fn active_idle_terminal_transitions() {
        let w = test_window();
        w.mark_active();
        assert_eq!(w.state(), WindowState::Active);
        w.mark_idle_if_active();
        assert_eq!(w.state(), WindowState::Idle);
        w.set_state(WindowState::Terminal);
        w.mark_active();
        assert_eq!(w.state(), WindowState::Terminal);
    }

    #[test]
    fn resize_updates_dimensions() {
        let w = test_window();
        w.set_dimensions(120, 40);
        assert_eq!(w.dimensions(), (120, 40));
    }
}
