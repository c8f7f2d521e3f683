//! Attachment Coordinator: the `Create/Attach/Detach/Write/Resize/Kill/List`
//! surface, the window state-machine transitions, and single-writer
//! serialization of concurrent `Write` calls.
//!
//! Grounded on the `SessionState` dispatch loop in `hostagent::quic_server` and
//! the per-operation methods of `hostagent::session::SessionManager`.

use crate::error::{CoreError, Result};
use crate::terminal::fanout::FanoutMsg;
use crate::terminal::ids::WindowId;
use crate::terminal::registry::{CreateSpec, Registry};
use crate::terminal::window::WindowSummary;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

/// `T_op_max`: synchronous operations abandon after this and report `OpTimeout`.
const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(1);

pub struct Coordinator {
    registry: Arc<Registry>,
    op_timeout: Duration,
}

impl Coordinator {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }

    pub fn with_op_timeout(registry: Arc<Registry>, op_timeout: Duration) -> Self {
        Self { registry, op_timeout }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub async fn create(&self, spec: CreateSpec) -> Result<WindowSummary> {
        let window = self.registry.create(spec).await?;
        Ok(WindowSummary::from(window.as_ref()))
    }

    /// Attach a new subscriber to `id`. Scrollback is replayed before any live
    /// chunk, handled atomically inside the Fanout. `Active` is entered on success.
    pub async fn attach(
        &self,
        id: &WindowId,
        cols: u16,
        rows: u16,
    ) -> Result<(u64, mpsc::Receiver<FanoutMsg>)> {
        if cols == 0 || rows == 0 {
            return Err(CoreError::Invalid("cols and rows must be >= 1".into()));
        }
        let window = self.registry.get(id).await?;
        let (sub_id, rx) = window.fanout.attach().await;
        window.mark_active();
        Ok((sub_id, rx))
    }

    /// Idempotent: detaching twice, or detaching from a window that's already
    /// gone, both succeed.
    pub async fn detach(&self, id: &WindowId, sub_id: u64) -> Result<()> {
        if let Ok(window) = self.registry.get(id).await {
            window.fanout.detach(sub_id).await;
            if window.fanout.subscriber_count().await == 0 {
                window.mark_idle_if_active();
            }
        }
        Ok(())
    }

    /// Serializes against any other in-flight `Write` on the same window so input
    /// bytes from one client are never interleaved with another's.
    pub async fn write(&self, id: &WindowId, data: &[u8]) -> Result<()> {
        let window = self.registry.get(id).await?;
        timeout(self.op_timeout, async {
            let _guard = window.writer_guard.lock().await;
            window.host.write(data).await
        })
        .await
        .map_err(|_| CoreError::OpTimeout(self.op_timeout.as_millis() as u64))?
    }

    /// Last writer wins; no negotiation across subscribers with different
    /// viewports.
    pub async fn resize(&self, id: &WindowId, cols: u16, rows: u16) -> Result<()> {
        if cols == 0 || rows == 0 {
            return Err(CoreError::Invalid("cols and rows must be >= 1".into()));
        }
        let window = self.registry.get(id).await?;
        timeout(self.op_timeout, window.host.resize(cols, rows))
            .await
            .map_err(|_| CoreError::OpTimeout(self.op_timeout.as_millis() as u64))??;
        window.set_dimensions(cols, rows);
        Ok(())
    }

    /// Idempotent: killing an unknown or already-terminal window returns `Ok`.
    pub async fn kill(&self, id: &WindowId) -> Result<()> {
        self.registry.kill(id).await
    }

    pub async fn list(&self, project_path: Option<&str>) -> Vec<WindowSummary> {
        let windows = match project_path {
            Some(p) => self.registry.list_by_project(p).await,
            None => self.registry.list().await,
        };
        windows.iter().map(|w| WindowSummary::from(w.as_ref())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::registry::DEFAULT_SB_CAP;

    fn spec() -> CreateSpec {
        CreateSpec {
            shell: "/bin/sh".to_string(),
            project_path: "/tmp/proj".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn attach_write_detach_round_trip() {
        let registry = Registry::new(DEFAULT_SB_CAP);
        let coordinator = Coordinator::new(registry);
        let summary = coordinator.create(spec()).await.unwrap();
        let id = WindowId::parse(&summary.id).unwrap();

        let (sub_id, mut rx) = coordinator.attach(&id, 80, 24).await.unwrap();
        coordinator.write(&id, b"echo hi\n").await.unwrap();

        let mut got_echo = false;
        for _ in 0..20 {
            match tokio::time::timeout(Duration::from_millis(500), rx.recv()).await {
                Ok(Some(FanoutMsg::Chunk(data))) => {
                    if data.windows(2).any(|w| w == b"hi") {
                        got_echo = true;
                        break;
                    }
                }
                Ok(Some(_)) => continue,
                _ => break,
            }
        }
        assert!(got_echo, "expected shell echo to arrive");

        coordinator.detach(&id, sub_id).await.unwrap();
        coordinator.detach(&id, sub_id).await.unwrap();
        coordinator.kill(&id).await.unwrap();
    }

    #[tokio::test]
    async fn attach_rejects_zero_viewport() {
        let registry = Registry::new(DEFAULT_SB_CAP);
        let coordinator = Coordinator::new(registry);
        let summary = coordinator.create(spec()).await.unwrap();
        let id = WindowId::parse(&summary.id).unwrap();
        assert!(matches!(
            coordinator.attach(&id, 0, 24).await,
            Err(CoreError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn operations_on_unknown_window_are_not_found() {
        let registry = Registry::new(DEFAULT_SB_CAP);
        let coordinator = Coordinator::new(registry);
        let id = WindowId::new_direct();
        assert!(matches!(
            coordinator.write(&id, b"x").await,
            Err(CoreError::NotFound(_))
        ));
        assert!(matches!(
            coordinator.resize(&id, 80, 24).await,
            Err(CoreError::NotFound(_))
        ));
        // Kill and detach are idempotent even against unknown windows.
        coordinator.kill(&id).await.unwrap();
        coordinator.detach(&id, 1).await.unwrap();
    }

    #[tokio::test]
    async fn attach_after_kill_is_window_terminal_not_not_found() {
        let registry = Registry::new(DEFAULT_SB_CAP);
        let coordinator = Coordinator::new(registry);
        let summary = coordinator.create(spec()).await.unwrap();
        let id = WindowId::parse(&summary.id).unwrap();
        coordinator.kill(&id).await.unwrap();

        for _ in 0..20 {
            match coordinator.attach(&id, 80, 24).await {
                Err(CoreError::WindowTerminal(_)) => return,
                Err(CoreError::NotFound(_)) => {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
                Ok(_) => panic!("attach succeeded on a killed window"),
                Err(e) => panic!("unexpected error attaching to a killed window: {e}"),
            }
        }
        panic!("attach on a killed window never reported WindowTerminal");
    }

    #[tokio::test]
    async fn kill_then_list_omits_window() {
        let registry = Registry::new(DEFAULT_SB_CAP);
        let coordinator = Coordinator::new(registry);
        let summary = coordinator.create(spec()).await.unwrap();
        let id = WindowId::parse(&summary.id).unwrap();
        coordinator.kill(&id).await.unwrap();

        for _ in 0..20 {
            if coordinator.list(None).await.is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("killed window still listed after 1s");
    }
}
