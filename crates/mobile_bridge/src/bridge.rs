//! Mobile bridge output streaming
//!
//! Bridges a window's `Fanout` subscription (from `termbroker_core::terminal`)
//! to a Flutter-facing `OutputStream`, so the FFI layer never has to speak
//! `FanoutMsg`/`WindowId` directly.

use bytes::Bytes;
use flutter_rust_bridge::frb;
use std::collections::HashMap;
use std::sync::Arc;
use termbroker_core::terminal::{Coordinator, FanoutMsg};
use termbroker_core::{OutputStream, WindowId};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Output stream handler for mobile terminal UI
///
/// Forwards bytes from a window's Fanout subscription into an `OutputStream`
/// the Flutter side drains via [`OutputStream::sender`]'s matching receiver.
pub struct MobileTerminalStream {
    output_stream: OutputStream,
    sub_id: u64,
    pump: JoinHandle<()>,
}

impl MobileTerminalStream {
    /// Attach to `window_id` and spawn the pump task that drains the Fanout
    /// subscription into a fresh bounded channel of the given capacity.
    async fn attach(
        coordinator: &Coordinator,
        window_id: &WindowId,
        cols: u16,
        rows: u16,
        capacity: usize,
    ) -> Result<(Self, tokio::sync::mpsc::Receiver<Bytes>), String> {
        let (sub_id, mut fanout_rx) = coordinator
            .attach(window_id, cols, rows)
            .await
            .map_err(|e| e.to_string())?;
        let (output_stream, client_rx) = OutputStream::new(capacity);
        let sender = output_stream.sender();

        let pump = tokio::spawn(async move {
            while let Some(msg) = fanout_rx.recv().await {
                match msg {
                    FanoutMsg::Chunk(data) => {
                        if sender.send(data).await.is_err() {
                            break;
                        }
                    }
                    FanoutMsg::Control(_) => break,
                }
            }
        });

        Ok((
            Self {
                output_stream,
                sub_id,
                pump,
            },
            client_rx,
        ))
    }

    /// Send a chunk directly into the stream, bypassing the Fanout (used by
    /// tests and by callers that already have raw bytes in hand).
    pub async fn send_output(&self, data: Bytes) -> Result<(), String> {
        self.output_stream
            .send(data)
            .await
            .map_err(|e| format!("Failed to send output: {}", e))
    }

    pub fn sender(&self) -> tokio::sync::mpsc::Sender<Bytes> {
        self.output_stream.sender()
    }

    pub fn remaining_capacity(&self) -> usize {
        self.output_stream.remaining()
    }
}

impl Drop for MobileTerminalStream {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Shared mobile terminal stream manager: one `MobileTerminalStream` per
/// attached window, keyed by the window's string ID.
pub struct MobileStreamManager {
    coordinator: Arc<Coordinator>,
    streams: Arc<Mutex<HashMap<String, Arc<MobileTerminalStream>>>>,
}

impl MobileStreamManager {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self {
            coordinator,
            streams: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Attach to `window_id` and register the resulting stream. Returns the
    /// receiver half so the caller can hand it to the Flutter event sink.
    pub async fn register_session(
        &self,
        window_id: String,
        cols: u16,
        rows: u16,
    ) -> Result<(Arc<MobileTerminalStream>, tokio::sync::mpsc::Receiver<Bytes>), String> {
        let id = WindowId::parse(&window_id)?;
        let (stream, rx) =
            MobileTerminalStream::attach(&self.coordinator, &id, cols, rows, 1024).await?;
        let stream = Arc::new(stream);
        self.streams
            .lock()
            .await
            .insert(window_id, stream.clone());
        Ok((stream, rx))
    }

    pub async fn get_stream(&self, window_id: &str) -> Option<Arc<MobileTerminalStream>> {
        self.streams.lock().await.get(window_id).cloned()
    }

    /// Detach and drop the stream for `window_id`, if one is registered.
    pub async fn unregister_session(&self, window_id: &str) {
        if let Some(stream) = self.streams.lock().await.remove(window_id) {
            if let Ok(id) = WindowId::parse(window_id) {
                let _ = self.coordinator.detach(&id, stream.sub_id).await;
            }
        }
    }
}

// Flutter-friendly FFI functions. These take a shared `MobileStreamManager`
// handle rather than owning state themselves; wiring that handle through
// `flutter_rust_bridge`'s opaque-object support is left to the app layer.

/// Send terminal input bytes to `window_id` through the Coordinator.
#[frb]
pub async fn send_terminal_input(
    manager: &MobileStreamManager,
    window_id: String,
    data: Vec<u8>,
) -> Result<(), String> {
    let id = WindowId::parse(&window_id)?;
    manager
        .coordinator
        .write(&id, &data)
        .await
        .map_err(|e| e.to_string())
}

/// Get the remaining buffer slots for an attached window's output stream.
#[frb]
pub async fn get_remaining_capacity(manager: &MobileStreamManager, window_id: String) -> usize {
    match manager.get_stream(&window_id).await {
        Some(stream) => stream.remaining_capacity(),
        None => 0,
    }
}
