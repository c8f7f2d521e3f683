//! Output fanout: one reader task per window, broadcasting Host bytes to every
//! attached subscriber through a bounded, non-blocking, drop-then-evict queue.
//!
//! Grounded on `hostagent::snapshot::SnapshotBuffer` (byte-level ring buffer) for
//! the scrollback half, `termbroker_core::streaming::OutputStream` for the bounded
//! per-subscriber channel shape, and the `tokio::select!` batching loop in
//! `termbroker_core::transport::stream::pump_pty_to_quic_smart` for the reader-task
//! structure. Unlike `OutputStream`, a full queue here drops the chunk instead of
//! blocking the reader — a single slow subscriber must never stall the PTY.

use crate::terminal::scrollback::Scrollback;
use crate::terminal::traits::ExitStatus;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::{mpsc, oneshot, Mutex};

/// Default per-subscriber queue depth (`Q_CAP`).
pub const DEFAULT_Q_CAP: usize = 256;
/// Default dropped-byte threshold before a subscriber is evicted (`EVICT_THRESH`).
pub const DEFAULT_EVICT_THRESH: usize = 1024 * 1024;

/// What a subscriber receives: either raw output or a typed control event. Callers
/// must distinguish the two — control events are not part of the byte stream.
#[derive(Debug, Clone)]
pub enum FanoutMsg {
    Chunk(Bytes),
    Control(ControlEvent),
}

#[derive(Debug, Clone, Copy)]
pub enum ControlEvent {
    WindowExited { code: Option<i32>, signal: Option<i32> },
    SlowConsumerEvicted { dropped_bytes: usize },
}

struct SubscriberHandle {
    sender: mpsc::Sender<FanoutMsg>,
    dropped_bytes: AtomicUsize,
}

struct FanoutState {
    scrollback: Scrollback,
    subscribers: HashMap<u64, SubscriberHandle>,
}

/// Per-window fanout. One instance owns exactly one window's scrollback and
/// subscriber set; the reader task that feeds it is spawned separately via
/// [`spawn_reader`] so the Fanout itself stays free of Host-specific types.
pub struct Fanout {
    state: Mutex<FanoutState>,
    next_sub_id: AtomicU64,
    q_cap: usize,
    evict_thresh: usize,
}

impl Fanout {
    pub fn new(sb_cap: usize, q_cap: usize, evict_thresh: usize) -> Self {
        Self {
            state: Mutex::new(FanoutState {
                scrollback: Scrollback::new(sb_cap),
                subscribers: HashMap::new(),
            }),
            next_sub_id: AtomicU64::new(1),
            q_cap,
            evict_thresh,
        }
    }

    pub fn with_defaults(sb_cap: usize) -> Self {
        Self::new(sb_cap, DEFAULT_Q_CAP, DEFAULT_EVICT_THRESH)
    }

    /// Register a new subscriber. The current scrollback contents are enqueued as
    /// the first message on its channel before the function returns, and — because
    /// both this and [`Self::deliver`] hold the same state lock for their critical
    /// section — no live chunk emitted after this call can arrive before it.
    pub async fn attach(&self) -> (u64, mpsc::Receiver<FanoutMsg>) {
        let sub_id = self.next_sub_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(self.q_cap);

        let mut state = self.state.lock().await;
        let replay = state.scrollback.snapshot();
        if !replay.is_empty() {
            let _ = tx.try_send(FanoutMsg::Chunk(Bytes::from(replay)));
        }
        state.subscribers.insert(
            sub_id,
            SubscriberHandle {
                sender: tx,
                dropped_bytes: AtomicUsize::new(0),
            },
        );
        drop(state);

        (sub_id, rx)
    }

    /// Idempotent: detaching an unknown or already-detached subscriber is a no-op.
    pub async fn detach(&self, sub_id: u64) {
        self.state.lock().await.subscribers.remove(&sub_id);
    }

    pub async fn subscriber_count(&self) -> usize {
        self.state.lock().await.subscribers.len()
    }

    /// Append a chunk to scrollback and fan it out. Never blocks on a subscriber;
    /// a full queue increments that subscriber's dropped-byte counter instead, and
    /// once it crosses `evict_thresh` the subscriber is evicted with a final
    /// [`ControlEvent::SlowConsumerEvicted`].
    pub async fn deliver(&self, data: &[u8]) {
        let mut state = self.state.lock().await;
        state.scrollback.push(data);

        let mut to_evict = Vec::new();
        for (&sub_id, handle) in state.subscribers.iter() {
            match handle.sender.try_send(FanoutMsg::Chunk(Bytes::copy_from_slice(data))) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    let dropped = handle
                        .dropped_bytes
                        .fetch_add(data.len(), Ordering::SeqCst)
                        + data.len();
                    if dropped >= self.evict_thresh {
                        to_evict.push((sub_id, dropped));
                    }
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    to_evict.push((sub_id, 0));
                }
            }
        }
        for (sub_id, dropped) in to_evict {
            if let Some(handle) = state.subscribers.remove(&sub_id) {
                let _ = handle
                    .sender
                    .try_send(FanoutMsg::Control(ControlEvent::SlowConsumerEvicted {
                        dropped_bytes: dropped,
                    }));
            }
        }
    }

    /// Deliver a control event to every subscriber, best-effort, then leave the
    /// subscriber set untouched — the caller (Coordinator) removes them after the
    /// window transitions to `Terminal`.
    pub async fn broadcast_control(&self, event: ControlEvent) {
        let state = self.state.lock().await;
        for handle in state.subscribers.values() {
            let _ = handle.sender.try_send(FanoutMsg::Control(event));
        }
    }

    pub async fn clear_subscribers(&self) {
        self.state.lock().await.subscribers.clear();
    }
}

/// Drive a window's reader task: drain `output_rx` into `fanout.deliver`, and once
/// the Host's byte channel closes (or `exit_rx` resolves first), broadcast
/// `WindowExited` exactly once.
pub fn spawn_reader(
    fanout: std::sync::Arc<Fanout>,
    mut output_rx: mpsc::Receiver<Bytes>,
    mut exit_rx: oneshot::Receiver<ExitStatus>,
) -> tokio::task::JoinHandle<ExitStatus> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                chunk = output_rx.recv() => {
                    match chunk {
                        Some(data) => fanout.deliver(&data).await,
                        None => break,
                    }
                }
                status = &mut exit_rx => {
                    let status = status.unwrap_or_default();
                    while let Ok(data) = output_rx.try_recv() {
                        fanout.deliver(&data).await;
                    }
                    fanout
                        .broadcast_control(ControlEvent::WindowExited {
                            code: status.code,
                            signal: status.signal,
                        })
                        .await;
                    return status;
                }
            }
        }
        let status = exit_rx.await.unwrap_or_default();
        fanout
            .broadcast_control(ControlEvent::WindowExited {
                code: status.code,
                signal: status.signal,
            })
            .await;
        status
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replay_then_live_ordering() {
        let fanout = Fanout::with_defaults(1024);
        fanout.deliver(b"before").await;

        let (_sub_id, mut rx) = fanout.attach().await;
        fanout.deliver(b"after").await;

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        match (first, second) {
            (FanoutMsg::Chunk(a), FanoutMsg::Chunk(b)) => {
                assert_eq!(&a[..], b"before");
                assert_eq!(&b[..], b"after");
            }
            _ => panic!("expected two chunks"),
        }
    }

    #[tokio::test]
    async fn two_subscribers_both_receive() {
        let fanout = Fanout::with_defaults(1024);
        let (_a, mut rx_a) = fanout.attach().await;
        let (_b, mut rx_b) = fanout.attach().await;
        fanout.deliver(b"hello").await;

        assert!(matches!(rx_a.recv().await, Some(FanoutMsg::Chunk(c)) if &c[..] == b"hello"));
        assert!(matches!(rx_b.recv().await, Some(FanoutMsg::Chunk(c)) if &c[..] == b"hello"));
    }

    #[tokio::test]
    async fn slow_consumer_is_evicted_and_notified() {
        let fanout = std::sync::Arc::new(Fanout::new(1024, 2, 16));
        let (_sub_id, mut rx) = fanout.attach().await;

        for _ in 0..20 {
            fanout.deliver(b"xxxxxxxxxx").await;
        }

        assert_eq!(fanout.subscriber_count().await, 0);
        let mut saw_eviction = false;
        while let Ok(msg) = rx.try_recv() {
            if matches!(msg, FanoutMsg::Control(ControlEvent::SlowConsumerEvicted { .. })) {
                saw_eviction = true;
            }
        }
        assert!(saw_eviction);
    }

    #[tokio::test]
    async fn detach_is_idempotent() {
        let fanout = Fanout::with_defaults(1024);
        let (sub_id, _rx) = fanout.attach().await;
        fanout.detach(sub_id).await;
        fanout.detach(sub_id).await;
        assert_eq!(fanout.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn no_delivery_after_kill_drains_and_closes() {
        let fanout = std::sync::Arc::new(Fanout::with_defaults(1024));
        let (tx, rx) = mpsc::channel::<Bytes>(8);
        let (exit_tx, exit_rx) = oneshot::channel();
        let (_sub, mut sub_rx) = fanout.attach().await;

        tx.send(Bytes::from_static(b"hi")).await.unwrap();
        drop(tx);
        exit_tx.send(ExitStatus { code: Some(0), signal: None }).unwrap();

        let handle = spawn_reader(fanout.clone(), rx, exit_rx);
        let status = handle.await.unwrap();
        assert_eq!(status.code, Some(0));

        let mut saw_exit = false;
        while let Ok(msg) = sub_rx.try_recv() {
            if matches!(msg, FanoutMsg::Control(ControlEvent::WindowExited { .. })) {
                saw_exit = true;
            }
        }
        assert!(saw_exit);
    }
}
