//! QUIC server for terminal multiplexer connections
//!
//! Provides encrypted QUIC endpoint for mobile/CLI client connections,
//! dispatching `NetworkMessage` operations into the shared `Coordinator`.

use anyhow::{Context, Result};
use termbroker_core::terminal::{Coordinator, CreateSpec, Registry, WindowId};
use termbroker_core::{protocol::MessageCodec, transport::pump_fanout_to_quic, types::NetworkMessage};
use quinn::{Endpoint, TokioRuntime};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use rcgen::KeyPair;

use crate::auth::TokenStore;
use crate::ratelimit::RateLimiterStore;

/// QUIC server for terminal multiplexer connections
pub struct QuicServer {
    /// QUIC endpoint
    endpoint: Endpoint,
    /// Shared window registry / coordinator
    coordinator: Arc<Coordinator>,
    /// Token store for authentication validation
    token_store: Arc<TokenStore>,
    /// Rate limiter for auth failure tracking
    rate_limiter: Arc<RateLimiterStore>,
    /// Shutdown signal sender
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl QuicServer {
    /// Create new QUIC server with self-signed certificate
    pub async fn new(
        bind_addr: SocketAddr,
        token_store: Arc<TokenStore>,
        rate_limiter: Arc<RateLimiterStore>,
        scrollback_cap: usize,
        allow_multiplexer: bool,
    ) -> Result<(Self, CertificateDer<'static>, PrivateKeyDer<'static>)> {
        let (cert, key_pair) = generate_cert_with_keypair()?;

        let key_der = key_pair.serialize_der();
        let key_for_config = PrivateKeyDer::Pkcs8(key_der.clone().into());
        let key_for_return = PrivateKeyDer::Pkcs8(key_der.into());

        let cert_vec = vec![cert.clone()];
        let cfg = termbroker_core::transport::configure_server(cert_vec, key_for_config)
            .context("Failed to configure server")?;

        let socket = std::net::UdpSocket::bind(bind_addr)
            .context("Failed to bind UDP socket")?;

        let runtime = Arc::new(TokioRuntime);
        let endpoint = Endpoint::new(Default::default(), Some(cfg), socket, runtime)
            .context("Failed to create QUIC endpoint")?;

        tracing::info!("QUIC server listening on {}", bind_addr);

        let registry = Registry::with_multiplexer(scrollback_cap, allow_multiplexer);

        Ok((
            Self {
                endpoint,
                coordinator: Arc::new(Coordinator::new(registry)),
                token_store,
                rate_limiter,
                shutdown_tx: None,
            },
            cert,
            key_for_return,
        ))
    }

    /// Run server (accepts connections indefinitely)
    pub async fn run(&mut self) -> Result<()> {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        let token_store = Arc::clone(&self.token_store);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(3600));
            loop {
                interval.tick().await;
                let cleaned = token_store.cleanup_expired().await;
                if cleaned > 0 {
                    tracing::info!("Cleaned {} expired tokens", cleaned);
                }
            }
        });

        loop {
            tokio::select! {
                incoming = self.endpoint.accept() => {
                    match incoming {
                        Some(incoming) => {
                            let coordinator = Arc::clone(&self.coordinator);
                            let token_store = Arc::clone(&self.token_store);
                            let rate_limiter = Arc::clone(&self.rate_limiter);
                            tokio::spawn(async move {
                                if let Err(e) = Self::handle_connection(incoming, coordinator, token_store, rate_limiter).await {
                                    tracing::error!("Connection error: {}", e);
                                }
                            });
                        }
                        None => {
                            tracing::warn!("Endpoint closed");
                            break;
                        }
                    }
                }
                _ = &mut shutdown_rx => {
                    tracing::info!("Shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }

    async fn handle_connection(
        incoming: quinn::Incoming,
        coordinator: Arc<Coordinator>,
        token_store: Arc<TokenStore>,
        rate_limiter: Arc<RateLimiterStore>,
    ) -> Result<()> {
        let connecting = incoming.accept()?;
        let connection = connecting.await?;

        let remote_addr = connection.remote_address();
        tracing::info!("Connection from {}", remote_addr);

        loop {
            match connection.accept_bi().await {
                Ok((send, recv)) => {
                    let coordinator = Arc::clone(&coordinator);
                    let token_store = Arc::clone(&token_store);
                    let rate_limiter = Arc::clone(&rate_limiter);
                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_stream(send, recv, coordinator, token_store, rate_limiter, remote_addr).await {
                            tracing::error!("Stream error: {}", e);
                        }
                    });
                }
                Err(quinn::ConnectionError::ApplicationClosed(_)) | Err(quinn::ConnectionError::LocallyClosed) => {
                    tracing::info!("Connection closed");
                    break;
                }
                Err(e) => {
                    tracing::error!("Accept stream error: {}", e);
                    break;
                }
            }
        }

        Ok(())
    }

    /// Handle a single bi-directional stream: one connection's worth of
    /// multiplexer operations, with a background pump per attached window
    /// fanning `Output`/`WindowExited`/`SlowConsumerEvicted` back over the
    /// same stream (serialized through `send_shared`).
    async fn handle_stream(
        send: quinn::SendStream,
        mut recv: quinn::RecvStream,
        coordinator: Arc<Coordinator>,
        token_store: Arc<TokenStore>,
        rate_limiter: Arc<RateLimiterStore>,
        peer_addr: SocketAddr,
    ) -> Result<()> {
        let mut authenticated = false;
        let send_shared = Arc::new(Mutex::new(send));
        // (window_id, sub_id) -> pump task, so we can detach cleanly on disconnect.
        let mut attachments: HashMap<(String, u64), tokio::task::JoinHandle<()>> = HashMap::new();

        let mut len_buf = [0u8; 4];

        loop {
            if recv.read_exact(&mut len_buf).await.is_err() {
                break;
            }

            let len = u32::from_be_bytes(len_buf) as usize;
            if len > 16 * 1024 * 1024 {
                tracing::error!("Message too large: {} bytes", len);
                break;
            }

            let mut payload = vec![0u8; len];
            if recv.read_exact(&mut payload).await.is_err() {
                break;
            }

            let mut full_buffer = Vec::with_capacity(4 + len);
            full_buffer.extend_from_slice(&len_buf);
            full_buffer.extend_from_slice(&payload);

            let msg = match MessageCodec::decode(&full_buffer) {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::error!("Failed to decode message: {}", e);
                    continue;
                }
            };

            match msg {
                NetworkMessage::Hello { ref protocol_version, ref app_version, auth_token, .. } => {
                    tracing::info!("Client hello protocol_version={}, app_version={}", protocol_version, app_version);

                    let token_valid = if let Some(token) = auth_token {
                        token_store.validate(&token).await
                    } else {
                        tracing::warn!("No auth token provided from {}", peer_addr);
                        false
                    };

                    if !token_valid {
                        tracing::warn!("Auth failed for IP: {}", peer_addr);
                        let _ = rate_limiter.record_auth_failure(peer_addr.ip()).await;
                        let mut send_lock = send_shared.lock().await;
                        let _ = Self::send_message(&mut send_lock, &NetworkMessage::hello(None)).await;
                        break;
                    }

                    rate_limiter.reset_auth_failures(peer_addr.ip()).await;
                    authenticated = true;
                    tracing::info!("Client authenticated: {}", peer_addr);

                    if let Err(e) = msg.validate_handshake() {
                        tracing::error!("Handshake validation failed: {}", e);
                        let mut send_lock = send_shared.lock().await;
                        let _ = Self::send_message(&mut send_lock, &NetworkMessage::hello(None)).await;
                        break;
                    }

                    let response = NetworkMessage::hello(None);
                    let mut send_lock = send_shared.lock().await;
                    Self::send_message(&mut send_lock, &response).await?;
                }
                NetworkMessage::Create { project_path, cwd, shell, env, cols, rows, label, prefer_multiplexed } => {
                    if !authenticated {
                        tracing::warn!("Create received before authentication from {}", peer_addr);
                        break;
                    }
                    let spec = CreateSpec {
                        shell,
                        cwd,
                        env,
                        cols,
                        rows,
                        project_path,
                        label,
                        prefer_multiplexed,
                        sb_cap: None,
                    };
                    match coordinator.create(spec).await {
                        Ok(window) => {
                            let mut send_lock = send_shared.lock().await;
                            Self::send_message(&mut send_lock, &NetworkMessage::Created { window }).await?;
                        }
                        Err(e) => {
                            tracing::error!("Failed to create window: {}", e);
                            let mut send_lock = send_shared.lock().await;
                            let _ = Self::send_message(&mut send_lock, &NetworkMessage::Error { message: e.to_string() }).await;
                        }
                    }
                }
                NetworkMessage::Attach { window_id, cols, rows } => {
                    if !authenticated {
                        tracing::warn!("Attach received before authentication from {}", peer_addr);
                        break;
                    }
                    let Ok(id) = WindowId::parse(&window_id) else {
                        let mut send_lock = send_shared.lock().await;
                        let _ = Self::send_message(&mut send_lock, &NetworkMessage::Error { message: format!("invalid window id: {}", window_id) }).await;
                        continue;
                    };
                    match coordinator.attach(&id, cols, rows).await {
                        Ok((sub_id, rx)) => {
                            {
                                let mut send_lock = send_shared.lock().await;
                                Self::send_message(&mut send_lock, &NetworkMessage::Attached { window_id: window_id.clone(), sub_id }).await?;
                            }
                            let send_clone = send_shared.clone();
                            let wid = window_id.clone();
                            let task = tokio::spawn(async move {
                                let mut send_lock = send_clone.lock().await;
                                if let Err(e) = pump_fanout_to_quic(wid, rx, &mut send_lock).await {
                                    tracing::debug!("fanout pump ended: {}", e);
                                }
                            });
                            attachments.insert((window_id, sub_id), task);
                        }
                        Err(e) => {
                            tracing::error!("Failed to attach to {}: {}", window_id, e);
                            let mut send_lock = send_shared.lock().await;
                            let _ = Self::send_message(&mut send_lock, &NetworkMessage::Error { message: e.to_string() }).await;
                        }
                    }
                }
                NetworkMessage::Detach { window_id, sub_id } => {
                    if let Ok(id) = WindowId::parse(&window_id) {
                        let _ = coordinator.detach(&id, sub_id).await;
                    }
                    if let Some(task) = attachments.remove(&(window_id, sub_id)) {
                        task.abort();
                    }
                }
                NetworkMessage::Write { window_id, data } => {
                    if !authenticated {
                        tracing::warn!("Write received before authentication from {}", peer_addr);
                        break;
                    }
                    if let Ok(id) = WindowId::parse(&window_id) {
                        if let Err(e) = coordinator.write(&id, &data).await {
                            tracing::debug!("write to {} failed: {}", window_id, e);
                        }
                    }
                }
                NetworkMessage::Resize { window_id, cols, rows } => {
                    if let Ok(id) = WindowId::parse(&window_id) {
                        if let Err(e) = coordinator.resize(&id, cols, rows).await {
                            tracing::debug!("resize of {} failed: {}", window_id, e);
                        }
                    }
                }
                NetworkMessage::Kill { window_id } => {
                    if let Ok(id) = WindowId::parse(&window_id) {
                        let _ = coordinator.kill(&id).await;
                    }
                }
                NetworkMessage::List { project_path } => {
                    let windows = coordinator.list(project_path.as_deref()).await;
                    let mut send_lock = send_shared.lock().await;
                    Self::send_message(&mut send_lock, &NetworkMessage::Windows { windows }).await?;
                }
                NetworkMessage::Ping { timestamp } => {
                    let response = NetworkMessage::pong(timestamp);
                    let mut send_lock = send_shared.lock().await;
                    Self::send_message(&mut send_lock, &response).await?;
                }
                NetworkMessage::Close => {
                    tracing::info!("Received Close message");
                    break;
                }
                other => {
                    tracing::warn!("Unhandled message on control stream: {:?}", other);
                }
            }
        }

        for (_, task) in attachments {
            task.abort();
        }

        Ok(())
    }

    /// Send message to stream
    async fn send_message(
        send: &mut quinn::SendStream,
        msg: &NetworkMessage,
    ) -> Result<()> {
        let encoded = MessageCodec::encode(msg)?;
        send.write_all(&encoded).await?;
        Ok(())
    }

    /// Get the shared coordinator
    pub fn coordinator(&self) -> Arc<Coordinator> {
        Arc::clone(&self.coordinator)
    }

    /// Shutdown server
    #[allow(dead_code)]
    pub async fn shutdown(self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx {
            let _ = tx.send(());
        }
        self.endpoint.close(0u32.into(), b"Server shutdown");
        Ok(())
    }
}

/// Generate self-signed TLS certificate with keypair
fn generate_cert_with_keypair() -> Result<(CertificateDer<'static>, KeyPair)> {
    let cert = rcgen::generate_simple_self_signed(vec!["Termbroker".to_string()])
        .context("Failed to generate certificate")?;

    Ok((
        CertificateDer::from(cert.cert.der().to_vec()),
        cert.key_pair,
    ))
}
