//! QUIC stream pumps for terminal I/O
//!
//! Bridges a window's Fanout subscriber channel to a QUIC send stream. Quinn's
//! `write_all` backpressure is the only flow control: when the network is
//! slow, the pump task stalls, which simply lets the subscriber's bounded
//! mpsc channel (and the Fanout's slow-consumer eviction) absorb the rest.

use quinn::SendStream;
use tokio::sync::mpsc;

use crate::protocol::MessageCodec;
use crate::terminal::FanoutMsg;
use crate::types::NetworkMessage;
use crate::Result;

/// Drain a window's subscriber channel to a QUIC send stream.
///
/// Terminates when the channel closes (detach, eviction, or window exit),
/// translating `FanoutMsg` into the matching wire messages.
pub async fn pump_fanout_to_quic(
    window_id: String,
    mut rx: mpsc::Receiver<FanoutMsg>,
    send: &mut SendStream,
) -> Result<()> {
    while let Some(msg) = rx.recv().await {
        let wire = match msg {
            FanoutMsg::Chunk(data) => NetworkMessage::Output {
                window_id: window_id.clone(),
                data: data.to_vec(),
            },
            FanoutMsg::Control(crate::terminal::ControlEvent::WindowExited { code, signal }) => {
                NetworkMessage::WindowExited {
                    window_id: window_id.clone(),
                    code,
                    signal,
                }
            }
            FanoutMsg::Control(crate::terminal::ControlEvent::SlowConsumerEvicted {
                dropped_bytes,
            }) => NetworkMessage::SlowConsumerEvicted {
                window_id: window_id.clone(),
                dropped_bytes,
            },
        };
        let encoded = MessageCodec::encode(&wire)?;
        send.write_all(&encoded).await?;
    }

    let _ = send.finish();
    Ok(())
}
