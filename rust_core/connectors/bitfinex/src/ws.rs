use std::time::Duration;

use connectors_common::{shutdown_signalled, ConnectorError, ConnectorResult};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::net::TcpStream;
use tokio::sync::{watch, RwLock};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tungstenite::Message;

use crate::messages::StreamMessage;
use crate::source::EXCHANGE;
use crate::state::{ChannelState, Control};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub type WsWrite = SplitSink<WsStream, Message>;
pub type WsRead = SplitStream<WsStream>;

/// Why a read loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Server sent the restart info code.
    Restart,
    /// Peer closed the stream or it failed.
    Closed,
    Shutdown,
}

pub async fn connect(url: &str) -> ConnectorResult<(WsWrite, WsRead)> {
    info!("Connecting to {}", url);
    let (ws_stream, _) = connect_async(url).await.map_err(|e| ConnectorError::Stream(e.to_string()))?;
    Ok(ws_stream.split())
}

pub fn subscribe_frame(pair: &str) -> String {
    serde_json::json!({
        "event": "subscribe",
        "channel": "ticker",
        "pair": pair
    })
    .to_string()
}

pub async fn subscribe_all(write: &mut WsWrite, pairs: &[String]) -> ConnectorResult<()> {
    for pair in pairs {
        write
            .send(Message::Text(subscribe_frame(pair)))
            .await
            .map_err(|e| ConnectorError::Stream(e.to_string()))?;
        debug!("{}: subscribe sent for {}", EXCHANGE, pair);
    }
    Ok(())
}

/// Applies incoming frames to `state` until a restart, a close or shutdown.
pub async fn read_loop(
    read: &mut WsRead,
    write: &mut WsWrite,
    state: &RwLock<ChannelState>,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd {
    loop {
        let msg = tokio::select! {
            _ = shutdown_signalled(shutdown) => return SessionEnd::Shutdown,
            msg = read.next() => msg,
        };
        match msg {
            Some(Ok(Message::Text(txt))) => match StreamMessage::parse(&txt) {
                Ok(parsed) => {
                    if state.write().await.apply(parsed) == Control::Restart {
                        return SessionEnd::Restart;
                    }
                }
                Err(e) => warn!("{}: undecodable frame {:?}: {}", EXCHANGE, txt, e),
            },
            Some(Ok(Message::Ping(payload))) => {
                write.send(Message::Pong(payload)).await.ok();
            }
            Some(Ok(Message::Close(frame))) => {
                warn!("{}: stream closed by server: {:?}", EXCHANGE, frame);
                // pushes out the queued close reply before the halves are dropped
                if let Err(e) = write.flush().await {
                    debug!("{}: close reply not flushed: {}", EXCHANGE, e);
                }
                return SessionEnd::Closed;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!("{}: ws error: {:?}", EXCHANGE, e);
                return SessionEnd::Closed;
            }
            None => {
                warn!("{}: stream ended", EXCHANGE);
                return SessionEnd::Closed;
            }
        }
    }
}

/// Sends a close frame and waits, up to `timeout`, for the peer to finish the handshake.
pub async fn close(write: &mut WsWrite, read: &mut WsRead, timeout: Duration) {
    if let Err(e) = write.send(Message::Close(None)).await {
        debug!("{}: close frame not sent: {}", EXCHANGE, e);
        return;
    }
    let drain = async {
        while let Some(msg) = read.next().await {
            if msg.is_err() {
                break;
            }
        }
    };
    if tokio::time::timeout(timeout, drain).await.is_err() {
        warn!("{}: peer did not confirm close within {:?}", EXCHANGE, timeout);
    }
}
