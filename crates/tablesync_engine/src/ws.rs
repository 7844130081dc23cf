//! WebSocket push connector.

use crate::error::{SyncError, SyncResult};
use crate::transport::{PushConnector, PushStream};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tablesync_protocol::ConnectionInfo;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

/// Opens push channels over WebSocket.
///
/// The sub-protocol from [`ConnectionInfo`] is offered in the
/// `Sec-WebSocket-Protocol` header. Only text frames are delivered; binary,
/// ping and pong frames are skipped and a close frame ends the stream.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    /// Creates a connector.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PushConnector for WebSocketConnector {
    async fn connect(&self, info: &ConnectionInfo) -> SyncResult<PushStream> {
        let mut request = info.url.as_str().into_client_request()?;
        if let Some(protocol) = &info.protocol {
            let value = HeaderValue::from_str(protocol)
                .map_err(|e| SyncError::transport_fatal(format!("invalid sub-protocol: {e}")))?;
            request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
        }

        let (socket, _response) = tokio_tungstenite::connect_async(request).await?;

        let frames = stream::unfold(socket, |mut socket| async move {
            loop {
                match socket.next().await? {
                    Ok(Message::Text(text)) => return Some((Ok(text.to_string()), socket)),
                    Ok(Message::Close(frame)) => {
                        debug!(?frame, "close frame received");
                        return None;
                    }
                    Ok(Message::Binary(data)) => {
                        debug!(bytes = data.len(), "skipping binary frame");
                    }
                    Ok(_) => {}
                    Err(e) => return Some((Err(SyncError::from(e)), socket)),
                }
            }
        });

        Ok(frames.boxed())
    }
}
