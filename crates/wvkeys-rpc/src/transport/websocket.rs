//! WebSocket binding: one duplex socket, replies matched on `req_id`.

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{info, warn};

use super::Transport;
use crate::config::{RpcConfig, TransportKind};
use crate::dispatch::{Dispatcher, InboundMessage};
use crate::envelope::RequestEnvelope;
use crate::error::TransportError;
use crate::registry::CorrelationId;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WebSocketTransport {
    sink: Mutex<SplitSink<Socket, Message>>,
    dispatcher: Dispatcher,
    inbound: JoinHandle<()>,
}

/// The request frame as sent on the socket, tagged with its `req_id`.
fn request_text(envelope: &RequestEnvelope) -> Result<String, TransportError> {
    let frame = envelope
        .frame()
        .with_req_id(envelope.correlation_id.as_str());
    Ok(serde_json::to_string(&frame)?)
}

impl WebSocketTransport {
    pub async fn connect(
        config: &RpcConfig,
        dispatcher: Dispatcher,
    ) -> Result<Self, TransportError> {
        info!(uri = %config.transport_uri, "Connecting to WebSocket server");
        let (socket, _response) = tokio_tungstenite::connect_async(config.transport_uri.as_str())
            .await
            .map_err(|e| TransportError::Connection(format!("Failed to connect: {}", e)))?;

        let (sink, mut stream) = socket.split();
        let loop_dispatcher = dispatcher.clone();
        let inbound = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        loop_dispatcher.dispatch(InboundMessage::new(text.into_bytes()));
                    }
                    Ok(Message::Binary(data)) => {
                        loop_dispatcher.dispatch(InboundMessage::new(data));
                    }
                    Ok(Message::Close(reason)) => {
                        info!(reason = ?reason, "WebSocket closed by server");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "WebSocket receive failed");
                        break;
                    }
                }
            }
            warn!("WebSocket inbound loop ended");
            loop_dispatcher.close();
        });

        info!("Successfully connected to WebSocket server");
        Ok(Self {
            sink: Mutex::new(sink),
            dispatcher,
            inbound,
        })
    }
}

impl Transport for WebSocketTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }

    async fn open_reply(&self, _id: &CorrelationId) -> Result<Option<String>, TransportError> {
        if self.dispatcher.is_closed() {
            return Err(TransportError::Closed);
        }
        Ok(None)
    }

    async fn send(&self, envelope: &RequestEnvelope) -> Result<(), TransportError> {
        if self.dispatcher.is_closed() {
            return Err(TransportError::Closed);
        }
        let text = request_text(envelope)?;
        self.sink
            .lock()
            .await
            .send(Message::text(text))
            .await
            .map_err(|e| match e {
                tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                    TransportError::Closed
                }
                other => TransportError::Send(format!("Failed to send frame: {}", other)),
            })
    }

    async fn close_reply(&self, _id: &CorrelationId) -> Result<(), TransportError> {
        Ok(())
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.inbound.abort();
    }
}
