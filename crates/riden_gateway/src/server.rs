use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::control::{ControlHandle, ControlSlot};
use crate::envelope::Envelope;
use crate::error::{ForwardError, GatewayError};
use crate::registry::{ClientRegistry, ClientRoute};

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsStream = SplitStream<WebSocketStream<TcpStream>>;

/// Which side of the gateway a connection belongs to, decided at upgrade time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Control,
    Client,
}

/// The client-facing WebSocket gateway.
///
/// Terminates one WebSocket per API client plus the single adapter control
/// connection, and fans messages out by connection name.
pub struct Gateway {
    config: GatewayConfig,
    registry: Arc<ClientRegistry>,
    control: Arc<ControlSlot>,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            registry: Arc::new(ClientRegistry::new()),
            control: Arc::new(ControlSlot::new()),
        }
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    pub fn control(&self) -> &Arc<ControlSlot> {
        &self.control
    }

    /// Bind the configured address and serve until the process exits.
    pub async fn run(self) -> Result<(), GatewayError> {
        let addr = self.config.listen_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| GatewayError::Bind { addr, source })?;
        self.serve(listener).await;
        Ok(())
    }

    /// Accept connections from an already bound listener.
    ///
    /// Each connection is handled on its own task; accept errors are logged
    /// and the loop keeps going.
    pub async fn serve(self, listener: TcpListener) {
        let shared = Arc::new(self);

        match listener.local_addr() {
            Ok(addr) => info!(%addr, "Gateway listening"),
            Err(e) => warn!(error = %e, "Gateway listening on unknown address"),
        }

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let gateway = Arc::clone(&shared);
                    tokio::spawn(async move {
                        gateway.handle_connection(stream, peer).await;
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let mut role = None;
        let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            role = Some(self.classify(request.uri().path())?);
            Ok(response)
        };

        let ws = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
            Ok(ws) => ws,
            Err(e) => {
                debug!(%peer, error = %e, "Upgrade refused or failed");
                return;
            }
        };

        match role {
            Some(Role::Control) => self.serve_control(ws, peer).await,
            Some(Role::Client) => self.serve_client(ws, peer).await,
            None => {}
        }
    }

    /// Decide whether to upgrade a request, and in which role.
    fn classify(&self, path: &str) -> Result<Role, ErrorResponse> {
        if path == self.config.adapter_path {
            if let Some(remote) = self.control.remote() {
                info!(%remote, "Adapter already connected, refusing another");
                return Err(reject(StatusCode::TOO_MANY_REQUESTS));
            }
            return Ok(Role::Control);
        }

        if path == self.config.client_path {
            if !self.control.is_connected() {
                info!("Adapter is not connected, refusing client");
                return Err(reject(StatusCode::INTERNAL_SERVER_ERROR));
            }
            return Ok(Role::Client);
        }

        Err(reject(StatusCode::NOT_FOUND))
    }

    async fn serve_control(&self, ws: WebSocketStream<TcpStream>, peer: SocketAddr) {
        let (tx, rx) = mpsc::channel(self.config.control_queue_capacity);
        let guard = match self.control.claim(ControlHandle::new(tx.clone(), peer)) {
            Ok(guard) => guard,
            Err(e) => {
                warn!(%peer, error = %e, "Lost the race for the control connection");
                let mut ws = ws;
                let _ = ws
                    .close(Some(close_frame(CloseCode::Policy, "Adapter already connected")))
                    .await;
                return;
            }
        };
        info!(%peer, "Adapter connected");

        let (sink, stream) = ws.split();
        let writer = tokio::spawn(write_loop(sink, rx, peer));

        read_control(stream, tx, &self.registry, peer).await;

        // Freeing the slot drops the last queue sender, which ends the writer.
        drop(guard);
        let _ = writer.await;
        info!(%peer, "Adapter disconnected");
    }

    async fn serve_client(&self, ws: WebSocketStream<TcpStream>, peer: SocketAddr) {
        let name = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(self.config.client_queue_capacity);
        let guard = match self.registry.register(&name, ClientRoute::new(tx.clone(), peer)) {
            Ok(guard) => guard,
            Err(e) => {
                error!(%peer, error = %e, "Failed to register client");
                return;
            }
        };
        info!(%peer, conn = %name, "Client connected");

        let (sink, stream) = ws.split();
        let writer = tokio::spawn(write_loop(sink, rx, peer));

        read_client(stream, tx, &name, &self.control, &self.registry, peer).await;

        drop(guard);
        let _ = writer.await;
        info!(%peer, conn = %name, "Client disconnected");
    }
}

/// Reads envelopes from the adapter and fans them out to clients.
async fn read_control(
    mut stream: WsStream,
    reply: mpsc::Sender<Message>,
    registry: &ClientRegistry,
    peer: SocketAddr,
) {
    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(_)) => {
                warn!(%peer, "Binary frame from adapter, sending close 1003");
                send_close(&reply, CloseCode::Unsupported, "Binary data not supported");
                continue;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!(%peer, error = %e, "Adapter read failed");
                break;
            }
        };

        let envelope = match Envelope::from_json(&text) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(%peer, error = %e, frame = ?text, "Dropping malformed envelope");
                continue;
            }
        };
        debug!(conn = %envelope.client_conn_name, "Envelope from adapter");

        if envelope.is_broadcast() {
            match registry.broadcast(&envelope.message_bytes) {
                Ok(delivered) => debug!(delivered, "Broadcast queued"),
                Err(e) => error!(error = %e, "Dropping broadcast"),
            }
        } else if let Err(e) = registry.unicast(&envelope.client_conn_name, &envelope.message_bytes)
        {
            error!(
                conn = %envelope.client_conn_name,
                error = %e,
                "Could not deliver message to client"
            );
        }
    }
}

/// Reads API messages from one client and forwards them to the adapter.
///
/// If the adapter has gone away, the client is told with close 1011 and its
/// route is invalidated, so a reconnecting adapter cannot write to it.
async fn read_client(
    mut stream: WsStream,
    reply: mpsc::Sender<Message>,
    name: &str,
    control: &ControlSlot,
    registry: &ClientRegistry,
    peer: SocketAddr,
) {
    let mut adapter_lost = false;

    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(_)) => {
                warn!(%peer, conn = %name, "Binary frame from client, sending close 1003");
                send_close(&reply, CloseCode::Unsupported, "Binary data not supported");
                continue;
            }
            Ok(_) => continue,
            Err(e) => {
                debug!(%peer, conn = %name, error = %e, "Client read failed");
                break;
            }
        };

        if adapter_lost {
            send_close(&reply, CloseCode::Error, "Server encountered an unexpected error");
            continue;
        }

        debug!(conn = %name, payload = ?text, "Message from client");
        let envelope = Envelope::new(name, Bytes::from(text.into_bytes()));
        match control.forward(&envelope) {
            Ok(()) => {}
            Err(ForwardError::NotConnected) => {
                error!(conn = %name, "Adapter connection lost, closing client with 1011");
                send_close(&reply, CloseCode::Error, "Server encountered an unexpected error");
                registry.invalidate(name);
                adapter_lost = true;
            }
            Err(e) => {
                error!(conn = %name, error = %e, "Dropping client message");
            }
        }
    }
}

async fn write_loop(mut sink: WsSink, mut queue: mpsc::Receiver<Message>, peer: SocketAddr) {
    while let Some(frame) = queue.recv().await {
        if let Err(e) = sink.send(frame).await {
            warn!(%peer, error = %e, "Failed to write frame");
        }
    }
    let _ = sink.close().await;
}

fn send_close(reply: &mpsc::Sender<Message>, code: CloseCode, reason: &'static str) {
    if reply.try_send(Message::Close(Some(close_frame(code, reason)))).is_err() {
        warn!(code = u16::from(code), "Could not queue close frame");
    }
}

fn close_frame(code: CloseCode, reason: &'static str) -> CloseFrame<'static> {
    CloseFrame {
        code,
        reason: reason.into(),
    }
}

fn reject(status: StatusCode) -> ErrorResponse {
    let mut response = ErrorResponse::new(status.canonical_reason().map(str::to_owned));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert("Sec-WebSocket-Version", HeaderValue::from_static("13"));
    response
}
