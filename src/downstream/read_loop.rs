use futures::{Stream, StreamExt};
use riden_gateway::Envelope;
use std::sync::Arc;
use tokio::sync::{Notify, mpsc};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, error, info, warn};

use crate::downstream::link::SessionEnd;
use crate::error::{DecodeError, FrameError};
use crate::message::{ClientData, Direction, MessageKind, peek_kind};
use crate::relay::{RelayItem, RelayTable};
use crate::tripwire::Tripwire;

/// Reads frames from the gateway and relays client messages by kind.
pub(crate) struct ReadLoop<S> {
    pub stream: S,
    pub relays: Arc<RelayTable>,
    /// Control frames the write loop should send back.
    pub control: mpsc::Sender<Message>,
    pub pong: Arc<Notify>,
    pub close: Tripwire<SessionEnd>,
}

impl<S> ReadLoop<S>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    /// Read until the session closes or the connection fails.
    ///
    /// A failed read ends the session; everything else is handled in place.
    pub async fn run(mut self) {
        loop {
            let frame = tokio::select! {
                _ = self.close.tripped() => return,
                frame = self.stream.next() => frame,
            };

            match frame {
                Some(Ok(Message::Text(text))) => match relay_frame(&text, &self.relays) {
                    Ok(kind) => debug!(kind = %kind, "Relayed client message"),
                    Err(FrameError::Decode(e)) => {
                        warn!(error = %e, frame = ?text, "Dropping undecodable frame");
                    }
                    Err(FrameError::Dispatch(e)) => {
                        error!(error = %e, "Failed to relay client message");
                    }
                },
                Some(Ok(Message::Binary(_))) => {
                    warn!("Binary frame from gateway, sending close 1003");
                    let frame = CloseFrame {
                        code: CloseCode::Unsupported,
                        reason: "Binary data not supported".into(),
                    };
                    if self.control.try_send(Message::Close(Some(frame))).is_err() {
                        warn!("Could not queue close frame");
                    }
                }
                Some(Ok(Message::Pong(_))) => self.pong.notify_one(),
                Some(Ok(Message::Close(frame))) => {
                    info!(frame = ?frame, "Gateway sent close");
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    self.close.trip(SessionEnd::ReadFailed(e.to_string()));
                    return;
                }
                None => {
                    self.close.trip(SessionEnd::PeerClosed);
                    return;
                }
            }
        }
    }
}

/// Decode one text frame and place it on the relay channel for its kind.
///
/// Only the kind is read from the payload here. The sender's connection name
/// travels with it so replies can find their way back.
pub(crate) fn relay_frame(text: &str, relays: &RelayTable) -> Result<MessageKind, FrameError> {
    let envelope = Envelope::from_json(text).map_err(DecodeError::from)?;
    let kind = peek_kind(&envelope.message_bytes)?;
    if kind.direction() != Direction::ToLogic {
        return Err(DecodeError::WrongDirection(kind).into());
    }

    relays.dispatch(
        kind,
        RelayItem {
            client: ClientData::websocket(envelope.client_conn_name),
            payload: envelope.message_bytes,
        },
    )?;
    Ok(kind)
}
