use futures::{Sink, SinkExt};
use riden_gateway::Envelope;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, mpsc};
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, trace, warn};

use crate::downstream::link::SessionEnd;
use crate::tripwire::Tripwire;

/// Writes to the gateway: outbound envelopes, control frames, and keep-alive
/// pings.
///
/// Write failures are logged and the loop carries on. A dead connection is
/// noticed by the read loop or by the keep-alive expiring.
pub(crate) struct WriteLoop<K> {
    pub sink: K,
    pub outbound: mpsc::Receiver<Envelope>,
    pub control: mpsc::Receiver<Message>,
    pub pong: Arc<Notify>,
    pub close: Tripwire<SessionEnd>,
    pub keep_alive_period: Duration,
    pub keep_alive_expiry: Duration,
    pub close_write_timeout: Duration,
}

impl<K> WriteLoop<K>
where
    K: Sink<Message> + Unpin,
    K::Error: Display,
{
    pub async fn run(mut self) {
        let start = Instant::now() + self.keep_alive_period;
        let mut ticker = interval_at(start, self.keep_alive_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut expiry: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = self.close.tripped() => {
                    self.send_going_away().await;
                    return;
                }
                _ = ticker.tick() => {
                    trace!("Sending keep-alive ping");
                    self.write(Message::Ping(Vec::new())).await;
                    if expiry.is_none() {
                        expiry = Some(Instant::now() + self.keep_alive_expiry);
                    }
                }
                _ = self.pong.notified() => {
                    trace!("Keep-alive pong");
                    expiry = None;
                }
                _ = wait_until(expiry) => {
                    warn!("No pong before keep-alive expired, reconnecting");
                    expiry = None;
                    self.close.trip(SessionEnd::KeepAliveExpired);
                }
                Some(frame) = self.control.recv() => {
                    self.write(frame).await;
                }
                Some(envelope) = self.outbound.recv() => {
                    match envelope.to_json() {
                        Ok(text) => {
                            debug!(conn = %envelope.client_conn_name, "Writing envelope to gateway");
                            self.write(Message::Text(text)).await;
                        }
                        Err(e) => warn!(error = %e, "Failed to encode envelope"),
                    }
                }
            }
        }
    }

    async fn write(&mut self, frame: Message) {
        if let Err(e) = self.sink.send(frame).await {
            warn!(error = %e, "Failed to write to gateway");
        }
    }

    /// Tell the gateway we are going away, without waiting long for it.
    async fn send_going_away(&mut self) {
        let frame = Message::Close(Some(CloseFrame {
            code: CloseCode::Away,
            reason: "".into(),
        }));
        match timeout(self.close_write_timeout, self.sink.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "Could not send close frame"),
            Err(_) => debug!("Timed out sending close frame"),
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use futures::channel::mpsc as fmpsc;

    struct Harness {
        frames: fmpsc::UnboundedReceiver<Message>,
        outbound: mpsc::Sender<Envelope>,
        _control: mpsc::Sender<Message>,
        pong: Arc<Notify>,
        close: Tripwire<SessionEnd>,
        task: tokio::task::JoinHandle<()>,
    }

    fn start() -> Harness {
        let (sink, frames) = fmpsc::unbounded();
        let (outbound, outbound_rx) = mpsc::channel(8);
        let (control, control_rx) = mpsc::channel(8);
        let pong = Arc::new(Notify::new());
        let close = Tripwire::new();
        let task = tokio::spawn(
            WriteLoop {
                sink,
                outbound: outbound_rx,
                control: control_rx,
                pong: Arc::clone(&pong),
                close: close.clone(),
                keep_alive_period: Duration::from_secs(60),
                keep_alive_expiry: Duration::from_secs(59),
                close_write_timeout: Duration::from_secs(5),
            }
            .run(),
        );
        Harness {
            frames,
            outbound,
            _control: control,
            pong,
            close,
            task,
        }
    }

    #[tokio::test]
    async fn test_envelopes_written_as_text() {
        let mut h = start();
        h.outbound
            .send(Envelope::new("c", &br#"{"MessageType":"ack"}"#[..]))
            .await
            .unwrap();

        let Some(Message::Text(text)) = h.frames.next().await else {
            panic!("expected a text frame");
        };
        let envelope = Envelope::from_json(&text).unwrap();
        assert_eq!(envelope.client_conn_name, "c");
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_pong_expires_session() {
        let mut h = start();

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(h.frames.next().await, Some(Message::Ping(Vec::new())));
        assert!(!h.close.is_tripped());

        let end = h.close.tripped().await;
        assert_eq!(end, SessionEnd::KeepAliveExpired);

        let Some(Message::Close(Some(frame))) = h.frames.next().await else {
            panic!("expected a going-away close frame");
        };
        assert_eq!(frame.code, CloseCode::Away);
        h.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_pong_cancels_expiry() {
        let mut h = start();

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(h.frames.next().await, Some(Message::Ping(Vec::new())));
        h.pong.notify_one();

        tokio::time::sleep(Duration::from_secs(58)).await;
        assert!(!h.close.is_tripped());
        assert_eq!(h.frames.next().await, Some(Message::Ping(Vec::new())));
        assert!(!h.close.is_tripped());
    }

    #[tokio::test]
    async fn test_close_sends_going_away() {
        let mut h = start();
        h.close.trip(SessionEnd::Shutdown);
        h.task.await.unwrap();

        let Some(Message::Close(Some(frame))) = h.frames.next().await else {
            panic!("expected a going-away close frame");
        };
        assert_eq!(frame.code, CloseCode::Away);
    }
}
