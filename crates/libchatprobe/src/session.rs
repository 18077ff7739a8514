use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chatprobe_protocol::{ChatEndpoint, Inbound, MalformedMessage, OutboundEnvelope};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::classifier::{BacklogClassifier, Classification, Phase};
use crate::error::SessionError;
use crate::report::{Direction, Initiator, RecordSink, Reporter, SessionEvent};
use crate::role::{Participant, Role};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long `disconnect` waits for the socket task before aborting it.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        })
    }
}

/// Snapshot of a client, published on every change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub connection: ConnectionState,
    pub phase: Phase,
    pub backlog_count: usize,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            phase: Phase::LoadingBacklog,
            backlog_count: 0,
        }
    }
}

enum Outbound {
    Text(String),
    Close,
}

/// Handle to the task that owns an open socket.
struct Link {
    outbound: mpsc::UnboundedSender<Outbound>,
    task: JoinHandle<()>,
}

/// One role's connection to the chat socket of one order.
///
/// The socket itself lives in a spawned task; this handle queues outbound
/// frames to it and observes its state through a watch channel. Dropping the
/// client closes the socket.
pub struct SessionClient {
    participant: Participant,
    endpoint: ChatEndpoint,
    settle: Duration,
    reporter: Reporter,
    status: Arc<watch::Sender<SessionStatus>>,
    link: Option<Link>,
}

impl SessionClient {
    pub fn new(
        participant: Participant,
        endpoint: ChatEndpoint,
        settle: Duration,
        sink: &RecordSink,
    ) -> Self {
        let reporter = sink.reporter(participant.role, participant.style.clone());
        let (status, _) = watch::channel(SessionStatus::default());
        Self {
            participant,
            endpoint,
            settle,
            reporter,
            status: Arc::new(status),
            link: None,
        }
    }

    pub fn role(&self) -> Role {
        self.participant.role
    }

    pub fn participant(&self) -> &Participant {
        &self.participant
    }

    pub fn endpoint(&self) -> &ChatEndpoint {
        &self.endpoint
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    /// Follow status changes, e.g. to wait for the backlog to settle.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.status().connection == ConnectionState::Connected
    }

    /// Open the socket. Resolves once the handshake completes; the history
    /// burst is consumed in the background afterwards.
    pub async fn connect(&mut self) -> Result<(), SessionError> {
        let role = self.role();
        let state = self.status().connection;
        if state != ConnectionState::Disconnected {
            return Err(SessionError::AlreadyActive { role, state });
        }

        // Left over from a close the server initiated.
        self.link = None;

        self.status
            .send_modify(|s| s.connection = ConnectionState::Connecting);
        self.reporter.emit(SessionEvent::Connecting {
            endpoint: self.endpoint.to_string(),
        });
        let pending = PendingConnect {
            status: Arc::clone(&self.status),
            reporter: self.reporter.clone(),
            armed: true,
        };

        let url = self.endpoint.with_token(self.participant.credential.expose());
        let result = connect_async(url.as_str()).await;
        pending.disarm();

        let ws = match result {
            Ok((ws, _)) => ws,
            Err(e) => {
                self.status.send_replace(SessionStatus::default());
                self.reporter.emit(SessionEvent::ConnectFailed {
                    error: e.to_string(),
                });
                return Err(SessionError::Connection {
                    role,
                    source: Box::new(e),
                });
            }
        };

        self.status.send_replace(SessionStatus {
            connection: ConnectionState::Connected,
            phase: Phase::LoadingBacklog,
            backlog_count: 0,
        });
        self.reporter.emit(SessionEvent::Connected);
        tracing::info!(%role, endpoint = %self.endpoint, "chat socket open");

        let (tx, rx) = mpsc::unbounded_channel();
        let pump = Pump {
            participant: self.participant.clone(),
            reporter: self.reporter.clone(),
            status: Arc::clone(&self.status),
            classifier: BacklogClassifier::new(self.settle),
        };
        let task = tokio::spawn(pump.run(ws, rx));
        self.link = Some(Link { outbound: tx, task });
        Ok(())
    }

    /// Queue `{"message": text}` for transmission. Does not wait for
    /// delivery; the protocol has no acknowledgement.
    pub fn send(&self, text: &str) -> Result<(), SessionError> {
        let role = self.role();
        let link = match &self.link {
            Some(link) if self.is_connected() => link,
            _ => {
                self.reporter.emit(SessionEvent::NotConnected);
                return Err(SessionError::NotConnected { role });
            }
        };

        let json = OutboundEnvelope::new(text).to_json()?;
        if link.outbound.send(Outbound::Text(json)).is_err() {
            self.reporter.emit(SessionEvent::NotConnected);
            return Err(SessionError::NotConnected { role });
        }

        self.reporter.emit(SessionEvent::Sent {
            text: text.to_string(),
        });
        Ok(())
    }

    /// Close the socket if one is open or opening. Repeated calls are no-ops.
    pub async fn disconnect(&mut self) {
        match self.link.take() {
            Some(mut link) => {
                // Fails only if the task already ended on its own.
                let _ = link.outbound.send(Outbound::Close);
                if timeout(CLOSE_GRACE, &mut link.task).await.is_err() {
                    tracing::warn!(role = %self.role(), "socket task did not stop, aborting");
                    link.task.abort();
                    self.mark_closed_locally();
                }
            }
            None => self.mark_closed_locally(),
        }
    }

    fn mark_closed_locally(&self) {
        let was_open = self.status.send_if_modified(|s| {
            let changed = s.connection != ConnectionState::Disconnected;
            *s = SessionStatus::default();
            changed
        });
        if was_open {
            self.reporter.emit(SessionEvent::Disconnected {
                code: None,
                reason: None,
                initiator: Initiator::Local,
            });
        }
    }
}

/// Puts the client back to `Disconnected` if a `connect` future is dropped
/// before the handshake resolves.
struct PendingConnect {
    status: Arc<watch::Sender<SessionStatus>>,
    reporter: Reporter,
    armed: bool,
}

impl PendingConnect {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingConnect {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.status.send_replace(SessionStatus::default());
        self.reporter.emit(SessionEvent::ConnectFailed {
            error: "connect cancelled".to_string(),
        });
    }
}

struct CloseInfo {
    code: Option<u16>,
    reason: Option<String>,
    initiator: Initiator,
}

impl CloseInfo {
    fn remote(frame: Option<CloseFrame>) -> Self {
        let (code, reason) = match frame {
            Some(frame) => {
                let reason = frame.reason.as_str();
                let reason = (!reason.is_empty()).then(|| reason.to_string());
                (Some(u16::from(frame.code)), reason)
            }
            None => (None, None),
        };
        Self {
            code,
            reason,
            initiator: Initiator::Remote,
        }
    }
}

/// Socket-side state of one connection. Every event is handled to completion
/// before the next one is looked at.
struct Pump {
    participant: Participant,
    reporter: Reporter,
    status: Arc<watch::Sender<SessionStatus>>,
    classifier: BacklogClassifier,
}

impl Pump {
    async fn run(mut self, ws: WsStream, mut outbound: mpsc::UnboundedReceiver<Outbound>) {
        let (mut sink, mut stream) = ws.split();

        let close = loop {
            let deadline = self.classifier.deadline();

            tokio::select! {
                biased;

                cmd = outbound.recv() => match cmd {
                    Some(Outbound::Text(json)) => {
                        if let Err(e) = sink.send(Message::Text(json.into())).await {
                            self.reporter.emit(SessionEvent::TransportError {
                                error: e.to_string(),
                            });
                            break CloseInfo::remote(None);
                        }
                    }
                    // A dropped client closes like an explicit disconnect.
                    Some(Outbound::Close) | None => {
                        let frame = CloseFrame {
                            code: CloseCode::Normal,
                            reason: "".into(),
                        };
                        let _ = sink.send(Message::Close(Some(frame))).await;
                        break CloseInfo {
                            code: Some(u16::from(CloseCode::Normal)),
                            reason: None,
                            initiator: Initiator::Local,
                        };
                    }
                },

                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.on_frame(Inbound::parse(text.as_str())),
                    Some(Ok(Message::Binary(bytes))) => self.on_frame(Inbound::parse_bytes(&bytes)),
                    Some(Ok(Message::Close(frame))) => break CloseInfo::remote(frame),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        self.reporter.emit(SessionEvent::TransportError {
                            error: e.to_string(),
                        });
                        break CloseInfo::remote(None);
                    }
                    None => break CloseInfo::remote(None),
                },

                () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.on_settle_timer();
                }
            }
        };

        // History and phase belong to the connection that just ended.
        self.status.send_replace(SessionStatus::default());
        self.reporter.emit(SessionEvent::Disconnected {
            code: close.code,
            reason: close.reason,
            initiator: close.initiator,
        });
        tracing::info!(role = %self.participant.role, "chat socket closed");
    }

    fn on_frame(&mut self, parsed: Result<Inbound, MalformedMessage>) {
        match parsed {
            Ok(Inbound::Chat(message)) => {
                let classification = self.classifier.classify(Instant::now());
                if classification == Classification::Backlog {
                    let count = self.classifier.backlog_count();
                    self.status.send_modify(|s| s.backlog_count = count);
                }
                let direction = if self.participant.authored(&message.sender_type) {
                    Direction::Sent
                } else {
                    Direction::Received
                };
                self.reporter.emit(SessionEvent::Message {
                    direction,
                    classification,
                    message,
                });
            }
            Ok(Inbound::Error(text)) => {
                self.reporter.emit(SessionEvent::ServerError { text });
            }
            Err(e) => {
                self.reporter.emit(SessionEvent::Malformed {
                    error: e.to_string(),
                });
            }
        }
    }

    fn on_settle_timer(&mut self) {
        if let Some(count) = self.classifier.settle(Instant::now()) {
            let phase = self.classifier.phase();
            self.status.send_modify(|s| s.phase = phase);
            self.reporter.emit(SessionEvent::BacklogSettled { count });
        }
    }
}
