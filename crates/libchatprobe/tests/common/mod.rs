#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chatprobe_protocol::{ChatEndpoint, ChatMessage, OutboundEnvelope};
use chrono::Utc;
use crossterm::style::Color;
use futures_util::{SinkExt, StreamExt};
use libchatprobe::{
    Credential, Participant, Record, RecordReceiver, RecordSink, Role, RoleStyle, SessionClient,
    SessionStatus,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::timeout;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

pub const WAIT: Duration = Duration::from_secs(5);

/// What the mock server saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    Accepted { uri: String },
    Received { sender_type: String, text: String },
}

#[derive(Debug, Clone, Default)]
pub struct MockOptions {
    /// Raw frames written right after the handshake.
    pub history: Vec<String>,
    /// Pause between consecutive history frames.
    pub history_gap: Duration,
    /// Close with this code and reason after the history.
    pub hang_up: Option<(u16, String)>,
    /// Relay every received message to all connections, like the real server.
    pub broadcast: bool,
}

/// Minimal order chat server. The `token` query parameter doubles as the
/// caller's `sender_type`.
pub struct MockChatServer {
    pub addr: SocketAddr,
    pub events: mpsc::UnboundedReceiver<ServerEvent>,
    bus: broadcast::Sender<String>,
}

impl MockChatServer {
    pub async fn start(options: MockOptions) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (events_tx, events) = mpsc::unbounded_channel();
        let (bus, _) = broadcast::channel(64);
        let options = Arc::new(options);

        let accept_bus = bus.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let options = Arc::clone(&options);
                let bus = accept_bus.clone();
                let events = events_tx.clone();
                tokio::spawn(async move {
                    let _ = serve(stream, options, bus, events).await;
                });
            }
        });

        Ok(Self { addr, events, bus })
    }

    pub fn server_url(&self) -> String {
        format!("ws://{}/api/realtime/chat", self.addr)
    }

    pub fn endpoint(&self, session_id: &str) -> ChatEndpoint {
        ChatEndpoint::new(&self.server_url(), session_id).expect("valid mock endpoint")
    }

    /// Write a raw frame to every open connection.
    pub fn push(&self, frame: impl Into<String>) {
        let _ = self.bus.send(frame.into());
    }

    pub async fn next_event(&mut self) -> Result<ServerEvent> {
        timeout(WAIT, self.events.recv())
            .await
            .context("timed out waiting for server event")?
            .context("server event channel closed")
    }

    /// Skip `Accepted` events and return the next received message.
    pub async fn next_received(&mut self) -> Result<(String, String)> {
        loop {
            if let ServerEvent::Received { sender_type, text } = self.next_event().await? {
                return Ok((sender_type, text));
            }
        }
    }
}

async fn serve(
    stream: TcpStream,
    options: Arc<MockOptions>,
    bus: broadcast::Sender<String>,
    events: mpsc::UnboundedSender<ServerEvent>,
) -> Result<()> {
    let (uri_tx, uri_rx) = oneshot::channel();
    let ws = accept_hdr_async(
        stream,
        move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            let _ = uri_tx.send(req.uri().to_string());
            Ok(resp)
        },
    )
    .await?;
    let uri = uri_rx.await?;
    let sender_type = uri
        .split_once("token=")
        .map(|(_, token)| token.to_string())
        .unwrap_or_default();
    let _ = events.send(ServerEvent::Accepted { uri });

    let mut relay = bus.subscribe();
    let (mut tx, mut rx) = ws.split();

    for (i, frame) in options.history.iter().enumerate() {
        if i > 0 && !options.history_gap.is_zero() {
            tokio::time::sleep(options.history_gap).await;
        }
        tx.send(Message::Text(frame.clone().into())).await?;
    }

    if let Some((code, reason)) = &options.hang_up {
        tx.send(Message::Close(Some(CloseFrame {
            code: CloseCode::from(*code),
            reason: reason.clone().into(),
        })))
        .await?;
        return Ok(());
    }

    loop {
        tokio::select! {
            msg = rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let envelope: OutboundEnvelope = serde_json::from_str(text.as_str())?;
                    if options.broadcast {
                        let _ = bus.send(chat_json(&sender_type, &envelope.message));
                    }
                    let _ = events.send(ServerEvent::Received {
                        sender_type: sender_type.clone(),
                        text: envelope.message,
                    });
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            frame = relay.recv() => match frame {
                Ok(frame) => tx.send(Message::Text(frame.into())).await?,
                Err(_) => break,
            },
        }
    }
    Ok(())
}

/// A chat frame as the server would write it.
pub fn chat_json(sender_type: &str, text: &str) -> String {
    let message = ChatMessage {
        sender_type: sender_type.to_string(),
        message: text.to_string(),
        created_at: Utc::now().fixed_offset(),
        order_id: Some(2),
        sender_id: Some(7),
    };
    serde_json::to_string(&message).expect("chat message serializes")
}

pub fn participant(role: Role) -> Participant {
    let (sender_type, label, color) = match role {
        Role::Customer => ("customer", "Customer", Color::Cyan),
        Role::Courier => ("mitra", "Mitra", Color::Magenta),
    };
    Participant::new(
        role,
        sender_type,
        Credential::new(sender_type),
        RoleStyle::new(label, color),
    )
}

pub fn client(
    role: Role,
    endpoint: ChatEndpoint,
    settle: Duration,
    sink: &RecordSink,
) -> SessionClient {
    SessionClient::new(participant(role), endpoint, settle, sink)
}

pub async fn wait_status(
    status: &mut watch::Receiver<SessionStatus>,
    pred: impl FnMut(&SessionStatus) -> bool,
) -> Result<SessionStatus> {
    let status = timeout(WAIT, status.wait_for(pred))
        .await
        .context("timed out waiting for session status")??;
    Ok(*status)
}

pub async fn next_record(records: &mut RecordReceiver) -> Result<Record> {
    timeout(WAIT, records.recv())
        .await
        .context("timed out waiting for record")?
        .context("record channel closed")
}

/// Collect records until `pred` matches one (inclusive).
pub async fn records_until(
    records: &mut RecordReceiver,
    mut pred: impl FnMut(&Record) -> bool,
) -> Result<Vec<Record>> {
    let mut seen = Vec::new();
    loop {
        let record = next_record(records).await?;
        let done = pred(&record);
        seen.push(record);
        if done {
            return Ok(seen);
        }
    }
}

/// Whatever is queued right now, without waiting.
pub fn drain(records: &mut RecordReceiver) -> Vec<Record> {
    let mut seen = Vec::new();
    while let Ok(record) = records.try_recv() {
        seen.push(record);
    }
    seen
}

pub fn ensure(cond: bool, msg: impl Into<String>) -> Result<()> {
    if !cond {
        bail!(msg.into());
    }
    Ok(())
}
