use chatprobe_protocol::ChatMessage;
use chrono::{DateTime, Local};
use crossterm::style::Stylize;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::classifier::Classification;
use crate::role::{Role, RoleStyle};

/// Who wrote a chat message, relative to the client that received it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Our own message, echoed back by the server.
    Sent,
    Received,
}

/// Which side ended a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Initiator {
    Local,
    Remote,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connecting {
        endpoint: String,
    },
    Connected,
    ConnectFailed {
        error: String,
    },
    Disconnected {
        code: Option<u16>,
        reason: Option<String>,
        initiator: Initiator,
    },
    Sent {
        text: String,
    },
    Message {
        direction: Direction,
        classification: Classification,
        message: ChatMessage,
    },
    BacklogSettled {
        count: usize,
    },
    ServerError {
        text: String,
    },
    Malformed {
        error: String,
    },
    NotConnected,
    TransportError {
        error: String,
    },
}

/// One line of harness output.
#[derive(Debug, Clone)]
pub struct Record {
    pub at: DateTime<Local>,
    pub instant: Instant,
    pub role: Role,
    pub style: RoleStyle,
    pub event: SessionEvent,
}

impl Record {
    pub fn line(&self) -> String {
        format!(
            "{} [{}] {}",
            self.at.format("%H:%M:%S%.3f"),
            self.style.label,
            describe(&self.event)
        )
    }

    /// [`Record::line`] in the role's color.
    pub fn styled_line(&self) -> String {
        self.line().with(self.style.color).to_string()
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self.event,
            SessionEvent::ConnectFailed { .. }
                | SessionEvent::ServerError { .. }
                | SessionEvent::Malformed { .. }
                | SessionEvent::NotConnected
                | SessionEvent::TransportError { .. }
        )
    }
}

fn describe(event: &SessionEvent) -> String {
    match event {
        SessionEvent::Connecting { endpoint } => format!("connecting to {endpoint}"),
        SessionEvent::Connected => "connected".to_string(),
        SessionEvent::ConnectFailed { error } => format!("connection failed: {error}"),
        SessionEvent::Disconnected {
            code,
            reason,
            initiator,
        } => {
            let code = code.map_or_else(|| "none".to_string(), |c| c.to_string());
            let reason = reason.as_deref().unwrap_or("none");
            let by = match initiator {
                Initiator::Local => "client",
                Initiator::Remote => "server",
            };
            format!("disconnected by {by} (code: {code}, reason: {reason})")
        }
        SessionEvent::Sent { text } => format!("sent: {text}"),
        SessionEvent::Message {
            direction,
            classification,
            message,
        } => {
            let class = match classification {
                Classification::Backlog => "HISTORY",
                Classification::Live => "LIVE",
            };
            let dir = match direction {
                Direction::Sent => "SENT",
                Direction::Received => "RECEIVED",
            };
            format!(
                "{class} {dir} {} at {}: {}",
                message.sender_type,
                message.created_at.with_timezone(&Local).format("%H:%M:%S"),
                message.message
            )
        }
        SessionEvent::BacklogSettled { count } => {
            format!("loaded {count} messages from history")
        }
        SessionEvent::ServerError { text } => format!("server error: {text}"),
        SessionEvent::Malformed { error } => format!("malformed message dropped: {error}"),
        SessionEvent::NotConnected => "not connected, message not sent".to_string(),
        SessionEvent::TransportError { error } => format!("transport error: {error}"),
    }
}

pub type RecordReceiver = mpsc::UnboundedReceiver<Record>;

/// Shared end of the record queue. Every client gets its own [`Reporter`]
/// from it so records from both roles arrive in one ordered stream.
#[derive(Debug, Clone)]
pub struct RecordSink {
    tx: mpsc::UnboundedSender<Record>,
}

impl RecordSink {
    pub fn channel() -> (Self, RecordReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn reporter(&self, role: Role, style: RoleStyle) -> Reporter {
        Reporter {
            tx: self.tx.clone(),
            role,
            style,
        }
    }
}

/// Emits records tagged with one role.
#[derive(Debug, Clone)]
pub struct Reporter {
    tx: mpsc::UnboundedSender<Record>,
    role: Role,
    style: RoleStyle,
}

impl Reporter {
    pub fn emit(&self, event: SessionEvent) {
        let record = Record {
            at: Local::now(),
            instant: Instant::now(),
            role: self.role,
            style: self.style.clone(),
            event,
        };

        // Records already reach the operator on stdout.
        tracing::debug!(
            role = %self.role,
            error = record.is_error(),
            "{}",
            describe(&record.event)
        );

        // Nobody listening is fine; the harness may be shutting down.
        let _ = self.tx.send(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::style::Color;

    fn record(event: SessionEvent) -> Record {
        Record {
            at: Local::now(),
            instant: Instant::now(),
            role: Role::Customer,
            style: RoleStyle::new("Customer", Color::Cyan),
            event,
        }
    }

    fn chat(sender: &str, text: &str) -> ChatMessage {
        ChatMessage {
            sender_type: sender.to_string(),
            message: text.to_string(),
            created_at: DateTime::parse_from_rfc3339("2025-01-15T03:30:00Z").unwrap(),
            order_id: None,
            sender_id: None,
        }
    }

    #[test]
    fn message_line_carries_class_direction_and_text() {
        let line = record(SessionEvent::Message {
            direction: Direction::Received,
            classification: Classification::Backlog,
            message: chat("mitra", "on my way"),
        })
        .line();
        assert!(line.contains("[Customer]"), "{line}");
        assert!(line.contains("HISTORY RECEIVED mitra at "), "{line}");
        assert!(line.ends_with(": on my way"), "{line}");

        let line = record(SessionEvent::Message {
            direction: Direction::Sent,
            classification: Classification::Live,
            message: chat("customer", "hi"),
        })
        .line();
        assert!(line.contains("LIVE SENT customer"), "{line}");
    }

    #[test]
    fn disconnect_line_defaults_missing_fields() {
        let line = record(SessionEvent::Disconnected {
            code: None,
            reason: None,
            initiator: Initiator::Remote,
        })
        .line();
        assert!(
            line.ends_with("disconnected by server (code: none, reason: none)"),
            "{line}"
        );
    }

    #[test]
    fn styled_line_wraps_plain_line() {
        let rec = record(SessionEvent::Connected);
        let styled = rec.styled_line();
        assert!(styled.contains(&rec.line()));
    }

    #[test]
    fn errors_are_flagged() {
        assert!(record(SessionEvent::NotConnected).is_error());
        assert!(
            record(SessionEvent::Malformed {
                error: "x".into()
            })
            .is_error()
        );
        assert!(!record(SessionEvent::BacklogSettled { count: 2 }).is_error());
    }

    #[tokio::test]
    async fn reporter_tags_records_with_role() {
        let (sink, mut rx) = RecordSink::channel();
        let reporter = sink.reporter(Role::Courier, RoleStyle::new("Mitra", Color::Magenta));
        reporter.emit(SessionEvent::Sent { text: "hi".into() });

        let rec = rx.recv().await.unwrap();
        assert_eq!(rec.role, Role::Courier);
        assert_eq!(rec.style.label, "Mitra");
        assert_eq!(rec.event, SessionEvent::Sent { text: "hi".into() });
    }

    #[test]
    fn emit_without_listener_is_silent() {
        let (sink, rx) = RecordSink::channel();
        drop(rx);
        sink.reporter(Role::Customer, RoleStyle::new("Customer", Color::Cyan))
            .emit(SessionEvent::Connected);
    }
}
