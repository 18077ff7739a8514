//! Backlog/live classification.
//!
//! The chat socket replays stored history immediately after the handshake and
//! then relays new messages as they happen, without any marker between the
//! two. A message is treated as history while the stream has not been quiet
//! for [`DEFAULT_SETTLE`]; the first quiet period after at least one history
//! message switches the connection to live for good.
//!
//! A live message that lands inside the settle window is counted as history.
//! With no history at all, the first live message is counted as history too.

use std::time::Duration;

use tokio::time::Instant;

pub const DEFAULT_SETTLE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    LoadingBacklog,
    Live,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Backlog,
    Live,
}

/// Per-connection classifier; a new connection gets a new one. Time is passed
/// in so the caller owns the clock.
#[derive(Debug, Clone)]
pub struct BacklogClassifier {
    settle: Duration,
    phase: Phase,
    backlog_count: usize,
    deadline: Option<Instant>,
}

impl BacklogClassifier {
    pub fn new(settle: Duration) -> Self {
        Self {
            settle,
            phase: Phase::LoadingBacklog,
            backlog_count: 0,
            deadline: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn backlog_count(&self) -> usize {
        self.backlog_count
    }

    /// When the settle timer fires, if it is armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Classify one chat message arriving at `now`.
    pub fn classify(&mut self, now: Instant) -> Classification {
        match self.phase {
            Phase::LoadingBacklog => {
                self.backlog_count += 1;
                self.deadline = Some(now + self.settle);
                Classification::Backlog
            }
            Phase::Live => Classification::Live,
        }
    }

    /// Settle timer check. Returns the history size on the single
    /// LoadingBacklog -> Live transition, `None` otherwise.
    pub fn settle(&mut self, now: Instant) -> Option<usize> {
        let deadline = self.deadline?;
        if now < deadline {
            return None;
        }
        self.deadline = None;

        if self.phase == Phase::LoadingBacklog && self.backlog_count > 0 {
            self.phase = Phase::Live;
            Some(self.backlog_count)
        } else {
            None
        }
    }
}
