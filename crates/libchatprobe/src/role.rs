use std::fmt;
use std::str::FromStr;

use crossterm::style::Color;
use serde::{Deserialize, Serialize};

/// One side of an order chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    /// The delivering party. The server calls this side `mitra`.
    #[serde(alias = "mitra")]
    Courier,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Customer, Role::Courier];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Courier => "courier",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "customer" => Ok(Role::Customer),
            "courier" | "mitra" => Ok(Role::Courier),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// How one role's records are tagged on the terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleStyle {
    pub label: String,
    pub color: Color,
}

impl RoleStyle {
    pub fn new(label: impl Into<String>, color: Color) -> Self {
        Self {
            label: label.into(),
            color,
        }
    }
}

/// Opaque bearer token. Never printed.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Everything a [`SessionClient`](crate::SessionClient) needs to know about
/// the party it speaks for. Fixed for the client's lifetime.
#[derive(Debug, Clone)]
pub struct Participant {
    pub role: Role,
    /// `sender_type` the server stamps on this party's messages.
    pub sender_type: String,
    pub credential: Credential,
    pub style: RoleStyle,
    pub display_name: Option<String>,
}

impl Participant {
    pub fn new(
        role: Role,
        sender_type: impl Into<String>,
        credential: Credential,
        style: RoleStyle,
    ) -> Self {
        Self {
            role,
            sender_type: sender_type.into(),
            credential,
            style,
            display_name: None,
        }
    }

    /// Whether a message with this `sender_type` was written by this party.
    pub fn authored(&self, sender_type: &str) -> bool {
        self.sender_type.eq_ignore_ascii_case(sender_type)
    }
}
