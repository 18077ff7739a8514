use std::path::PathBuf;

use chatprobe_protocol::EndpointError;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

use crate::role::Role;
use crate::session::ConnectionState;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("{role}: connection failed: {source}")]
    Connection {
        role: Role,
        #[source]
        source: Box<tungstenite::Error>,
    },

    #[error("{role}: not connected")]
    NotConnected { role: Role },

    #[error("{role}: connection already {state}")]
    AlreadyActive { role: Role, state: ConnectionState },

    #[error("failed to encode outbound message: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("scenario aborted, {role} could not connect: {source}")]
    Connect {
        role: Role,
        #[source]
        source: SessionError,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid color {value:?} for {role}")]
    Color { role: Role, value: String },

    #[error(transparent)]
    Endpoint(#[from] EndpointError),
}
