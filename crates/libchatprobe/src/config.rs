use std::path::{Path, PathBuf};
use std::time::Duration;

use chatprobe_protocol::{ChatEndpoint, DEFAULT_SERVER_URL};
use crossterm::style::Color;
use serde::Deserialize;

use crate::classifier::DEFAULT_SETTLE;
use crate::driver::{Scenario, ScenarioTiming, ScriptStep};
use crate::error::ConfigError;
use crate::role::{Credential, Participant, Role, RoleStyle};

#[derive(Deserialize, Debug, Clone)]
pub struct ProbeConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default = "default_session_id")]
    pub session_id: String,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub customer: ParticipantConfig,
    #[serde(default)]
    pub courier: ParticipantConfig,
    /// Replaces the stock exchange when non-empty.
    #[serde(default)]
    pub script: Vec<ScriptStep>,
}

/// All values in milliseconds.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingConfig {
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    #[serde(default = "default_connect_gap_ms")]
    pub connect_gap_ms: u64,
    #[serde(default = "default_warmup_ms")]
    pub warmup_ms: u64,
    #[serde(default = "default_message_gap_ms")]
    pub message_gap_ms: u64,
}

/// Unset fields fall back to the role's defaults.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct ParticipantConfig {
    pub label: Option<String>,
    pub sender_type: Option<String>,
    pub token: Option<String>,
    pub color: Option<String>,
    pub display_name: Option<String>,
}

impl ProbeConfig {
    /// Load `path`, or the default config file when it exists, or defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let path = Self::config_path();
                if path.exists() {
                    Self::from_file(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn config_path() -> PathBuf {
        dirs_path().join("config.toml")
    }

    pub fn endpoint(&self) -> Result<ChatEndpoint, ConfigError> {
        Ok(ChatEndpoint::new(&self.server_url, &self.session_id)?)
    }

    pub fn participant_config(&self, role: Role) -> &ParticipantConfig {
        match role {
            Role::Customer => &self.customer,
            Role::Courier => &self.courier,
        }
    }

    pub fn participant_config_mut(&mut self, role: Role) -> &mut ParticipantConfig {
        match role {
            Role::Customer => &mut self.customer,
            Role::Courier => &mut self.courier,
        }
    }

    pub fn participant(&self, role: Role) -> Result<Participant, ConfigError> {
        let cfg = self.participant_config(role);
        let (label, sender_type, color) = match role {
            Role::Customer => ("Customer", "customer", "cyan"),
            Role::Courier => ("Mitra", "mitra", "magenta"),
        };

        let color_name = cfg.color.as_deref().unwrap_or(color);
        let color = Color::try_from(color_name).map_err(|_| ConfigError::Color {
            role,
            value: color_name.to_string(),
        })?;

        let mut participant = Participant::new(
            role,
            cfg.sender_type.as_deref().unwrap_or(sender_type),
            Credential::new(cfg.token.clone().unwrap_or_default()),
            RoleStyle::new(cfg.label.as_deref().unwrap_or(label), color),
        );
        participant.display_name = cfg.display_name.clone();
        Ok(participant)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.timing.settle_ms)
    }

    pub fn scenario(&self) -> Scenario {
        let timing = self.timing.scenario_timing();
        if self.script.is_empty() {
            Scenario::standard(timing)
        } else {
            Scenario::new(self.script.clone(), timing)
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            session_id: default_session_id(),
            timing: TimingConfig::default(),
            customer: ParticipantConfig::default(),
            courier: ParticipantConfig::default(),
            script: Vec::new(),
        }
    }
}

impl TimingConfig {
    pub fn scenario_timing(&self) -> ScenarioTiming {
        ScenarioTiming {
            connect_gap: Duration::from_millis(self.connect_gap_ms),
            warmup: Duration::from_millis(self.warmup_ms),
            message_gap: Duration::from_millis(self.message_gap_ms),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_ms: default_settle_ms(),
            connect_gap_ms: default_connect_gap_ms(),
            warmup_ms: default_warmup_ms(),
            message_gap_ms: default_message_gap_ms(),
        }
    }
}

fn dirs_path() -> PathBuf {
    if let Ok(config_dir) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(config_dir).join("chatprobe")
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".config").join("chatprobe")
    } else {
        PathBuf::from("/tmp/chatprobe")
    }
}

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

fn default_session_id() -> String {
    "2".to_string()
}

fn default_settle_ms() -> u64 {
    millis(DEFAULT_SETTLE)
}

fn default_connect_gap_ms() -> u64 {
    millis(ScenarioTiming::default().connect_gap)
}

fn default_warmup_ms() -> u64 {
    millis(ScenarioTiming::default().warmup)
}

fn default_message_gap_ms() -> u64 {
    millis(ScenarioTiming::default().message_gap)
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
