pub mod classifier;
pub mod config;
pub mod driver;
pub mod error;
pub mod report;
pub mod role;
pub mod session;

pub use classifier::{BacklogClassifier, Classification, DEFAULT_SETTLE, Phase};
pub use config::{ProbeConfig, TimingConfig};
pub use driver::{
    InteractionDriver, Scenario, ScenarioReport, ScenarioTiming, ScriptStep, default_script,
};
pub use error::{ConfigError, ScenarioError, SessionError};
pub use report::{Direction, Initiator, Record, RecordReceiver, RecordSink, Reporter, SessionEvent};
pub use role::{Credential, Participant, Role, RoleStyle};
pub use session::{ConnectionState, SessionClient, SessionStatus};
