use std::time::Duration;

use serde::Deserialize;
use tokio::time::sleep;

use crate::error::{ScenarioError, SessionError};
use crate::role::Role;
use crate::session::{ConnectionState, SessionClient};

/// One scripted line: who says what.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScriptStep {
    pub role: Role,
    pub text: String,
}

impl ScriptStep {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

/// Pauses of the scripted run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScenarioTiming {
    /// After the customer connects, before the courier connects.
    pub connect_gap: Duration,
    /// After both are connected, so both histories can settle.
    pub warmup: Duration,
    /// Before every scripted send.
    pub message_gap: Duration,
}

impl Default for ScenarioTiming {
    fn default() -> Self {
        Self {
            connect_gap: Duration::from_millis(500),
            warmup: Duration::from_millis(1000),
            message_gap: Duration::from_millis(1500),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    pub steps: Vec<ScriptStep>,
    pub timing: ScenarioTiming,
}

impl Scenario {
    pub fn new(steps: Vec<ScriptStep>, timing: ScenarioTiming) -> Self {
        Self { steps, timing }
    }

    /// The stock five-line exchange between customer and courier.
    pub fn standard(timing: ScenarioTiming) -> Self {
        Self::new(default_script(), timing)
    }
}

pub fn default_script() -> Vec<ScriptStep> {
    vec![
        ScriptStep::new(Role::Customer, "Hello! I need help with my order."),
        ScriptStep::new(Role::Courier, "Hi! I'm on my way to your location."),
        ScriptStep::new(Role::Customer, "Great! How long will it take?"),
        ScriptStep::new(Role::Courier, "About 10 minutes. I'll be there soon!"),
        ScriptStep::new(Role::Customer, "Perfect, thank you!"),
    ]
}

/// Outcome of a scripted run that got past the connect phase.
#[derive(Debug, Default)]
pub struct ScenarioReport {
    pub sent: usize,
    /// Step index and error for every send that was refused.
    pub failed: Vec<(usize, SessionError)>,
}

impl ScenarioReport {
    pub fn succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Owns the customer and courier clients and runs operations on them one at
/// a time.
pub struct InteractionDriver {
    customer: SessionClient,
    courier: SessionClient,
}

impl InteractionDriver {
    pub fn new(customer: SessionClient, courier: SessionClient) -> Self {
        debug_assert_eq!(customer.role(), Role::Customer);
        debug_assert_eq!(courier.role(), Role::Courier);
        Self { customer, courier }
    }

    pub fn client(&self, role: Role) -> &SessionClient {
        match role {
            Role::Customer => &self.customer,
            Role::Courier => &self.courier,
        }
    }

    pub fn client_mut(&mut self, role: Role) -> &mut SessionClient {
        match role {
            Role::Customer => &mut self.customer,
            Role::Courier => &mut self.courier,
        }
    }

    pub async fn connect(&mut self, role: Role) -> Result<(), SessionError> {
        self.client_mut(role).connect().await
    }

    pub async fn disconnect(&mut self, role: Role) {
        self.client_mut(role).disconnect().await;
    }

    pub fn send(&self, role: Role, text: &str) -> Result<(), SessionError> {
        self.client(role).send(text)
    }

    /// Connect customer then courier, then play the script with a fixed pause
    /// before each line. Only a failed connect aborts the run; messages sent
    /// before a failure stay sent.
    pub async fn run_scenario(
        &mut self,
        scenario: &Scenario,
    ) -> Result<ScenarioReport, ScenarioError> {
        let timing = scenario.timing;
        tracing::info!(steps = scenario.steps.len(), "scenario starting");

        self.ensure_connected(Role::Customer).await?;
        sleep(timing.connect_gap).await;
        self.ensure_connected(Role::Courier).await?;
        sleep(timing.warmup).await;

        let mut report = ScenarioReport::default();
        for (index, step) in scenario.steps.iter().enumerate() {
            sleep(timing.message_gap).await;
            match self.send(step.role, &step.text) {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    tracing::warn!(index, role = %step.role, "scripted send failed: {e}");
                    report.failed.push((index, e));
                }
            }
        }

        tracing::info!(sent = report.sent, failed = report.failed.len(), "scenario finished");
        Ok(report)
    }

    async fn ensure_connected(&mut self, role: Role) -> Result<(), ScenarioError> {
        if self.client(role).status().connection == ConnectionState::Connected {
            return Ok(());
        }
        self.connect(role)
            .await
            .map_err(|source| ScenarioError::Connect { role, source })
    }

    /// Close both connections. Safe to call more than once.
    pub async fn shutdown(&mut self) {
        for role in Role::ALL {
            self.disconnect(role).await;
        }
    }
}
