mod menu;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::style::Stylize;
use libchatprobe::{
    InteractionDriver, ProbeConfig, RecordReceiver, RecordSink, Role, Scenario, SessionClient,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "chatprobe",
    about = "Drive both ends of an order chat socket and watch what gets delivered"
)]
struct Cli {
    /// Config file (default: ~/.config/chatprobe/config.toml, if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Chat route without the session id, e.g. ws://localhost:8080/api/realtime/chat
    #[arg(long)]
    server: Option<String>,

    /// Order/session id to join
    #[arg(long)]
    session: Option<String>,

    /// Token presented by the customer socket
    #[arg(long)]
    customer_token: Option<String>,

    /// Token presented by the courier socket
    #[arg(long)]
    courier_token: Option<String>,

    /// Run the scripted exchange once and exit
    #[arg(long)]
    auto: bool,
}

impl Cli {
    fn load_config(&self) -> Result<ProbeConfig> {
        let mut config =
            ProbeConfig::load(self.config.as_deref()).context("failed to load config")?;
        if let Some(server) = &self.server {
            config.server_url = server.clone();
        }
        if let Some(session) = &self.session {
            config.session_id = session.clone();
        }
        if let Some(token) = &self.customer_token {
            config.participant_config_mut(Role::Customer).token = Some(token.clone());
        }
        if let Some(token) = &self.courier_token {
            config.participant_config_mut(Role::Courier).token = Some(token.clone());
        }
        Ok(config)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatprobe=warn,libchatprobe=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.load_config()?;
    let scenario = config.scenario();

    let (sink, records) = RecordSink::channel();
    let mut driver = build_driver(&config, &sink)?;
    drop(sink);
    let printer = tokio::spawn(print_records(records));

    print_banner(&config, &driver);

    let outcome = tokio::select! {
        res = session(&mut driver, &scenario, cli.auto) => res,
        _ = tokio::signal::ctrl_c() => {
            println!("\n{}", "Shutting down...".yellow());
            Ok(())
        }
    };

    driver.shutdown().await;
    // Last reporter goes with the driver; the printer then drains and stops.
    drop(driver);
    let _ = printer.await;
    outcome
}

fn build_driver(config: &ProbeConfig, sink: &RecordSink) -> Result<InteractionDriver> {
    let endpoint = config.endpoint().context("invalid chat endpoint")?;
    let client = |role: Role| -> Result<SessionClient> {
        let participant = config.participant(role)?;
        if participant.credential.is_empty() {
            tracing::warn!(%role, "no token configured, the server will likely refuse the upgrade");
        }
        Ok(SessionClient::new(
            participant,
            endpoint.clone(),
            config.settle(),
            sink,
        ))
    };
    Ok(InteractionDriver::new(
        client(Role::Customer)?,
        client(Role::Courier)?,
    ))
}

fn print_banner(config: &ProbeConfig, driver: &InteractionDriver) {
    println!(
        "\n{}",
        format!("Order chat probe, session {}", config.session_id).bold()
    );
    println!(
        "{}",
        format!("Server: {}", driver.client(Role::Customer).endpoint()).dark_grey()
    );
    for role in Role::ALL {
        let participant = driver.client(role).participant();
        let name = participant
            .display_name
            .as_deref()
            .map(|name| format!(" ({name})"))
            .unwrap_or_default();
        let line = format!(
            "{}{name} as sender_type {:?}",
            participant.style.label, participant.sender_type
        );
        println!("{}", line.with(participant.style.color));
    }
}

async fn print_records(mut records: RecordReceiver) {
    while let Some(record) = records.recv().await {
        println!("{}", record.styled_line());
    }
}

async fn session(driver: &mut InteractionDriver, scenario: &Scenario, auto: bool) -> Result<()> {
    if !auto {
        return menu::run(driver, scenario).await;
    }

    let ok = menu::run_auto(driver, scenario).await;
    // Let the last relay come back before closing.
    tokio::time::sleep(scenario.timing.message_gap).await;
    if !ok {
        anyhow::bail!("automated test did not complete");
    }
    Ok(())
}
