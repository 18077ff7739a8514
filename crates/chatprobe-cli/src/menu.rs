use std::io::{self, BufRead, Write};

use anyhow::Result;
use crossterm::style::Stylize;
use libchatprobe::{InteractionDriver, Role, Scenario};
use tokio::sync::mpsc;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

/// Operator commands, by menu number or by word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect(Role),
    /// Text given inline, or `None` to prompt for it.
    Send(Role, Option<String>),
    Disconnect(Role),
    Auto,
    Exit,
}

impl Command {
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        let numbered = match input {
            "1" => Some(Command::Connect(Role::Customer)),
            "2" => Some(Command::Connect(Role::Courier)),
            "3" => Some(Command::Send(Role::Customer, None)),
            "4" => Some(Command::Send(Role::Courier, None)),
            "5" => Some(Command::Disconnect(Role::Customer)),
            "6" => Some(Command::Disconnect(Role::Courier)),
            "7" | "auto" => Some(Command::Auto),
            "8" | "exit" | "quit" => Some(Command::Exit),
            _ => None,
        };
        if numbered.is_some() {
            return numbered;
        }

        let (verb, rest) = input.split_once(char::is_whitespace)?;
        let rest = rest.trim_start();
        let (role, text) = match rest.split_once(char::is_whitespace) {
            Some((role, text)) => (role, Some(text.trim())),
            None => (rest, None),
        };
        let role: Role = role.parse().ok()?;

        match verb.to_ascii_lowercase().as_str() {
            "connect" if text.is_none() => Some(Command::Connect(role)),
            "disconnect" if text.is_none() => Some(Command::Disconnect(role)),
            "send" => Some(Command::Send(
                role,
                text.filter(|t| !t.is_empty()).map(str::to_string),
            )),
            _ => None,
        }
    }
}

/// Line-oriented stdin. Reads on a plain thread so a pending read never
/// holds up runtime shutdown.
struct Console {
    lines: mpsc::UnboundedReceiver<io::Result<String>>,
}

impl Console {
    fn new() -> Self {
        let (tx, lines) = mpsc::unbounded_channel();
        std::thread::spawn(move || {
            for line in io::stdin().lock().lines() {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
        Self { lines }
    }

    /// `None` on end of input.
    async fn prompt(&mut self, prompt: &str) -> Result<Option<String>> {
        print!("{prompt}");
        io::stdout().flush()?;
        Ok(self.lines.recv().await.transpose()?)
    }
}

fn show_menu(driver: &InteractionDriver) {
    let customer = &driver.client(Role::Customer).participant().style.label;
    let courier = &driver.client(Role::Courier).participant().style.label;

    println!();
    println!("{}", RULE.yellow());
    println!("{}", "Order chat test menu".bold());
    println!("{}", RULE.yellow());
    println!("1. Connect {customer}");
    println!("2. Connect {courier}");
    println!("3. Send message as {customer}");
    println!("4. Send message as {courier}");
    println!("5. Disconnect {customer}");
    println!("6. Disconnect {courier}");
    println!("7. Auto test (send messages from both)");
    println!("8. Exit");
    println!("{}", RULE.yellow());
    println!();
}

/// Menu loop. Returns on exit or end of input.
pub async fn run(driver: &mut InteractionDriver, scenario: &Scenario) -> Result<()> {
    let mut console = Console::new();
    loop {
        show_menu(driver);
        let Some(answer) = console.prompt("Select option: ").await? else {
            return Ok(());
        };

        let Some(command) = Command::parse(&answer) else {
            println!("{}", "Invalid option".red());
            continue;
        };

        match command {
            Command::Connect(role) => {
                if let Err(e) = driver.connect(role).await {
                    println!("{}", format!("Connection failed: {e}").red());
                }
            }
            Command::Send(role, text) => {
                let text = match text {
                    Some(text) => text,
                    None => {
                        let label = &driver.client(role).participant().style.label;
                        let prompt = format!("Enter message for {label}: ");
                        match console.prompt(&prompt).await? {
                            Some(line) => line,
                            None => return Ok(()),
                        }
                    }
                };
                let text = text.trim();
                // The server drops empty messages anyway.
                if !text.is_empty() {
                    let _ = driver.send(role, text);
                }
            }
            Command::Disconnect(role) => driver.disconnect(role).await,
            Command::Auto => {
                run_auto(driver, scenario).await;
            }
            Command::Exit => {
                println!("\n{}\n", "Goodbye!".green());
                return Ok(());
            }
        }
    }
}

/// Run the scripted exchange and print the outcome. True if every step went
/// out.
pub async fn run_auto(driver: &mut InteractionDriver, scenario: &Scenario) -> bool {
    println!("\n{}\n", "Starting automated test...".green());
    match driver.run_scenario(scenario).await {
        Ok(report) if report.succeeded() => {
            println!(
                "\n{}\n",
                format!("Automated test completed! ({} messages sent)", report.sent).green()
            );
            true
        }
        Ok(report) => {
            println!(
                "\n{}\n",
                format!(
                    "Automated test finished with {} of {} messages refused",
                    report.failed.len(),
                    report.sent + report.failed.len()
                )
                .yellow()
            );
            false
        }
        Err(e) => {
            println!("\n{}\n", format!("Automated test failed: {e}").red());
            false
        }
    }
}
