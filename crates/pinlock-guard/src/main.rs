//! Pinlock - PIN lock guard CLI

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pinlock_core::{Language, SystemClock};
use pinlock_guard::{
    ActivitySender, ActivitySignal, AttemptResponse, AuthError, ControllerOptions, FileBackend,
    GuardConfig, GuardState, GuardStatus, LockController, SettingsStore,
};

/// Pinlock - 4-digit PIN lock with attempt lockout
#[derive(Parser)]
#[command(name = "pinlock")]
#[command(about = "PIN lock guard with brute-force lockout and idle re-locking")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the state file (overrides the config file)
    #[arg(long, global = true)]
    state: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Set the PIN for the first time
    Setup {
        /// New 4-digit PIN
        pin: String,
        /// The same PIN again
        confirm: String,
    },

    /// Submit a PIN attempt
    Unlock {
        /// 4-digit PIN
        pin: String,
    },

    /// Change the PIN
    Change {
        /// Current PIN
        current: String,
        /// New 4-digit PIN
        new: String,
    },

    /// Engage the lock
    Lock,

    /// Clear the PIN, attempt counter and lockout
    Reset,

    /// Show guard status
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Change lock triggers and language
    Configure {
        #[arg(long)]
        lock_on_startup: Option<bool>,

        #[arg(long)]
        lock_on_inactivity: Option<bool>,

        #[arg(long)]
        lock_on_blur: Option<bool>,

        /// Inactivity timeout in minutes
        #[arg(long)]
        timeout: Option<u32>,

        /// Interface language (en, zh-cn)
        #[arg(long)]
        language: Option<Language>,
    },

    /// Run the activity monitor, reading signals from stdin
    ///
    /// One signal per line: pointer, key, touch, scroll, blur. Also accepts
    /// `unlock <PIN>`, `lock`, `status` and `quit`.
    Watch,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pinlock=info,pinlock_guard=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    // Reset must work even when the stored document is unreadable
    let recover = matches!(cli.command, Commands::Reset);
    let mut controller = open_controller(cli.state, recover)?;

    match cli.command {
        Commands::Setup { pin, confirm } => {
            if !controller.needs_setup() {
                warn!("A PIN is already configured; use `pinlock change` or `pinlock reset`");
                return Ok(ExitCode::SUCCESS);
            }
            controller.set_credential_confirmed(&pin, &confirm)?;
            println!("PIN set");
        }

        Commands::Unlock { pin } => {
            let result = controller.submit_attempt(&pin);
            println!("{}", attempt_message(&controller, &result));
            if result.is_err() {
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Change { current, new } => {
            let result = controller.change_credential(&current, &new);
            if result.is_err() {
                println!("{}", attempt_message(&controller, &result));
                return Ok(ExitCode::FAILURE);
            }
            println!("PIN changed");
        }

        Commands::Lock => {
            if controller.engage_lock() {
                println!("Locked");
            } else if controller.needs_setup() {
                println!("No PIN configured, nothing to lock");
            } else {
                println!("Already locked");
            }
        }

        Commands::Reset => {
            controller.reset_all()?;
            println!("PIN and lockout state cleared");
        }

        Commands::Status { json } => {
            let status = controller.status();
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }

        Commands::Configure {
            lock_on_startup,
            lock_on_inactivity,
            lock_on_blur,
            timeout,
            language,
        } => {
            let mut triggers = controller.triggers();
            if let Some(v) = lock_on_startup {
                triggers.lock_on_startup = v;
            }
            if let Some(v) = lock_on_inactivity {
                triggers.lock_on_inactivity = v;
            }
            if let Some(v) = lock_on_blur {
                triggers.lock_on_window_blur = v;
            }
            if let Some(v) = timeout {
                triggers.inactivity_timeout_minutes = v;
            }
            controller.update_triggers(triggers)?;
            if let Some(language) = language {
                controller.set_language(language)?;
            }
            print_status(&controller.status());
        }

        Commands::Watch => {
            let result = watch(&mut controller).await;
            controller.shutdown();
            result?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn open_controller(state: Option<PathBuf>, recover: bool) -> anyhow::Result<LockController> {
    let config = GuardConfig::load_or_init().context("Failed to load configuration")?;
    let state_path = state.unwrap_or_else(|| config.state_path.clone());
    info!("Using state file {:?}", state_path);

    let backend = FileBackend::new(&state_path);
    let store = if recover {
        SettingsStore::open_or_default(backend)
    } else {
        SettingsStore::open(backend)
    };
    let store = store
        .with_context(|| format!("Failed to open state file {:?}", state_path))?
        .with_write_attempts(config.write_attempts);

    let options = ControllerOptions {
        tick_interval: config.tick_interval(),
        ..Default::default()
    };
    Ok(LockController::open(store, Arc::new(SystemClock), options))
}

async fn watch(controller: &mut LockController) -> anyhow::Result<()> {
    controller.start_monitor()?;
    let sender = controller
        .activity_sender()
        .context("Activity monitor did not start")?;

    info!("Watching stdin for activity (Ctrl-C or `quit` to stop)");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                return Ok(());
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("Input closed");
                    return Ok(());
                };
                if !handle_line(controller, &sender, line.trim())? {
                    return Ok(());
                }
            }
        }
    }
}

/// Handle one line of watch input; returns false to stop
fn handle_line(
    controller: &LockController,
    sender: &ActivitySender,
    line: &str,
) -> anyhow::Result<bool> {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next()) {
        (None, _) => {}
        (Some("quit"), _) => return Ok(false),
        (Some("unlock"), Some(pin)) => {
            let result = controller.submit_attempt(pin);
            println!("{}", serde_json::to_string(&AttemptResponse::from(&result))?);
        }
        (Some("lock"), None) => {
            controller.engage_lock();
        }
        (Some("status"), None) => {
            println!("{}", serde_json::to_string(&controller.status())?);
        }
        (Some(word), None) => match word.parse::<ActivitySignal>() {
            Ok(signal) => {
                sender.send(signal);
            }
            Err(e) => warn!("{}", e),
        },
        _ => warn!("Unrecognised input: {}", line),
    }
    Ok(true)
}

/// One line describing an attempt outcome
fn attempt_message(controller: &LockController, result: &Result<(), AuthError>) -> String {
    match result {
        Ok(()) => "Unlocked".to_string(),
        Err(AuthError::LockedOut(_)) => controller
            .status()
            .lockout_message
            .unwrap_or_else(|| "Locked out".to_string()),
        Err(e) => e.to_string(),
    }
}

fn print_status(status: &GuardStatus) {
    let state = match status.state {
        GuardState::Unlocked => "unlocked",
        GuardState::Locked => "locked",
        GuardState::LockedOut { .. } => "locked out",
    };

    println!("State:              {}", state);
    if status.needs_setup {
        println!("PIN:                not configured (run `pinlock setup`)");
    } else {
        println!("PIN:                configured");
    }
    println!("Failed attempts:    {}", status.attempts);
    if let Some(message) = &status.lockout_message {
        println!("                    {}", message);
    }
    println!("Lock on startup:    {}", status.triggers.lock_on_startup);
    println!(
        "Lock on inactivity: {} ({} min)",
        status.triggers.lock_on_inactivity, status.triggers.inactivity_timeout_minutes
    );
    println!("Lock on blur:       {}", status.triggers.lock_on_window_blur);
    println!("Language:           {}", status.language);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pinlock_core::ManualClock;
    use pinlock_guard::MemoryBackend;

    const T0: u64 = 1_700_000_000_000;

    fn controller_with_pin(pin: &str) -> LockController {
        let store = SettingsStore::open(MemoryBackend::new()).unwrap();
        let controller = LockController::open(
            store,
            Arc::new(ManualClock::new(T0)),
            ControllerOptions::default(),
        );
        controller.set_credential(pin).unwrap();
        controller
    }

    #[test]
    fn test_attempt_messages() {
        let controller = controller_with_pin("1234");

        let result = controller.submit_attempt("0000");
        assert_eq!(
            attempt_message(&controller, &result),
            "Incorrect password (4 attempts remaining)"
        );

        for _ in 0..4 {
            let _ = controller.submit_attempt("0000");
        }
        let result = controller.submit_attempt("1234");
        assert_eq!(attempt_message(&controller, &result), "Locked for 5 minutes.");

        let result = controller.submit_attempt("12");
        assert_eq!(
            attempt_message(&controller, &result),
            "Password must be exactly 4 digits"
        );
    }

    #[test]
    fn test_attempt_message_without_pin() {
        let store = SettingsStore::open(MemoryBackend::new()).unwrap();
        let controller = LockController::open(
            store,
            Arc::new(ManualClock::new(T0)),
            ControllerOptions::default(),
        );
        let result = controller.submit_attempt("1234");
        assert_eq!(
            attempt_message(&controller, &result),
            "No password configured - run setup first"
        );
    }

    #[test]
    fn test_watch_unlock_line_reports_error_code() {
        let controller = controller_with_pin("1234");
        let response = AttemptResponse::from(&controller.submit_attempt("99"));
        assert_eq!(
            serde_json::to_value(&response).unwrap()["error"],
            "invalidFormat"
        );
    }

    #[test]
    fn test_cli_parses_reset_with_state() {
        let cli = Cli::try_parse_from(["pinlock", "--state", "/tmp/s.json", "reset"]).unwrap();
        assert!(matches!(cli.command, Commands::Reset));
        assert_eq!(cli.state, Some(PathBuf::from("/tmp/s.json")));
    }
}
