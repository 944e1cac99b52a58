//! ufwm - terminal manager for ufw rules
//!
//! Shows ufw's numbered rules with a service label and a note per rule, and
//! keeps those annotations attached to the right rule as ufw renumbers.
//!
//! # Usage
//!
//! ```bash
//! # Interactive session
//! ufwm
//!
//! # CLI commands
//! ufwm list                                # Print the annotated rule list
//! ufwm annotate 3 --service ssh --note hq  # Set a rule's annotation
//! ufwm reset --yes                         # Reset ufw and clear annotations
//! ufwm config --write-default              # Create the config file
//! ```
//!
//! # Security
//!
//! - Runs unprivileged; ufw itself runs through sudo/run0/pkexec
//! - sudo credentials are primed before the terminal enters raw mode
//! - Audit trail of all privileged operations

use clap::{Parser, Subcommand};
use ratatui::Terminal;
use ratatui::backend::{Backend, CrosstermBackend};
use std::io;
use std::process::ExitCode;
use std::time::{Duration, Instant};
use ufwm::app::handlers::handle_key;
use ufwm::app::view::{MIN_HEIGHT, MIN_WIDTH};
use ufwm::app::{Mode, Session, execute};
use ufwm::audit::AuditLog;
use ufwm::config::{self, AppConfig};
use ufwm::core::metadata::MetadataStore;
use ufwm::core::source::RuleSource;
use ufwm::core::ufw::Ufw;
use ufwm::event::{Event, EventHandler};
use ufwm::tui::Tui;
use ufwm::{Error, Reconciler, elevation, utils};

shadow_rs::shadow!(build);

/// Redraw cadence; drives the header clock and the refresh timer
const TICK_RATE: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(name = "ufwm")]
#[command(about = "Terminal manager for ufw rules with service labels and notes", long_about = None)]
#[command(version = build::PKG_VERSION, long_version = build::CLAP_LONG_VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the numbered rules with their annotations
    List,
    /// Set the service label and/or note of a rule (no firewall change)
    Annotate {
        /// Rule position as shown by `ufwm list`
        position: u32,
        /// Service label (omit to keep the current one)
        #[arg(short, long)]
        service: Option<String>,
        /// Free-text note (omit to keep the current one)
        #[arg(short, long)]
        note: Option<String>,
    },
    /// Reset ufw to its defaults and clear all annotations
    Reset {
        /// Required: confirms the reset
        #[arg(long)]
        yes: bool,
    },
    /// Show the configuration
    Config {
        /// Write the current (or default) configuration to disk
        #[arg(long)]
        write_default: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = utils::ensure_dirs() {
        eprintln!("Warning: could not create ufwm directories: {e}");
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Some(command) = cli.command {
        init_logging(false);
        match runtime.block_on(handle_cli(command)) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                report_error(e.as_ref());
                ExitCode::FAILURE
            }
        }
    } else {
        init_logging(true);
        runtime.block_on(launch_tui())
    }
}

/// Interactive mode logs to `<state_dir>/ufwm.log` so nothing reaches the
/// alternate screen; CLI mode logs warnings to stderr.
fn init_logging(to_file: bool) {
    if to_file
        && let Some(mut log_path) = utils::get_state_dir()
    {
        log_path.push("ufwm.log");
        if let Ok(file) = std::fs::File::create(log_path) {
            tracing_subscriber::fmt()
                .with_ansi(false)
                .with_writer(file)
                .init();
            return;
        }
    }
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_writer(io::stderr)
        .init();
}

fn report_error(e: &(dyn std::error::Error + 'static)) {
    if let Some(err) = e.downcast_ref::<Error>() {
        let translation = err.translate();
        eprintln!("Error: {}", translation.user_message);
        for suggestion in translation.suggestions {
            eprintln!("  hint: {suggestion}");
        }
    } else {
        eprintln!("Error: {e}");
    }
}

fn build_reconciler(config: &AppConfig) -> io::Result<Reconciler<Ufw>> {
    let metadata_dir = config.resolved_metadata_dir().ok_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "Configuration directory not found")
    })?;
    let mut reconciler = Reconciler::new(
        Ufw::new(config.ufw_command.clone()),
        MetadataStore::new(metadata_dir),
    );
    match AuditLog::new() {
        Ok(audit) => reconciler = reconciler.with_audit(audit),
        Err(e) => tracing::warn!("Audit log disabled: {e}"),
    }
    Ok(reconciler)
}

async fn handle_cli(command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load_config().await;
    match command {
        Commands::List => {
            elevation::prime_credentials().await?;
            let reconciler = build_reconciler(&config)?;
            let snapshot = reconciler.refresh().await?;
            println!("Status: {}", snapshot.status);
            if snapshot.rules.is_empty() {
                println!("No rules.");
            } else {
                println!(
                    "{:>4}  {:<16} {:<12} {:<24} {:<18} NOTE",
                    "#", "TO", "ACTION", "FROM/TO", "SERVICE"
                );
                for annotated in &snapshot.rules {
                    let rule = &annotated.rule;
                    println!(
                        "{:>4}  {:<16} {:<12} {:<24} {:<18} {}",
                        rule.position,
                        rule.port_display(),
                        rule.action_display(),
                        rule.endpoint_display(),
                        annotated.service,
                        annotated.note
                    );
                }
            }
        }
        Commands::Annotate {
            position,
            service,
            note,
        } => {
            elevation::prime_credentials().await?;
            let reconciler = build_reconciler(&config)?;
            let snapshot = reconciler.refresh().await?;
            let current = snapshot.find(position).ok_or_else(|| Error::Validation {
                field: "position".to_string(),
                message: format!("No rule at position {position}"),
            })?;
            let service = service.unwrap_or_else(|| current.service.clone());
            let note = note.unwrap_or_else(|| current.note.clone());

            let applied = reconciler.annotate(position, &service, &note).await?;
            if let Some(warning) = applied.warning {
                return Err(warning.into());
            }
            println!("✓ Rule {position} annotated.");
        }
        Commands::Reset { yes } => {
            if !yes {
                return Err("Refusing to reset without --yes".into());
            }
            elevation::prime_credentials().await?;
            let reconciler = build_reconciler(&config)?;
            let applied = reconciler.panic_reset().await?;
            if let Some(warning) = applied.warning {
                eprintln!("Warning: {}", warning.user_message());
            }
            println!("✓ Firewall has been reset to default.");
        }
        Commands::Config { write_default } => {
            if write_default {
                let path = config::save_config(&config).await?;
                println!("Wrote {}", path.display());
            }
            if let Some(path) = config::config_path() {
                println!("# {}", path.display());
            }
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }
    Ok(())
}

/// Startup checks run in cooked mode so failures print normally.
async fn launch_tui() -> ExitCode {
    let config = config::load_config().await;

    let reconciler = match build_reconciler(&config) {
        Ok(reconciler) => reconciler,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = elevation::prime_credentials().await {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }

    let snapshot = match reconciler.refresh().await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::error!("Startup refresh failed: {e}");
            report_error(&e);
            return ExitCode::FAILURE;
        }
    };

    match ratatui::crossterm::terminal::size() {
        Ok((width, height)) if width >= MIN_WIDTH && height >= MIN_HEIGHT => {}
        Ok((width, height)) => {
            eprintln!(
                "Error: terminal too small ({width}x{height}, need {MIN_WIDTH}x{MIN_HEIGHT})"
            );
            return ExitCode::FAILURE;
        }
        Err(e) => {
            eprintln!("Error: not a terminal: {e}");
            return ExitCode::FAILURE;
        }
    }

    match run_session(&reconciler, Session::new(snapshot), config.refresh_interval()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_session<S: RuleSource>(
    reconciler: &Reconciler<S>,
    session: Session,
    refresh_interval: Duration,
) -> io::Result<()> {
    let terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;
    let mut tui = Tui::new(terminal, EventHandler::new(TICK_RATE));
    tui.init()?;

    let result = session_loop(&mut tui, reconciler, session, refresh_interval).await;
    tui.exit()?;
    result
}

async fn session_loop<B: Backend, S: RuleSource>(
    tui: &mut Tui<B>,
    reconciler: &Reconciler<S>,
    mut session: Session,
    refresh_interval: Duration,
) -> io::Result<()> {
    let mut last_refresh = Instant::now();

    while session.running {
        tui.draw(&session)?;

        let Some(event) = tui.events.next().await else {
            break;
        };
        match event {
            Event::Tick => {
                // Never refresh under an open form or dialog
                if session.mode == Mode::Listing && last_refresh.elapsed() >= refresh_interval {
                    last_refresh = Instant::now();
                    if let Some(result) = reconciler.try_refresh().await {
                        session.on_refresh(result);
                    }
                }
            }
            Event::Resize(..) => {}
            Event::Key(key) => {
                let (next, command) = handle_key(session, key);
                session = next;
                if let Some(command) = command {
                    session.busy = Some(command.busy_label());
                    tui.draw(&session)?;
                    session = execute(session, command, reconciler).await;
                    last_refresh = Instant::now();
                }
            }
        }
    }
    Ok(())
}
