//! Uranus Daemon
//!
//! Runs the hackernel policy agent and offers the administrative commands
//! that manage its store.
//!
//! # Usage
//!
//! ```bash
//! # Run the agent (default subcommand)
//! uranus-daemon --config /etc/uranus/uranus.toml
//!
//! # Inspect the audit trail
//! uranus-daemon records --limit 20
//!
//! # Trust a command ahead of the threshold
//! uranus-daemon trust /home/user /usr/bin/git status
//!
//! # Turn kernel protection on for the next agent start
//! uranus-daemon config set proc::core::status 1
//! ```

mod config;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use uranus_agent::{AgentError, PolicyAgent, SignalTerminator};
use uranus_connector::UnixConnector;
use uranus_protocol::join_command;
use uranus_store::{PromotionStatus, Store};

use crate::config::DaemonConfig;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Uranus - user-space policy agent for hackernel
#[derive(Parser, Debug)]
#[command(name = "uranus-daemon")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML, JSON, or YAML)
    #[arg(short, long, env = "URANUS_CONFIG")]
    config: Option<String>,

    /// SQLite database path
    #[arg(long, env = "URANUS_DATABASE")]
    database: Option<PathBuf>,

    /// hackernel socket path
    #[arg(long, env = "URANUS_SOCKET")]
    socket: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "URANUS_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (json, pretty)
    #[arg(long, env = "URANUS_LOG_FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the policy agent until interrupted
    Run,
    /// List audited commands, most frequent first
    Records {
        #[arg(long, default_value = "50")]
        limit: i64,
        #[arg(long, default_value = "0")]
        offset: i64,
        /// Print records as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Mark a command trusted; it is sent to the kernel on the next start
    Trust {
        workdir: String,
        binary: String,
        args: Vec<String>,
    },
    /// Clear the trusted mark of a command
    Untrust {
        workdir: String,
        binary: String,
        args: Vec<String>,
    },
    /// Read or write persisted settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    Get { key: String },
    Set { key: String, value: i64 },
    List,
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut daemon_config = DaemonConfig::load(args.config.as_deref())?;
    if let Some(database) = args.database {
        daemon_config.agent.database_path = database;
    }
    if let Some(socket) = args.socket {
        daemon_config.agent.socket_path = socket;
    }
    if let Some(level) = args.log_level {
        daemon_config.logging.level = level;
    }
    if let Some(format) = args.log_format {
        daemon_config.logging.format = format;
    }

    init_logging(&daemon_config.logging);
    daemon_config.validate()?;

    let mut out = std::io::stdout();
    match args.command.unwrap_or(Command::Run) {
        Command::Run => run_agent(&daemon_config).await,
        Command::Records { limit, offset, json } => {
            list_records(&daemon_config, limit, offset, json, &mut out).await
        }
        Command::Trust { workdir, binary, args } => {
            let cmd = join_command(&workdir, &binary, &args);
            set_status(&daemon_config, &cmd, PromotionStatus::Trusted, &mut out).await
        }
        Command::Untrust { workdir, binary, args } => {
            let cmd = join_command(&workdir, &binary, &args);
            set_status(&daemon_config, &cmd, PromotionStatus::Unclassified, &mut out).await
        }
        Command::Config { action } => config_command(&daemon_config, action, &mut out).await,
    }
}

/// Initialize tracing/logging
fn init_logging(config: &config::LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    match config.format.as_str() {
        "json" => {
            subscriber
                .with(fmt::layer().json().with_target(true))
                .init();
        }
        _ => {
            subscriber
                .with(fmt::layer().pretty().with_target(true))
                .init();
        }
    }
}

// =============================================================================
// Commands
// =============================================================================

async fn run_agent(config: &DaemonConfig) -> anyhow::Result<()> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        socket = %config.agent.socket_path.display(),
        "Starting uranus agent"
    );

    let store = Store::open(&config.agent.database_path).await?;
    let connector = Arc::new(UnixConnector::new(&config.agent.socket_path));
    let terminator = Arc::new(SignalTerminator::new());
    let mut agent = PolicyAgent::new(connector, store.clone(), config.agent.agent_config())
        .with_fatal_handler(terminator.clone());

    // Installed before start so a fatal self-interrupt takes the stop path.
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    let started = agent.start().await;
    match &started {
        Ok(()) => wait_for_shutdown(&mut interrupt, &mut terminate).await,
        Err(e) => tracing::error!(error = %e, "Agent startup failed"),
    }

    let stopped = agent.stop().await;
    store.close().await;

    shutdown_outcome(started, stopped, terminator.fatal_reason())?;
    tracing::info!("Agent shutdown complete");
    Ok(())
}

/// A fatal self-interrupt stops the agent cleanly but must still fail the
/// process, so supervision restarts it.
fn shutdown_outcome(
    started: Result<(), AgentError>,
    stopped: Result<(), AgentError>,
    fatal_reason: Option<&str>,
) -> anyhow::Result<()> {
    started?;
    stopped?;
    if let Some(reason) = fatal_reason {
        anyhow::bail!("agent terminated after fatal condition: {reason}");
    }
    Ok(())
}

async fn wait_for_shutdown(interrupt: &mut Signal, terminate: &mut Signal) {
    tokio::select! {
        _ = interrupt.recv() => {
            tracing::info!("Received SIGINT, stopping agent...");
        }
        _ = terminate.recv() => {
            tracing::info!("Received SIGTERM, stopping agent...");
        }
    }
}

async fn open_store(config: &DaemonConfig) -> anyhow::Result<Store> {
    let store = Store::open(&config.agent.database_path).await?;
    store.init_schema().await?;
    Ok(store)
}

async fn list_records(
    config: &DaemonConfig,
    limit: i64,
    offset: i64,
    json: bool,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    let records = store.audit_repo().list(limit, offset).await?;
    for record in &records {
        if json {
            writeln!(out, "{}", serde_json::to_string(record)?)?;
        } else {
            writeln!(
                out,
                "{:>6} {:>8} {:>6} {:<14} {} {} {}",
                record.id,
                record.count,
                record.judge,
                record.status,
                record.workdir,
                record.binary,
                record.argv
            )?;
        }
    }
    store.close().await;
    Ok(())
}

async fn set_status(
    config: &DaemonConfig,
    cmd: &str,
    status: PromotionStatus,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    let updated = store.audit_repo().set_status(cmd, status).await?;
    store.close().await;
    if !updated {
        anyhow::bail!("no audit record for this command; it must be executed at least once");
    }
    writeln!(out, "{status}")?;
    Ok(())
}

async fn config_command(
    config: &DaemonConfig,
    action: ConfigAction,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    let repo = store.config_repo();
    match action {
        ConfigAction::Get { key } => match repo.get_integer(&key).await? {
            Some(value) => writeln!(out, "{value}")?,
            None => writeln!(out, "(unset)")?,
        },
        ConfigAction::Set { key, value } => {
            repo.set_integer(&key, value).await?;
            writeln!(out, "{key} = {value}")?;
        }
        ConfigAction::List => {
            for (key, value) in repo.list().await? {
                writeln!(out, "{key} = {value}")?;
            }
        }
    }
    store.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use uranus_connector::ConnectorError;
    use uranus_store::PROC_CORE_STATUS;

    use super::*;

    fn daemon_config(dir: &tempfile::TempDir) -> DaemonConfig {
        let mut config = DaemonConfig::default();
        config.agent.database_path = dir.path().join("uranus").join("main.db");
        config
    }

    async fn seed(config: &DaemonConfig, cmd: &str, reports: usize) {
        let store = open_store(config).await.unwrap();
        for _ in 0..reports {
            store.audit_repo().record_report(cmd, 1).await.unwrap();
        }
        store.close().await;
    }

    fn output(out: Vec<u8>) -> String {
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_fatal_termination_fails_the_process() {
        assert!(shutdown_outcome(Ok(()), Ok(()), None).is_ok());

        let err = shutdown_outcome(Ok(()), Ok(()), Some("osinfo::report timeout")).unwrap_err();
        assert!(err.to_string().contains("osinfo::report timeout"));

        let err = shutdown_outcome(
            Err(AgentError::Connector(ConnectorError::NotConnected)),
            Ok(()),
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("not connected"));
    }

    #[tokio::test]
    async fn test_trust_and_untrust_update_status() {
        let dir = tempfile::tempdir().unwrap();
        let config = daemon_config(&dir);
        let cmd = join_command("/home", "/usr/bin/git", &["status"]);
        seed(&config, &cmd, 1).await;

        let mut out = Vec::new();
        set_status(&config, &cmd, PromotionStatus::Trusted, &mut out).await.unwrap();
        assert_eq!(output(out), "trusted\n");

        let store = open_store(&config).await.unwrap();
        assert_eq!(
            store.audit_repo().commands_with_status(PromotionStatus::Trusted).await.unwrap(),
            vec![cmd.clone()]
        );
        store.close().await;

        let mut out = Vec::new();
        set_status(&config, &cmd, PromotionStatus::Unclassified, &mut out).await.unwrap();
        assert_eq!(output(out), "unclassified\n");

        let store = open_store(&config).await.unwrap();
        let record = store.audit_repo().find(&cmd).await.unwrap().unwrap();
        assert_eq!(record.status, PromotionStatus::Unclassified);
        store.close().await;
    }

    #[tokio::test]
    async fn test_trust_unknown_command_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = daemon_config(&dir);
        let cmd = join_command("/", "/bin/never-ran", &[] as &[&str]);

        let mut out = Vec::new();
        assert!(set_status(&config, &cmd, PromotionStatus::Trusted, &mut out).await.is_err());
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_records_listed_most_frequent_first() {
        let dir = tempfile::tempdir().unwrap();
        let config = daemon_config(&dir);
        let rare = join_command("/", "/bin/date", &[] as &[&str]);
        let frequent = join_command("/", "/bin/id", &["-u"]);
        seed(&config, &rare, 1).await;
        seed(&config, &frequent, 4).await;

        let mut out = Vec::new();
        list_records(&config, 10, 0, true, &mut out).await.unwrap();
        let rows: Vec<serde_json::Value> = output(out)
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["binary"], "/bin/id");
        assert_eq!(rows[0]["count"], 4);
        assert_eq!(rows[1]["binary"], "/bin/date");

        let mut out = Vec::new();
        list_records(&config, 1, 1, false, &mut out).await.unwrap();
        let text = output(out);
        assert_eq!(text.lines().count(), 1);
        assert!(text.contains("/bin/date"));
        assert!(text.contains("unclassified"));
    }

    #[tokio::test]
    async fn test_config_set_get_list() {
        let dir = tempfile::tempdir().unwrap();
        let config = daemon_config(&dir);

        let mut out = Vec::new();
        let get = ConfigAction::Get { key: PROC_CORE_STATUS.to_string() };
        config_command(&config, get, &mut out).await.unwrap();
        assert_eq!(output(out), "(unset)\n");

        let mut out = Vec::new();
        let set = ConfigAction::Set { key: PROC_CORE_STATUS.to_string(), value: 1 };
        config_command(&config, set, &mut out).await.unwrap();
        assert_eq!(output(out), "proc::core::status = 1\n");

        let mut out = Vec::new();
        let get = ConfigAction::Get { key: PROC_CORE_STATUS.to_string() };
        config_command(&config, get, &mut out).await.unwrap();
        assert_eq!(output(out), "1\n");

        let mut out = Vec::new();
        config_command(&config, ConfigAction::List, &mut out).await.unwrap();
        assert_eq!(output(out), "proc::core::status = 1\n");
    }
}
