#![forbid(unsafe_code)]

//! `notebook-fleet`: provision workspaces and run one notebook server per user.
//!
//! Subcommands map onto the fleet lifecycle: `provision` syncs workspaces,
//! `launch` starts sessions on existing workspaces, `up` does both, `stop`
//! terminates the sessions recorded in the ownership ledger, and `sweep`
//! kills every process matching the signature.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use notebook_fleet::config::{FleetConfig, ReadinessMode};
use notebook_fleet::models::outcome::RunReport;
use notebook_fleet::orchestrator::fleet::{launch_fleet, provision_fleet};
use notebook_fleet::orchestrator::terminator::{stop_recorded, terminate_by_name};
use notebook_fleet::process::SystemProcessTable;
use notebook_fleet::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "notebook-fleet",
    about = "Provision per-user workspaces and supervise a fleet of notebook servers",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the TOML configuration file; defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Command,
}

/// Command-line overrides applied on top of the configuration file.
#[derive(Debug, Args)]
struct Overrides {
    /// Number of users.
    #[arg(long, global = true)]
    users: Option<u32>,

    /// Port of the first session.
    #[arg(long, global = true)]
    base_port: Option<u16>,

    /// Bind address passed to every session.
    #[arg(long, global = true)]
    host: Option<String>,

    /// Host used in published URLs.
    #[arg(long, global = true)]
    public_host: Option<String>,

    /// Directory holding the user workspaces.
    #[arg(long, global = true)]
    base_path: Option<PathBuf>,

    /// Template directory.
    #[arg(long, global = true)]
    template: Option<PathBuf>,

    /// Session table output path.
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    /// Process signature used by `stop` and `sweep`.
    #[arg(long, global = true)]
    signature: Option<String>,

    /// Replace the readiness probe with a fixed settling wait of this many seconds.
    #[arg(long, global = true)]
    settle_seconds: Option<u64>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sync every workspace from the template.
    Provision,

    /// Launch sessions against existing workspaces.
    Launch,

    /// Provision workspaces, then launch sessions.
    Up,

    /// Terminate the sessions recorded in the ownership ledger.
    Stop,

    /// Kill every process whose listing line contains the signature.
    Sweep,
}

fn main() -> ExitCode {
    let args = Cli::parse();
    if let Err(err) = init_tracing(args.log_format) {
        eprintln!("{err}");
        return ExitCode::FAILURE;
    }

    let outcome = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))
        .and_then(|runtime| runtime.block_on(run(args)));

    match outcome {
        Ok(code) => code,
        Err(err) => {
            error!(%err, "run aborted");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Cli) -> Result<ExitCode> {
    let config = load_config(args.config.as_deref(), args.overrides)?;
    info!("configuration loaded");

    match args.command {
        Command::Provision => Ok(summarize(
            &provision_fleet(&config),
            "Provisioned",
            &config.base_path,
        )),
        Command::Launch => Ok(summarize(
            &launch_fleet(&config, false).await?,
            "Launched",
            &config.output_path,
        )),
        Command::Up => Ok(summarize(
            &launch_fleet(&config, true).await?,
            "Launched",
            &config.output_path,
        )),
        Command::Stop => stop(&config),
        Command::Sweep => {
            let table = SystemProcessTable::new()?;
            let report = terminate_by_name(&table, &config.signature)?;
            println!(
                "Killed {} of {} process(es) matching '{}'",
                report.killed, report.matched, config.signature
            );
            Ok(if report.failed == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            })
        }
    }
}

fn load_config(path: Option<&Path>, overrides: Overrides) -> Result<FleetConfig> {
    let mut config = match path {
        Some(path) => FleetConfig::load_from_path(path)?,
        None => FleetConfig::default(),
    };

    if let Some(users) = overrides.users {
        config.users = users;
    }
    if let Some(base_port) = overrides.base_port {
        config.base_port = base_port;
    }
    if let Some(host) = overrides.host {
        config.host = host;
    }
    if let Some(public_host) = overrides.public_host {
        config.public_host = Some(public_host);
    }
    if let Some(base_path) = overrides.base_path {
        config.base_path = base_path;
    }
    if let Some(template) = overrides.template {
        config.template_path = template;
    }
    if let Some(output) = overrides.output {
        config.output_path = output;
    }
    if let Some(signature) = overrides.signature {
        config.signature = signature;
    }
    if let Some(seconds) = overrides.settle_seconds {
        config.readiness.mode = ReadinessMode::Settle;
        config.readiness.settle_seconds = seconds;
    }

    config.validate()?;
    Ok(config)
}

fn stop(config: &FleetConfig) -> Result<ExitCode> {
    let ledger_path = config.ownership_path();
    let table = SystemProcessTable::new()?;
    let report = stop_recorded(&table, &ledger_path, &config.signature)?;

    for record in &report.unverified {
        eprintln!(
            "{}: pid {} is running but does not match '{}'; kept in {}",
            record.user,
            record.pid.map_or_else(|| "?".to_owned(), |pid| pid.to_string()),
            config.signature,
            ledger_path.display()
        );
    }
    println!(
        "Stopped {} session(s); {} already gone; {} unverified; {} could not be stopped",
        report.killed,
        report.gone,
        report.unverified.len(),
        report.failed.len()
    );
    Ok(if report.retained().is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

fn summarize(report: &RunReport, done: &str, destination: &Path) -> ExitCode {
    for (user, stage, err) in report.failures() {
        eprintln!("{user}: {stage} failed: {err}");
    }

    let total = report.outcomes.len();
    println!(
        "{done} {} of {total} user(s); see {}",
        total - report.failed(),
        destination.display()
    );

    if report.failed() == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
