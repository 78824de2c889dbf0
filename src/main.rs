/// Version injected at compile time via PSCLINK_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("PSCLINK_VERSION") {
    Some(v) => v,
    None => "dev",
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use psclink::config::{Config, Overrides};
use psclink::decommission::{TeardownOutcome, TeardownReport};
use psclink::gcp::auth::GcpCredentials;
use psclink::gcp::client::GcpClient;
use psclink::gcp::http::format_gcp_error;
use psclink::orchestrator::{ApplyReport, ResourceStatus};
use psclink::provider::{ComputeApi, GcpCompute, InMemoryCompute};
use psclink::{Orchestrator, ProvisionError};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Provision GCP Private Service Connect resources
#[derive(Parser, Debug)]
#[command(name = "psclink", version = VERSION, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Config file (default: <config dir>/psclink/config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// GCP project to use
    #[arg(short, long, global = true)]
    project: Option<String>,

    /// GCP region for regional resources
    #[arg(short, long, global = true)]
    region: Option<String>,

    /// GCP zone for the instance group
    #[arg(short, long, global = true)]
    zone: Option<String>,

    /// OAuth access token to use instead of Application Default Credentials
    #[arg(long, global = true, env = "CLOUDSDK_AUTH_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Stop watching a single operation after this many seconds
    #[arg(long, global = true)]
    operation_timeout: Option<u64>,

    /// Run against an in-memory control plane instead of GCP. `status` and
    /// `destroy` act on a freshly simulated deployment of the plan.
    #[arg(long, global = true)]
    simulate: bool,

    /// Print reports as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create every missing resource, in dependency order
    Apply,
    /// Delete every resource, in reverse dependency order
    Destroy {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Show which resources currently exist
    Status,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let tracing_level = level.to_tracing_level()?;

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Warning: cannot open log file {}: {}", log_path.display(), e);
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(LevelFilter::from_level(tracing_level).into())
                .from_env_lossy(),
        )
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("psclink {} started with log level: {:?}", VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("psclink").join("psclink.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".psclink").join("psclink.log");
    }
    PathBuf::from("psclink.log")
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level);

    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            tracing::error!("{:#}", err);
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether the command fully succeeded
async fn run(args: Args) -> Result<bool> {
    let overrides = Overrides {
        project_id: args.project.clone(),
        region: args.region.clone(),
        zone: args.zone.clone(),
        operation_timeout_secs: args.operation_timeout,
    };
    let config = Config::resolve(args.config.as_deref(), &overrides)?;
    let plan = config.plan()?;

    tracing::info!(
        "Using project: {}, region: {}, zone: {}",
        config.project(),
        config.region(),
        config.zone()
    );

    let api = connect(&args, &config).await?;
    let orchestrator = Orchestrator::new(api).with_operation_timeout(config.operation_timeout());

    // Each simulated run starts from an empty control plane
    if args.simulate && !matches!(args.command, Command::Apply) {
        tracing::info!("Simulation mode: deploying the plan before {:?}", args.command);
        if let Err(failure) = orchestrator.apply(&plan).await {
            anyhow::bail!("Simulated deployment failed: {}", failure);
        }
    }

    match args.command {
        Command::Apply => match orchestrator.apply(&plan).await {
            Ok(report) => {
                print_apply(&report, args.json)?;
                Ok(true)
            }
            Err(failure) => {
                eprintln!(
                    "Apply failed at step {} ({}): {}",
                    failure.step,
                    failure.id,
                    describe(&failure.error)
                );
                eprintln!(
                    "{} of {} steps completed; re-run apply to resume",
                    failure.completed.len(),
                    plan.len()
                );
                Ok(false)
            }
        },
        Command::Destroy { yes } => {
            if !yes && !confirm_destroy(config.project(), plan.len())? {
                println!("Aborted");
                return Ok(true);
            }
            let report = orchestrator.destroy(&plan).await;
            print_teardown(&report, args.json)?;
            Ok(report.is_clean())
        }
        Command::Status => {
            let statuses = orchestrator.status(&plan).await?;
            print_status(&statuses, args.json)?;
            Ok(true)
        }
    }
}

async fn connect(args: &Args, config: &Config) -> Result<Arc<dyn ComputeApi>> {
    if args.simulate {
        tracing::info!("Simulation mode: using in-memory control plane");
        return Ok(Arc::new(InMemoryCompute::new(config.project())));
    }

    let client = match &args.access_token {
        Some(token) => GcpClient::with_credentials(config.project(), GcpCredentials::from_access_token(token.clone()))?,
        None => GcpClient::new(config.project()).await?,
    };
    Ok(Arc::new(GcpCompute::new(client)))
}

fn confirm_destroy(project: &str, count: usize) -> Result<bool> {
    print!("Delete {} resources in project {}? [y/N] ", count, project);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin()
        .read_line(&mut answer)
        .context("Failed to read confirmation")?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

/// Provider errors are shown in their sanitized form
fn describe(error: &ProvisionError) -> String {
    match error {
        ProvisionError::Transport(err) => format_gcp_error(err),
        other => other.to_string(),
    }
}

fn print_apply(report: &ApplyReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    for result in &report.results {
        let state = if result.already_existed { "exists " } else { "created" };
        let ip = result
            .attributes
            .get(psclink::provision::ATTR_IP_ADDRESS)
            .map(|ip| format!(" ({})", ip))
            .unwrap_or_default();
        println!("{}  {:<20} {}{}", state, result.kind.to_string(), result.name, ip);
    }
    println!(
        "\n{} created, {} already existed",
        report.created_count(),
        report.existing_count()
    );
    Ok(())
}

fn print_teardown(report: &TeardownReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    for entry in &report.entries {
        let outcome = match &entry.outcome {
            TeardownOutcome::Deleted => "deleted".to_string(),
            TeardownOutcome::AlreadyAbsent => "absent ".to_string(),
            TeardownOutcome::Failed(err) => format!("FAILED: {}", describe(err)),
        };
        println!("{:<20} {:<40} {}", entry.kind.to_string(), entry.name, outcome);
    }
    println!(
        "\n{} deleted, {} failed",
        report.deleted_count(),
        report.failure_count()
    );
    Ok(())
}

fn print_status(statuses: &[ResourceStatus], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(statuses)?);
        return Ok(());
    }
    for status in statuses {
        let mark = if status.exists { "present" } else { "missing" };
        println!(
            "{}  {:<20} {:<40} {}",
            mark,
            status.kind.to_string(),
            status.name,
            status.scope
        );
    }
    Ok(())
}
