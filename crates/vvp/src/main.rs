use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use comfy_table::Table;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vvp_core::deployments::{self, DeploymentOptions, JobOutcome};
use vvp_core::parameters::{self, load_parameter_file, EnvParameterSource};
use vvp_core::session::list_namespaces;
use vvp_core::{sql, DeploymentParameters, VvpConfig, VvpSession};

#[derive(Parser, Debug)]
#[command(author, version, about = "Submit streaming SQL to Ververica Platform as managed deployments", long_about = None)]
struct Cli {
    /// Platform base URL (overrides VVP_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,
    /// Namespace to operate in (overrides VVP_NAMESPACE)
    #[arg(long, global = true)]
    namespace: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List namespaces visible to the current credentials
    Namespaces,
    /// Print the namespace's deployment defaults
    Defaults,
    /// Validate a SQL statement
    Validate(StatementArgs),
    /// Execute a SQL statement (e.g. DDL) and print the result
    Execute(StatementArgs),
    /// Deploy an INSERT query as a managed deployment
    Deploy(DeployArgs),
}

#[derive(Args, Debug)]
struct StatementArgs {
    /// File holding the statement, or `-` for stdin
    source: PathBuf,
}

#[derive(Args, Debug)]
struct DeployArgs {
    /// File holding the query, or `-` for stdin
    source: PathBuf,
    /// Name of the parameter variable to use (looked up as an upper-cased env var)
    #[arg(long, conflicts_with = "parameters_file")]
    parameters: Option<String>,
    /// JSON or TOML file with deployment/flink parameters
    #[arg(long)]
    parameters_file: Option<PathBuf>,
    /// Deployment override as dotted.path=value (repeatable)
    #[arg(long = "set", value_name = "PATH=VALUE")]
    set: Vec<String>,
    /// Flink setting as key=value (repeatable)
    #[arg(long = "flink", value_name = "KEY=VALUE")]
    flink: Vec<String>,
    /// Check the job once instead of waiting for it to start
    #[arg(long)]
    no_wait: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Command::Namespaces => handle_namespaces(&config).await,
        Command::Defaults => handle_defaults(&config).await,
        Command::Validate(args) => handle_validate(&config, args).await,
        Command::Execute(args) => handle_execute(&config, args).await,
        Command::Deploy(args) => handle_deploy(&config, args).await,
    }
}

fn load_config(cli: &Cli) -> Result<VvpConfig> {
    dotenvy::dotenv().ok();

    let mut config = match &cli.base_url {
        Some(base_url) => VvpConfig::from_lookup(|key| match key {
            "VVP_BASE_URL" => Some(base_url.clone()),
            other => std::env::var(other).ok(),
        })?,
        None => VvpConfig::from_env().context("VVP_BASE_URL (or --base-url) must be set")?,
    };
    if let Some(namespace) = &cli.namespace {
        config.namespace = namespace.clone();
    }
    Ok(config)
}

async fn connect(config: &VvpConfig) -> Result<VvpSession> {
    config
        .connect()
        .await
        .with_context(|| format!("failed to open session on namespace '{}'", config.namespace))
}

async fn handle_namespaces(config: &VvpConfig) -> Result<()> {
    let transport = config.transport()?;
    let names = list_namespaces(&transport).await?;

    let mut table = Table::new();
    table.set_header(vec!["Namespace", "Active"]);
    for name in names {
        let active = if name == config.namespace { "*" } else { "" };
        table.add_row(vec![name, active.to_string()]);
    }
    println!("{table}");
    Ok(())
}

async fn handle_defaults(config: &VvpConfig) -> Result<()> {
    let session = connect(config).await?;
    let defaults = deployments::fetch_deployment_defaults(&session).await?;
    println!("{}", serde_json::to_string_pretty(defaults.as_map())?);
    Ok(())
}

async fn handle_validate(config: &VvpConfig, args: StatementArgs) -> Result<()> {
    let statement = read_statement(&args.source).await?;
    let session = connect(config).await?;
    let validation = sql::validate_sql(&session, &statement).await?;

    println!("{}", validation.raw_result);
    if let Some(message) = &validation.error_message {
        println!("{message}");
    }
    if !validation.result.is_valid() {
        bail!("statement is not valid");
    }
    Ok(())
}

async fn handle_execute(config: &VvpConfig, args: StatementArgs) -> Result<()> {
    let statement = read_statement(&args.source).await?;
    let session = connect(config).await?;
    let result = sql::execute_sql(&session, &statement).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn handle_deploy(config: &VvpConfig, args: DeployArgs) -> Result<()> {
    let query = read_statement(&args.source).await?;
    let parameters = resolve_deploy_parameters(&args)?;
    let session = connect(config).await?;

    let mut options = DeploymentOptions {
        poll: config.poll,
        cancel: CancellationToken::new(),
    };
    if args.no_wait {
        options.poll.max_attempts = 0;
    }

    let cancel = options.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let handle = deployments::make_deployment(&query, &session, &parameters, &options).await?;
    for note in &handle.diagnostics {
        warn!(deployment_id = %handle.deployment_id, note = %note, "Deployment diagnostic");
    }

    println!("{}", handle.deployment_id);
    match &handle.job {
        JobOutcome::Running { job_id } => {
            info!(deployment_id = %handle.deployment_id, job_id = %job_id, "Deployment running");
            println!("job {job_id}");
            Ok(())
        }
        JobOutcome::Cancelled => {
            info!(deployment_id = %handle.deployment_id, "Stopped waiting for job");
            Ok(())
        }
        JobOutcome::TimedOut { .. } if args.no_wait => Ok(()),
        _ => {
            handle.require_job_id()?;
            Ok(())
        }
    }
}

fn resolve_deploy_parameters(args: &DeployArgs) -> Result<DeploymentParameters> {
    let base = match &args.parameters_file {
        Some(path) => DeploymentParameters::from_value(&load_parameter_file(path)?)?,
        None => parameters::resolve_parameters(&EnvParameterSource, args.parameters.as_deref())?,
    };
    let resolved = base
        .with_assignments(&args.set)?
        .with_flink_assignments(&args.flink)?;
    Ok(resolved)
}

async fn read_statement(source: &Path) -> Result<String> {
    let text = if source == Path::new("-") {
        let mut buffer = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buffer)
            .await
            .context("failed to read statement from stdin")?;
        buffer
    } else {
        tokio::fs::read_to_string(source)
            .await
            .with_context(|| format!("failed to read {}", source.display()))?
    };

    let trimmed = text.trim();
    if trimmed.is_empty() {
        bail!("statement is empty");
    }
    Ok(trimmed.to_string())
}
