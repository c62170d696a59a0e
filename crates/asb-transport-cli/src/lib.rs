//! # ASB Transport CLI
//!
//! Command-line interface for provisioning the broker topology an Azure
//! Service Bus transport endpoint needs.
//!
//! This module provides CLI commands for:
//! - Creating an endpoint (queue, topic, forwarding subscription)
//! - Creating and deleting individual queues
//!
//! Command output goes to stdout; logs go to stderr.

pub mod config;

use asb_transport_core::{
    AzureServiceBusClient, ConnectionString, EndpointOptions, EndpointTopology, EntityName,
    EntityOutcome, ManagementClient, ProvisionError, ProvisioningOrchestrator, QueueOptions,
    QueueSpec, ValidationError, CONNECTION_STRING_ENV_VAR,
};
use clap::{Args, CommandFactory, Parser, Subcommand};
use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use crate::config::{CliConfig, ConfigError, LogFormat, LoggingConfig, ManagementConfig};

// ============================================================================
// CLI Structure
// ============================================================================

/// Azure Service Bus transport topology tool
#[derive(Debug, Parser)]
#[command(name = "asb-transport")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Provisions Azure Service Bus entities for transport endpoints")]
pub struct Cli {
    /// Configuration file path
    #[arg(long, env = "ASB_TRANSPORT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Logging filter (overrides RUST_LOG and the configuration file)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Endpoint topology commands
    Endpoint {
        #[command(subcommand)]
        action: Option<EndpointCommands>,
    },

    /// Queue commands
    Queue {
        #[command(subcommand)]
        action: Option<QueueCommands>,
    },
}

/// Endpoint subcommands
#[derive(Debug, Subcommand)]
pub enum EndpointCommands {
    /// Creates required infrastructure for an endpoint.
    Create {
        /// Name of the endpoint
        name: String,

        #[command(flatten)]
        connection: ConnectionArgs,

        #[command(flatten)]
        queue: QueueArgs,

        /// Topic name (defaults to 'bundle-1')
        #[arg(short, long)]
        topic: Option<String>,

        /// Subscription name (defaults to endpoint name)
        #[arg(short = 'b', long)]
        subscription: Option<String>,
    },
}

/// Queue subcommands
#[derive(Debug, Subcommand)]
pub enum QueueCommands {
    /// Creates a queue with the settings required by the transport
    Create {
        /// Name of the queue
        name: String,

        #[command(flatten)]
        connection: ConnectionArgs,

        #[command(flatten)]
        queue: QueueArgs,
    },

    /// Deletes a queue
    Delete {
        /// Name of the queue
        name: String,

        #[command(flatten)]
        connection: ConnectionArgs,
    },
}

#[derive(Debug, Clone, Args)]
pub struct ConnectionArgs {
    /// Overrides environment variable 'AzureServiceBus_ConnectionString'
    #[arg(short = 'c', long, env = CONNECTION_STRING_ENV_VAR, hide_env_values = true)]
    pub connection_string: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct QueueArgs {
    /// Queue size in GB (defaults to 5)
    #[arg(short, long)]
    pub size: Option<u32>,

    /// Enable partitioning
    #[arg(short, long)]
    pub partitioned: bool,
}

// ============================================================================
// CLI Error Types
// ============================================================================

/// CLI-specific errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Specify a subcommand")]
    MissingSubcommand,

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Client setup failed: {0}")]
    Client(#[from] asb_transport_core::ConfigurationError),

    #[error("{0}")]
    Provisioning(#[from] ProvisionError),

    #[error("{0}")]
    Usage(#[from] clap::Error),

    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::MissingSubcommand => 1,
            Self::Configuration(_) | Self::Client(_) => 1,
            Self::Provisioning(_) => 2,
            Self::Usage(_) | Self::InvalidArgument { .. } => 4,
            Self::Io(_) => 5,
        }
    }

    fn invalid_argument(arg: &str, error: impl std::fmt::Display) -> Self {
        Self::InvalidArgument {
            arg: arg.to_string(),
            message: error.to_string(),
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

/// Main CLI entry point
pub async fn run_cli() -> Result<(), CliError> {
    let mut stdout = std::io::stdout();
    run(std::env::args_os(), &mut stdout).await
}

/// Parse `args` and execute the command, writing command output to `out`.
pub async fn run<I, T, W>(args: I, out: &mut W) -> Result<(), CliError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    W: Write,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(e) if !e.use_stderr() => {
            // --help and --version
            write!(out, "{}", e.render())?;
            return Ok(());
        }
        Err(e) => return Err(CliError::Usage(e)),
    };

    let config = CliConfig::load(cli.config.as_deref())?;
    initialize_logging(&cli, &config.logging)?;
    debug!(config = ?config, "Configuration loaded");

    match cli.command {
        None => missing_subcommand(None, out),
        Some(Commands::Endpoint { action: None }) => missing_subcommand(Some("endpoint"), out),
        Some(Commands::Queue { action: None }) => missing_subcommand(Some("queue"), out),
        Some(Commands::Endpoint {
            action:
                Some(EndpointCommands::Create {
                    name,
                    connection,
                    queue,
                    topic,
                    subscription,
                }),
        }) => {
            let topology =
                resolve_endpoint(&name, &queue, topic.as_deref(), subscription.as_deref())?;
            let orchestrator = build_orchestrator(&connection, &config.management)?;
            execute_endpoint_create(&orchestrator, &topology, out).await
        }
        Some(Commands::Queue {
            action:
                Some(QueueCommands::Create {
                    name,
                    connection,
                    queue,
                }),
        }) => {
            let spec = resolve_queue(&name, &queue)?;
            let orchestrator = build_orchestrator(&connection, &config.management)?;
            execute_queue_create(&orchestrator, &spec, out).await
        }
        Some(Commands::Queue {
            action: Some(QueueCommands::Delete { name, connection }),
        }) => {
            let name = parse_name("name", &name)?;
            let orchestrator = build_orchestrator(&connection, &config.management)?;
            execute_queue_delete(&orchestrator, &name, out).await
        }
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// Initialize logging based on CLI arguments and configuration.
///
/// Filter precedence: `--log-level`, then `RUST_LOG`, then the configured level.
fn initialize_logging(cli: &Cli, logging: &LoggingConfig) -> Result<(), CliError> {
    let filter = match &cli.log_level {
        Some(level) => {
            EnvFilter::try_new(level).map_err(|e| CliError::invalid_argument("--log-level", e))?
        }
        None => EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&logging.level))
            .map_err(|e| ConfigError::Invalid {
                key: "logging.level".to_string(),
                message: e.to_string(),
            })?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    // A subscriber may already be installed when the CLI runs in-process.
    let _ = if cli.json_logs || logging.format == LogFormat::Json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };

    Ok(())
}

fn missing_subcommand(group: Option<&str>, out: &mut impl Write) -> Result<(), CliError> {
    writeln!(out, "Specify a subcommand")?;
    writeln!(out, "{}", subcommand_help(group))?;
    Err(CliError::MissingSubcommand)
}

fn subcommand_help(group: Option<&str>) -> String {
    let mut command = Cli::command();
    command.build();

    if let Some(name) = group {
        if let Some(subcommand) = command.find_subcommand_mut(name) {
            return subcommand.render_help().to_string();
        }
    }
    command.render_help().to_string()
}

fn parse_name(arg: &str, value: &str) -> Result<EntityName, CliError> {
    EntityName::new(value).map_err(|e| CliError::invalid_argument(arg, e))
}

fn queue_options(queue: &QueueArgs) -> Result<QueueOptions, CliError> {
    QueueOptions::new(queue.size, queue.partitioned)
        .map_err(|e| CliError::invalid_argument("--size", e))
}

/// Validate `queue create` arguments.
pub fn resolve_queue(name: &str, queue: &QueueArgs) -> Result<QueueSpec, CliError> {
    Ok(QueueSpec::new(
        parse_name("name", name)?,
        &queue_options(queue)?,
    ))
}

/// Validate `endpoint create` arguments and apply topic/subscription defaults.
pub fn resolve_endpoint(
    name: &str,
    queue: &QueueArgs,
    topic: Option<&str>,
    subscription: Option<&str>,
) -> Result<EndpointTopology, CliError> {
    let endpoint = parse_name("name", name)?;
    let options = EndpointOptions {
        queue: queue_options(queue)?,
        topic: topic.map(|t| parse_name("--topic", t)).transpose()?,
        subscription: subscription
            .map(|s| parse_name("--subscription", s))
            .transpose()?,
    };

    // The endpoint name doubles as the subscription name unless one is given.
    EndpointTopology::resolve(endpoint, &options).map_err(|e| match (subscription, e) {
        (None, e @ ValidationError::OutOfRange { .. }) => CliError::invalid_argument(
            "name",
            format!("{}; pass --subscription to choose a shorter subscription name", e),
        ),
        (None, e) => CliError::invalid_argument(
            "name",
            format!("{}; pass --subscription to choose a subscription name", e),
        ),
        (Some(_), e) => CliError::invalid_argument("--subscription", e),
    })
}

fn build_orchestrator(
    connection: &ConnectionArgs,
    management: &ManagementConfig,
) -> Result<ProvisioningOrchestrator<AzureServiceBusClient>, CliError> {
    let connection_string = connection
        .connection_string
        .as_deref()
        .map(ConnectionString::parse)
        .transpose()
        .map_err(|e| CliError::invalid_argument("--connection-string", e))?;

    let client = AzureServiceBusClient::new(connection_string, management.client_settings())?;
    Ok(ProvisioningOrchestrator::new(client))
}

/// Execute `endpoint create`.
pub async fn execute_endpoint_create<M: ManagementClient>(
    orchestrator: &ProvisioningOrchestrator<M>,
    topology: &EndpointTopology,
    out: &mut impl Write,
) -> Result<(), CliError> {
    info!(endpoint = %topology.endpoint(), "Creating endpoint topology");

    let report = orchestrator.create_endpoint_topology(topology).await?;

    if report.queue == EntityOutcome::AlreadyExisted {
        writeln!(out, "Queue already exists, skipping creation")?;
    }
    if report.topic == EntityOutcome::AlreadyExisted {
        writeln!(out, "Topic already exists, skipping creation")?;
    }
    if report.subscription == EntityOutcome::AlreadyExisted {
        writeln!(out, "Subscription already exists, skipping creation")?;
    }
    writeln!(out, "Endpoint '{}' is ready.", topology.endpoint())?;
    Ok(())
}

/// Execute `queue create`.
pub async fn execute_queue_create<M: ManagementClient>(
    orchestrator: &ProvisioningOrchestrator<M>,
    spec: &QueueSpec,
    out: &mut impl Write,
) -> Result<(), CliError> {
    if orchestrator.create_queue(spec).await? == EntityOutcome::AlreadyExisted {
        writeln!(out, "Queue already exists, skipping creation")?;
    }
    writeln!(
        out,
        "Queue name '{}', size '{}GB', partitioned '{}' created",
        spec.name(),
        spec.max_size_in_mb() / 1024,
        spec.partitioned()
    )?;
    Ok(())
}

/// Execute `queue delete`.
pub async fn execute_queue_delete<M: ManagementClient>(
    orchestrator: &ProvisioningOrchestrator<M>,
    name: &EntityName,
    out: &mut impl Write,
) -> Result<(), CliError> {
    orchestrator.delete_queue(name).await?;
    writeln!(out, "Queue name '{}' deleted", name)?;
    Ok(())
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
