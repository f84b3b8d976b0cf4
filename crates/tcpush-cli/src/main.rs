//! tcpush CLI entrypoint.

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod client;
mod commands;
mod config;
mod handlers;

#[cfg(test)]
mod client_tests;

use commands::{Commands, ConfigCommands};
use config::{CliConfig, LogFormat};

#[derive(Parser)]
#[command(name = "tcpush")]
#[command(author, version, about = "Instantiate and schedule push task graphs", long_about = None)]
struct Cli {
    /// Log output format
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    /// Try configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    // stdout carries command output, logs go to stderr
    match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = CliConfig::load().unwrap_or_default();
    init_tracing(cli.log_format.unwrap_or(config.log_format));

    let try_config = cli.config.as_deref();

    match cli.command {
        Commands::Render { graph, vars } => handlers::render(&graph, &vars)?,
        Commands::Schedule {
            graph,
            vars,
            project,
            scope,
        } => handlers::schedule(&config, try_config, &graph, &vars, &project, &scope).await?,
        Commands::Push {
            alias,
            repo_url,
            pushlog_id,
            revision_hash,
        } => {
            handlers::push(
                &config,
                try_config,
                &alias,
                &repo_url,
                pushlog_id,
                &revision_hash,
            )
            .await?
        }
        Commands::Schema => handlers::schema()?,
        Commands::Config { command } => match command {
            ConfigCommands::Validate { path } => {
                handlers::validate_config(&config, path.as_deref().or(try_config))?
            }
            ConfigCommands::Show => handlers::show_config(&config)?,
            ConfigCommands::Set { key, value } => handlers::set_config(&key, &value)?,
        },
    }

    Ok(())
}
