//! CLI command definitions.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Render a graph template and print it as JSON
    Render {
        /// Path to the graph template
        graph: PathBuf,

        /// YAML or JSON file with the template variables
        #[arg(short, long)]
        vars: PathBuf,
    },

    /// Schedule a graph against an in-memory queue and print each task
    Schedule {
        /// Path or URL of the graph template
        graph: String,

        /// YAML or JSON file with the template variables
        #[arg(short, long)]
        vars: PathBuf,

        /// Project alias
        #[arg(short, long)]
        project: String,

        /// Extra scopes granted to every task
        #[arg(short, long)]
        scope: Vec<String>,
    },

    /// Handle a push the way the push job does, without a real queue
    Push {
        /// Project alias
        alias: String,

        /// Repository url
        #[arg(long)]
        repo_url: String,

        /// Pushlog id
        #[arg(long)]
        pushlog_id: u64,

        /// Revision hash of the push
        #[arg(long)]
        revision_hash: String,
    },

    /// Print the JSON schema of a task definition
    Schema,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate a try configuration
    Validate {
        /// Path to the try configuration, defaults to the configured one
        path: Option<PathBuf>,
    },

    /// Show current configuration
    Show,

    /// Set configuration value
    Set {
        /// Key
        key: String,

        /// Value
        value: String,
    },
}
