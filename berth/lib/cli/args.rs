use std::path::PathBuf;

use clap::Parser;

use crate::cli::styles;

//-------------------------------------------------------------------------------------------------
// Types
//-------------------------------------------------------------------------------------------------

/// `berth` is a deployment and lifecycle manager for self-hosted apps on a
/// compose-compatible container engine
#[derive(Debug, Parser)]
#[command(name = "berth", author, styles=styles::styles())]
pub struct BerthArgs {
    /// The subcommand to run
    #[command(subcommand)]
    pub subcommand: Option<BerthSubcommand>,

    /// Override the berth home directory
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    /// Show version
    #[arg(short = 'v', long)]
    pub version: bool,
}

/// Available subcommands for managing apps
#[derive(Debug, Parser)]
pub enum BerthSubcommand {
    /// Initialize the berth home layout and state database
    #[command(name = "init")]
    Init,

    /// Deploy an app from a compose manifest
    #[command(name = "deploy")]
    Deploy {
        /// The app identifier
        #[arg(required = true)]
        app_id: String,

        /// Path to an existing compose manifest to install from
        #[arg(short = 'f', long)]
        compose: Option<PathBuf>,

        /// Read the compose manifest from stdin
        #[arg(long)]
        stdin: bool,

        /// Port overrides (host:container)
        #[arg(short, long)]
        ports: Vec<String>,

        /// Volume overrides (source:target[:ro])
        #[arg(long)]
        volumes: Vec<String>,

        /// Environment overrides (NAME=VALUE)
        #[arg(short, long)]
        envs: Vec<String>,

        /// The externally reachable web UI port
        #[arg(long)]
        web_ui_port: Option<u16>,

        /// Display name
        #[arg(long)]
        name: Option<String>,

        /// Apps that must already be installed
        #[arg(long)]
        depends_on: Vec<String>,
    },

    /// Start an app
    #[command(name = "start")]
    Start {
        /// App identifier or container name
        #[arg(required = true)]
        name: String,
    },

    /// Stop an app
    #[command(name = "stop")]
    Stop {
        /// App identifier or container name
        #[arg(required = true)]
        name: String,
    },

    /// Restart an app
    #[command(name = "restart")]
    Restart {
        /// App identifier or container name
        #[arg(required = true)]
        name: String,
    },

    /// Update an app to its latest images, rolling back on failure
    #[command(name = "update")]
    Update {
        /// App identifier or container name
        #[arg(required = true)]
        name: String,
    },

    /// Uninstall an app
    #[command(name = "uninstall")]
    Uninstall {
        /// The app identifier
        #[arg(required = true)]
        app_id: String,

        /// Permanently delete the app's data instead of moving it to trash
        #[arg(long)]
        purge: bool,
    },

    /// List apps known to the engine or the install store
    #[command(name = "list")]
    List,

    /// Show an app's aggregate status
    #[command(name = "status")]
    Status {
        /// The app identifier
        #[arg(required = true)]
        app_id: String,
    },

    /// Fetch an app's recent log lines
    #[command(name = "logs")]
    Logs {
        /// App identifier or container name
        #[arg(required = true)]
        name: String,

        /// Number of trailing lines to fetch
        #[arg(short = 'n', long, default_value_t = 100)]
        lines: usize,
    },

    /// Permanently delete soft-deleted app data
    #[command(name = "empty-trash")]
    EmptyTrash,
}
