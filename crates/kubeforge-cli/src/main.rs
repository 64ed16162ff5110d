//! Kubeforge CLI - local Kubernetes clusters on k3d and kind

use clap::{Parser, Subcommand};
use kubeforge_cluster::CancellationToken;
use kubeforge_core::ClusterType;
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;
mod config;
mod display;
mod error;
mod exit_codes;

use commands::App;
use config::GlobalOptions;
use error::Result;

#[derive(Parser)]
#[command(name = "kubeforge")]
#[command(author = "Kubeforge Contributors")]
#[command(version)]
#[command(about = "Create, inspect and tear down local Kubernetes clusters", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging and verbose tool output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log the tool invocations instead of running them
    #[arg(long, global = true)]
    dry_run: bool,

    /// Settings file (default: <config dir>/kubeforge/config.yaml)
    #[arg(long, global = true, env = "KUBEFORGE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a cluster (no-op if it already exists)
    Create {
        /// Cluster name (default from settings, "kubeforge-dev")
        name: Option<String>,

        /// Cluster type (k3d, kind)
        #[arg(short = 't', long = "type")]
        cluster_type: Option<ClusterType>,

        /// Total number of nodes, control plane included
        #[arg(short, long)]
        nodes: Option<u32>,

        /// Kubernetes version, e.g. v1.31.5-k3s1
        #[arg(long)]
        k8s_version: Option<String>,
    },

    /// Delete a cluster
    Delete {
        /// Cluster name
        name: String,

        /// Cluster type (detected when omitted)
        #[arg(short = 't', long = "type")]
        cluster_type: Option<ClusterType>,

        /// Delete even if the backend reports errors
        #[arg(short, long)]
        force: bool,
    },

    /// Start a stopped cluster
    Start {
        /// Cluster name
        name: String,

        /// Cluster type (detected when omitted)
        #[arg(short = 't', long = "type")]
        cluster_type: Option<ClusterType>,
    },

    /// List clusters
    List {
        /// Only list clusters of this type
        #[arg(short = 't', long = "type")]
        cluster_type: Option<ClusterType>,

        /// Output as JSON
        #[arg(long, conflicts_with = "quiet")]
        json: bool,

        /// Only print cluster names
        #[arg(short, long)]
        quiet: bool,
    },

    /// Show cluster status and nodes
    Status {
        /// Cluster name
        name: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Prune unused images inside the cluster's nodes
    Cleanup {
        /// Cluster name
        name: String,

        /// Cluster type (detected when omitted)
        #[arg(short = 't', long = "type")]
        cluster_type: Option<ClusterType>,
    },

    /// Print the cluster's kubeconfig
    Kubeconfig {
        /// Cluster name
        name: String,

        /// Cluster type (detected when omitted)
        #[arg(short = 't', long = "type")]
        cluster_type: Option<ClusterType>,
    },
}

#[tokio::main]
async fn main() {
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let ctx = CancellationToken::new();
    spawn_interrupt_handler(ctx.clone());

    let options = GlobalOptions {
        verbose: cli.verbose,
        dry_run: cli.dry_run,
        config_path: cli.config,
    };

    if let Err(err) = run(cli.command, options, ctx).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

async fn run(command: Commands, options: GlobalOptions, ctx: CancellationToken) -> Result<()> {
    let app = App::new(options, ctx)?;

    match command {
        Commands::Create {
            name,
            cluster_type,
            nodes,
            k8s_version,
        } => {
            commands::create::run(
                &app,
                name.as_deref(),
                cluster_type,
                nodes,
                k8s_version.as_deref(),
            )
            .await
        }

        Commands::Delete {
            name,
            cluster_type,
            force,
        } => commands::delete::run(&app, &name, cluster_type, force).await,

        Commands::Start { name, cluster_type } => {
            commands::start::run(&app, &name, cluster_type).await
        }

        Commands::List {
            cluster_type,
            json,
            quiet,
        } => commands::list::run(&app, cluster_type, json, quiet).await,

        Commands::Status { name, json } => commands::status::run(&app, &name, json).await,

        Commands::Cleanup { name, cluster_type } => {
            commands::cleanup::run(&app, &name, cluster_type).await
        }

        Commands::Kubeconfig { name, cluster_type } => {
            commands::kubeconfig::run(&app, &name, cluster_type).await
        }
    }
}

/// `info` by default, `debug` with --verbose; `RUST_LOG` wins over both
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(std::io::stderr().is_terminal())
                .with_writer(std::io::stderr),
        )
        .try_init();
}

/// Cancel the root token on Ctrl-C; running tools are killed
fn spawn_interrupt_handler(ctx: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling");
            ctx.cancel();
        }
    });
}
