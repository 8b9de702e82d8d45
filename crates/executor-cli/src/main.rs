use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod dispatch;

#[derive(Parser)]
#[command(name = "pipeline-executor")]
#[command(about = "Drive pipeline tasks through their action executors", long_about = None)]
struct Cli {
    /// Config file (defaults to the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

/// Addresses one task on one executor.
#[derive(Args)]
struct TaskArgs {
    /// Executor name, e.g. k8sjob-dev or docker-local
    executor: String,

    /// Task descriptor (YAML)
    #[arg(long)]
    task: PathBuf,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List live executors by kind
    Executors {
        #[arg(long)]
        json: bool,
    },

    /// Rebuild every cluster executor, then list
    Refresh {
        #[arg(long)]
        json: bool,
    },

    /// Show task status
    Status(TaskArgs),

    /// Show backend diagnostics for a task
    Inspect(TaskArgs),

    /// Create (if needed) and start a task
    Start(TaskArgs),

    /// Cancel a task
    Cancel(TaskArgs),

    /// Remove a task's backend objects
    Remove(TaskArgs),

    /// Delete a pipeline namespace once no live task objects remain
    Cleanup {
        /// Executor name, e.g. k8sjob-dev
        executor: String,

        #[arg(long)]
        namespace: String,
    },

    /// Show or initialize configuration
    Config {
        /// Print the config file path
        #[arg(long)]
        path: bool,

        /// Write a sample config file
        #[arg(long)]
        init: bool,
    },
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    use commands::task::Op;
    use Commands::*;

    match cli.command {
        Executors { json } => {
            let config = dispatch::load_config(cli.config.as_deref())?;
            commands::executors::run(&config, false, json).await?;
        }
        Refresh { json } => {
            let config = dispatch::load_config(cli.config.as_deref())?;
            commands::executors::run(&config, true, json).await?;
        }
        Status(args) => run_task(cli.config, Op::Status, args).await?,
        Inspect(args) => run_task(cli.config, Op::Inspect, args).await?,
        Start(args) => run_task(cli.config, Op::Start, args).await?,
        Cancel(args) => run_task(cli.config, Op::Cancel, args).await?,
        Remove(args) => run_task(cli.config, Op::Remove, args).await?,
        Cleanup { executor, namespace } => {
            let config = dispatch::load_config(cli.config.as_deref())?;
            commands::task::clean_up(&config, &executor, &namespace).await?;
        }
        Config { path, init } => {
            commands::config::run(cli.config.as_deref(), path, init).await?;
        }
    }

    Ok(())
}

async fn run_task(config: Option<PathBuf>, op: commands::task::Op, args: TaskArgs) -> Result<()> {
    let config = dispatch::load_config(config.as_deref())?;
    commands::task::run(&config, op, &args.executor, &args.task, args.json).await
}
