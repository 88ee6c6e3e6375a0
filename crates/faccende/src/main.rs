use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

mod diff;
mod html;
mod logic;
mod pipeline;
mod server;
mod source;
mod types;
mod undo;
mod view;

use source::{SourceConfig, TaskSource};

#[derive(Parser, Debug)]
#[command(name = "faccende")]
#[command(about = "Poll a chores sheet and serve a cleaning-status dashboard")]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the web server (default)
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,

        /// Seconds between background polls of the task source
        #[arg(long, default_value = "300")]
        poll: u64,

        /// Milliseconds the mark-done undo window stays open
        #[arg(long, default_value_t = undo::UNDO_WINDOW_MS)]
        undo_window: u64,
    },

    /// Fetch once and write a static HTML snapshot (no server)
    Build {
        /// Output path for the generated file
        #[arg(short, long, default_value = "index.html")]
        output: PathBuf,
    },

    /// Fetch once and log the normalized tasks
    Fetch,
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level))
        .add_directive("hyper=warn".parse().unwrap())
        .add_directive("tower_http=warn".parse().unwrap());

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_max_level(Level::TRACE)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(&args.log_level);

    let command = args.command.unwrap_or(Commands::Serve {
        port: 8080,
        poll: 300,
        undo_window: undo::UNDO_WINDOW_MS,
    });

    match command {
        Commands::Serve {
            port,
            poll,
            undo_window,
        } => {
            let source = TaskSource::new(SourceConfig::from_env()?);
            server::serve(
                source,
                port,
                Duration::from_secs(poll),
                Duration::from_millis(undo_window),
            )
            .await?;
        }
        Commands::Build { output } => {
            let source = TaskSource::new(SourceConfig::from_env()?);
            let tasks = source.fetch_tasks().await?;
            html::generate_html(&tasks, &output)?;
            info!(count = tasks.len(), path = %output.display(), "HTML saved");
        }
        Commands::Fetch => {
            let source = TaskSource::new(SourceConfig::from_env()?);
            let tasks = source.fetch_tasks().await?;
            info!(count = tasks.len(), "Found tasks");
            for task in &tasks {
                info!(
                    task = %task.task,
                    room = task.room.as_deref().unwrap_or("—"),
                    status = %logic::derive_status(task),
                    "Task"
                );
            }
        }
    }

    Ok(())
}
