use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use file_vault::{config::Config, storage::models::FolderRecord, FileService, RequestContext};

#[derive(Parser)]
#[command(name = "file-vault")]
#[command(about = "Content-addressable file storage", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest files or directory trees
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Target folder path, created if missing (default folder otherwise)
        #[arg(short, long)]
        folder: Option<String>,
    },
    /// Print the folder tree
    Folders {
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    match log_format.to_lowercase().as_str() {
        "gcp" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_stackdriver::layer())
                .init();
        }
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_span_list(false),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = Cli::parse();
    info!(version = env!("CARGO_PKG_VERSION"), "file-vault starting");

    let config = Config::load()?;
    info!(
        storage_root = %config.storage.storage_root.display(),
        data_dir = %config.storage.data_dir.display(),
        "Loaded configuration"
    );

    let service = FileService::open(config)?;

    match cli.command {
        Command::Ingest { paths, folder } => ingest(&service, paths, folder).await?,
        Command::Folders { json } => print_folders(&service, json)?,
    }

    info!("Shutdown complete");
    Ok(())
}

async fn ingest(service: &FileService, paths: Vec<PathBuf>, folder: Option<String>) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let ctx = RequestContext::system().with_cancellation(cancel.clone());

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            cancel.cancel();
        }
    });

    let folder_id = match folder {
        Some(path) => Some(service.get_or_create_folder(&ctx, &path)?.id),
        None => None,
    };

    let mut failed = 0;
    for path in paths {
        match service.ingest(&ctx, &path, folder_id.as_deref()).await {
            Ok(report) => {
                for failure in &report.failures {
                    tracing::error!(path = %failure.path.display(), error = %failure.error, "Ingest failed");
                }
                failed += report.failures.len();
                println!(
                    "{}: {} uploaded, {} duplicates, {} failed",
                    path.display(),
                    report.uploaded.len(),
                    report.duplicates,
                    report.failures.len()
                );
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Ingest aborted");
                return Err(e.into());
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} files failed to ingest");
    }
    Ok(())
}

fn print_folders(service: &FileService, json: bool) -> anyhow::Result<()> {
    let mut all: Vec<(usize, FolderRecord)> = Vec::new();
    let mut stack: Vec<(usize, FolderRecord)> = service
        .list_folders(None)?
        .into_iter()
        .rev()
        .map(|f| (0, f))
        .collect();

    while let Some((depth, folder)) = stack.pop() {
        for child in service.list_folders(Some(&folder.id))?.into_iter().rev() {
            stack.push((depth + 1, child));
        }
        all.push((depth, folder));
    }

    if json {
        let folders: Vec<&FolderRecord> = all.iter().map(|(_, f)| f).collect();
        println!("{}", serde_json::to_string_pretty(&folders)?);
        return Ok(());
    }

    for (depth, folder) in &all {
        let count = service.list_files(Some(&folder.id))?.len();
        let marker = if folder.protected { " (protected)" } else { "" };
        println!("{}{}/  [{count} files]{marker}", "  ".repeat(*depth), folder.name);
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, cancelling in-flight work");
}
