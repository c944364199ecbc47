use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use logrelay::ingest::ingest_lines;
use logrelay::Pipeline;
use logrelay_core::config::Config;
use logrelay_core::MemoryLogStore;
use logrelay_stream::{LogPayload, StreamClient};
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "logrelay", about = "Log event bus with live WebSocket streaming")]
struct Cli {
    /// Verbose operator logs on stderr (overridden by RUST_LOG).
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the pipeline: stream server plus `GET /logs`.
    Serve {
        /// Config file (defaults to ~/.config/logrelay/config.toml when present).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Listening port; wins over the config file and LOG_STREAM_PORT.
        #[arg(long)]
        port: Option<u16>,

        /// Publish stdin lines as log events.
        #[arg(long)]
        stdin: bool,
    },
    /// Print a running server's stream to stdout, one event per line.
    Watch {
        #[arg(long, default_value = "ws://127.0.0.1:8080/")]
        url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    match cli.command {
        Command::Serve {
            config,
            port,
            stdin,
        } => serve(config, port, stdin).await,
        Command::Watch { url } => watch(url).await,
    }
}

async fn serve(config_path: Option<PathBuf>, port: Option<u16>, stdin: bool) -> anyhow::Result<()> {
    let mut config = Config::load(config_path.as_deref()).context("failed to load configuration")?;
    if let Some(port) = port {
        config.stream.port = port;
    }

    let store = Arc::new(MemoryLogStore::new(config.store.capacity));
    let pipeline = Pipeline::build(config, store)?;
    pipeline.start().await.context("failed to start log stream")?;

    if stdin {
        let logger = pipeline.logger().clone();
        tokio::spawn(async move {
            match ingest_lines(BufReader::new(tokio::io::stdin()), &logger).await {
                Ok(n) => tracing::info!(published = n, "stdin closed"),
                Err(e) => tracing::error!(error = %e, "failed to read stdin"),
            }
        });
    }

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    pipeline.shutdown().await;
    Ok(())
}

async fn watch(url: String) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::channel::<LogPayload>(256);
    let cancel = CancellationToken::new();
    let client = StreamClient::new(url);

    let task = tokio::spawn({
        let cancel = cancel.clone();
        async move { client.run(tx, cancel).await }
    });

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            payload = rx.recv() => match payload {
                Some(payload) => println!("{}", render(&payload)),
                None => break,
            },
        }
    }

    cancel.cancel();
    task.await.context("stream client task failed")?;
    Ok(())
}

fn render(payload: &LogPayload) -> String {
    let time = chrono::DateTime::from_timestamp_millis(payload.timestamp)
        .map(|t| t.with_timezone(&chrono::Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| payload.timestamp.to_string());
    format!(
        "[{time}] {}: {}",
        payload.level.as_str().to_uppercase(),
        payload.message
    )
}
