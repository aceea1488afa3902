#![forbid(unsafe_code)]

//! `natty` — run one NAT traversal session from the command line.
//!
//! The process's own stdio is the signaling transport: every signaling
//! message the engine emits is printed as one line on stdout, and every line
//! read from stdin is handed to the engine as a message from the remote peer.
//! On success the negotiated five-tuple is printed as a JSON line. Logs go to
//! stderr.

use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use clap::{Parser, ValueEnum};
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use natty::engine::codec::RecordCodec;
use natty::{AppError, DebugSink, EngineBinary, EngineConfig, InboundHandle, Result, Role, Session};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum RoleArg {
    Offer,
    Answer,
}

impl From<RoleArg> for Role {
    fn from(arg: RoleArg) -> Self {
        match arg {
            RoleArg::Offer => Self::Offerer,
            RoleArg::Answer => Self::Answerer,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "natty", about = "Run one natty NAT traversal session", version, long_about = None)]
struct Cli {
    /// Negotiation role.
    #[arg(value_enum)]
    role: RoleArg,

    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Engine executable; overrides `binary` from the config file.
    #[arg(long)]
    binary: Option<PathBuf>,

    /// Run the engine with `-debug` and relay its stderr.
    #[arg(long)]
    debug: bool,

    /// Give up after this many seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?;
    let result = runtime.block_on(run(args));
    // The stdin reader may still be parked in a blocking read.
    runtime.shutdown_timeout(Duration::from_millis(100));
    result
}

async fn run(args: Cli) -> Result<()> {
    let config = load_config(args.config.as_ref(), args.binary)?;
    let role = Role::from(args.role);

    let (out_tx, out_rx) = mpsc::unbounded_channel::<Bytes>();
    let writer = tokio::spawn(write_stdout(out_rx));

    let sink_tx = out_tx.clone();
    let sink = move |msg: Bytes| {
        if sink_tx.send(msg).is_err() {
            warn!("stdout writer stopped, dropping signaling message");
        }
    };
    let debug: Option<DebugSink> = args
        .debug
        .then(|| Box::new(tokio::io::stderr()) as DebugSink);

    let session = Session::new(config, sink, debug);
    info!(session_id = session.id(), %role, "starting session");

    let reader = tokio::spawn(read_stdin(session.inbound()));

    let cancel = CancellationToken::new();
    let canceller = tokio::spawn(cancel_on_signal(cancel.clone(), args.timeout_secs));

    let outcome = session.run(role, cancel).await;
    canceller.abort();
    reader.abort();

    if let Ok(tuple) = &outcome {
        let line = serde_json::to_vec(tuple)
            .map_err(|err| AppError::Io(format!("failed to encode result: {err}")))?;
        if out_tx.send(Bytes::from(line)).is_err() {
            warn!("stdout writer stopped before the result could be printed");
        }
    }
    drop(out_tx);
    if let Err(err) = writer.await {
        warn!(%err, "stdout writer task failed");
    }

    outcome.map(|_| ())
}

fn load_config(path: Option<&PathBuf>, binary: Option<PathBuf>) -> Result<EngineConfig> {
    let config = match (path, binary) {
        (Some(path), binary) => {
            let mut config = EngineConfig::load_from_path(path)?;
            if let Some(binary) = binary {
                config.binary = EngineBinary::Path(binary);
            }
            config
        }
        (None, Some(binary)) => EngineConfig::with_binary(EngineBinary::Path(binary)),
        (None, None) => {
            return Err(AppError::Config(
                "either --config or --binary is required".into(),
            ))
        }
    };
    config.validate()?;
    Ok(config)
}

/// Print each outbound signaling message as one stdout line.
async fn write_stdout(mut messages: mpsc::UnboundedReceiver<Bytes>) {
    let mut stdout = tokio::io::stdout();
    while let Some(msg) = messages.recv().await {
        let written = async {
            stdout.write_all(&msg).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await
        }
        .await;
        if let Err(err) = written {
            warn!(%err, "failed to write to stdout");
            break;
        }
    }
}

/// Submit each stdin line to the engine as a message from the remote peer.
async fn read_stdin(inbound: InboundHandle) {
    let mut lines = FramedRead::new(tokio::io::stdin(), RecordCodec::new());
    while let Some(line) = lines.next().await {
        let outcome = match line {
            Ok(line) => inbound.submit(line).await,
            Err(err) => Err(err),
        };
        if let Err(err) = outcome {
            warn!(%err, "stopped forwarding stdin to the engine");
            return;
        }
    }
    info!("stdin closed, no more inbound messages");
}

async fn cancel_on_signal(cancel: CancellationToken, timeout_secs: Option<u64>) {
    let deadline = async {
        match timeout_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    let interrupted = tokio::select! {
        result = tokio::signal::ctrl_c() => Some(result),
        () = &mut deadline => None,
    };

    match interrupted {
        Some(Ok(())) => info!("interrupted, cancelling session"),
        Some(Err(err)) => {
            warn!(%err, "ctrl-c signal handler failed, relying on timeout only");
            deadline.await;
            info!(timeout_secs, "timeout reached, cancelling session");
        }
        None => info!(timeout_secs, "timeout reached, cancelling session"),
    }

    cancel.cancel();
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
