//! # convo
//!
//! Command-line chat client: sends one message to a teammate, streams the
//! reply through the reconciliation engine and prints the transcript.

#![deny(unsafe_code)]

use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use tracing::info;

use convo_client::{ChatRequest, HttpTransport, SessionStore, Transport, render_transcript};
use convo_core::ids::SessionId;
use convo_core::logging::{LogFormat, init_subscriber};
use convo_settings::{ConvoSettings, get_settings};
use convo_stream::{StreamController, StreamOutcome};

/// Streaming chat client.
#[derive(Parser, Debug)]
#[command(name = "convo", about = "Streaming chat client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a message and stream the reply.
    Send {
        /// Teammate (agent) UUID.
        #[arg(long)]
        teammate: String,

        /// Message text.
        message: String,
    },
    /// Run a recorded response stream through the engine offline.
    Replay {
        /// File containing the raw response body.
        file: PathBuf,

        /// Bytes delivered per chunk.
        #[arg(long, default_value = "4096")]
        chunk_size: usize,
    },
    /// Forget the stored session.
    Reset,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let settings = get_settings();
    init_subscriber(
        &settings.logging.level,
        LogFormat::parse(&settings.logging.format),
    );

    match cli.command {
        Command::Send { teammate, message } => send(settings, teammate, message).await,
        Command::Replay { file, chunk_size } => replay(settings, &file, chunk_size).await,
        Command::Reset => {
            let store = SessionStore::from_settings(&settings.client);
            store.clear().context("failed to clear session state")?;
            info!(path = %store.path().display(), "session state cleared");
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn send(settings: &ConvoSettings, teammate: String, message: String) -> Result<ExitCode> {
    let store = SessionStore::from_settings(&settings.client);
    let mut state = store.load().context("failed to read session state")?;
    if state.for_teammate(&teammate) {
        info!(teammate = %teammate, "teammate changed, starting a new session");
    }

    let transport = HttpTransport::new(&settings.client).context("failed to build HTTP client")?;
    let mut controller = StreamController::from_settings(&settings.stream);
    let engine = controller.engine_mut();
    engine.set_session_id(state.session_id.clone().map(SessionId::from));
    let _ = engine.push_user(&message);

    let request = ChatRequest {
        message,
        agent_uuid: teammate,
        session_id: state.session_id.clone(),
    };
    let stream = transport
        .open(&request)
        .await
        .with_context(|| format!("failed to reach {}", transport.endpoint()))?;

    let token = controller.cancel_token();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
    let outcome = controller.run(stream).await;
    ctrl_c.abort();

    state.session_id = controller
        .engine()
        .session_id()
        .map(ToString::to_string);
    store.save(&state).context("failed to save session state")?;

    Ok(report(&controller, &outcome))
}

async fn replay(settings: &ConvoSettings, file: &Path, chunk_size: usize) -> Result<ExitCode> {
    let data = Bytes::from(
        std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?,
    );
    let size = chunk_size.max(1);
    let chunks: Vec<Result<Bytes, Infallible>> = (0..data.len())
        .step_by(size)
        .map(|start| Ok(data.slice(start..(start + size).min(data.len()))))
        .collect();

    let mut controller = StreamController::from_settings(&settings.stream);
    let outcome = controller.run(futures::stream::iter(chunks)).await;
    Ok(report(&controller, &outcome))
}

fn report(controller: &StreamController, outcome: &StreamOutcome) -> ExitCode {
    print!("{}", render_transcript(&controller.engine().snapshot()));
    match outcome {
        StreamOutcome::Completed => ExitCode::SUCCESS,
        StreamOutcome::Cancelled => {
            eprintln!("Cancelled.");
            ExitCode::FAILURE
        }
        failed => {
            if let Some(banner) = failed.banner(controller.inactivity()) {
                eprintln!("{banner}");
            }
            ExitCode::FAILURE
        }
    }
}
