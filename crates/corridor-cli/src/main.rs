//! Corridor terminal client.
//!
//! Prints one line per model change and reads commands from stdin.
//!
//! Usage:
//!   cargo run -p corridor-cli
//!   cargo run -p corridor-cli -- --base-url https://corridor.example
//!   RUST_LOG=corridor_client=debug cargo run -p corridor-cli -- --token <bearer>

mod command;
mod render;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt};

use corridor_client::{
    ClientConfig, CommandOutcome, ConnectError, CorridorClient, FileTokenStore, MemoryTokenStore,
    MoveOutcome, SessionStatus, TextDraft, TokenStore, TransportError, connect,
};

use crate::command::{Command, RequestVerb};
use crate::render::render;

/// Terminal client for the corridor presence service.
#[derive(Parser, Debug)]
#[command(name = "corridor")]
#[command(about = "Watch and steer your place in the corridor")]
struct Args {
    /// Backend base URL (overrides the config file)
    #[arg(long)]
    base_url: Option<String>,

    /// Config file (RON). Defaults to $CONFIG_DIR/corridor/client.ron
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bearer token for this run only; the stored token is left untouched
    #[arg(long)]
    token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::load_or_default()?,
    };
    if let Some(base_url) = args.base_url {
        config.base_url = base_url;
    }

    let tokens: Arc<dyn TokenStore> = match args.token {
        Some(token) => Arc::new(MemoryTokenStore::new(Some(token))),
        None => Arc::new(FileTokenStore::default_location()?),
    };

    tracing::info!(base_url = %config.base_url, "Connecting");
    let client = match connect(config, tokens).await {
        Ok(client) => client,
        Err(ConnectError::Unavailable(e)) => {
            eprintln!("backend unavailable: {e}");
            std::process::exit(2);
        }
        Err(e) => return Err(e.into()),
    };

    match &client.status {
        SessionStatus::Authenticated(user) => {
            tracing::info!(user_id = %user.id, username = ?user.username, "Signed in");
        }
        _ => tracing::warn!("Not signed in; actions will be rejected"),
    }

    let result = run(&client).await;
    client.shutdown().await;
    result
}

async fn run(client: &CorridorClient) -> Result<()> {
    let mut state = client.session.state();
    let mut draft = TextDraft::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("{}", render(&state.borrow_and_update()));

    loop {
        tokio::select! {
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = state.borrow_and_update().clone();
                draft.sync(&current);
                println!("{}", render(&current));
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match command::parse(&line) {
                    Ok(Command::Quit) => break,
                    Ok(cmd) => println!("{}", execute(client, &mut draft, cmd).await),
                    Err(e) => eprintln!("{e}"),
                }
            }
        }
    }
    Ok(())
}

async fn execute(client: &CorridorClient, draft: &mut TextDraft, cmd: Command) -> String {
    let dispatch = &client.dispatcher;
    let outcome = match cmd {
        Command::Move(side) => {
            return match dispatch.move_toward(side).await {
                Ok(MoveOutcome::Moved(result)) => format!(
                    "moved {} -> {} of {}",
                    result.from_index + 1,
                    result.to_index + 1,
                    result.corridor_size
                ),
                Ok(MoveOutcome::Conflict) => "can't move right now".to_string(),
                Ok(MoveOutcome::Skipped(why)) => format!("not moving: {why}"),
                Err(e) => describe(&e),
            };
        }
        Command::Lock => dispatch.lock().await,
        Command::Unlock => dispatch.unlock().await,
        Command::Leave => dispatch.leave().await,
        Command::Request(verb, side) => match verb {
            RequestVerb::Send => dispatch.send_request(side).await,
            RequestVerb::Cancel => dispatch.cancel_request(side).await,
            RequestVerb::Accept => dispatch.accept_request(side).await,
            RequestVerb::Reject => dispatch.reject_request(side).await,
        },
        Command::Text(text) => {
            if !draft.is_hydrated() {
                draft.edit(text);
                return "text not loaded yet; try again after the snapshot".to_string();
            }
            return match draft.edit(text) {
                Some(text) => match dispatch.update_text(text) {
                    Ok(()) => "text sent".to_string(),
                    Err(e) => describe(&e),
                },
                None => "text unchanged".to_string(),
            };
        }
        Command::Refresh => {
            return match client.session.refresh() {
                Ok(()) => "refreshing".to_string(),
                Err(e) => e.to_string(),
            };
        }
        Command::Quit => return String::new(),
    };

    match outcome {
        Ok(CommandOutcome::Sent) => "ok".to_string(),
        Ok(CommandOutcome::Skipped(why)) => format!("skipped: {why}"),
        Err(e) => describe(&e),
    }
}

fn describe(e: &TransportError) -> String {
    match e {
        TransportError::Unauthorized => "not signed in".to_string(),
        TransportError::PushInactive => "push channel not connected".to_string(),
        e if e.is_unavailable() => format!("backend unavailable: {e}"),
        e => e.to_string(),
    }
}
