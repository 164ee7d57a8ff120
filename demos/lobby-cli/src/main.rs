//! Logs in, joins the matchmaking queue and waits for a match.
//!
//! ```text
//! LOBBYLINK_HOST=127.0.0.1 LOBBYLINK_PORT=7350 cargo run -p lobby-cli -- ranked
//! ```
//!
//! The device identity is kept in `--data-dir` (or `$LOBBYLINK_DATA_DIR`,
//! default `.lobbylink`), so repeated runs log in as the same player.

use std::path::PathBuf;

use clap::Parser;
use lobbylink::prelude::*;

#[derive(Debug, Parser)]
#[command(name = "lobby-cli")]
#[command(about = "Queue for a match on a lobbylink service")]
#[command(version)]
struct Args {
    /// Queue to join (casual or ranked)
    #[arg(default_value_t = QueueMode::Casual)]
    mode: QueueMode,

    /// Where the device identity is stored
    #[arg(long, env = "LOBBYLINK_DATA_DIR", default_value = ".lobbylink")]
    data_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    lobbylink::init_tracing();

    let config = ClientConfig::from_env()?;
    eprintln!("connecting to {} ({} queue)", config.http_base_url(), args.mode);

    let mut client = LobbyClient::from_config(config, args.data_dir);
    let session = client.login().await?;
    eprintln!("logged in as {}", session.username());

    let Some(matchmaking) = client.matchmaking().cloned() else {
        client.dispose().await;
        return Err("connected but matchmaking is unavailable".into());
    };

    let mut matches = matchmaking.matches();
    let ticket = matchmaking.enqueue(args.mode).await?;
    eprintln!("queued with ticket {} (ctrl-c to leave)", ticket.id());

    tokio::select! {
        found = wait_for_match(&mut matches, &ticket) => match found {
            Some(found) => println!(
                "match found: match_id={} token={}",
                found.match_id.as_deref().unwrap_or("-"),
                found.token.as_deref().unwrap_or("-"),
            ),
            None => eprintln!("connection closed before a match was found"),
        },
        _ = tokio::signal::ctrl_c() => {
            eprintln!("leaving the queue");
            if let Err(e) = matchmaking.dequeue(&ticket).await {
                tracing::warn!(error = %e, "dequeue failed");
            }
        }
    }

    client.dispose().await;
    Ok(())
}

/// Waits for the match that belongs to `ticket`.
async fn wait_for_match(matches: &mut MatchSubscription, ticket: &QueueTicket) -> Option<MatchFound> {
    while let Some(found) = matches.recv().await {
        if found.is_for(ticket) {
            return Some(found);
        }
    }
    None
}
