//! Strictly Arena - Unified CLI
//!
//! Serves the account API or runs a local match.

#![warn(missing_docs)]

mod cli;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use strictly_arena::{
    AccountBackend, AccountRepository, AccountService, ArenaConfig, AuthorityCoordinator,
    Credentials, HttpAccountClient, InMemoryAccounts, Matchmaker, Participant, ParticipantProfile,
    SessionDirectory, router,
};
use tracing::{info, instrument, warn};
use tracing_subscriber::EnvFilter;

/// Scripted moves for the demo: player 1 wins down the middle column.
const DEMO_MOVES: [i32; 5] = [4, 0, 1, 3, 7];

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Backend {
            port,
            host,
            db_path,
        } => run_backend(host, port, db_path).await,
        Command::Play {
            config,
            disconnect_after,
        } => run_play(config, disconnect_after).await,
        Command::Leaderboard { backend_url } => print_leaderboard(&HttpAccountClient::new(backend_url)).await,
    }
}

/// Serve the account HTTP API over SQLite.
#[instrument]
async fn run_backend(host: String, port: u16, db_path: String) -> Result<()> {
    let repository = AccountRepository::new(db_path)?;
    repository.run_migrations()?;
    let backend: Arc<dyn AccountBackend> = Arc::new(AccountService::new(repository));

    let app = router(backend);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(%addr, "Account API listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Run two local participants through a scripted game.
#[instrument]
async fn run_play(config: Option<std::path::PathBuf>, disconnect_after: Option<usize>) -> Result<()> {
    let config = match config {
        Some(path) => ArenaConfig::from_file(path)?,
        None => ArenaConfig::default(),
    };

    let accounts: Arc<dyn AccountBackend> = match config.backend_url() {
        Some(url) => Arc::new(HttpAccountClient::new(url.clone())),
        None => Arc::new(InMemoryAccounts::new()),
    };
    let alice = sign_in(accounts.as_ref(), "alice").await;
    let bob = sign_in(accounts.as_ref(), "bob").await;

    let directory = SessionDirectory::new(*config.event_capacity());
    let matchmaker = Matchmaker::new(directory.clone(), config.clone());
    let coordinator = AuthorityCoordinator::new(directory, config.clone(), Some(Arc::clone(&accounts)));

    let first = Participant::connect(&matchmaker, &coordinator, alice).await?;
    let second = Participant::connect(&matchmaker, &coordinator, bob).await?;
    info!(session = %first.session(), "Both participants connected");

    let timeout = config.registration_timeout();
    first
        .wait_until(timeout, |r| r.state().as_ref().is_some_and(|s| s.registered_count() == 2))
        .await?;

    let mut first = Some(first);
    for (turn, position) in DEMO_MOVES.iter().enumerate() {
        if disconnect_after == Some(turn) {
            if let Some(authority) = first.take() {
                println!("Authority {} loses its connection", authority.profile().name());
                drop(authority);
            }
            let rebuilt = second
                .wait_until(timeout, |r| {
                    *r.epoch() > 1 && r.state().as_ref().is_some_and(|s| s.board().occupied() == 0)
                })
                .await?;
            println!("{} now holds authority with a fresh board", second.profile().name());
            if let Some(state) = rebuilt.state() {
                println!("{}", state.board().display());
            }
            break;
        }

        let replica = second.replica();
        let Some(state) = replica.state() else {
            warn!("No state available, stopping");
            break;
        };
        let mover = match (state.current_player(), second.seat()) {
            (seat, Some(mine)) if seat == mine => &second,
            _ => match first.as_ref() {
                Some(p) => p,
                None => break,
            },
        };
        let outcome = mover.request_move(*position).await?;
        let updated = second
            .wait_until(timeout, |r| {
                r.state().as_ref().is_some_and(|s| s.board().occupied() == turn + 1)
            })
            .await?;
        println!("{} plays {}", mover.profile().name(), position);
        if let Some(state) = updated.state() {
            println!("{}\n", state.board().display());
        }
        if outcome.is_terminal() {
            match updated.state().as_ref().and_then(|s| s.winner()) {
                Some(seat) => println!("Player {} wins", seat),
                None => println!("Draw"),
            }
            break;
        }
    }

    // Give the detached result report a moment to land.
    tokio::time::sleep(Duration::from_millis(200)).await;
    print_leaderboard(accounts.as_ref()).await?;

    if let Some(p) = first {
        p.leave()?;
    }
    second.leave()?;
    Ok(())
}

/// Logs in, registering on first use. Falls back to a guest profile.
async fn sign_in(accounts: &dyn AccountBackend, name: &str) -> ParticipantProfile {
    let credentials = Credentials::new(name.to_string(), format!("{}-password", name));
    let account = match accounts.login(credentials.clone()).await {
        Ok(account) => Ok(account),
        Err(_) => accounts.register(credentials).await,
    };
    match account {
        Ok(account) => account.profile(),
        Err(e) => {
            warn!(error = %e, name, "Playing as guest");
            ParticipantProfile::guest(name)
        }
    }
}

async fn print_leaderboard(accounts: &dyn AccountBackend) -> Result<()> {
    let entries = accounts.leaderboard().await?;
    println!("{:<5} {:<20} {:>6} {:>6}", "Rank", "Player", "Rating", "Games");
    for entry in entries {
        println!(
            "{:<5} {:<20} {:>6} {:>6}",
            entry.rank(),
            entry.username(),
            entry.rating(),
            entry.games_played()
        );
    }
    Ok(())
}
