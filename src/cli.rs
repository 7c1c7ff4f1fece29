//! Command-line interface for strictly_arena.

use clap::{Parser, Subcommand};

/// Strictly Arena - authoritative tic-tac-toe sessions with ratings
#[derive(Parser, Debug)]
#[command(name = "strictly_arena")]
#[command(about = "Authoritative two-player tic-tac-toe with matchmaking", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the account HTTP API (register, login, matches, leaderboard)
    Backend {
        /// Port to bind to
        #[arg(short, long, default_value = "5000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Path to the database file (created if it doesn't exist)
        #[arg(long, default_value = "strictly_arena.db")]
        db_path: String,
    },

    /// Play a local two-participant match
    Play {
        /// Path to an arena config file
        #[arg(short, long)]
        config: Option<std::path::PathBuf>,

        /// Disconnect the authority after this many moves to exercise migration
        #[arg(long)]
        disconnect_after: Option<usize>,
    },

    /// Print the leaderboard of an account backend
    Leaderboard {
        /// Account API base URL
        #[arg(long, default_value = "http://127.0.0.1:5000")]
        backend_url: String,
    },
}
