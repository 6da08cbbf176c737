mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// chatgate CLI -- operate a running chatgate daemon.
#[derive(Parser)]
#[command(name = "cg", version, about)]
struct Cli {
    /// Base URL of the chatgate HTTP API.
    #[arg(long, global = true, env = "CHATGATE_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    /// API key sent as `x-api-key`.
    #[arg(long, global = true, env = "CHATGATE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the session status (default when no subcommand is given).
    Status,

    /// Send a text message.
    Send {
        /// Phone number or full chat id.
        to: String,
        /// Message text.
        message: String,
    },

    /// Print recent inbound messages, oldest first.
    History {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Log the session out; the daemon re-pairs shortly after.
    Logout,

    /// Remove stored credentials and *.log files from the working directory.
    /// Does not talk to the daemon; stop it first.
    Cleanup {
        /// Credential directory to remove.
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let api_url = cli.api_url.trim_end_matches('/');
    let api_key = cli.api_key.as_deref();

    match cli.command {
        None | Some(Commands::Status) => {
            commands::status::run(api_url, api_key).await?;
        }
        Some(Commands::Send { to, message }) => {
            commands::send::run(api_url, api_key, &to, &message).await?;
        }
        Some(Commands::History { limit }) => {
            commands::history::run(api_url, api_key, limit).await?;
        }
        Some(Commands::Logout) => {
            commands::logout::run(api_url, api_key).await?;
        }
        Some(Commands::Cleanup { dir }) => {
            let dir = dir.unwrap_or_else(commands::cleanup::default_dir);
            commands::cleanup::run(&dir, &std::env::current_dir()?)?;
        }
    }

    Ok(())
}
