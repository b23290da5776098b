use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use backupd::commands;

#[derive(Parser)]
#[command(name = "backupd")]
#[command(version, about = "Backup, download and restore for a self-hosted app server")]
struct Cli {
    /// Config file (default: ~/.backupd/backupd.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the backup API server
    Serve {
        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Print a superuser session token, or a file-access token with --file
    Token {
        /// Superuser id the token is issued for
        #[arg(long)]
        subject: String,
        /// Issue a file-access (download) token instead of a session
        #[arg(long)]
        file: bool,
        /// Lifetime in seconds (file tokens only)
        #[arg(long, requires = "file")]
        ttl: Option<u64>,
    },
    /// Manage backups directly, without the HTTP API
    Backups {
        #[command(subcommand)]
        action: BackupsAction,
    },
}

#[derive(Subcommand)]
enum BackupsAction {
    /// List stored backups
    List,
    /// Create a backup now
    Create {
        /// Archive name, e.g. nightly.zip (generated when omitted)
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Serve { port } => commands::serve::execute(config, port).await,
        Commands::Token { subject, file, ttl } => {
            commands::token::execute(config, &subject, file, ttl)
        },
        Commands::Backups { action } => match action {
            BackupsAction::List => commands::backups::list(config).await,
            BackupsAction::Create { name } => {
                commands::backups::create(config, name.as_deref()).await
            },
        },
    }
}
