//! Command-line interface for Stockroom.
//!
//! Connection settings are shared flags that fall back to environment
//! variables, so `stockroom watch` and `stockroom items ...` work the same
//! way in scripts and interactive shells.

mod items;
mod watch;

use clap::{Args, Parser, Subcommand};
use stockroom_core::config::Config;

#[derive(Parser)]
#[command(name = "stockroom", version, about = "Stockroom inventory client")]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Server and credential flags shared by every command.
#[derive(Args)]
struct ConnectionArgs {
    /// HTTP API base URL
    #[arg(long, global = true, env = "STOCKROOM_API_URL")]
    api_url: Option<String>,

    /// Sync server base URL; omit to skip live sync
    #[arg(long, global = true, env = "STOCKROOM_SYNC_URL")]
    sync_url: Option<String>,

    /// Bearer token
    #[arg(long, global = true, env = "STOCKROOM_TOKEN")]
    token: Option<String>,

    /// Organization id
    #[arg(long, global = true, env = "STOCKROOM_ORG_ID")]
    org_id: Option<String>,
}

impl ConnectionArgs {
    /// Layer the flags over whatever the environment provides.
    fn into_config(self) -> Config {
        let mut config = Config::from_env();
        if let Some(api_url) = self.api_url {
            config.api_url = api_url;
        }
        if self.sync_url.is_some() {
            config.sync_url = self.sync_url;
        }
        if self.token.is_some() {
            config.token = self.token;
        }
        if self.org_id.is_some() {
            config.org_id = self.org_id;
        }
        config
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Watch live item changes for the organization
    Watch,
    /// Operate on items through the HTTP API
    Items {
        #[command(subcommand)]
        command: items::ItemCommands,
    },
}

/// Parse arguments and run the CLI.
pub fn run_cli() {
    let cli = Cli::parse();
    let config = cli.connection.into_config();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };

    runtime.block_on(async {
        match cli.command {
            Commands::Watch => watch::handle_watch(&config).await,
            Commands::Items { command } => items::handle_items(&config, command).await,
        }
    });
}
