mod config;
use clap::{ArgAction, Parser, Subcommand};
use crate::config::{CliOverrides, Config};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod server;
use server::run_server;

#[derive(Parser)]
#[command(name = "inventory")]
#[command(about = "Inventory service with photo attachments")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    #[command(disable_help_flag = true)]
    Server {
        /// Address to bind
        #[arg(short = 'h', long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory holding uploaded photos
        #[arg(short, long)]
        cache: Option<String>,

        /// Optional configuration file
        #[arg(long)]
        config: Option<String>,

        /// Print help
        #[arg(long, action = ArgAction::Help)]
        help: Option<bool>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "inventory_server=info,inventory_core=info,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Server {
            host,
            port,
            cache,
            config,
            help: _,
        } => {
            let overrides = CliOverrides {
                host,
                port,
                cache_dir: cache,
            };

            let cfg = match Config::load(config.as_deref(), &overrides) {
                Ok(c) => c,
                Err(e) => {
                    tracing::error!("Failed to load config: {}", e);
                    std::process::exit(1);
                }
            };

            tracing::info!(
                "Starting Inventory server: bind={}, cache={:?}",
                cfg.bind_addr(),
                cfg.storage.cache_dir
            );

            if let Err(e) = run_server(cfg).await {
                tracing::error!("Server error: {:#}", e);
                std::process::exit(1);
            }
        }
    }
}
