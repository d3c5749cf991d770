use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use fractal_memory_cli::{commands, config as cli_config, exit_code_for, EXIT_SUCCESS};

#[derive(Parser)]
#[command(name = "fractal-memory")]
#[command(about = "Operational CLI for the hierarchical memory core")]
#[command(version, long_about = None)]
struct Cli {
    /// Configuration file path (defaults to ./fractal-memory.toml or .json if present)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// User id to operate on, overriding the config file's `user_id`
    #[arg(short, long)]
    user: Option<String>,

    /// Enable verbose (debug-level) logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply schema migrations up to the current version
    Migrate,
    /// End-to-end health check: remember, recall, consolidate, garbage collect
    SmokeTest,
    /// Destructively flush the volatile store and delete all graph nodes
    Reset {
        /// Required to actually perform the reset
        #[arg(long)]
        confirm: bool,
    },
    /// Dump per-tier counters for a user
    Inspect,
    /// Run the chat HTTP surface
    Serve {
        /// Address to bind, e.g. 127.0.0.1:8080
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: SocketAddr,
        /// Allowed CORS origin (repeatable); default is none (refuse cross-origin)
        #[arg(long = "allow-origin")]
        allow_origin: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    let config = match cli_config::load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("configuration error: {e:#}");
            std::process::exit(fractal_memory_cli::EXIT_VALIDATION);
        }
    };
    let user = cli.user.unwrap_or_else(|| config.user_id.clone());

    let result = match cli.command {
        Commands::Migrate => commands::migrate(&config).await,
        Commands::SmokeTest => commands::smoke_test(&config).await,
        Commands::Reset { confirm } => commands::reset(&config, confirm).await,
        Commands::Inspect => commands::inspect(&config, &user).await,
        Commands::Serve { addr, allow_origin } => commands::serve(&config, &user, addr, allow_origin).await,
    };

    match result {
        Ok(()) => std::process::exit(EXIT_SUCCESS),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(exit_code_for(&e));
        }
    }
}
