//! finchat CLI entry point.
//!
//! Commands:
//! - `serve`: Start the HTTP gateway
//! - `chat`: Ask the assistant one question from the terminal
//! - `config`: Print the default configuration

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "finchat", about = "finchat: financial assistant chat backend", version, author)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Send a single message to the assistant
    Chat {
        /// The question to ask
        #[arg(short, long)]
        message: String,

        /// Print the answer as it is generated
        #[arg(long)]
        stream: bool,
    },

    /// Print the default configuration file
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match cli.command {
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Chat { message, stream } => commands::chat::run(&message, stream).await?,
        Commands::Config => commands::config_cmd::run(),
    }

    Ok(())
}
