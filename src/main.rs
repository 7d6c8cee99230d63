use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use dhcp6lease::{Config, Dhcp6Server, Error, Message, OptionRegistry, Result};

#[derive(Parser)]
#[command(name = "dhcp6lease")]
#[command(author, version, about = "A DHCPv6 server", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    Run,
    ShowConfig,
    /// Decode a hex-encoded DHCPv6 message and print it.
    Decode {
        input: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let config = Config::load_or_create(&cli.config)?;
            info!("Starting DHCPv6 server with config: {:?}", cli.config);
            let server = Dhcp6Server::new(config).await?;

            tokio::select! {
                result = server.run() => result,
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal, stopping server...");
                    Ok(())
                }
            }
        }
        Commands::ShowConfig => {
            let config = Config::load_or_create(&cli.config)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Decode { input } => {
            let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
            let bytes = hex::decode(&compact)
                .map_err(|error| Error::Malformed(format!("Invalid hex input: {}", error)))?;
            let message = Message::parse(&bytes, &OptionRegistry::new())?;

            println!("{}", message);
            for option in message.options.iter() {
                println!("  {:?}", option);
            }
            Ok(())
        }
    }
}
