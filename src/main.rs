mod agri_client;
mod attachment;
mod cli;

use std::io;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use crossterm::tty::IsTty;
use dotenv::dotenv;
use eyre::Result;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use crate::agri_client::{AgriClient, ClientConfig, DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS};
use crate::cli::chat::ChatContext;
use crate::cli::diagnose::{DiagnosisPanel, run_diagnosis};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Input to send to the chat
    #[arg(short, long)]
    input: Option<String>,

    /// Base URL of the analysis service
    #[arg(long, global = true, env = "AGRI_API_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Give up on a request after this many seconds
    #[arg(long, global = true, env = "AGRI_API_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a chat session
    Chat {
        /// Input to send to the chat
        #[arg(short, long)]
        input: Option<String>,
    },
    /// Ask one question, optionally with an image, and print the answer
    Ask {
        /// The question to ask
        query: Option<String>,

        /// Image to send along with the question
        #[arg(long)]
        image: Option<String>,
    },
    /// Diagnose a crop image
    Diagnose {
        /// Path to a JPG, PNG or WEBP image under 10MB
        image: String,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load environment variables from .env file
    dotenv().ok();

    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting AgriGPT CLI");

    let config = match ClientConfig::new(&cli.base_url, Duration::from_secs(cli.timeout_secs)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid base URL {}: {}", cli.base_url, e);
            return Ok(ExitCode::FAILURE);
        }
    };

    let client = match AgriClient::new(config) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Failed to initialize AgriGPT client: {}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    let styled = io::stdout().is_tty();

    info!(
        "Using analysis service at {} (timeout {}s)",
        client.config().base_url(),
        client.config().timeout().as_secs()
    );

    match cli.command {
        Some(Commands::Chat { input }) => {
            let mut chat_context = ChatContext::new(
                Box::new(io::stdout()),
                input.or(cli.input),
                true,
                Box::new(client),
            )
            .with_styling(styled);
            chat_context.run().await
        }
        Some(Commands::Ask { query, image }) => {
            let mut chat_context = ChatContext::new(
                Box::new(io::stdout()),
                Some(query.unwrap_or_default()),
                false,
                Box::new(client),
            )
            .with_styling(styled)
            .with_text_endpoint(image.is_none());
            if let Some(path) = image {
                if !chat_context.attach_image(&path)? {
                    return Ok(ExitCode::FAILURE);
                }
            }
            chat_context.run().await
        }
        Some(Commands::Diagnose { image }) => {
            let mut output = io::stdout();
            let mut panel = DiagnosisPanel::new();
            let diagnosed = run_diagnosis(&mut output, &mut panel, &client, &image, styled).await?;
            Ok(if diagnosed { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
        None => {
            // Default to chat if no subcommand is provided
            let mut chat_context = ChatContext::new(
                Box::new(io::stdout()),
                cli.input,
                true,
                Box::new(client),
            )
            .with_styling(styled);
            chat_context.run().await
        }
    }
}
