use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use pdf_chat::commands::{ask_question, check_services, rebuild_index};
use pdf_chat::config::{Config, run_interactive_config, show_config};
use pdf_chat::generation::Backend;
use pdf_chat::pipeline::Pipeline;
use pdf_chat::shell::run_shell;

#[derive(Parser)]
#[command(name = "pdf-chat")]
#[command(about = "Ask questions about a folder of PDF files using retrieval-augmented generation")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml (defaults to $PDF_CHAT_CONFIG_DIR or the platform config dir)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the interactive shell
    Chat,
    /// Rebuild the vector index from the documents directory
    Rebuild,
    /// Answer a single question and exit
    Ask {
        /// The question to answer
        question: String,
        /// Generation backend to use
        #[arg(long, value_enum, default_value_t = Backend::Llama)]
        backend: Backend,
        /// Number of chunks to retrieve as context
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Configure the model service and settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Check the model service and the persisted index
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => Config::default_config_dir()?,
    };

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&Config::load(&config_dir)?)?;
            } else {
                run_interactive_config(&config_dir)?;
            }
        }
        Commands::Chat => {
            let pipeline = Pipeline::from_config(Config::load(&config_dir)?)?;
            run_shell(pipeline).await?;
        }
        Commands::Rebuild => {
            rebuild_index(Config::load(&config_dir)?).await?;
        }
        Commands::Ask {
            question,
            backend,
            top_k,
        } => {
            ask_question(Config::load(&config_dir)?, &question, backend, top_k).await?;
        }
        Commands::Check => {
            check_services(&Config::load(&config_dir)?)?;
        }
    }

    Ok(())
}
