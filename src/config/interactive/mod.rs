#[cfg(test)]
mod tests;

use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};

use super::{Config, ConfigError, EmbeddingConfig, GenerationConfig, OllamaConfig};
use crate::ollama::OllamaClient;

#[inline]
pub fn run_interactive_config(config_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 PDF Chat Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(config_dir);

    eprintln!("{}", style("Ollama Configuration").bold().yellow());
    eprintln!("Configure the Ollama service used for embeddings and answers.");
    eprintln!();

    configure_ollama(&mut config.ollama)?;
    configure_embedding(&mut config.embedding)?;
    configure_generation(&mut config.generation)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    match OllamaClient::new(&config.ollama).and_then(|client| client.ping()) {
        Ok(()) => eprintln!("{}", style("✓ Ollama connection successful!").green()),
        Err(e) => {
            eprintln!(
                "{}",
                style(format!("⚠ Warning: Could not connect to Ollama ({})", e)).yellow()
            );
            eprintln!("You can continue, but make sure Ollama is running before indexing.");
        }
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config: &Config) -> Result<()> {
    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Ollama Settings:").bold().yellow());
    match config.ollama_url() {
        Ok(url) => eprintln!("  Ollama URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  Ollama URL: {} ({})", style("Invalid").red(), e),
    }
    eprintln!(
        "  Request Timeout: {}s",
        style(config.ollama.timeout_secs).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Models:").bold().yellow());
    eprintln!("  Embedding: {}", style(&config.embedding.model).cyan());
    eprintln!(
        "  Embedding Dimension: {}",
        style(config.embedding.dimension).cyan()
    );
    eprintln!("  Llama: {}", style(&config.generation.llama_model).cyan());
    eprintln!("  Mistral: {}", style(&config.generation.mistral_model).cyan());
    eprintln!(
        "  Max Answer Tokens: {}",
        style(config.generation.max_tokens).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Indexing:").bold().yellow());
    eprintln!(
        "  Chunk Size / Overlap: {} / {} characters",
        style(config.chunking.chunk_size).cyan(),
        style(config.chunking.chunk_overlap).cyan()
    );
    eprintln!("  Top K: {}", style(config.retrieval.top_k).cyan());
    eprintln!(
        "  Documents: {}",
        style(config.storage.documents_dir.display()).cyan()
    );
    eprintln!(
        "  Vector Index: {}",
        style(config.storage.index_dir.display()).cyan()
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn load_existing_config(config_dir: &Path) -> Config {
    Config::load(config_dir).map_or_else(
        |e| {
            eprintln!(
                "{}",
                style(format!(
                    "Existing configuration could not be loaded ({}). Using defaults.",
                    e
                ))
                .yellow()
            );
            Config {
                base_dir: config_dir.to_path_buf(),
                ..Config::default()
            }
        },
        |config| {
            eprintln!("{}", style("Loaded configuration.").green());
            config
        },
    )
}

fn configure_ollama(ollama: &mut OllamaConfig) -> Result<()> {
    let protocols = &["http", "https"];
    let default_index = protocols
        .iter()
        .position(|&p| p == ollama.protocol)
        .unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt("Ollama protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;

    let protocol = protocols[protocol_index].to_string();

    let host: String = Input::new()
        .with_prompt("Ollama host")
        .default(ollama.host.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = OllamaConfig {
                protocol: protocol.clone(),
                host: input.clone(),
                ..OllamaConfig::default()
            };
            temp_config.validate()
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Ollama port")
        .default(ollama.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    ollama.set_protocol(protocol)?;
    ollama.set_host(host)?;
    ollama.set_port(port)?;

    Ok(())
}

fn configure_embedding(embedding: &mut EmbeddingConfig) -> Result<()> {
    let model: String = Input::new()
        .with_prompt("Embedding model")
        .default(embedding.model.clone())
        .validate_with(non_empty)
        .interact_text()?;

    let dimension: u32 = Input::new()
        .with_prompt("Embedding dimension")
        .default(embedding.dimension)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if (64..=4096).contains(input) {
                Ok(())
            } else {
                Err("Dimension must be between 64 and 4096")
            }
        })
        .interact_text()?;

    embedding.set_model(model)?;
    embedding.set_dimension(dimension)?;

    Ok(())
}

fn configure_generation(generation: &mut GenerationConfig) -> Result<()> {
    let llama_model: String = Input::new()
        .with_prompt("Model for the Llama backend")
        .default(generation.llama_model.clone())
        .validate_with(non_empty)
        .interact_text()?;

    let mistral_model: String = Input::new()
        .with_prompt("Model for the Mistral backend")
        .default(generation.mistral_model.clone())
        .validate_with(non_empty)
        .interact_text()?;

    generation.llama_model = llama_model;
    generation.mistral_model = mistral_model;

    Ok(())
}

fn non_empty(input: &String) -> Result<(), &'static str> {
    if input.trim().is_empty() {
        Err("Model name cannot be empty")
    } else {
        Ok(())
    }
}
