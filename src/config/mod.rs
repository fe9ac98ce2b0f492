// Configuration management module
// TOML settings for the upstream source, batch fetching and embeddings

pub mod settings;


use anyhow::{Context, Result};
use console::style;

pub use settings::{
    BASE_URL_ENV, Config, ConfigError, DEFAULT_EMBEDDING_DIMENSION, EmbeddingConfig,
    IngestConfig, SourceConfig,
};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::config_dir()
}

/// Print the effective configuration to stderr
#[inline]
pub fn show_config(config: &Config) -> Result<()> {
    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Source Settings:").bold().yellow());
    match &config.source.base_url {
        Some(url) => eprintln!("  Base URL: {}", style(url).cyan()),
        None => eprintln!(
            "  Base URL: {} (set {} or source.base_url)",
            style("Not configured").red(),
            BASE_URL_ENV
        ),
    }
    eprintln!("  Page Size: {}", style(config.source.page_size).cyan());
    eprintln!(
        "  Score Page Size: {}",
        style(config.source.score_page_size).cyan()
    );
    eprintln!("  Timeout: {}s", style(config.source.timeout_seconds).cyan());

    eprintln!();
    eprintln!("{}", style("Ingest Settings:").bold().yellow());
    eprintln!("  Concurrency: {}", style(config.ingest.concurrency).cyan());
    eprintln!(
        "  Inter-batch Delay: {}ms",
        style(config.ingest.inter_batch_delay_ms).cyan()
    );
    eprintln!("  Max Reviews: {}", style(config.ingest.max_reviews).cyan());

    eprintln!();
    eprintln!("{}", style("Embedding Settings:").bold().yellow());
    eprintln!("  Model: {}", style(&config.embedding.model).cyan());
    eprintln!(
        "  Dimension: {}",
        style(config.embedding.embedding_dimension).cyan()
    );
    let url = config
        .embedding
        .ollama_url()
        .context("Failed to build Ollama URL")?;
    eprintln!("  Ollama URL: {}", style(url).cyan());

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );
    eprintln!(
        "Database: {}",
        style(config.database_path().display()).dim()
    );

    Ok(())
}
