use anyhow::Result;
use clap::{Parser, Subcommand};
use game_catalog::commands::{
    RankInput, RunOptions, embed, ingest, parse_rank_ids, refresh, show_tables,
};
use game_catalog::config::{Config, show_config};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "game-catalog")]
#[command(about = "Ingests game catalog data from an upstream provider into SQLite")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect rank lists, fetch every game's details and persist them
    Ingest {
        /// Rank ids to collect, e.g. "1-100" or "1-3,7"
        #[arg(long, default_value = "1-100")]
        ranks: String,
        /// Items fetched at once; overrides ingest.concurrency
        #[arg(long)]
        concurrency: Option<usize>,
        /// Pause between batches in milliseconds; overrides ingest.inter_batch_delay_ms
        #[arg(long)]
        delay_ms: Option<u64>,
        /// Only process the first N collected games
        #[arg(long)]
        limit: Option<usize>,
        /// Stop starting new batches after this many seconds
        #[arg(long)]
        deadline_secs: Option<u64>,
        /// Replay rank lists saved by an earlier run instead of fetching them
        #[arg(long)]
        from_snapshot: bool,
        /// Persist the replayed rank data without fetching details
        #[arg(long, requires = "from_snapshot")]
        skip_details: bool,
    },
    /// Re-fetch details and scores for games already stored
    Refresh {
        #[arg(long)]
        concurrency: Option<usize>,
        #[arg(long)]
        delay_ms: Option<u64>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Generate embeddings for stored games
    Embed {
        #[arg(long)]
        limit: Option<usize>,
        /// Re-embed games that already have a vector
        #[arg(long)]
        all: bool,
    },
    /// Show which catalog tables exist
    Tables,
    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Ingest {
            ranks,
            concurrency,
            delay_ms,
            limit,
            deadline_secs,
            from_snapshot,
            skip_details,
        } => {
            let rank_ids = parse_rank_ids(&ranks)?;
            let input = if from_snapshot {
                RankInput::Snapshot {
                    fetch_details: !skip_details,
                }
            } else {
                RankInput::Live
            };
            let options = RunOptions {
                concurrency,
                delay_ms,
                limit,
                deadline: deadline_secs.map(Duration::from_secs),
            };
            ingest(&config, &rank_ids, input, &options).await?;
        }
        Commands::Refresh {
            concurrency,
            delay_ms,
            limit,
        } => {
            let options = RunOptions {
                concurrency,
                delay_ms,
                limit,
                deadline: None,
            };
            refresh(&config, &options).await?;
        }
        Commands::Embed { limit, all } => {
            embed(&config, limit, all).await?;
        }
        Commands::Tables => {
            show_tables(&config).await?;
        }
        Commands::Config => {
            show_config(&config)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn ingest_defaults() {
        let cli = Cli::try_parse_from(["game-catalog", "ingest"]).expect("ingest should parse");

        match cli.command {
            Commands::Ingest {
                ranks,
                concurrency,
                deadline_secs,
                ..
            } => {
                assert_eq!(ranks, "1-100");
                assert_eq!(concurrency, None);
                assert_eq!(deadline_secs, None);
            }
            _ => panic!("expected ingest command"),
        }
    }

    #[test]
    fn ingest_with_overrides() {
        let cli = Cli::try_parse_from([
            "game-catalog",
            "ingest",
            "--ranks",
            "1-3,7",
            "--concurrency",
            "3",
            "--delay-ms",
            "0",
            "--limit",
            "20",
            "--deadline-secs",
            "600",
        ])
        .expect("ingest should parse");

        match cli.command {
            Commands::Ingest {
                ranks,
                concurrency,
                delay_ms,
                limit,
                deadline_secs,
                from_snapshot,
                skip_details,
            } => {
                assert_eq!(ranks, "1-3,7");
                assert!(!from_snapshot);
                assert!(!skip_details);
                assert_eq!(concurrency, Some(3));
                assert_eq!(delay_ms, Some(0));
                assert_eq!(limit, Some(20));
                assert_eq!(deadline_secs, Some(600));
            }
            _ => panic!("expected ingest command"),
        }
    }

    #[test]
    fn ingest_from_snapshot() {
        let cli = Cli::try_parse_from([
            "game-catalog",
            "ingest",
            "--from-snapshot",
            "--skip-details",
        ])
        .expect("ingest should parse");

        match cli.command {
            Commands::Ingest {
                from_snapshot,
                skip_details,
                ..
            } => {
                assert!(from_snapshot);
                assert!(skip_details);
            }
            _ => panic!("expected ingest command"),
        }
    }

    #[test]
    fn skip_details_needs_snapshot() {
        let cli = Cli::try_parse_from(["game-catalog", "ingest", "--skip-details"]);

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        } else {
            panic!("--skip-details alone should not parse");
        }
    }

    #[test]
    fn embed_all_flag() {
        let cli = Cli::try_parse_from(["game-catalog", "embed", "--all", "--limit", "5"])
            .expect("embed should parse");

        match cli.command {
            Commands::Embed { limit, all } => {
                assert!(all);
                assert_eq!(limit, Some(5));
            }
            _ => panic!("expected embed command"),
        }
    }

    #[test]
    fn simple_commands() {
        assert!(matches!(
            Cli::try_parse_from(["game-catalog", "tables"]).map(|cli| cli.command),
            Ok(Commands::Tables)
        ));
        assert!(matches!(
            Cli::try_parse_from(["game-catalog", "config"]).map(|cli| cli.command),
            Ok(Commands::Config)
        ));
        assert!(matches!(
            Cli::try_parse_from(["game-catalog", "refresh"]).map(|cli| cli.command),
            Ok(Commands::Refresh { limit: None, .. })
        ));
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["game-catalog", "invalid"]);

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        } else {
            panic!("invalid command should not parse");
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["game-catalog", "--help"]);

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        } else {
            panic!("--help should short-circuit parsing");
        }
    }
}
