use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use metascribe::cli::{Cli, Commands, KeyCommands};
use metascribe::config::Config;
use metascribe::keypool::{FileKeyStore, KeyPool};
use metascribe::transcribe::TranscriptionOrchestrator;
use metascribe::{output, utils};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose {
        "metascribe=debug"
    } else {
        "metascribe=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Transcribe {
            url,
            output,
            format,
            language,
            prompt,
        } => {
            // Check for required external dependencies (non-fatal in Docker)
            let missing_deps = utils::check_dependencies().await;
            if !missing_deps.is_empty() {
                eprintln!("⚠️  Dependency check warnings:");
                for dep in missing_deps {
                    eprintln!("   • {}", dep);
                }
                eprintln!("   (Continuing anyway - tools may be available)");
            }

            let url = utils::validate_and_normalize_url(&url)?;
            let config = Config::load().await?;

            let store = FileKeyStore::open_default()?;
            let pool = Arc::new(KeyPool::load(Box::new(store))?);

            if pool.status().total == 0 {
                anyhow::bail!("No API keys registered. Add one with: metascribe keys add <KEY>");
            }

            let orchestrator = TranscriptionOrchestrator::new(config, pool)?;

            tracing::info!("Starting transcription for URL: {}", url);

            let result = orchestrator
                .transcribe_url(&url, language.as_deref(), prompt.as_deref())
                .await?;

            match output {
                Some(path) => {
                    output::save_to_file(&result, &path, &format).await?;
                    println!("Transcription saved to: {}", path.display());
                }
                None => {
                    output::print_to_console(&result, &format)?;
                }
            }
        }
        Commands::Keys { command } => {
            let store = FileKeyStore::open_default()?;
            let pool = KeyPool::load(Box::new(store))?;

            match command {
                KeyCommands::Add { key } => {
                    let count = pool.add_key(&key)?;
                    println!("Key added ({} registered)", count);
                }
                KeyCommands::Remove { index } => {
                    let count = pool.remove_key(index)?;
                    println!("Key removed ({} remaining)", count);
                }
                KeyCommands::List => {
                    let masked = pool.masked_keys();

                    if masked.is_empty() {
                        println!("No keys registered. Add one with: metascribe keys add <KEY>");
                    } else {
                        let status = pool.status();
                        println!(
                            "Registered keys ({} total, {} in use):",
                            status.total, status.in_use
                        );
                        for (index, key) in masked.iter().enumerate() {
                            println!("  {}: {}", index, key);
                        }
                    }
                }
            }
        }
        Commands::Config { show } => {
            let config = Config::load().await?;

            if show {
                config.display();
            } else {
                println!("Edit the config file to change settings:");
                println!("  {}", Config::path_hint()?);
            }
        }
        Commands::Platforms => {
            println!("Supported platforms:");
            println!("  • Facebook Ads Library");
            println!("  • Instagram Reels");
            println!("  • YouTube");
            println!("  • Google Ads Transparency");
            println!("  • Direct video URLs (progressive files or live playlists)");
        }
    }

    Ok(())
}
