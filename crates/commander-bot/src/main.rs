//! Commander Bot - Main Entry Point

use anyhow::{Context, Result};
use clap::Parser;
use commander_bot::{prompt_token, resolve_token, Args, CommanderBot, TOKEN_ENV_VAR};
use commander_config::ConfigLoader;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let envfile = dotenvy::from_filename(&args.envfile);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = envfile {
        if !e.not_found() {
            warn!("Failed to load {}: {}", args.envfile.display(), e);
        }
    }

    info!("Starting Commander Bot");

    let config_loader = ConfigLoader::new(&args.config);
    let config = config_loader
        .load()
        .await
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;
    info!("Configuration loaded successfully");

    let token = match resolve_token(
        std::env::var(TOKEN_ENV_VAR).ok(),
        args.token.clone(),
        args.tokenfile.as_deref(),
    )? {
        Some((token, source)) => {
            info!(?source, "Using bot token");
            token
        }
        None => prompt_token(&mut std::io::stdin().lock(), &mut std::io::stderr())?,
    };

    CommanderBot::new(config)
        .with_config_loader(config_loader)
        .with_synctree(args.synctree)
        .start(&token)
        .await?;

    info!("Commander Bot stopped");
    Ok(())
}
