//! Command line arguments.

use clap::Parser;
use std::path::PathBuf;

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path (.json, .yaml or .toml)
    pub config: PathBuf,

    /// Bot token
    #[arg(long)]
    pub token: Option<String>,

    /// File containing the bot token
    #[arg(long)]
    pub tokenfile: Option<PathBuf>,

    /// Environment file loaded before reading the environment
    #[arg(long, default_value = ".env")]
    pub envfile: PathBuf,

    /// Sync the command tree with Discord on startup
    #[arg(long)]
    pub synctree: bool,

    /// Log level, overridden by RUST_LOG
    #[arg(long, default_value = "warn")]
    pub log: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["commander-bot", "bot.json"]).unwrap();
        assert_eq!(args.config, PathBuf::from("bot.json"));
        assert_eq!(args.envfile, PathBuf::from(".env"));
        assert_eq!(args.log, "warn");
        assert!(!args.synctree);
        assert!(args.token.is_none());
    }

    #[test]
    fn test_all_flags() {
        let args = Args::try_parse_from([
            "commander-bot",
            "bot.yaml",
            "--token",
            "abc",
            "--tokenfile",
            "token.txt",
            "--envfile",
            "prod.env",
            "--synctree",
            "--log",
            "debug",
        ])
        .unwrap();
        assert_eq!(args.token.as_deref(), Some("abc"));
        assert_eq!(args.tokenfile, Some(PathBuf::from("token.txt")));
        assert_eq!(args.envfile, PathBuf::from("prod.env"));
        assert!(args.synctree);
        assert_eq!(args.log, "debug");
    }

    #[test]
    fn test_config_is_required() {
        assert!(Args::try_parse_from(["commander-bot"]).is_err());
    }
}
