//! Command-line client for the Chorus feed
//!
//! Reads the feed, toggles likes, reposts and saves, and publishes posts
//! against a Chorus server.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{
    common::{self, SessionArgs},
    engage::{self, EngageCommand},
    feed, post,
};

#[derive(Parser)]
#[command(name = "chorus")]
#[command(about = "Chorus - social feed client", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path
    #[arg(short, long, global = true, default_value = ".chorus/config.toml")]
    config: PathBuf,

    /// Signed-in user id
    #[arg(short, long, global = true, env = "CHORUS_USER")]
    user: Option<String>,

    /// Bearer token for the API
    #[arg(long, global = true, env = "CHORUS_TOKEN", hide_env_values = true)]
    token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the feed, newest first
    Feed {
        /// Keep printing live posts until interrupted
        #[arg(short, long)]
        watch: bool,

        /// Maximum number of posts to print
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// Toggle a like on a post
    Like(EngageCommand),

    /// Toggle a repost, optionally with a comment
    Repost {
        #[command(flatten)]
        target: EngageCommand,

        /// Comment to attach when reposting
        #[arg(long)]
        comment: Option<String>,
    },

    /// Toggle a save on a post
    Save(EngageCommand),

    /// Publish a post
    Post {
        /// Post text
        content: String,

        /// Image to attach
        #[arg(long)]
        image: Option<PathBuf>,

        /// Publish over the broadcast channel instead of HTTP
        #[arg(long)]
        channel: bool,
    },

    /// Show the effective configuration
    Config,
}

/// `RUST_LOG` wins when set and valid; otherwise `--verbose` picks the level.
fn log_filter(verbose: bool, from_env: Option<String>) -> EnvFilter {
    let level = if verbose { "debug" } else { "info" };
    from_env
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(level))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(
            cli.verbose,
            std::env::var(EnvFilter::DEFAULT_ENV).ok(),
        ))
        .with_writer(std::io::stderr)
        .init();

    let config = common::load_config(&cli.config)?;

    if let Commands::Config = cli.command {
        return common::show_config(&config);
    }

    let args = SessionArgs {
        config,
        user: cli.user,
        token: cli.token,
    };

    match cli.command {
        Commands::Feed { watch, limit } => feed::run(args, limit, watch).await?,
        Commands::Like(target) => engage::like(args, target).await?,
        Commands::Repost { target, comment } => engage::repost(args, target, comment).await?,
        Commands::Save(target) => engage::save(args, target).await?,
        Commands::Post {
            content,
            image,
            channel,
        } => post::run(args, content, image, channel).await?,
        Commands::Config => {}
    }

    Ok(())
}
