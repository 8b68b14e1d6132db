//! Shared helpers for commands

use anyhow::{bail, Context, Result};
use chorus_core::{ActionKind, ClientConfig, Post};
use chorus_feed::FeedSession;
use chorus_transport::{HttpApiClient, WebSocketTransport};
use std::path::Path;
use std::sync::Arc;

/// Session type every command runs against.
pub type Session = FeedSession<HttpApiClient, WebSocketTransport>;

/// Inputs for opening a session.
pub struct SessionArgs {
    pub config: ClientConfig,
    pub user: Option<String>,
    pub token: Option<String>,
}

/// Load configuration: file (if present), then `CHORUS_*` overrides.
pub fn load_config(path: &Path) -> Result<ClientConfig> {
    ClientConfig::load(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}

pub fn show_config(config: &ClientConfig) -> Result<()> {
    let rendered = toml::to_string_pretty(config).context("Failed to render config")?;
    print!("{rendered}");
    Ok(())
}

/// Build the production handlers and initialize a session.
pub async fn open_session(args: SessionArgs) -> Result<Session> {
    let Some(user) = args.user else {
        bail!("No user given; pass --user or set CHORUS_USER");
    };

    let mut api = HttpApiClient::new(&args.config)?;
    if let Some(token) = args.token {
        api = api.with_bearer_token(token);
    }
    let transport = WebSocketTransport::from_config(&args.config)?;

    let session = FeedSession::new(user, args.config, Arc::new(api), Arc::new(transport))?;
    session.init().await.context("Failed to load the feed")?;
    Ok(session)
}

pub fn print_post(session: &Session, post: &Post) {
    let flags: Vec<&str> = ActionKind::ALL
        .iter()
        .filter(|kind| session.engagement(post.id.clone(), **kind).applied)
        .map(|kind| kind.as_str())
        .collect();

    println!(
        "[{}] {} at {}{}",
        post.id,
        post.creator_id,
        post.created_at.format("%Y-%m-%d %H:%M"),
        if flags.is_empty() {
            String::new()
        } else {
            format!(" ({})", flags.join(", "))
        }
    );
    println!("    {}", post.content);
    if let Some(media) = &post.media_ref {
        println!("    image: {media}");
    }
}
