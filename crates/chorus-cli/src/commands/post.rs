//! `chorus post`

use super::common::{open_session, print_post, SessionArgs};
use anyhow::{bail, Context, Result};
use chorus_core::MediaAttachment;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub async fn run(
    args: SessionArgs,
    content: String,
    image: Option<PathBuf>,
    over_channel: bool,
) -> Result<()> {
    let attachment = image.as_deref().map(read_image).transpose()?;
    let session = open_session(args).await?;

    let composer = session.composer();
    composer.set_content(content);
    if let Some(attachment) = attachment {
        composer.attach_image(attachment);
    }

    let result = if over_channel {
        wait_for_channel(&session).await;
        composer.submit_over_channel().await
    } else {
        composer.submit().await
    };

    match result {
        Ok(post) => {
            print_post(&session, &post);
            session.shutdown().await;
            Ok(())
        }
        Err(err) => {
            debug!(draft = ?composer.draft(), "draft kept after failed submission");
            session.shutdown().await;
            Err(err).context("Failed to publish post")
        }
    }
}

/// Give the channel one request timeout to come up; the composer falls back
/// to HTTP if it does not.
async fn wait_for_channel(session: &super::common::Session) {
    let mut state = session.channel().watch_state();
    let limit = session.config().request_timeout();
    if tokio::time::timeout(limit, state.wait_for(|s| s.is_connected()))
        .await
        .is_err()
    {
        info!("broadcast channel not connected, publishing over HTTP");
    }
}

fn read_image(path: &Path) -> Result<MediaAttachment> {
    let content_type = match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => bail!("Unsupported image type: {}", path.display()),
    };

    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());

    Ok(MediaAttachment {
        file_name,
        content_type: content_type.to_string(),
        bytes,
    })
}
