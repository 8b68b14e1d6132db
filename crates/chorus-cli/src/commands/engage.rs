//! `chorus like|repost|save`

use super::common::{open_session, SessionArgs};
use anyhow::Result;
use chorus_core::ActionKind;
use chorus_feed::{RepostSubmission, ToggleOutcome};
use clap::Args;

/// Target of an engagement toggle
#[derive(Args)]
pub struct EngageCommand {
    /// Post id
    pub post: String,
}

pub async fn like(args: SessionArgs, cmd: EngageCommand) -> Result<()> {
    toggle(args, cmd, ActionKind::Like).await
}

pub async fn save(args: SessionArgs, cmd: EngageCommand) -> Result<()> {
    toggle(args, cmd, ActionKind::Save).await
}

pub async fn repost(args: SessionArgs, cmd: EngageCommand, comment: Option<String>) -> Result<()> {
    let session = open_session(args).await?;
    let submission = match comment {
        Some(comment) => RepostSubmission::with_comment(comment),
        None => RepostSubmission::plain(),
    };

    let outcome = session.toggle_repost(cmd.post.as_str(), submission).await;
    session.shutdown().await;

    match outcome? {
        ToggleOutcome::Applied(true) => println!("Reposted {}", cmd.post),
        ToggleOutcome::Applied(false) => println!("Removed repost of {}", cmd.post),
        ToggleOutcome::Cancelled => println!("Repost cancelled"),
    }
    Ok(())
}

async fn toggle(args: SessionArgs, cmd: EngageCommand, kind: ActionKind) -> Result<()> {
    let session = open_session(args).await?;
    let result = session.toggle(cmd.post.as_str(), kind).await;
    session.shutdown().await;

    let verb = match (kind, result?) {
        (ActionKind::Like, true) => "Liked",
        (ActionKind::Like, false) => "Unliked",
        (ActionKind::Save, true) => "Saved",
        (ActionKind::Save, false) => "Unsaved",
        (ActionKind::Repost, true) => "Reposted",
        (ActionKind::Repost, false) => "Removed repost of",
    };
    println!("{verb} {}", cmd.post);
    Ok(())
}
