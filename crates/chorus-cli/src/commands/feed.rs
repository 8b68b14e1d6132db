//! `chorus feed`

use super::common::{open_session, print_post, SessionArgs};
use anyhow::Result;
use chorus_feed::ChannelEvent;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

pub async fn run(args: SessionArgs, limit: usize, watch: bool) -> Result<()> {
    let session = open_session(args).await?;

    let posts = session.snapshot();
    if posts.is_empty() {
        println!("No posts yet.");
    }
    for post in posts.iter().take(limit) {
        print_post(&session, post);
    }

    if watch {
        let mut events = session.channel().subscribe();
        info!("watching for new posts, press Ctrl-C to stop");
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                event = events.recv() => match event {
                    Ok(ChannelEvent::PeerPostArrived(post)) => print_post(&session, &post),
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "missed live posts; rerun to resync");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
    }

    session.shutdown().await;
    Ok(())
}
