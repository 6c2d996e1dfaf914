//! Queue command - manage drafts without a chat bot

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use trendposter_domain::{PostStatus, QueueError, QueueStore, usecases::Renderer};

use crate::args::{QueueArgs, QueueCommands};
use crate::config::AppConfig;
use crate::wiring;

pub async fn execute(args: QueueArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;
    let queue = wiring::open_queue(&config).await?;

    match args.command {
        QueueCommands::Add { text, priority } => {
            let post = queue.enqueue(&text, priority).await.context("Not queued")?;
            let queued = queue.counts().await?.queued;
            println!("Queued #{} ({} post(s) in queue)", post.id, queued);
        }
        QueueCommands::List { status, all, json } => {
            let filter = match (status, all) {
                (_, true) => None,
                (Some(raw), false) => {
                    Some(PostStatus::from_str(&raw).map_err(anyhow::Error::msg)?)
                }
                (None, false) => Some(PostStatus::Queued),
            };
            let posts = queue.list(filter).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&posts)?);
            } else {
                println!("{}", Renderer::default().render_queue(&posts));
            }
        }
        QueueCommands::Remove { id } => match queue.remove(id).await {
            Ok(()) => println!("Removed #{}", id),
            Err(QueueError::NotFound(_)) => anyhow::bail!("Post #{} not found in queue", id),
            Err(e) => return Err(e.into()),
        },
    }

    Ok(())
}
