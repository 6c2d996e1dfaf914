//! Status command - latest cycle, queue counts and recent posts

use anyhow::Result;
use std::path::PathBuf;
use trendposter_domain::{
    QueueStore,
    usecases::{Renderer, StatusView},
};

use crate::config::AppConfig;
use crate::wiring;

const RECENT_POSTS: usize = 3;

pub async fn execute(config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;
    let queue = wiring::open_queue(&config).await?;

    let info = match wiring::resolve_provider(&config, |key| std::env::var(key).ok())
        .and_then(|kind| wiring::status_info(&config, kind))
    {
        Ok(info) => Some(info),
        Err(e) => {
            tracing::debug!(error = %e, "Omitting provider line from status");
            None
        }
    };

    let counts = queue.counts().await?;
    let latest = queue.latest_cycle().await?;
    let recent = queue.recent_posted(RECENT_POSTS).await?;

    let rendered = Renderer::default().render_status(&StatusView {
        info: info.as_ref(),
        cycle_state: None,
        latest: latest.as_ref(),
        counts,
        recent: &recent,
    });
    println!("{}", rendered);
    Ok(())
}
