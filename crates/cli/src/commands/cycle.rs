//! Cycle command - one manual cycle from the command line

use anyhow::{Result, bail};
use std::path::PathBuf;
use std::sync::Arc;
use trendposter_adapters::{notify::LogNotifier, x::StubXPublisher};
use trendposter_domain::{
    CycleOutcome, Publisher, SystemClock, Trigger,
    usecases::{LlmMatcher, Orchestrator, Renderer},
};

use crate::args::CycleArgs;
use crate::config::AppConfig;
use crate::wiring;

pub async fn execute(args: CycleArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;

    let queue = Arc::new(wiring::open_queue(&config).await?);
    let provider = wiring::build_provider(&config, |key| std::env::var(key).ok())?;
    let trends = Arc::new(wiring::build_trend_source(&config)?);

    // Dry runs stop before publishing, so they need no X credentials
    let publisher: Arc<dyn Publisher> = if args.dry_run {
        Arc::new(StubXPublisher::new())
    } else {
        Arc::new(wiring::build_publisher(&config)?)
    };

    let orchestrator = Orchestrator::new(
        trends,
        queue,
        Arc::new(LlmMatcher::new(Arc::new(provider))),
        publisher,
        Arc::new(LogNotifier),
        Arc::new(SystemClock),
        wiring::orchestrator_config(&config)?,
    );

    let trigger = if args.dry_run {
        Trigger::DryRun
    } else {
        Trigger::Manual
    };
    let report = orchestrator.run_cycle(trigger).await?;

    println!("{}", Renderer::default().render_report(&report));

    if report.record.outcome == CycleOutcome::Error {
        bail!("Cycle failed: {}", report.record.detail);
    }
    Ok(())
}
