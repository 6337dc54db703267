use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use job_listing_scraper::agents::AgentOrchestrator;
use job_listing_scraper::browser::BrowserManager;
use job_listing_scraper::config::{credential_from_env, ConfigManager, FileConfigManager};
use job_listing_scraper::events::{EventBus, RunOutcome};
use job_listing_scraper::scraper::{ScrapeOrchestrator, SessionManager};
use job_listing_scraper::storage::{FileStorageManager, StorageManager};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config_manager = FileConfigManager::new(config_path.clone());
    let config = config_manager
        .load_config()
        .await
        .map_err(|e| anyhow::anyhow!(e))
        .with_context(|| format!("loading {}", config_path.display()))?;
    let token = credential_from_env().map_err(|e| anyhow::anyhow!(e))?;
    let queries = config.resolve_queries().map_err(|e| anyhow::anyhow!(e))?;

    tracing::info!("Starting job listing scraper with {} queries", queries.len());

    let bus = Arc::new(EventBus::new());

    let storage = Arc::new(
        FileStorageManager::new(config.output.directory.clone(), &config.output.format, &config.output.base_url)
            .map_err(|e| anyhow::anyhow!(e))?,
    );
    storage.attach(&bus);

    bus.on_error(|event| {
        tracing::warn!("{} Listing {:?} failed: {}", event.context.tag(), event.job_index, event.message);
        Ok(())
    });
    bus.on_invalid_session(|context| {
        tracing::warn!("{} Session is no longer authenticated", context.tag());
        Ok(())
    });
    bus.on_end(|summary| {
        match &summary.outcome {
            RunOutcome::Done => tracing::info!(
                "{} Run finished: {} listings, {} failed",
                summary.context.tag(),
                summary.processed,
                summary.failed
            ),
            RunOutcome::Aborted(reason) => tracing::error!("{} Run aborted: {}", summary.context.tag(), reason),
        }
        Ok(())
    });

    let session = SessionManager::new(config.session_settings(), token);
    let settings = config.scrape_settings().map_err(|e| anyhow::anyhow!(e))?;
    let scraper = ScrapeOrchestrator::new(session, config.selectors.clone(), settings, bus);
    let launcher = Arc::new(BrowserManager::new(config.launch_options()));
    let orchestrator = AgentOrchestrator::new(scraper, launcher, config.browser.max_workers);

    let reports = orchestrator.run_all(&queries).await;

    let status = orchestrator.get_status().await;
    tracing::info!("Orchestrator status: {}", serde_json::to_string(&status)?);
    if let Ok(stats) = storage.storage_stats() {
        tracing::info!(
            "Stored {} records across {} files in {}",
            stats.total_records,
            stats.files_created,
            config.output.directory.display()
        );
    }

    let aborted = reports.iter().filter(|r| r.outcome.is_aborted()).count();
    if aborted > 0 {
        anyhow::bail!("{} of {} runs aborted", aborted, reports.len());
    }

    tracing::info!("Job listing scraper finished.");
    Ok(())
}
