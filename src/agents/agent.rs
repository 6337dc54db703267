use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::browser::BrowserLauncher;
use crate::error::Result;
use crate::events::{RunContext, RunOutcome, RunSummary, ScrapeEvent};
use crate::scraper::orchestrator::ScrapeOrchestrator;
use crate::scraper::query::Query;

pub type AgentId = Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum AgentStatus {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
    Error(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub listings_scraped: u64,
    pub error_count: u32,
    #[serde(with = "humantime_serde")]
    pub uptime: Duration,
    pub last_listing_time: Option<DateTime<Utc>>,
    pub status: AgentStatus,
}

#[async_trait]
pub trait Agent {
    /// Execute one (query, location) run on a browser session of its own.
    async fn run(&mut self, query: &Query, location: &str) -> Result<RunSummary>;
    async fn get_status(&self) -> AgentStatus;
    async fn get_metrics(&self) -> AgentMetrics;
}

/// Live counters fed by event listeners while a run is in progress.
#[derive(Default)]
struct LiveCounters {
    listings: AtomicU64,
    errors: AtomicU32,
    last_listing: std::sync::Mutex<Option<DateTime<Utc>>>,
}

pub struct ScrapingAgent {
    pub id: AgentId,
    pub context: Option<RunContext>,
    pub status: Arc<RwLock<AgentStatus>>,
    launcher: Arc<dyn BrowserLauncher>,
    scraper: ScrapeOrchestrator,
    counters: Arc<LiveCounters>,
    start_time: Option<Instant>,
    finished_after: Option<Duration>,
}

impl ScrapingAgent {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, scraper: ScrapeOrchestrator) -> Self {
        Self {
            id: Uuid::new_v4(),
            context: None,
            status: Arc::new(RwLock::new(AgentStatus::Idle)),
            launcher,
            scraper,
            counters: Arc::new(LiveCounters::default()),
            start_time: None,
            finished_after: None,
        }
    }

    pub async fn set_status(&self, status: AgentStatus) {
        let mut current_status = self.status.write().await;
        *current_status = status;
    }

    fn uptime(&self) -> Duration {
        match (self.finished_after, self.start_time) {
            (Some(finished), _) => finished,
            (None, Some(start)) => start.elapsed(),
            (None, None) => Duration::ZERO,
        }
    }

    /// Count this run's DATA and ERROR events while it is in progress.
    fn track_events(&self, context: &RunContext) -> Vec<crate::events::ListenerId> {
        let bus = self.scraper.events();

        let counters = self.counters.clone();
        let data_context = context.clone();
        let data_listener = bus.on_data(move |data| {
            if data.run_id == data_context.run_id {
                counters.listings.fetch_add(1, Ordering::Relaxed);
                *counters.last_listing.lock().unwrap_or_else(|e| e.into_inner()) = Some(Utc::now());
            }
            Ok(())
        });

        let counters = self.counters.clone();
        let error_context = context.clone();
        let error_listener = bus.on_error(move |event| {
            if event.context.run_id == error_context.run_id {
                counters.errors.fetch_add(1, Ordering::Relaxed);
            }
            Ok(())
        });

        vec![data_listener, error_listener]
    }
}

#[async_trait]
impl Agent for ScrapingAgent {
    async fn run(&mut self, query: &Query, location: &str) -> Result<RunSummary> {
        let context = RunContext::new(query.query.clone(), location);
        let tag = context.tag();
        info!("{} Agent {} starting", tag, self.id);

        self.set_status(AgentStatus::Starting).await;
        self.context = Some(context.clone());
        self.start_time = Some(Instant::now());
        self.finished_after = None;

        let session = match self.launcher.launch(query.options.optimize).await {
            Ok(session) => session,
            Err(e) => {
                error!("{} Failed to launch browser for agent {}: {}", tag, self.id, e);
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                self.finished_after = Some(self.uptime());
                // The run never reached the scraper, so END is ours to send.
                self.scraper.events().emit(ScrapeEvent::End(RunSummary {
                    context,
                    processed: 0,
                    failed: 0,
                    outcome: RunOutcome::Aborted(format!("Browser launch failed: {}", e)),
                }));
                self.set_status(AgentStatus::Error(format!("Browser launch failed: {}", e))).await;
                return Err(e);
            }
        };
        info!("{} Agent {} using browser session {}", tag, self.id, session.session_id());

        let listeners = self.track_events(&context);
        self.set_status(AgentStatus::Running).await;

        let result = self
            .scraper
            .run_as(session.as_capability(), query, context.clone())
            .await;

        self.set_status(AgentStatus::Stopping).await;
        for id in listeners {
            self.scraper.events().remove_listener(id);
        }
        if let Err(e) = session.close().await {
            warn!("{} Failed to close browser session {}: {}", tag, session.session_id(), e);
        }
        self.finished_after = Some(self.uptime());

        match &result {
            Ok(summary) => {
                info!(
                    "{} Agent {} finished: {} listings, {} errors",
                    tag, self.id, summary.processed, summary.failed
                );
                self.set_status(AgentStatus::Stopped).await;
            }
            Err(e) => {
                error!("{} Agent {} aborted: {}", tag, self.id, e);
                self.set_status(AgentStatus::Error(e.to_string())).await;
            }
        }

        result
    }

    async fn get_status(&self) -> AgentStatus {
        let status = self.status.read().await;
        status.clone()
    }

    async fn get_metrics(&self) -> AgentMetrics {
        let last_listing_time = *self
            .counters
            .last_listing
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        AgentMetrics {
            listings_scraped: self.counters.listings.load(Ordering::Relaxed),
            error_count: self.counters.errors.load(Ordering::Relaxed),
            uptime: self.uptime(),
            last_listing_time,
            status: self.get_status().await,
        }
    }
}
