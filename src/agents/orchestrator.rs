use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{RwLock, Semaphore};
use tokio::time::Instant;
use tracing::{error, info};

use crate::agents::{Agent, AgentId, AgentMetrics, AgentStatus, ScrapingAgent};
use crate::browser::BrowserLauncher;
use crate::error::ScrapingError;
use crate::events::{EventBus, RunContext, RunOutcome};
use crate::scraper::orchestrator::ScrapeOrchestrator;
use crate::scraper::query::Query;

/// A (query, location) run handed to one agent.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunAssignment {
    pub agent_id: AgentId,
    pub context: RunContext,
    #[serde(with = "humantime_serde")]
    pub assigned_at: SystemTime,
}

/// How one run ended, as seen by the worker that executed it.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunReport {
    pub agent_id: AgentId,
    pub context: RunContext,
    pub outcome: RunOutcome,
    pub metrics: AgentMetrics,
}

/// Orchestrator status and statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct OrchestratorStatus {
    pub max_workers: usize,
    pub active_agents: usize,
    pub total_agents_spawned: u64,
    pub agent_assignments: Vec<RunAssignment>,
    pub completed_runs: usize,
    pub aborted_runs: usize,
    pub total_listings: u64,
    pub error_count: u32,
    #[serde(with = "humantime_serde")]
    pub uptime: Duration,
}

/// Runs every (query, location) pair on its own agent and browser session,
/// with at most `max_workers` runs in flight.
pub struct AgentOrchestrator {
    launcher: Arc<dyn BrowserLauncher>,
    scraper: ScrapeOrchestrator,
    max_workers: usize,
    agent_assignments: Arc<RwLock<HashMap<AgentId, RunAssignment>>>,
    reports: Arc<RwLock<Vec<RunReport>>>,
    total_agents_spawned: Arc<RwLock<u64>>,
    error_count: Arc<RwLock<u32>>,
    start_time: Instant,
}

impl AgentOrchestrator {
    pub fn new(scraper: ScrapeOrchestrator, launcher: Arc<dyn BrowserLauncher>, max_workers: usize) -> Self {
        Self {
            launcher,
            scraper,
            max_workers: max_workers.max(1),
            agent_assignments: Arc::new(RwLock::new(HashMap::new())),
            reports: Arc::new(RwLock::new(Vec::new())),
            total_agents_spawned: Arc::new(RwLock::new(0)),
            error_count: Arc::new(RwLock::new(0)),
            start_time: Instant::now(),
        }
    }

    pub fn events(&self) -> &Arc<EventBus> {
        self.scraper.events()
    }

    /// One run per (query, location), in configuration order.
    pub fn plan(queries: &[Query]) -> Vec<(Query, String)> {
        queries
            .iter()
            .flat_map(|query| {
                query
                    .options
                    .locations
                    .iter()
                    .map(move |location| (query.clone(), location.clone()))
            })
            .collect()
    }

    /// Execute every run and return one report per run, in plan order. A run
    /// that aborts is reported without affecting its siblings.
    pub async fn run_all(&self, queries: &[Query]) -> Vec<RunReport> {
        let plan = Self::plan(queries);
        info!("Scheduling {} runs on up to {} workers", plan.len(), self.max_workers);

        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut handles = Vec::with_capacity(plan.len());

        for (query, location) in plan {
            let semaphore = semaphore.clone();
            let launcher = self.launcher.clone();
            let scraper = self.scraper.clone();
            let assignments = self.agent_assignments.clone();
            let total_agents_spawned = self.total_agents_spawned.clone();

            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| ScrapingError::AgentError(format!("Worker pool closed: {}", e)))?;

                let mut agent = ScrapingAgent::new(launcher, scraper);
                let agent_id = agent.id;
                let context = RunContext::new(query.query.clone(), location.clone());

                assignments.write().await.insert(
                    agent_id,
                    RunAssignment {
                        agent_id,
                        context: context.clone(),
                        assigned_at: SystemTime::now(),
                    },
                );
                *total_agents_spawned.write().await += 1;

                let outcome = match agent.run(&query, &location).await {
                    Ok(summary) => summary.outcome,
                    Err(e) => RunOutcome::Aborted(e.to_string()),
                };

                assignments.write().await.remove(&agent_id);

                Ok::<RunReport, ScrapingError>(RunReport {
                    agent_id,
                    context: agent.context.clone().unwrap_or(context),
                    outcome,
                    metrics: agent.get_metrics().await,
                })
            }));
        }

        let mut reports = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(Ok(report)) => {
                    if report.outcome.is_aborted() {
                        self.increment_error_count().await;
                    }
                    reports.push(report);
                }
                Ok(Err(e)) => {
                    error!("Worker failed before running: {}", e);
                    self.increment_error_count().await;
                }
                Err(e) => {
                    error!("Worker task panicked: {}", e);
                    self.increment_error_count().await;
                }
            }
        }

        self.reports.write().await.extend(reports.iter().cloned());
        reports
    }

    pub async fn get_status(&self) -> OrchestratorStatus {
        let agent_assignments: Vec<RunAssignment> = self.agent_assignments.read().await.values().cloned().collect();
        let reports = self.reports.read().await;

        OrchestratorStatus {
            max_workers: self.max_workers,
            active_agents: agent_assignments.len(),
            total_agents_spawned: *self.total_agents_spawned.read().await,
            agent_assignments,
            completed_runs: reports.iter().filter(|r| !r.outcome.is_aborted()).count(),
            aborted_runs: reports.iter().filter(|r| r.outcome.is_aborted()).count(),
            total_listings: reports.iter().map(|r| r.metrics.listings_scraped).sum(),
            error_count: *self.error_count.read().await,
            uptime: self.start_time.elapsed(),
        }
    }

    /// Runs currently in flight.
    pub async fn active_runs(&self) -> Vec<(AgentId, RunContext)> {
        self.agent_assignments
            .read()
            .await
            .values()
            .map(|a| (a.agent_id, a.context.clone()))
            .collect()
    }

    async fn increment_error_count(&self) {
        let mut error_count = self.error_count.write().await;
        *error_count += 1;
    }
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        !self.outcome.is_aborted() && !matches!(self.metrics.status, AgentStatus::Error(_))
    }
}
