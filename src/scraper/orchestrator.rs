use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::browser::{BrowserCapability, WaitOutcome, WaitPolicy};
use crate::error::{Result, ScrapingError};
use crate::events::{ErrorEvent, EventBus, RunContext, RunOutcome, RunSummary, ScrapeEvent};
use crate::scraper::extractor::{ListingExtractor, ListingTarget};
use crate::scraper::pagination::{PaginationController, PaginationOutcome, DEFAULT_PAGE_SIZE};
use crate::scraper::query::Query;
use crate::scraper::scripts;
use crate::scraper::selectors::SelectorSet;
use crate::scraper::session::SessionManager;

/// Site and timing knobs for one orchestrator.
#[derive(Debug, Clone)]
pub struct ScrapeSettings {
    pub search_url: Url,
    pub page_size: usize,
    /// Pause after navigations, before each listing and after opening a detail pane.
    pub slow_mo: Duration,
    pub container_wait: WaitPolicy,
    pub detail_wait: WaitPolicy,
    pub pagination_wait: WaitPolicy,
}

impl ScrapeSettings {
    pub fn new(search_url: Url) -> Self {
        Self {
            search_url,
            page_size: DEFAULT_PAGE_SIZE,
            slow_mo: Duration::ZERO,
            container_wait: WaitPolicy::default(),
            detail_wait: WaitPolicy::default(),
            pagination_wait: WaitPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScrapeStage {
    Init,
    SessionCheck,
    PageReady,
    ListingLoop,
    Paginate,
    Done,
}

/// Per-run bookkeeping, discarded when the run ends.
#[derive(Debug, Default)]
struct ScrapeState {
    offset: usize,
    processed: usize,
    failed: usize,
    pagination_index: usize,
    job_index: usize,
    page_position: usize,
    page_total: usize,
    session_valid: bool,
}

/// Drives one (query, location) run from session setup to the END event.
#[derive(Clone)]
pub struct ScrapeOrchestrator {
    session: SessionManager,
    selectors: SelectorSet,
    settings: ScrapeSettings,
    extractor: ListingExtractor,
    paginator: PaginationController,
    events: Arc<EventBus>,
}

impl ScrapeOrchestrator {
    pub fn new(
        session: SessionManager,
        selectors: SelectorSet,
        settings: ScrapeSettings,
        events: Arc<EventBus>,
    ) -> Self {
        let extractor = ListingExtractor::new(selectors.clone(), settings.detail_wait, settings.slow_mo);
        let paginator = PaginationController::new(selectors.clone(), settings.page_size, settings.pagination_wait);

        Self {
            session,
            selectors,
            settings,
            extractor,
            paginator,
            events,
        }
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Run to a terminal state. END is emitted exactly once whichever way the
    /// run ends; fatal conditions are also returned.
    pub async fn run(&self, browser: &dyn BrowserCapability, query: &Query, location: &str) -> Result<RunSummary> {
        let context = RunContext::new(query.query.clone(), location);
        self.run_as(browser, query, context).await
    }

    /// Same as [`run`](Self::run) under a caller-supplied context, so the
    /// caller can pick out this run's events.
    pub async fn run_as(
        &self,
        browser: &dyn BrowserCapability,
        query: &Query,
        context: RunContext,
    ) -> Result<RunSummary> {
        let tag = context.tag();
        let mut state = ScrapeState::default();

        info!("{} Starting scraping", tag);
        let result = self.drive(browser, query, &context, &tag, &mut state).await;

        let outcome = match &result {
            Ok(()) => RunOutcome::Done,
            Err(e) => {
                error!("{} Run aborted: {}", tag, e);
                RunOutcome::Aborted(e.to_string())
            }
        };

        let summary = RunSummary {
            context,
            processed: state.processed,
            failed: state.failed,
            outcome,
        };
        info!(
            "{} Finished: {} processed, {} failed, {} pages",
            tag,
            summary.processed,
            summary.failed,
            state.pagination_index + 1
        );
        self.events.emit(ScrapeEvent::End(summary.clone()));

        result.map(|_| summary)
    }

    async fn drive(
        &self,
        browser: &dyn BrowserCapability,
        query: &Query,
        context: &RunContext,
        tag: &str,
        state: &mut ScrapeState,
    ) -> Result<()> {
        let mut stage = ScrapeStage::Init;

        loop {
            debug!("{} Stage {:?}", tag, stage);
            stage = match stage {
                ScrapeStage::Init => {
                    self.session.ensure_session(browser, tag).await?;
                    ScrapeStage::SessionCheck
                }
                ScrapeStage::SessionCheck => self.open_search(browser, query, context, tag, state).await?,
                ScrapeStage::PageReady => self.prepare_page(browser, context, tag, state).await,
                ScrapeStage::ListingLoop => self.process_listings(browser, query, context, tag, state).await,
                ScrapeStage::Paginate => self.advance_page(browser, context, tag, state).await,
                ScrapeStage::Done => return Ok(()),
            };
        }
    }

    async fn open_search(
        &self,
        browser: &dyn BrowserCapability,
        query: &Query,
        context: &RunContext,
        tag: &str,
        state: &mut ScrapeState,
    ) -> Result<ScrapeStage> {
        let url = query.search_url(&self.settings.search_url, &context.location)?;
        info!("{} Opening {}", tag, url);

        browser
            .navigate(url.as_str())
            .await
            .map_err(|e| ScrapingError::NavigationError(format!("Failed to open {}: {}", url, e)))?;
        self.pause().await;

        self.session.verify(browser).await?;
        state.session_valid = true;

        let outcome = browser
            .wait_until(
                scripts::ELEMENT_PRESENT,
                &[json!(self.selectors.container)],
                self.settings.container_wait,
            )
            .await;

        match outcome {
            Ok(WaitOutcome::Ready) => Ok(ScrapeStage::PageReady),
            Ok(WaitOutcome::TimedOut) => {
                info!("{} No jobs found, skip", tag);
                Ok(ScrapeStage::Done)
            }
            Err(e) => {
                debug!("{} Results container check failed: {}", tag, e);
                Ok(ScrapeStage::Done)
            }
        }
    }

    async fn prepare_page(
        &self,
        browser: &dyn BrowserCapability,
        context: &RunContext,
        tag: &str,
        state: &mut ScrapeState,
    ) -> ScrapeStage {
        self.housekeeping(browser, tag).await;
        self.check_session(browser, context, tag, state).await;

        match self.count_listings(browser).await {
            Ok(0) => {
                info!("{} No jobs found, skip", tag);
                ScrapeStage::Done
            }
            Ok(total) => {
                debug!("{} Found {} listings at offset {}", tag, total, state.offset);
                state.page_total = total;
                state.page_position = 0;
                ScrapeStage::ListingLoop
            }
            Err(e) => {
                self.emit_error(context, None, format!("Failed to count listings: {}", e));
                ScrapeStage::Done
            }
        }
    }

    async fn process_listings(
        &self,
        browser: &dyn BrowserCapability,
        query: &Query,
        context: &RunContext,
        tag: &str,
        state: &mut ScrapeState,
    ) -> ScrapeStage {
        let limit = query.options.limit;

        while state.processed < limit {
            if state.page_position >= state.page_total {
                // The list lazy-loads more entries once scrolled to its end.
                match self.count_listings(browser).await {
                    Ok(total) if total > state.page_total => {
                        debug!("{} Listing count grew from {} to {}", tag, state.page_total, total);
                        state.page_total = total;
                    }
                    _ => break,
                }
            }

            self.pause().await;
            self.check_session(browser, context, tag, state).await;

            let target = ListingTarget {
                run_id: context.run_id,
                query: &context.query,
                location: &context.location,
                page_position: state.page_position,
                job_index: state.job_index,
            };

            match self.extractor.extract(browser, target, tag).await {
                Ok(data) => {
                    info!(
                        "{} Processed job {}: {} at {}",
                        tag, state.job_index, data.summary.title, data.summary.company
                    );
                    self.events.emit(ScrapeEvent::Data(data));
                    state.processed += 1;
                }
                Err(failure) => {
                    state.failed += 1;
                    if failure.is_timeout() {
                        warn!("{} Job {}: {}", tag, state.job_index, failure);
                    } else {
                        error!("{} Job {}: {}", tag, state.job_index, failure);
                    }
                    self.check_session(browser, context, tag, state).await;
                    self.emit_error(context, Some(state.job_index), failure.to_string());
                }
            }

            state.job_index += 1;
            state.page_position += 1;
        }

        if state.processed >= limit {
            info!("{} Reached limit of {} listings", tag, limit);
            ScrapeStage::Done
        } else {
            ScrapeStage::Paginate
        }
    }

    async fn advance_page(
        &self,
        browser: &dyn BrowserCapability,
        context: &RunContext,
        tag: &str,
        state: &mut ScrapeState,
    ) -> ScrapeStage {
        info!("{} Pagination requested ({})", tag, state.pagination_index + 1);

        match self.paginator.paginate(browser, state.offset, tag).await {
            Ok(PaginationOutcome::Advanced { offset }) => {
                state.offset = offset;
                state.pagination_index += 1;
                self.pause().await;
                ScrapeStage::PageReady
            }
            Ok(PaginationOutcome::Failed(reason)) => {
                self.emit_error(context, None, reason);
                ScrapeStage::Done
            }
            Ok(other) => {
                info!("{} {}", tag, other.error().unwrap_or_default());
                ScrapeStage::Done
            }
            Err(e) => {
                self.emit_error(context, None, format!("Pagination failed: {}", e));
                ScrapeStage::Done
            }
        }
    }

    /// Best-effort page chores; failures are ignored.
    async fn housekeeping(&self, browser: &dyn BrowserCapability, tag: &str) {
        if let Err(e) = browser
            .evaluate(scripts::ACCEPT_COOKIES, &[json!(self.selectors.accept_cookies_text)])
            .await
        {
            debug!("{} Accept cookies skipped: {}", tag, e);
        }
        if let Err(e) = browser
            .evaluate(scripts::HIDE_OVERLAY, &[json!(self.selectors.chat_panel)])
            .await
        {
            debug!("{} Hide overlay skipped: {}", tag, e);
        }
    }

    /// Emits INVALID_SESSION on the transition from valid to invalid only.
    async fn check_session(
        &self,
        browser: &dyn BrowserCapability,
        context: &RunContext,
        tag: &str,
        state: &mut ScrapeState,
    ) {
        match self.session.is_authenticated(browser).await {
            Ok(true) => state.session_valid = true,
            Ok(false) => {
                if state.session_valid {
                    warn!("{} Session is no longer valid, continuing", tag);
                    state.session_valid = false;
                    self.events.emit(ScrapeEvent::InvalidSession(context.clone()));
                }
            }
            Err(e) => debug!("{} Session check failed: {}", tag, e),
        }
    }

    async fn count_listings(&self, browser: &dyn BrowserCapability) -> Result<usize> {
        let value = browser
            .evaluate(scripts::COUNT_ELEMENTS, &[json!(self.selectors.links)])
            .await?;
        Ok(value.as_u64().unwrap_or(0) as usize)
    }

    fn emit_error(&self, context: &RunContext, job_index: Option<usize>, message: String) {
        self.events.emit(ScrapeEvent::Error(ErrorEvent {
            context: context.clone(),
            job_index,
            message,
        }));
    }

    async fn pause(&self) {
        if !self.settings.slow_mo.is_zero() {
            tokio::time::sleep(self.settings.slow_mo).await;
        }
    }
}
