use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::browser::{BrowserCapability, WaitOutcome, WaitPolicy};
use crate::error::Result;
use crate::scraper::listing::{CriteriaEntry, EventData, JobCriteria, ListingDetail, ListingSummary};
use crate::scraper::scripts;
use crate::scraper::selectors::SelectorSet;

/// The independently failable steps of extracting one listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStep {
    Summary,
    OpenDetail,
    AwaitDetail,
    Description,
    Criteria,
}

impl fmt::Display for ExtractionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExtractionStep::Summary => "summary",
            ExtractionStep::OpenDetail => "open detail",
            ExtractionStep::AwaitDetail => "await detail",
            ExtractionStep::Description => "description",
            ExtractionStep::Criteria => "criteria",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// The detail pane never populated.
    Timeout,
    /// A script failed or returned something unexpected.
    Script,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionFailure {
    pub step: ExtractionStep,
    pub kind: FailureKind,
    pub message: String,
}

impl ExtractionFailure {
    fn script(step: ExtractionStep, message: impl Into<String>) -> Self {
        Self {
            step,
            kind: FailureKind::Script,
            message: message.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == FailureKind::Timeout
    }
}

impl fmt::Display for ExtractionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} step failed: {}", self.step, self.message)
    }
}

impl std::error::Error for ExtractionFailure {}

#[derive(Debug, Deserialize)]
struct DescriptionPayload {
    text: String,
    html: String,
}

/// Identifies the listing being extracted.
#[derive(Debug, Clone, Copy)]
pub struct ListingTarget<'a> {
    pub run_id: Uuid,
    pub query: &'a str,
    pub location: &'a str,
    /// Position of the listing in the current page.
    pub page_position: usize,
    /// Run-wide attempt ordinal.
    pub job_index: usize,
}

#[derive(Debug, Clone)]
pub struct ListingExtractor {
    selectors: SelectorSet,
    detail_wait: WaitPolicy,
    slow_mo: Duration,
}

impl ListingExtractor {
    pub fn new(selectors: SelectorSet, detail_wait: WaitPolicy, slow_mo: Duration) -> Self {
        Self {
            selectors,
            detail_wait,
            slow_mo,
        }
    }

    pub async fn extract(
        &self,
        browser: &dyn BrowserCapability,
        target: ListingTarget<'_>,
        tag: &str,
    ) -> std::result::Result<EventData, ExtractionFailure> {
        let summary = self.extract_summary(browser, target.page_position, tag).await?;
        let link = self.open_detail(browser, target.page_position).await?;

        if !self.slow_mo.is_zero() {
            tokio::time::sleep(self.slow_mo).await;
        }

        self.await_detail(browser).await?;
        let (description, description_html) = self.extract_description(browser, tag).await?;
        let criteria = self.extract_criteria(browser, tag).await?;

        Ok(EventData {
            run_id: target.run_id,
            query: target.query.to_string(),
            location: target.location.to_string(),
            job_index: target.job_index,
            link,
            summary,
            detail: ListingDetail::new(description, description_html, criteria),
        })
    }

    async fn extract_summary(
        &self,
        browser: &dyn BrowserCapability,
        position: usize,
        tag: &str,
    ) -> std::result::Result<ListingSummary, ExtractionFailure> {
        let s = &self.selectors;
        debug!("{} Evaluating selectors {:?}", tag, [&s.links, &s.companies, &s.places, &s.dates]);

        let value = evaluate(
            browser,
            ExtractionStep::Summary,
            scripts::LISTING_SUMMARY,
            &[json!(position), json!(s.jobs), json!(s.links), json!(s.companies), json!(s.places), json!(s.dates)],
        )
        .await?;

        if value.is_null() {
            return Ok(ListingSummary::default());
        }
        serde_json::from_value(value)
            .map_err(|e| ExtractionFailure::script(ExtractionStep::Summary, format!("Unexpected summary shape: {}", e)))
    }

    async fn open_detail(
        &self,
        browser: &dyn BrowserCapability,
        position: usize,
    ) -> std::result::Result<String, ExtractionFailure> {
        let value = evaluate(
            browser,
            ExtractionStep::OpenDetail,
            scripts::OPEN_LISTING,
            &[json!(position), json!(self.selectors.links)],
        )
        .await?;

        match value {
            Value::String(href) => Ok(href),
            Value::Null => Err(ExtractionFailure::script(
                ExtractionStep::OpenDetail,
                format!("No listing link at position {}", position),
            )),
            other => Err(ExtractionFailure::script(
                ExtractionStep::OpenDetail,
                format!("Unexpected link value: {}", other),
            )),
        }
    }

    async fn await_detail(&self, browser: &dyn BrowserCapability) -> std::result::Result<(), ExtractionFailure> {
        let outcome = browser
            .wait_until(scripts::DETAIL_LOADED, &[json!(self.selectors.description)], self.detail_wait)
            .await
            .map_err(|e| ExtractionFailure::script(ExtractionStep::AwaitDetail, e.to_string()))?;

        match outcome {
            WaitOutcome::Ready => Ok(()),
            WaitOutcome::TimedOut => Err(ExtractionFailure {
                step: ExtractionStep::AwaitDetail,
                kind: FailureKind::Timeout,
                message: "Timeout on loading job details".to_string(),
            }),
        }
    }

    async fn extract_description(
        &self,
        browser: &dyn BrowserCapability,
        tag: &str,
    ) -> std::result::Result<(String, String), ExtractionFailure> {
        debug!("{} Evaluating selectors {:?}", tag, [&self.selectors.description]);

        let value = evaluate(
            browser,
            ExtractionStep::Description,
            scripts::DESCRIPTION,
            &[json!(self.selectors.description)],
        )
        .await?;

        if value.is_null() {
            return Err(ExtractionFailure::script(ExtractionStep::Description, "Detail pane disappeared"));
        }
        let payload: DescriptionPayload = serde_json::from_value(value).map_err(|e| {
            ExtractionFailure::script(ExtractionStep::Description, format!("Unexpected description shape: {}", e))
        })?;
        Ok((payload.text, payload.html))
    }

    async fn extract_criteria(
        &self,
        browser: &dyn BrowserCapability,
        tag: &str,
    ) -> std::result::Result<JobCriteria, ExtractionFailure> {
        debug!("{} Evaluating selectors {:?}", tag, [&self.selectors.criteria]);

        let value = evaluate(
            browser,
            ExtractionStep::Criteria,
            scripts::CRITERIA_ENTRIES,
            &[json!(self.selectors.criteria)],
        )
        .await?;

        let entries: Vec<CriteriaEntry> = if value.is_null() {
            Vec::new()
        } else {
            serde_json::from_value(value).map_err(|e| {
                ExtractionFailure::script(ExtractionStep::Criteria, format!("Unexpected criteria shape: {}", e))
            })?
        };
        Ok(JobCriteria::from_entries(&entries))
    }
}

async fn evaluate(
    browser: &dyn BrowserCapability,
    step: ExtractionStep,
    script: &str,
    args: &[Value],
) -> std::result::Result<Value, ExtractionFailure> {
    let result: Result<Value> = browser.evaluate(script, args).await;
    result.map_err(|e| ExtractionFailure::script(step, e.to_string()))
}
