use serde_json::json;
use tracing::{debug, info};
use url::Url;

use crate::browser::{BrowserCapability, WaitOutcome, WaitPolicy};
use crate::error::Result;
use crate::scraper::scripts;
use crate::scraper::selectors::SelectorSet;

pub const DEFAULT_PAGE_SIZE: usize = 25;

/// Query parameter carrying the result offset.
const OFFSET_PARAM: &str = "start";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaginationOutcome {
    /// The next page is loaded and shows listings.
    Advanced { offset: usize },
    /// No next-page control in the current view.
    NoMorePages,
    /// The next page never showed listings within the wait policy.
    TimedOut,
    /// Navigating to the next page failed.
    Failed(String),
}

impl PaginationOutcome {
    pub fn success(&self) -> bool {
        matches!(self, PaginationOutcome::Advanced { .. })
    }

    pub fn error(&self) -> Option<String> {
        match self {
            PaginationOutcome::Advanced { .. } => None,
            PaginationOutcome::NoMorePages => Some("There are no more pages to visit".to_string()),
            PaginationOutcome::TimedOut => Some("Timeout on pagination".to_string()),
            PaginationOutcome::Failed(reason) => Some(reason.clone()),
        }
    }
}

/// Replace (or add) the offset parameter, keeping every other parameter in place.
pub fn with_offset(url: &Url, offset: usize) -> Url {
    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != OFFSET_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut next = url.clone();
    next.query_pairs_mut()
        .clear()
        .extend_pairs(retained)
        .append_pair(OFFSET_PARAM, &offset.to_string());
    next
}

/// Advances the listing view by a fixed page size through the URL offset.
#[derive(Debug, Clone)]
pub struct PaginationController {
    selectors: SelectorSet,
    page_size: usize,
    wait: WaitPolicy,
}

impl PaginationController {
    pub fn new(selectors: SelectorSet, page_size: usize, wait: WaitPolicy) -> Self {
        Self {
            selectors,
            page_size,
            wait,
        }
    }

    pub async fn paginate(
        &self,
        browser: &dyn BrowserCapability,
        current_offset: usize,
        tag: &str,
    ) -> Result<PaginationOutcome> {
        if !self.is_present(browser, &self.selectors.pagination).await? {
            debug!("{} No paginator on this page", tag);
            return Ok(PaginationOutcome::NoMorePages);
        }

        if !self.is_present(browser, &self.selectors.pagination_next_button).await? {
            debug!("{} No next page control found", tag);
            return Ok(PaginationOutcome::NoMorePages);
        }

        let current_url = browser.evaluate(scripts::CURRENT_URL, &[]).await?;
        let current_url = match current_url.as_str().map(Url::parse) {
            Some(Ok(url)) => url,
            _ => {
                return Ok(PaginationOutcome::Failed(format!(
                    "Could not read current page URL: {}",
                    current_url
                )))
            }
        };

        let offset = current_offset + self.page_size;
        let next_url = with_offset(&current_url, offset);
        info!("{} Requesting offset {}", tag, offset);

        if let Err(e) = browser.navigate(next_url.as_str()).await {
            return Ok(PaginationOutcome::Failed(format!("Failed to open next page: {}", e)));
        }

        let outcome = browser
            .wait_until(scripts::LISTINGS_PRESENT, &[json!(self.selectors.links)], self.wait)
            .await?;

        Ok(match outcome {
            WaitOutcome::Ready => PaginationOutcome::Advanced { offset },
            WaitOutcome::TimedOut => PaginationOutcome::TimedOut,
        })
    }

    async fn is_present(&self, browser: &dyn BrowserCapability, selector: &str) -> Result<bool> {
        let value = browser.evaluate(scripts::ELEMENT_PRESENT, &[json!(selector)]).await?;
        Ok(value.as_bool().unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_offset_replaces_existing_start() {
        let url = Url::parse("https://www.linkedin.com/jobs/search?keywords=rust&start=25&location=Morocco").unwrap();
        let next = with_offset(&url, 50);

        let pairs: Vec<(String, String)> = next.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect();
        assert_eq!(
            pairs,
            vec![
                ("keywords".to_string(), "rust".to_string()),
                ("location".to_string(), "Morocco".to_string()),
                ("start".to_string(), "50".to_string()),
            ]
        );
    }

    #[test]
    fn test_with_offset_adds_missing_start() {
        let url = Url::parse("https://www.linkedin.com/jobs/search?keywords=rust").unwrap();
        assert_eq!(
            with_offset(&url, 25).as_str(),
            "https://www.linkedin.com/jobs/search?keywords=rust&start=25"
        );
    }

    #[test]
    fn test_outcome_reasons() {
        assert!(PaginationOutcome::Advanced { offset: 25 }.success());
        assert!(PaginationOutcome::Advanced { offset: 25 }.error().is_none());
        assert!(!PaginationOutcome::NoMorePages.success());
        assert_eq!(
            PaginationOutcome::NoMorePages.error().as_deref(),
            Some("There are no more pages to visit")
        );
        assert_eq!(PaginationOutcome::TimedOut.error().as_deref(), Some("Timeout on pagination"));
    }
}
