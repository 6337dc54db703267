use serde::{Deserialize, Serialize};

use crate::error::{Result, ScrapingError};

/// CSS selectors for each element role the scraper reads or clicks.
///
/// Supplied through configuration so a markup change on the target site only
/// needs a new table, not new code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorSet {
    pub container: String,
    pub chat_panel: String,
    pub jobs: String,
    pub links: String,
    pub companies: String,
    pub places: String,
    pub dates: String,
    pub description: String,
    pub criteria: String,
    pub pagination: String,
    pub pagination_next_button: String,
    /// Text of the cookie consent button clicked during page housekeeping.
    pub accept_cookies_text: String,
}

impl Default for SelectorSet {
    fn default() -> Self {
        Self {
            container: ".jobs-search-two-pane__container".to_string(),
            chat_panel: ".msg-overlay-list-bubble".to_string(),
            jobs: ".job-card-container".to_string(),
            links: "a.job-card-container__link.job-card-list__title".to_string(),
            companies: ".job-card-container .artdeco-entity-lockup__subtitle".to_string(),
            places: ".job-card-container .artdeco-entity-lockup__caption".to_string(),
            dates: ".job-card-container time".to_string(),
            description: ".jobs-description".to_string(),
            criteria: ".jobs-box__group h3".to_string(),
            pagination: ".jobs-search-two-pane__pagination".to_string(),
            pagination_next_button: "li[data-test-pagination-page-btn].selected + li".to_string(),
            accept_cookies_text: "Accept cookies".to_string(),
        }
    }
}

impl SelectorSet {
    pub fn validate(&self) -> Result<()> {
        let roles = [
            ("container", &self.container),
            ("chat_panel", &self.chat_panel),
            ("jobs", &self.jobs),
            ("links", &self.links),
            ("companies", &self.companies),
            ("places", &self.places),
            ("dates", &self.dates),
            ("description", &self.description),
            ("criteria", &self.criteria),
            ("pagination", &self.pagination),
            ("pagination_next_button", &self.pagination_next_button),
        ];

        for (role, selector) in roles {
            if selector.trim().is_empty() {
                return Err(ScrapingError::ConfigError(format!("Selector for '{}' cannot be empty", role)).into());
            }
        }
        Ok(())
    }
}
