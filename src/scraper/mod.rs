pub mod extractor;
pub mod listing;
pub mod orchestrator;
pub mod pagination;
pub mod query;
pub mod scripts;
pub mod selectors;
pub mod session;

#[cfg(test)]
pub(crate) mod fake_browser;

#[cfg(test)]
mod tests;

pub use extractor::{ExtractionFailure, ExtractionStep, ListingExtractor};
pub use listing::{EventData, JobCriteria, ListingDetail, ListingSummary};
pub use orchestrator::{ScrapeOrchestrator, ScrapeSettings};
pub use pagination::{PaginationController, PaginationOutcome};
pub use query::{Query, QueryConfig, QueryFilters, QueryOptions};
pub use selectors::SelectorSet;
pub use session::{CredentialToken, SessionManager, SessionSettings};
