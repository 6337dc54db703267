pub mod agents;
pub mod browser;
pub mod config;
pub mod error;
pub mod events;
pub mod scraper;
pub mod storage;

pub use agents::AgentOrchestrator;
pub use browser::BrowserManager;
pub use config::Config;
pub use error::{Result, ScrapingError};
pub use events::{EventBus, ScrapeEvent};
pub use scraper::ScrapeOrchestrator;
