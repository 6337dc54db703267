use thiserror::Error;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Error, Debug)]
pub enum ScrapingError {
    #[error("Browser error: {0}")]
    BrowserError(String),

    #[error("Navigation error: {0}")]
    NavigationError(String),

    #[error("Script error: {0}")]
    ScriptError(String),

    #[error("Session setup failed: {0}")]
    SessionSetupError(String),

    #[error("Invalid session: {0}")]
    InvalidSession(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Agent error: {0}")]
    AgentError(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStrategy {
    /// Terminate the current run; sibling runs are unaffected.
    AbortRun,
    /// Drop the current listing and move to the next index.
    SkipListing,
    /// End the current run gracefully.
    StopRun,
    LogAndContinue,
}

impl ScrapingError {
    pub fn recovery_strategy(&self) -> RecoveryStrategy {
        match self {
            ScrapingError::BrowserError(_) => RecoveryStrategy::AbortRun,
            ScrapingError::NavigationError(_) => RecoveryStrategy::StopRun,
            ScrapingError::ScriptError(_) => RecoveryStrategy::SkipListing,
            ScrapingError::SessionSetupError(_) => RecoveryStrategy::AbortRun,
            ScrapingError::InvalidSession(_) => RecoveryStrategy::AbortRun,
            ScrapingError::StorageError(_) => RecoveryStrategy::LogAndContinue,
            ScrapingError::ConfigError(_) => RecoveryStrategy::AbortRun,
            ScrapingError::AgentError(_) => RecoveryStrategy::AbortRun,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.recovery_strategy() == RecoveryStrategy::AbortRun
    }

    /// Credential failures must never be retried.
    pub fn is_credential_failure(&self) -> bool {
        matches!(
            self,
            ScrapingError::InvalidSession(_) | ScrapingError::SessionSetupError(_)
        )
    }
}

/// Look through a boxed error for a `ScrapingError`.
pub fn as_scraping_error<'a>(
    err: &'a (dyn std::error::Error + Send + Sync + 'static),
) -> Option<&'a ScrapingError> {
    err.downcast_ref::<ScrapingError>()
}

// Conversion implementations for common error types
impl From<std::io::Error> for ScrapingError {
    fn from(err: std::io::Error) -> Self {
        ScrapingError::StorageError(err.to_string())
    }
}

impl From<serde_json::Error> for ScrapingError {
    fn from(err: serde_json::Error) -> Self {
        ScrapingError::ScriptError(err.to_string())
    }
}

impl From<toml::de::Error> for ScrapingError {
    fn from(err: toml::de::Error) -> Self {
        ScrapingError::ConfigError(err.to_string())
    }
}

impl From<url::ParseError> for ScrapingError {
    fn from(err: url::ParseError) -> Self {
        ScrapingError::ConfigError(format!("Invalid URL: {}", err))
    }
}

impl From<chromiumoxide::error::CdpError> for ScrapingError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        ScrapingError::BrowserError(err.to_string())
    }
}
