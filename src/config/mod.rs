use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::browser::{LaunchOptions, StealthConfig, WaitPolicy};
use crate::error::{Result, ScrapingError};
use crate::scraper::orchestrator::ScrapeSettings;
use crate::scraper::pagination::DEFAULT_PAGE_SIZE;
use crate::scraper::query::{Query, QueryConfig, QueryOptions};
use crate::scraper::selectors::SelectorSet;
use crate::scraper::session::{CredentialToken, SessionSettings};

/// Environment variable holding the session cookie value.
pub const CREDENTIAL_ENV_VAR: &str = "LI_AT_COOKIE";

const MAX_WORKERS_LIMIT: usize = 50;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub queries: Vec<QueryConfig>,
    /// Options applied to every query that leaves them unset.
    #[serde(default)]
    pub defaults: QueryOptions,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub selectors: SelectorSet,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub executable_path: Option<PathBuf>,
    pub max_workers: usize,
    #[serde(with = "humantime_serde")]
    pub slow_mo: Duration,
    pub stealth: StealthConfig,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            executable_path: None,
            max_workers: 2,
            slow_mo: Duration::from_millis(400),
            stealth: StealthConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SiteConfig {
    pub landing_url: String,
    pub search_url: String,
    pub cookie_name: String,
    pub cookie_domain: String,
    pub page_size: usize,
}

impl Default for SiteConfig {
    fn default() -> Self {
        let session = SessionSettings::default();
        Self {
            landing_url: session.landing_url,
            search_url: "https://www.linkedin.com/jobs/search".to_string(),
            cookie_name: session.cookie_name,
            cookie_domain: session.cookie_domain,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimingConfig {
    #[serde(with = "humantime_serde")]
    pub container_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub detail_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub pagination_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            container_timeout: Duration::from_secs(5),
            detail_timeout: Duration::from_secs(2),
            pagination_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: String, // "json" (one record per line) or "csv"
    pub directory: PathBuf,
    /// Joined with each listing's relative link to build record URLs.
    pub base_url: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: "json".to_string(),
            directory: PathBuf::from("./scraped_data"),
            base_url: "https://www.linkedin.com".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            queries: vec![QueryConfig {
                query: "Engineer".to_string(),
                options: Default::default(),
            }],
            defaults: QueryOptions::default(),
            browser: BrowserConfig::default(),
            site: SiteConfig::default(),
            timing: TimingConfig::default(),
            selectors: SelectorSet::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Config {
    /// Every configured query with the global defaults filled in.
    pub fn resolve_queries(&self) -> Result<Vec<Query>> {
        self.queries.iter().map(|q| q.resolve(&self.defaults)).collect()
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            landing_url: self.site.landing_url.clone(),
            cookie_name: self.site.cookie_name.clone(),
            cookie_domain: self.site.cookie_domain.clone(),
        }
    }

    pub fn scrape_settings(&self) -> Result<ScrapeSettings> {
        let search_url = Url::parse(&self.site.search_url).map_err(ScrapingError::from)?;
        let poll = self.timing.poll_interval;

        Ok(ScrapeSettings {
            search_url,
            page_size: self.site.page_size,
            slow_mo: self.browser.slow_mo,
            container_wait: WaitPolicy::new(self.timing.container_timeout, poll),
            detail_wait: WaitPolicy::new(self.timing.detail_timeout, poll),
            pagination_wait: WaitPolicy::new(self.timing.pagination_timeout, poll),
        })
    }

    pub fn launch_options(&self) -> LaunchOptions {
        LaunchOptions {
            headless: self.browser.headless,
            executable_path: self.browser.executable_path.clone(),
            stealth: self.browser.stealth.clone(),
        }
    }
}

/// Read the credential from the environment. It is never stored in the file.
pub fn credential_from_env() -> Result<CredentialToken> {
    credential_from(std::env::var(CREDENTIAL_ENV_VAR).ok())
}

fn credential_from(value: Option<String>) -> Result<CredentialToken> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(CredentialToken::new(value.trim())),
        _ => Err(ScrapingError::ConfigError(format!(
            "Environment variable {} must be set to a session cookie value",
            CREDENTIAL_ENV_VAR
        ))
        .into()),
    }
}

#[async_trait::async_trait]
pub trait ConfigManager {
    async fn load_config(&self) -> Result<Config>;
    async fn save_config(&self, config: &Config) -> Result<()>;
    fn validate_config(&self, config: &Config) -> Result<()>;
}

pub struct FileConfigManager {
    config_path: PathBuf,
}

impl FileConfigManager {
    pub fn new(config_path: PathBuf) -> Self {
        Self { config_path }
    }
}

#[async_trait::async_trait]
impl ConfigManager for FileConfigManager {
    async fn load_config(&self) -> Result<Config> {
        info!("Loading configuration from {:?}", self.config_path);

        if !self.config_path.exists() {
            warn!("Configuration file not found, creating default config at {:?}", self.config_path);
            self.create_default_config().await?;
        }

        let config_content = fs::read_to_string(&self.config_path)
            .map_err(|e| ScrapingError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&config_content)
            .map_err(|e| ScrapingError::ConfigError(format!("Failed to parse TOML config: {}", e)))?;

        self.validate_config(&config)?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    fn validate_config(&self, config: &Config) -> Result<()> {
        debug!("Validating configuration");

        if config.queries.is_empty() {
            return Err(ScrapingError::ConfigError("Queries list cannot be empty".to_string()).into());
        }
        config.defaults.validate()?;
        for query in &config.queries {
            query.resolve(&config.defaults).map_err(|e| {
                ScrapingError::ConfigError(format!("Query '{}' is invalid: {}", query.query, e))
            })?;
        }

        if config.browser.max_workers == 0 {
            return Err(ScrapingError::ConfigError("max_workers must be greater than 0".to_string()).into());
        }
        if config.browser.max_workers > MAX_WORKERS_LIMIT {
            return Err(ScrapingError::ConfigError(format!(
                "max_workers cannot exceed {} for resource safety",
                MAX_WORKERS_LIMIT
            ))
            .into());
        }
        if let Some(ref path) = config.browser.executable_path {
            if !path.exists() {
                return Err(ScrapingError::ConfigError(format!("Browser executable not found: {:?}", path)).into());
            }
        }

        for (name, url) in [
            ("landing_url", &config.site.landing_url),
            ("search_url", &config.site.search_url),
            ("base_url", &config.output.base_url),
        ] {
            Url::parse(url).map_err(|e| ScrapingError::ConfigError(format!("Invalid {} '{}': {}", name, url, e)))?;
        }
        if config.site.cookie_name.trim().is_empty() {
            return Err(ScrapingError::ConfigError("cookie_name cannot be empty".to_string()).into());
        }
        if config.site.page_size == 0 {
            return Err(ScrapingError::ConfigError("page_size must be greater than 0".to_string()).into());
        }

        if config.timing.poll_interval.is_zero() {
            return Err(ScrapingError::ConfigError("poll_interval must be greater than 0".to_string()).into());
        }

        config.selectors.validate()?;

        let valid_formats = ["json", "csv"];
        if !valid_formats.contains(&config.output.format.as_str()) {
            return Err(ScrapingError::ConfigError(format!(
                "Invalid output format '{}', must be one of: {:?}",
                config.output.format, valid_formats
            ))
            .into());
        }

        debug!("Configuration validation passed");
        Ok(())
    }

    async fn save_config(&self, config: &Config) -> Result<()> {
        info!("Saving configuration to {:?}", self.config_path);

        let toml_content = toml::to_string_pretty(config)
            .map_err(|e| ScrapingError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        fs::write(&self.config_path, toml_content)
            .map_err(|e| ScrapingError::ConfigError(format!("Failed to write config file: {}", e)))?;

        info!("Configuration saved successfully");
        Ok(())
    }
}

impl FileConfigManager {
    async fn create_default_config(&self) -> Result<()> {
        let default_config = Config::default();
        let toml_content = toml::to_string_pretty(&default_config)
            .map_err(|e| ScrapingError::ConfigError(format!("Failed to serialize default config: {}", e)))?;

        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ScrapingError::ConfigError(format!("Failed to create config directory: {}", e)))?;
        }

        fs::write(&self.config_path, toml_content)
            .map_err(|e| ScrapingError::ConfigError(format!("Failed to write default config: {}", e)))?;

        info!("Default configuration file created at {:?}", self.config_path);
        Ok(())
    }
}
