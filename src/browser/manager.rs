use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, EnableParams as NetworkEnableParams, SetBlockedUrLsParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::browser::capability::{BrowserCapability, BrowserLauncher, BrowserSession};
use crate::browser::stealth::{StealthConfig, UserAgentGenerator};
use crate::error::{Result, ScrapingError};

pub type BrowserInstanceId = Uuid;

const LAUNCH_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    pub executable_path: Option<PathBuf>,
    pub stealth: StealthConfig,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            executable_path: None,
            stealth: StealthConfig::default(),
        }
    }
}

/// Wrap a script body so it receives its arguments as an `args` array.
pub fn wrap_script(script: &str, args: &[Value]) -> Result<String> {
    let args = serde_json::to_string(args).map_err(ScrapingError::from)?;
    Ok(format!("(function(args) {{\n{}\n}})({})", script, args))
}

/// One Chrome process with a single page. Cookies and storage live in a
/// private user data directory, so instances never share a session.
pub struct BrowserInstance {
    pub id: BrowserInstanceId,
    pub user_agent: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    page: Page,
    browser: Mutex<Browser>,
    handler_task: JoinHandle<()>,
    user_data_dir: PathBuf,
    active_sessions: Arc<AtomicUsize>,
}

#[async_trait]
impl BrowserCapability for BrowserInstance {
    async fn navigate(&self, url: &str) -> Result<()> {
        debug!("Browser instance {} navigating to {}", self.id, url);
        self.page
            .goto(url)
            .await
            .map_err(|e| ScrapingError::NavigationError(format!("Failed to navigate to {}: {}", url, e)))?;
        Ok(())
    }

    async fn evaluate(&self, script: &str, args: &[Value]) -> Result<Value> {
        let expression = wrap_script(script, args)?;
        let params = EvaluateParams::builder()
            .expression(expression)
            .return_by_value(true)
            .await_promise(true)
            .build()
            .map_err(|e| ScrapingError::ScriptError(format!("Failed to build evaluation: {}", e)))?;

        let result = self
            .page
            .evaluate_expression(params)
            .await
            .map_err(|e| ScrapingError::ScriptError(format!("Script evaluation failed: {}", e)))?;

        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn get_cookie(&self, name: &str) -> Result<Option<String>> {
        let cookies = self
            .page
            .get_cookies()
            .await
            .map_err(|e| ScrapingError::BrowserError(format!("Failed to read cookies: {}", e)))?;

        Ok(cookies
            .into_iter()
            .find(|cookie| cookie.name == name)
            .map(|cookie| cookie.value))
    }

    async fn set_cookie(&self, name: &str, value: &str, domain: &str) -> Result<()> {
        let cookie = CookieParam::builder()
            .name(name)
            .value(value)
            .domain(domain)
            .build()
            .map_err(|e| ScrapingError::SessionSetupError(format!("Failed to build cookie {}: {}", name, e)))?;

        self.page
            .set_cookie(cookie)
            .await
            .map_err(|e| ScrapingError::SessionSetupError(format!("Failed to set cookie {}: {}", name, e)))?;
        Ok(())
    }
}

#[async_trait]
impl BrowserSession for BrowserInstance {
    fn session_id(&self) -> String {
        self.id.to_string()
    }

    fn as_capability(&self) -> &dyn BrowserCapability {
        self
    }

    async fn close(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            warn!("Failed to close browser instance {}: {}", self.id, e);
        }
        if let Err(e) = browser.wait().await {
            debug!("Browser process {} did not exit cleanly: {}", self.id, e);
        }
        drop(browser);

        self.handler_task.abort();
        if let Err(e) = std::fs::remove_dir_all(&self.user_data_dir) {
            debug!("Could not remove user data dir {:?}: {}", self.user_data_dir, e);
        }

        let remaining = self.active_sessions.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        info!("Closed browser instance {} ({} still active)", self.id, remaining);
        Ok(())
    }
}

pub struct BrowserManager {
    options: LaunchOptions,
    user_agent_generator: UserAgentGenerator,
    active_sessions: Arc<AtomicUsize>,
}

impl BrowserManager {
    pub fn new(options: LaunchOptions) -> Self {
        Self {
            options,
            user_agent_generator: UserAgentGenerator::new(),
            active_sessions: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn active_session_count(&self) -> usize {
        self.active_sessions.load(Ordering::SeqCst)
    }

    fn browser_config(&self, user_data_dir: &Path) -> Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .user_data_dir(user_data_dir)
            .args(vec![
                "--disable-gpu",
                "--disable-dev-shm-usage",
                "--disable-extensions",
                "--mute-audio",
                "--no-first-run",
                "--disable-default-apps",
                "--disable-sync",
                "--disable-background-networking",
                "--disable-blink-features=AutomationControlled",    // hide automation
                "--log-level=3", // Only fatal errors
            ]);

        if !self.options.headless {
            builder = builder.with_head();
        }
        if let Some(ref path) = self.options.executable_path {
            builder = builder.chrome_executable(path);
        }

        builder
            .build()
            .map_err(|e| ScrapingError::BrowserError(format!("Failed to create browser config: {}", e)).into())
    }

    async fn launch_browser(&self, user_data_dir: &Path) -> Result<(Browser, JoinHandle<()>)> {
        let config = self.browser_config(user_data_dir)?;

        let mut last_error = None;
        for attempt in 1..=LAUNCH_ATTEMPTS {
            match Browser::launch(config.clone()).await {
                Ok((browser, mut handler)) => {
                    debug!("Browser launched on attempt {}", attempt);

                    let handler_task = tokio::spawn(async move {
                        while let Some(event) = handler.next().await {
                            if let Err(e) = event {
                                // filter out common websocket deserialization errors
                                let error_msg = e.to_string();
                                if error_msg.contains("data did not match any variant") {
                                    debug!("Ignoring WebSocket deserialization error: {}", e);
                                } else {
                                    warn!("Browser handler error: {}", e);
                                }
                            }
                        }
                        debug!("Browser handler task ended");
                    });

                    return Ok((browser, handler_task));
                }
                Err(e) => {
                    error!("Browser launch attempt {} failed: {}", attempt, e);
                    last_error = Some(e.to_string());
                    if attempt < LAUNCH_ATTEMPTS {
                        tokio::time::sleep(Duration::from_secs(2)).await;
                    }
                }
            }
        }

        Err(ScrapingError::BrowserError(format!(
            "Failed to launch browser after {} attempts: {}",
            LAUNCH_ATTEMPTS,
            last_error.unwrap_or_default()
        ))
        .into())
    }

    /// Launch Chrome and open a prepared page. On failure nothing is left running.
    async fn start_session(
        &self,
        user_data_dir: &Path,
        optimize: bool,
    ) -> Result<(Browser, JoinHandle<()>, Page, String)> {
        let (mut browser, handler_task) = self.launch_browser(user_data_dir).await?;
        let user_agent = self.user_agent_generator.random_user_agent().to_string();

        match self.open_page(&browser, &user_agent, optimize).await {
            Ok(page) => Ok((browser, handler_task, page, user_agent)),
            Err(e) => {
                if let Err(close_error) = browser.close().await {
                    debug!("Failed to close browser after setup error: {}", close_error);
                }
                if let Err(wait_error) = browser.wait().await {
                    debug!("Browser process did not exit cleanly: {}", wait_error);
                }
                handler_task.abort();
                Err(e)
            }
        }
    }

    async fn open_page(&self, browser: &Browser, user_agent: &str, optimize: bool) -> Result<Page> {
        let page = match tokio::time::timeout(Duration::from_secs(10), browser.new_page("about:blank")).await {
            Ok(Ok(page)) => page,
            Ok(Err(e)) => {
                return Err(ScrapingError::BrowserError(format!("Failed to create new page: {}", e)).into());
            }
            Err(_) => return Err(ScrapingError::BrowserError("Timeout creating new page".to_string()).into()),
        };

        self.prepare_page(&page, user_agent, optimize).await?;
        Ok(page)
    }

    async fn prepare_page(&self, page: &Page, user_agent: &str, optimize: bool) -> Result<()> {
        if self.options.stealth.randomize_user_agents {
            let user_agent_params = SetUserAgentOverrideParams::builder()
                .user_agent(user_agent)
                .build()
                .map_err(|e| ScrapingError::BrowserError(format!("Failed to build user agent params: {}", e)))?;

            page.execute(user_agent_params)
                .await
                .map_err(|e| ScrapingError::BrowserError(format!("Failed to set user agent: {}", e)))?;
        }

        let patterns = self.options.stealth.blocked_url_patterns(optimize);
        if !patterns.is_empty() {
            page.execute(NetworkEnableParams::default())
                .await
                .map_err(|e| ScrapingError::BrowserError(format!("Failed to enable network domain: {}", e)))?;
            page.execute(SetBlockedUrLsParams::new(patterns))
                .await
                .map_err(|e| ScrapingError::BrowserError(format!("Failed to block request patterns: {}", e)))?;
        }

        Ok(())
    }
}

#[async_trait]
impl BrowserLauncher for BrowserManager {
    async fn launch(&self, optimize: bool) -> Result<Box<dyn BrowserSession>> {
        let id = Uuid::new_v4();

        // unique user data dir so sessions never share cookies
        let user_data_dir = std::env::temp_dir().join(format!(
            "job-listing-scraper-{}-{}",
            std::process::id(),
            id
        ));
        std::fs::create_dir_all(&user_data_dir)
            .map_err(|e| ScrapingError::BrowserError(format!("Failed to create user data dir: {}", e)))?;

        let (browser, handler_task, page, user_agent) = match self.start_session(&user_data_dir, optimize).await {
            Ok(parts) => parts,
            Err(e) => {
                if let Err(remove_error) = std::fs::remove_dir_all(&user_data_dir) {
                    debug!("Could not remove user data dir {:?}: {}", user_data_dir, remove_error);
                }
                return Err(e);
            }
        };

        let active = self.active_sessions.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Created browser instance {} ({} active)", id, active);

        Ok(Box::new(BrowserInstance {
            id,
            user_agent,
            created_at: chrono::Utc::now(),
            page,
            browser: Mutex::new(browser),
            handler_task,
            user_data_dir,
            active_sessions: self.active_sessions.clone(),
        }))
    }
}
