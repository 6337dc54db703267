use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

use crate::browser::BrowserCapability;
use crate::error::{Result, ScrapingError};

/// Opaque credential identifying an authenticated session.
///
/// Deliberately not `Serialize`; `Debug` and `Display` never show the value.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialToken(String);

impl CredentialToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for CredentialToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CredentialToken(<redacted>)")
    }
}

impl fmt::Display for CredentialToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub landing_url: String,
    pub cookie_name: String,
    pub cookie_domain: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            landing_url: "https://www.linkedin.com".to_string(),
            cookie_name: "li_at".to_string(),
            cookie_domain: ".www.linkedin.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub authenticated: bool,
}

/// Establishes and checks the authenticated session through its cookie.
#[derive(Debug, Clone)]
pub struct SessionManager {
    settings: SessionSettings,
    token: CredentialToken,
}

impl SessionManager {
    pub fn new(settings: SessionSettings, token: CredentialToken) -> Self {
        Self { settings, token }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Open the landing page and inject the session cookie when it is missing.
    ///
    /// A failed injection is fatal for the run: the credential is assumed
    /// unusable and is never retried.
    pub async fn ensure_session(&self, browser: &dyn BrowserCapability, tag: &str) -> Result<SessionStatus> {
        debug!("{} Opening {}", tag, self.settings.landing_url);
        browser.navigate(&self.settings.landing_url).await.map_err(|e| {
            ScrapingError::NavigationError(format!("Failed to open {}: {}", self.settings.landing_url, e))
        })?;

        if self.is_authenticated(browser).await? {
            debug!("{} Session cookie already present", tag);
            return Ok(SessionStatus { authenticated: true });
        }

        if self.token.is_empty() {
            return Err(ScrapingError::SessionSetupError("No credential token supplied".to_string()).into());
        }

        info!("{} Setting authentication cookie", tag);
        browser
            .set_cookie(&self.settings.cookie_name, self.token.expose(), &self.settings.cookie_domain)
            .await
            .map_err(|e| ScrapingError::SessionSetupError(format!("Failed to inject session cookie: {}", e)))?;

        let authenticated = self.is_authenticated(browser).await?;
        if !authenticated {
            warn!("{} Session cookie not visible after injection", tag);
        }
        Ok(SessionStatus { authenticated })
    }

    pub async fn is_authenticated(&self, browser: &dyn BrowserCapability) -> Result<bool> {
        let cookie = browser.get_cookie(&self.settings.cookie_name).await?;
        Ok(cookie.is_some())
    }

    /// Check after navigating to the listing page. An absent cookie means the
    /// credential was rejected, which is distinct from a transient failure.
    pub async fn verify(&self, browser: &dyn BrowserCapability) -> Result<()> {
        if self.is_authenticated(browser).await? {
            Ok(())
        } else {
            Err(ScrapingError::InvalidSession(
                "The provided session cookie is invalid. Obtain a fresh session cookie and try again.".to_string(),
            )
            .into())
        }
    }
}
