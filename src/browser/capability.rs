use async_trait::async_trait;
use serde_json::Value;

use crate::browser::wait::{poll_until, WaitOutcome, WaitPolicy};
use crate::error::Result;

/// The narrow surface the scraping core drives a browser through.
///
/// Scripts are function bodies that read their positional arguments from an
/// `args` array and `return` a JSON-compatible value.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrowserCapability: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;

    async fn evaluate(&self, script: &str, args: &[Value]) -> Result<Value>;

    async fn get_cookie(&self, name: &str) -> Result<Option<String>>;

    async fn set_cookie(&self, name: &str, value: &str, domain: &str) -> Result<()>;

    /// Re-evaluate `predicate` until it returns `true` or the policy times out.
    async fn wait_until(
        &self,
        predicate: &str,
        args: &[Value],
        policy: WaitPolicy,
    ) -> Result<WaitOutcome> {
        poll_until(policy, || async move {
            let value: Result<Value> = self.evaluate(predicate, args).await;
            value.map(|v| v.as_bool().unwrap_or(false))
        })
        .await
    }
}

/// A browser capability owned by exactly one worker.
#[async_trait]
pub trait BrowserSession: BrowserCapability {
    fn session_id(&self) -> String;

    fn as_capability(&self) -> &dyn BrowserCapability;

    async fn close(&self) -> Result<()>;
}

/// Starts independent browser sessions; no state is shared between sessions.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, optimize: bool) -> Result<Box<dyn BrowserSession>>;
}
