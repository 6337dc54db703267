use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};

use crate::error::Result;

/// Bounds for a spin-poll: how long to keep trying and how long to sleep between checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitPolicy {
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl WaitPolicy {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_millis(50))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready,
    TimedOut,
}

impl WaitOutcome {
    pub fn is_ready(self) -> bool {
        self == WaitOutcome::Ready
    }
}

/// Run `check` until it reports `true` or the policy's timeout elapses.
///
/// The check always runs at least once, so a zero timeout still checks the
/// current state. Check errors are propagated immediately.
pub async fn poll_until<F, Fut>(policy: WaitPolicy, mut check: F) -> Result<WaitOutcome>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let deadline = Instant::now() + policy.timeout;

    loop {
        if check().await? {
            return Ok(WaitOutcome::Ready);
        }

        if Instant::now() >= deadline {
            return Ok(WaitOutcome::TimedOut);
        }

        sleep(policy.poll_interval).await;
    }
}
