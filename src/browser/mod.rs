pub mod capability;
pub mod manager;
pub mod stealth;
pub mod wait;


pub use capability::{BrowserCapability, BrowserLauncher, BrowserSession};
pub use manager::{BrowserInstance, BrowserInstanceId, BrowserManager, LaunchOptions};
pub use stealth::{StealthConfig, UserAgentGenerator};
pub use wait::{poll_until, WaitOutcome, WaitPolicy};
