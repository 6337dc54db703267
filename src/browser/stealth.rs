use rand::Rng;
use serde::{Deserialize, Serialize};

/// Resource URL patterns dropped when a query asks for optimized loading.
const HEAVY_RESOURCE_PATTERNS: &[&str] = &[
    "*.png", "*.jpg", "*.jpeg", "*.gif", "*.webp", "*.svg", "*.ico", "*.css", "*.woff",
    "*.woff2", "*.ttf", "*.otf", "*.mp4", "*.webm", "*.mp3", "*.vtt",
];

/// Tracking endpoints are blocked regardless of the optimize flag.
const TRACKING_PATTERNS: &[&str] = &["*li/track*", "*doubleclick.net*", "*google-analytics.com*"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StealthConfig {
    pub randomize_user_agents: bool,
    pub block_tracking: bool,
}

impl Default for StealthConfig {
    fn default() -> Self {
        Self {
            randomize_user_agents: true,
            block_tracking: true,
        }
    }
}

impl StealthConfig {
    /// URL patterns to hand to the browser's request blocker.
    pub fn blocked_url_patterns(&self, optimize: bool) -> Vec<String> {
        let mut patterns = Vec::new();
        if self.block_tracking {
            patterns.extend(TRACKING_PATTERNS.iter().map(|p| p.to_string()));
        }
        if optimize {
            patterns.extend(HEAVY_RESOURCE_PATTERNS.iter().map(|p| p.to_string()));
        }
        patterns
    }
}

pub struct UserAgentGenerator {
    user_agents: Vec<String>,
}

impl Default for UserAgentGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl UserAgentGenerator {
    pub fn new() -> Self {
        let user_agents = vec![
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36".to_string(),
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36".to_string(),
            "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36".to_string(),
        ];

        Self { user_agents }
    }

    pub fn random_user_agent(&self) -> &str {
        let mut rng = rand::thread_rng();
        let index = rng.gen_range(0..self.user_agents.len());
        &self.user_agents[index]
    }
}
