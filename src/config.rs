//! Settings for the status layer.
//!
//! Everything has a sensible default; individual values can be overridden
//! through environment variables (load a `.env` with dotenvy before calling
//! [`Settings::from_env`]) or through the builder methods.

use std::time::Duration;

/// Backend API settings.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    /// Base URL of the dashboard agent, e.g. `http://127.0.0.1:8000`.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Polling cadences for the stores.
#[derive(Debug, Clone)]
pub struct PollSettings {
    /// Job list poll interval (unconditional).
    pub list_interval: Duration,
    /// Single-job watch poll interval (stops on terminal status).
    pub watch_interval: Duration,
    /// Health poll interval.
    pub health_interval: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            list_interval: Duration::from_secs(5),
            watch_interval: Duration::from_secs(2),
            health_interval: Duration::from_secs(30),
        }
    }
}

/// Demo driver settings.
#[derive(Debug, Clone)]
pub struct DemoSettings {
    /// Delay between simulated progress steps within a stage.
    pub step_delay: Duration,
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            step_delay: Duration::from_millis(400),
        }
    }
}

/// Top-level settings.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub api: ApiSettings,
    pub poll: PollSettings,
    pub demo: DemoSettings,
}

impl Settings {
    /// Build settings from the environment, falling back to defaults.
    ///
    /// Recognized variables: `PULSEBOARD_API_URL`,
    /// `PULSEBOARD_API_TIMEOUT_SECS`, `PULSEBOARD_LIST_INTERVAL_SECS`,
    /// `PULSEBOARD_WATCH_INTERVAL_SECS`, `PULSEBOARD_HEALTH_INTERVAL_SECS`,
    /// `PULSEBOARD_DEMO_STEP_MS`.
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        if let Ok(url) = std::env::var("PULSEBOARD_API_URL") {
            settings.api.base_url = url;
        }
        if let Some(secs) = env_u64("PULSEBOARD_API_TIMEOUT_SECS") {
            settings.api.timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("PULSEBOARD_LIST_INTERVAL_SECS") {
            settings.poll.list_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("PULSEBOARD_WATCH_INTERVAL_SECS") {
            settings.poll.watch_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("PULSEBOARD_HEALTH_INTERVAL_SECS") {
            settings.poll.health_interval = Duration::from_secs(secs);
        }
        if let Some(ms) = env_u64("PULSEBOARD_DEMO_STEP_MS") {
            settings.demo.step_delay = Duration::from_millis(ms);
        }

        settings
    }

    /// Override the API base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api.base_url = url.into();
        self
    }

    /// Override the demo step delay.
    pub fn with_demo_step_delay(mut self, delay: Duration) -> Self {
        self.demo.step_delay = delay;
        self
    }
}

fn env_u64(name: &str) -> Option<u64> {
    match std::env::var(name) {
        Ok(raw) => match raw.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("Ignoring unparseable {}: {:?}", name, raw);
                None
            }
        },
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_cadence() {
        let settings = Settings::default();
        assert_eq!(settings.poll.list_interval, Duration::from_secs(5));
        assert_eq!(settings.poll.watch_interval, Duration::from_secs(2));
        assert_eq!(settings.poll.health_interval, Duration::from_secs(30));
    }

    #[test]
    fn builder_overrides() {
        let settings = Settings::default()
            .with_base_url("http://example.test:9000")
            .with_demo_step_delay(Duration::from_millis(5));
        assert_eq!(settings.api.base_url, "http://example.test:9000");
        assert_eq!(settings.demo.step_delay, Duration::from_millis(5));
    }
}
