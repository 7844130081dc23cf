//! Configuration for the sync engine.

use crate::error::{SyncError, SyncResult};
use rand::Rng;
use std::time::Duration;
use tablesync_protocol::{KeyPath, PullShape};
use url::Url;

/// Configuration for a sync session.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Server base URL (e.g. `http://localhost:8000`).
    pub base_url: String,
    /// Path of the collection endpoint, relative to the base URL.
    pub collection_path: String,
    /// Path of the connection-info endpoint, relative to the base URL.
    pub connection_info_path: String,
    /// Query parameter carrying the pull cursor.
    pub cursor_param: String,
    /// Location of each record's unique key.
    pub key_path: KeyPath,
    /// Field names of the pull response body.
    pub pull_shape: PullShape,
    /// Delay between pull cycles in pull mode.
    pub poll_interval: Duration,
    /// Delay between safety-net pull cycles in push-with-fallback mode.
    pub fallback_interval: Duration,
    /// Bound on each HTTP request.
    pub request_timeout: Duration,
    /// Bound on each resolve-and-connect attempt of the push channel.
    pub connect_timeout: Duration,
    /// Reconnect backoff.
    pub retry: RetryConfig,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            collection_path: "/messages/".into(),
            connection_info_path: "/api/websocketinfo".into(),
            cursor_param: "last_version".into(),
            key_path: KeyPath::default(),
            pull_shape: PullShape::default(),
            poll_interval: Duration::from_millis(1000),
            fallback_interval: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            retry: RetryConfig::default(),
        }
    }

    /// Sets the collection endpoint path.
    pub fn with_collection_path(mut self, path: impl Into<String>) -> Self {
        self.collection_path = path.into();
        self
    }

    /// Sets the connection-info endpoint path.
    pub fn with_connection_info_path(mut self, path: impl Into<String>) -> Self {
        self.connection_info_path = path.into();
        self
    }

    /// Sets the cursor query parameter name.
    pub fn with_cursor_param(mut self, name: impl Into<String>) -> Self {
        self.cursor_param = name.into();
        self
    }

    /// Sets the record key location.
    pub fn with_key_path(mut self, key_path: KeyPath) -> Self {
        self.key_path = key_path;
        self
    }

    /// Sets the pull response shape.
    pub fn with_pull_shape(mut self, shape: PullShape) -> Self {
        self.pull_shape = shape;
        self
    }

    /// Sets the pull interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the safety-net pull interval used alongside push.
    pub fn with_fallback_interval(mut self, interval: Duration) -> Self {
        self.fallback_interval = interval;
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Parses the base URL.
    pub fn base(&self) -> SyncResult<Url> {
        if self.base_url.is_empty() {
            return Err(SyncError::InvalidUrl("base url is empty".into()));
        }
        Ok(Url::parse(&self.base_url)?)
    }

    /// Full URL of the collection endpoint.
    pub fn collection_url(&self) -> SyncResult<Url> {
        Ok(self.base()?.join(&self.collection_path)?)
    }

    /// Full URL of the connection-info endpoint.
    pub fn connection_info_url(&self) -> SyncResult<Url> {
        Ok(self.base()?.join(&self.connection_info_path)?)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("")
    }
}

/// Reconnect backoff policy.
///
/// The default is a fixed 500 ms delay. There is no attempt limit: the
/// connection manager retries until its handle is closed.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (1.0 is a fixed delay).
    pub backoff_multiplier: f64,
    /// Whether to add up to 25% random jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a fixed-delay policy.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Creates an exponential policy.
    pub fn exponential(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    ///
    /// A negative or non-finite multiplier is ignored and the policy keeps a
    /// fixed delay.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = if multiplier.is_finite() && multiplier >= 0.0 {
            multiplier
        } else {
            1.0
        };
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, add_jitter: bool) -> Self {
        self.add_jitter = add_jitter;
        self
    }

    /// Calculates the delay before retry number `attempt` (1-indexed).
    ///
    /// Never exceeds `max(max_delay, initial_delay)` before jitter. Any
    /// delay that cannot be represented saturates to that ceiling.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let ceiling = self.max_delay.max(self.initial_delay);
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = self.backoff_multiplier.powi(exponent);
        let delay = Duration::try_from_secs_f64(self.initial_delay.as_secs_f64() * factor)
            .map_or(ceiling, |d| d.min(ceiling));

        if self.add_jitter {
            let fraction = rand::thread_rng().gen_range(0.0..=0.25);
            let jitter = Duration::try_from_secs_f64(delay.as_secs_f64() * fraction)
                .unwrap_or(Duration::ZERO);
            delay.saturating_add(jitter)
        } else {
            delay
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::fixed(Duration::from_millis(500))
    }
}
