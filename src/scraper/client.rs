//! Blocking HTTP client with configurable politeness (delay between requests), optional proxy,
//! and bounded retries with backoff.

use crate::scraper::{PageSource, ScraperError};
use std::time::{Duration, Instant};

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_DELAY_SECS: u64 = 1;
const MAX_REDIRECTS: usize = 10;

/// Default number of attempts for get_with_retry (initial plus retries).
const DEFAULT_RETRY_COUNT: u32 = 5;
/// Default backoff delays in seconds after each failed attempt (1s, 2s, 4s, 8s).
const DEFAULT_BACKOFF_SECS: [u64; 4] = [1, 2, 4, 8];
/// Backoff for HTTP 429 (rate limit): wait longer so the server can recover.
const BACKOFF_429_SECS: [u64; 4] = [30, 60, 90, 120];

/// Why an attempt is worth repeating.
#[derive(Debug)]
enum Transient {
    Status(u16),
    Transport(reqwest::Error),
}

impl std::fmt::Display for Transient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transient::Status(code) => write!(f, "HTTP {}", code),
            Transient::Transport(e) => write!(f, "{}", e),
        }
    }
}

/// Blocking HTTP client that enforces a delay between requests.
#[derive(Debug)]
pub struct PoliteClient {
    inner: reqwest::blocking::Client,
    delay: Duration,
    last_request: Option<Instant>,
    retry_count: u32,
    backoff_secs: Vec<u64>,
}

impl PoliteClient {
    /// Build a polite client with default User-Agent, timeout, and delay.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::builder().build()
    }

    pub fn builder() -> PoliteClientBuilder {
        PoliteClientBuilder::default()
    }

    /// GET `url` and read the whole body, retrying transient failures.
    ///
    /// Retries on timeout, connection (including proxy and TLS handshake) errors, HTTP 5xx,
    /// HTTP 429, and a body that breaks off before it is complete. Other failures are
    /// returned immediately. After `retry_count` attempts the last transient failure is
    /// reported as [ScraperError::RetriesExhausted].
    pub fn get_with_retry(&mut self, url: &str) -> Result<Vec<u8>, ScraperError> {
        let max_attempts = self.retry_count;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.wait_delay();
            let result = self.inner.get(url).send();
            let failure = match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let body = response.bytes();
                        self.last_request = Some(Instant::now());
                        match body {
                            Ok(bytes) => return Ok(bytes.to_vec()),
                            Err(e) if e.is_timeout() || e.is_body() || e.is_decode() => {
                                Transient::Transport(e)
                            }
                            Err(e) => {
                                return Err(ScraperError::BodyRead {
                                    url: url.to_string(),
                                    source: e,
                                })
                            }
                        }
                    } else {
                        self.last_request = Some(Instant::now());
                        if !(status.is_server_error() || status.as_u16() == 429) {
                            return Err(ScraperError::HttpStatus {
                                status: status.as_u16(),
                                url: url.to_string(),
                            });
                        }
                        Transient::Status(status.as_u16())
                    }
                }
                Err(e) => {
                    self.last_request = Some(Instant::now());
                    if !(e.is_timeout() || e.is_connect()) {
                        return Err(ScraperError::Network {
                            url: url.to_string(),
                            source: e,
                        });
                    }
                    Transient::Transport(e)
                }
            };
            if attempt >= max_attempts {
                return Err(ScraperError::RetriesExhausted {
                    url: url.to_string(),
                    attempts: attempt,
                    last_error: failure.to_string(),
                });
            }
            let rate_limited = matches!(failure, Transient::Status(429));
            let backoff = self.backoff_delay(attempt, rate_limited);
            tracing::warn!(
                url,
                attempt,
                max_attempts,
                backoff_secs = backoff.as_secs(),
                error = %failure,
                "transient fetch failure, retrying"
            );
            std::thread::sleep(backoff);
        }
    }

    /// Delay before the retry that follows failed attempt number `attempt` (1-based).
    fn backoff_delay(&self, attempt: u32, rate_limited: bool) -> Duration {
        let idx = attempt.saturating_sub(1) as usize;
        let secs = if rate_limited {
            BACKOFF_429_SECS
                .get(idx)
                .or(BACKOFF_429_SECS.last())
                .copied()
                .unwrap_or(60)
        } else {
            self.backoff_secs
                .get(idx)
                .or(self.backoff_secs.last())
                .copied()
                .unwrap_or(1)
        };
        Duration::from_secs(secs)
    }

    fn wait_delay(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.delay {
                std::thread::sleep(self.delay - elapsed);
            }
        }
    }
}

impl PageSource for PoliteClient {
    fn fetch_bytes(&mut self, url: &str) -> Result<Vec<u8>, ScraperError> {
        let bytes = self.get_with_retry(url)?;
        tracing::debug!(url, len = bytes.len(), "fetched");
        Ok(bytes)
    }
}

/// Builder for PoliteClient with optional User-Agent, delay, timeout, proxy, and retry settings.
#[derive(Debug)]
pub struct PoliteClientBuilder {
    user_agent: Option<String>,
    delay_secs: u64,
    timeout_secs: u64,
    retry_count: u32,
    retry_backoff_secs: Vec<u64>,
    proxy: Option<(String, u16)>,
}

impl Default for PoliteClientBuilder {
    fn default() -> Self {
        Self {
            user_agent: None,
            delay_secs: DEFAULT_DELAY_SECS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            retry_count: DEFAULT_RETRY_COUNT,
            retry_backoff_secs: DEFAULT_BACKOFF_SECS.to_vec(),
            proxy: None,
        }
    }
}

impl PoliteClientBuilder {
    /// Set a custom User-Agent. If not set, a browser-like default is used.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Set delay between requests in seconds. Default 1.
    pub fn delay_secs(mut self, secs: u64) -> Self {
        self.delay_secs = secs;
        self
    }

    /// Set request timeout in seconds. Default 30.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Set number of HTTP attempts for transient failures (default 5, minimum 1).
    pub fn retry_count(mut self, n: u32) -> Self {
        self.retry_count = n.max(1);
        self
    }

    /// Set backoff delays in seconds before each retry (e.g. [1, 2, 4]). If shorter than
    /// retry_count - 1, the last value is reused. Empty means exponential 1, 2, 4, ...
    pub fn retry_backoff_secs(mut self, secs: Vec<u64>) -> Self {
        self.retry_backoff_secs = secs;
        self
    }

    /// Route http and https through `http://host:port`.
    pub fn proxy(mut self, host: impl Into<String>, port: u16) -> Self {
        self.proxy = Some((host.into(), port));
        self
    }

    /// Build the blocking client and polite wrapper.
    pub fn build(self) -> Result<PoliteClient, reqwest::Error> {
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let mut builder = reqwest::blocking::Client::builder()
            .cookie_store(true)
            .user_agent(user_agent)
            .timeout(Duration::from_secs(self.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS));
        if let Some((host, port)) = &self.proxy {
            builder = builder.proxy(reqwest::Proxy::all(format!("http://{}:{}", host, port))?);
        }
        let inner = builder.build()?;
        let backoff_secs = if self.retry_backoff_secs.is_empty() {
            // Exponential: 1, 2, 4, ... for (retry_count - 1) steps
            let n = self.retry_count.saturating_sub(1) as usize;
            (0..n).map(|i| 1u64 << i.min(6)).collect::<Vec<_>>()
        } else {
            self.retry_backoff_secs
        };
        Ok(PoliteClient {
            inner,
            delay: Duration::from_secs(self.delay_secs),
            last_request: None,
            retry_count: self.retry_count,
            backoff_secs,
        })
    }
}
