use std::thread;
use std::time::Duration;

use reqwest::blocking::Response;
use tracing::warn;

use crate::error::{Result, SyncError};

const MAX_ATTEMPTS: u32 = 5;
const BASE_DELAY: Duration = Duration::from_secs(2);
const MAX_DELAY: Duration = Duration::from_secs(60);

fn is_transient(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn backoff_delay(attempt: u32) -> Duration {
    (BASE_DELAY * attempt).min(MAX_DELAY)
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Retry policy for one upstream service: transient statuses are retried with
/// linear backoff capped at [`MAX_DELAY`], a `Retry-After` header overrides
/// the computed delay, and attempts are bounded. Anything left over surfaces
/// as [`SyncError::Upstream`].
pub struct RetryPolicy {
    service: &'static str,
    transient_403: bool,
}

impl RetryPolicy {
    pub fn new(service: &'static str) -> Self {
        Self {
            service,
            transient_403: false,
        }
    }

    /// Meta intermittently answers 403 for requests that succeed on retry.
    pub fn with_transient_403(mut self) -> Self {
        self.transient_403 = true;
        self
    }

    pub fn execute<F>(&self, mut send: F) -> Result<Response>
    where
        F: FnMut() -> std::result::Result<Response, reqwest::Error>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match send() {
                Ok(response) => {
                    if response.status().is_success() {
                        return Ok(response);
                    }
                    let status = response.status().as_u16();
                    let transient = is_transient(status) || (status == 403 && self.transient_403);
                    if !transient || attempt >= MAX_ATTEMPTS {
                        return Err(SyncError::Upstream {
                            service: self.service,
                            status,
                            detail: response.text().unwrap_or_default(),
                        });
                    }
                    let delay = retry_after(&response).unwrap_or_else(|| backoff_delay(attempt));
                    warn!(
                        service = self.service,
                        status,
                        attempt,
                        delay_secs = delay.as_secs(),
                        "transient upstream failure, retrying"
                    );
                    thread::sleep(delay);
                }
                Err(err) => {
                    if attempt >= MAX_ATTEMPTS {
                        return Err(SyncError::Http(err));
                    }
                    let delay = backoff_delay(attempt);
                    warn!(
                        service = self.service,
                        attempt,
                        delay_secs = delay.as_secs(),
                        error = %err,
                        "request failed, retrying"
                    );
                    thread::sleep(delay);
                }
            }
        }
    }
}
