//! Upstream HTTP transport with bounded retries
//!
//! Every upstream call is a single JSON POST. Rate limits (429), server
//! errors (5xx) and connection failures are retried with exponential
//! backoff. Any other status, or the last transient failure, is terminal.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use anyhow::Context;
use http::{HeaderMap, StatusCode};
use parley_config::UpstreamConfig;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::error::UpstreamFailure;

/// Retry ceiling and backoff base
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const fn from_config(config: &UpstreamConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.retry_base_delay,
        }
    }

    /// Delay before retry number `retry` (zero-based): `base * 2^retry`
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Attempt bookkeeping for one upstream call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    policy: RetryPolicy,
    attempts: u32,
    delays: Vec<Duration>,
}

impl RetryState {
    pub const fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            delays: Vec::new(),
        }
    }

    /// Record an attempt about to be made
    pub const fn begin_attempt(&mut self) {
        self.attempts += 1;
    }

    /// Delay before the next attempt, or `None` once the ceiling is reached
    pub fn next_delay(&mut self) -> Option<Duration> {
        let retries_used = self.attempts.saturating_sub(1);
        if retries_used >= self.policy.max_retries {
            return None;
        }

        let delay = self.policy.delay(retries_used);
        self.delays.push(delay);
        Some(delay)
    }

    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }
}

/// Whether an upstream status is worth retrying
pub fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_transient_error(error: &reqwest::Error) -> bool {
    error.is_connect() || error.is_timeout()
}

/// Authentication attached to an outbound request
#[derive(Debug, Clone)]
pub enum Auth {
    None,
    Bearer(SecretString),
    /// Key sent in a named header (e.g. `x-goog-api-key`)
    Header(&'static str, SecretString),
}

/// Fully built upstream request
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub url: String,
    pub headers: HeaderMap,
    pub auth: Auth,
    pub body: Value,
}

/// Successful upstream response body
#[derive(Debug, Clone)]
pub struct Delivery {
    pub status: StatusCode,
    pub body: String,
    pub attempts: u32,
}

/// Shared HTTP client for upstream calls
pub struct Transport {
    client: Client,
    policy: RetryPolicy,
    calls: AtomicU64,
}

impl Transport {
    /// Build the client with the configured timeout
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &UpstreamConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build upstream HTTP client")?;

        Ok(Self {
            client,
            policy: RetryPolicy::from_config(config),
            calls: AtomicU64::new(0),
        })
    }

    /// Upstream calls made so far, retries included
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Send a request, retrying transient failures
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamFailure`] with the last status and a body excerpt
    /// once the request fails terminally.
    pub async fn send(&self, request: &OutboundRequest) -> Result<Delivery, UpstreamFailure> {
        let mut state = RetryState::new(self.policy);

        loop {
            state.begin_attempt();
            self.calls.fetch_add(1, Ordering::Relaxed);

            let (status, detail) = match self.send_once(request).await {
                Ok(response) => {
                    let status = response.status();

                    match response.text().await {
                        Ok(body) if status.is_success() => {
                            return Ok(Delivery {
                                status,
                                body,
                                attempts: state.attempts(),
                            });
                        }
                        Ok(body) if !is_transient(status) => {
                            tracing::warn!(%status, attempts = state.attempts(), "upstream returned error");
                            return Err(UpstreamFailure::new(Some(status), &body, state.attempts()));
                        }
                        Ok(body) => (Some(status), body),
                        // A body cut off mid-read is retried like a dropped connection
                        Err(error) => {
                            tracing::warn!(%status, error = %error, attempts = state.attempts(), "upstream body read failed");
                            (
                                (!status.is_success()).then_some(status),
                                format!("failed to read upstream body: {error}"),
                            )
                        }
                    }
                }
                Err(error) => {
                    if !is_transient_error(&error) {
                        tracing::error!(error = %error, attempts = state.attempts(), "upstream request failed");
                        return Err(UpstreamFailure::new(None, &error.to_string(), state.attempts()));
                    }

                    (None, error.to_string())
                }
            };

            let Some(delay) = state.next_delay() else {
                tracing::warn!(
                    status = status.map(|s| s.as_u16()),
                    attempts = state.attempts(),
                    "upstream retries exhausted"
                );
                return Err(UpstreamFailure::new(status, &detail, state.attempts()));
            };

            tracing::debug!(
                status = status.map(|s| s.as_u16()),
                attempt = state.attempts(),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "retrying upstream call"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn send_once(&self, request: &OutboundRequest) -> Result<reqwest::Response, reqwest::Error> {
        let mut builder = self
            .client
            .post(&request.url)
            .headers(request.headers.clone())
            .json(&request.body);

        builder = match &request.auth {
            Auth::None => builder,
            Auth::Bearer(key) => builder.bearer_auth(key.expose_secret()),
            Auth::Header(name, key) => builder.header(*name, key.expose_secret()),
        };

        builder.send().await
    }
}
