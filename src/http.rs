//! Rate limited HTTP client for the catalog and the Bot API.
//!
//! This module provides a wrapper around `reqwest::Client` that adds:
//! * Request rate limiting, so a misbehaving loop cannot hammer a remote
//! * Consistent timeouts and headers
//! * Translation of `429 Too Many Requests` into a rate limit error that
//!   carries the `Retry-After` wait
//!
//! # Rate Limiting
//!
//! * 10 calls per 10-second interval, per client
//! * Allows bursts up to the maximum calls per interval
//! * Requests that would exceed the limit are delayed
//!
//! # Example
//!
//! ```rust
//! use ynison_bio::http::Client;
//!
//! let client = Client::new(&config, HeaderMap::new())?;
//! let request = client.get(url, "");
//! let response = client.execute(request).await?;
//! let body = Client::ensure_success(response)?.text().await?;
//! ```

use std::{future::Future, num::NonZeroU32, time::Duration};

use futures_util::{FutureExt, TryFutureExt};
use governor::{DefaultDirectRateLimiter, Quota};
use reqwest::{
    self,
    header::{HeaderMap, RETRY_AFTER},
    Body, Method, StatusCode, Url,
};

use crate::{
    config::Config,
    error::{Error, Result},
};

/// HTTP client with built-in rate limiting.
pub struct Client {
    /// Unlimited request client for special cases.
    pub unlimited: reqwest::Client,

    rate_limiter: DefaultDirectRateLimiter,
}

impl Client {
    /// Rolling window of the rate limiter.
    const RATE_LIMIT_INTERVAL: Duration = Duration::from_secs(10);

    /// Maximum calls within each window.
    const RATE_LIMIT_CALLS_PER_INTERVAL: u8 = 10;

    /// Duration to keep idle connections alive.
    const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Duration to wait for a complete response.
    const TIMEOUT: Duration = Duration::from_secs(10);

    /// Wait to assume when a `429` response carries no usable `Retry-After`.
    pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(5);

    /// Creates a new client that sends `headers` with every request.
    ///
    /// # Errors
    ///
    /// Returns error if the TLS backend cannot be initialized.
    ///
    /// # Panics
    ///
    /// Panics if rate limit parameters are zero.
    pub fn new(config: &Config, headers: HeaderMap) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .tcp_keepalive(Self::KEEPALIVE_TIMEOUT)
            .timeout(Self::TIMEOUT)
            .default_headers(headers)
            .user_agent(&config.user_agent);

        let replenish_interval =
            Self::RATE_LIMIT_INTERVAL / u32::from(Self::RATE_LIMIT_CALLS_PER_INTERVAL);
        let quota = Quota::with_period(replenish_interval)
            .expect("quota time interval is zero")
            .allow_burst(
                NonZeroU32::new(Self::RATE_LIMIT_CALLS_PER_INTERVAL.into())
                    .expect("calls per interval is zero"),
            );

        Ok(Self {
            unlimited: http_client.build()?,
            rate_limiter: governor::RateLimiter::direct(quota),
        })
    }

    /// Builds a request with specified method, URL and body.
    pub fn request<U, T>(&self, method: Method, url: U, body: T) -> reqwest::Request
    where
        U: Into<Url>,
        T: Into<Body>,
    {
        let mut request = reqwest::Request::new(method, url.into());
        let body_mut = request.body_mut();
        *body_mut = Some(body.into());

        request
    }

    /// Builds a POST request.
    pub fn post<U, T>(&self, url: U, body: T) -> reqwest::Request
    where
        U: Into<Url>,
        T: Into<Body>,
    {
        self.request(Method::POST, url, body)
    }

    /// Builds a GET request.
    pub fn get<U, T>(&self, url: U, body: T) -> reqwest::Request
    where
        U: Into<Url>,
        T: Into<Body>,
    {
        self.request(Method::GET, url, body)
    }

    /// Executes a request with rate limiting.
    ///
    /// The status code is not checked; see [`Client::ensure_success`].
    ///
    /// # Errors
    ///
    /// Returns error if the request could not be sent or no response was
    /// received in time.
    pub fn execute(
        &self,
        request: reqwest::Request,
    ) -> impl Future<Output = Result<reqwest::Response>> + '_ {
        let throttle = self.rate_limiter.until_ready();
        throttle.then(|()| self.unlimited.execute(request).map_err(Into::into))
    }

    /// Turns error status codes into errors.
    ///
    /// # Errors
    ///
    /// * `ResourceExhausted` with the `Retry-After` wait for `429`
    /// * otherwise as mapped from [`reqwest::Error`]
    pub fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            let wait = retry_after(response.headers()).unwrap_or(Self::DEFAULT_RETRY_AFTER);
            return Err(Error::rate_limited(wait));
        }

        response.error_for_status().map_err(Into::into)
    }
}

/// Parses a `Retry-After` header in its delay-seconds form.
///
/// The HTTP-date form is not supported and yields `None`.
#[must_use]
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
        .map(Duration::from_secs)
}
