//! A [`Transport`] backed by `reqwest::blocking`, with exponential-backoff
//! retries and byte-range resumption on the retryable status codes spec.md
//! §4.7 names (`408, 429, 500, 502, 503, 504`).

use crate::transport::{Transport, TransportError, TransportErrorKind};
use log::{debug, error, trace};
use reqwest::blocking::{Client, ClientBuilder, Request, Response};
use reqwest::header::{self, HeaderValue, ACCEPT_RANGES};
use reqwest::{Method, StatusCode};
use std::cmp::Ordering;
use std::io::Read;
use std::time::Duration;
use url::Url;

/// The set of HTTP status codes this transport treats as transient and
/// worth retrying (§4.7).
const RETRYABLE_STATUS_CODES: [u16; 6] = [408, 429, 500, 502, 503, 504];

fn is_retryable(status: StatusCode) -> bool {
    RETRYABLE_STATUS_CODES.contains(&status.as_u16())
}

/// Settings for the HTTP client's retry strategy and timeouts.
#[derive(Clone, Copy, Debug)]
pub struct ClientSettings {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub tries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_factor: f32,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            tries: 4,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(1),
            backoff_factor: 1.5,
        }
    }
}

/// An HTTP [`Transport`] with retry logic.
#[derive(Clone, Copy, Debug, Default)]
pub struct HttpTransport {
    settings: ClientSettings,
}

impl HttpTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_settings(settings: ClientSettings) -> Self {
        Self { settings }
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, url: Url) -> Result<Box<dyn Read + Send>, TransportError> {
        let mut r = RetryState::new(self.settings.initial_backoff);
        let read = fetch_with_retries(&mut r, &self.settings, &url)?;
        Ok(Box::new(read))
    }
}

/// A `Read` that transparently retries, resuming via `Range` when the
/// server advertises `Accept-Ranges: bytes`.
#[derive(Debug)]
pub struct RetryRead {
    retry_state: RetryState,
    settings: ClientSettings,
    response: Response,
    url: Url,
}

impl Read for RetryRead {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        loop {
            let retry_err = match self.response.read(buf) {
                Ok(sz) => {
                    self.retry_state.next_byte += sz;
                    return Ok(sz);
                }
                Err(err) => err,
            };
            debug!("error during read of '{}': {:?}", self.url, retry_err);

            if self.retry_state.current_try >= self.settings.tries - 1 {
                return Err(retry_err);
            }
            self.retry_state.increment(&self.settings);
            std::thread::sleep(self.retry_state.wait);
            if !self.supports_range() {
                error!(
                    "an error occurred and '{}' does not support range requests, giving up: {:?}",
                    self.url, retry_err
                );
                return Err(retry_err);
            }
            let new_read = fetch_with_retries(&mut self.retry_state, &self.settings, &self.url)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
            self.response = new_read.response;
        }
    }
}

impl RetryRead {
    fn supports_range(&self) -> bool {
        self.response
            .headers()
            .get(ACCEPT_RANGES)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("bytes"))
    }
}

#[derive(Clone, Copy, Debug)]
struct RetryState {
    current_try: u32,
    wait: Duration,
    next_byte: usize,
}

impl RetryState {
    fn new(initial_wait: Duration) -> Self {
        Self {
            current_try: 0,
            wait: initial_wait,
            next_byte: 0,
        }
    }

    fn increment(&mut self, settings: &ClientSettings) {
        if self.current_try > 0 {
            let new_wait = self.wait.mul_f32(settings.backoff_factor);
            match new_wait.cmp(&settings.max_backoff) {
                Ordering::Less => self.wait = new_wait,
                Ordering::Greater => self.wait = settings.max_backoff,
                Ordering::Equal => {}
            }
        }
        self.current_try += 1;
    }
}

fn fetch_with_retries(r: &mut RetryState, cs: &ClientSettings, url: &Url) -> Result<RetryRead, TransportError> {
    trace!("beginning fetch for '{url}'");
    let client = ClientBuilder::new()
        .timeout(cs.timeout)
        .connect_timeout(cs.connect_timeout)
        .build()
        .map_err(|e| TransportError::new(TransportErrorKind::Other, url.as_str(), e))?;

    loop {
        let request = build_request(&client, r.next_byte, url)?;
        let result = client.execute(request).and_then(Response::error_for_status);

        let retry_err = match result {
            Ok(response) => {
                return Ok(RetryRead {
                    retry_state: *r,
                    settings: *cs,
                    response,
                    url: url.clone(),
                });
            }
            Err(err) => {
                if let Some(status) = err.status() {
                    if status == StatusCode::NOT_FOUND {
                        return Err(TransportError::new(
                            TransportErrorKind::FileNotFound,
                            url.as_str(),
                            err,
                        ));
                    }
                    if !is_retryable(status) {
                        return Err(TransportError::new(TransportErrorKind::Other, url.as_str(), err));
                    }
                }
                err
            }
        };

        if r.current_try >= cs.tries - 1 {
            return Err(TransportError::new(TransportErrorKind::Other, url.as_str(), retry_err));
        }
        r.increment(cs);
        std::thread::sleep(r.wait);
    }
}

fn build_request(client: &Client, next_byte: usize, url: &Url) -> Result<Request, TransportError> {
    let mut builder = client.request(Method::GET, url.as_str());
    if next_byte != 0 {
        let header_value_string = format!("bytes={next_byte}-");
        let header_value = HeaderValue::from_str(&header_value_string)
            .map_err(|e| TransportError::new(TransportErrorKind::Other, url.as_str(), e))?;
        builder = builder.header(header::RANGE, header_value);
    }
    builder
        .build()
        .map_err(|e| TransportError::new(TransportErrorKind::Other, url.as_str(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_set_matches_spec() {
        for code in [408, 429, 500, 502, 503, 504] {
            assert!(is_retryable(StatusCode::from_u16(code).unwrap()));
        }
        for code in [200, 301, 400, 401, 403, 404] {
            assert!(!is_retryable(StatusCode::from_u16(code).unwrap()));
        }
    }

    #[test]
    fn backoff_grows_and_caps() {
        let settings = ClientSettings::default();
        let mut state = RetryState::new(settings.initial_backoff);
        state.increment(&settings);
        assert_eq!(state.wait, settings.initial_backoff);
        state.increment(&settings);
        assert!(state.wait > settings.initial_backoff);
        for _ in 0..20 {
            state.increment(&settings);
        }
        assert_eq!(state.wait, settings.max_backoff);
    }
}
