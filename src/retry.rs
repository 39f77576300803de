use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::client::ApiError;
use crate::config::Config;

/// Errors that may go away on a second attempt.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for ApiError {
    /// Transport failures only; an HTTP status from the API is a final answer.
    /// Unlike the web reader, a missing cover or an undecodable body is not
    /// retried either: repeating the request returns the same thing.
    fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Network(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 2, initial_delay: Duration::from_secs(1), factor: 2 }
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            max_retries: cfg.max_retries,
            initial_delay: Duration::from_millis(cfg.retry_initial_delay_ms),
            ..Self::default()
        }
    }

    /// Sleep before each retry, in order.
    pub fn backoff(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_retries).map(move |n| self.initial_delay.saturating_mul(self.factor.saturating_pow(n)))
    }
}

/// Run `op`, retrying retryable failures with exponential backoff.
pub async fn fetch_with_retry<T, E, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut delays = policy.backoff();
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() => match delays.next() {
                Some(delay) => {
                    warn!(error = %err, ?delay, "request failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                None => return Err(err),
            },
            Err(err) => return Err(err),
        }
    }
}

/// Outcome of a view's data request.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetch<T> {
    Loading,
    Loaded(T),
    Failed(String),
}

impl<T> Fetch<T> {
    pub fn settle<E: std::fmt::Display>(result: Result<T, E>) -> Self {
        match result {
            Ok(v) => Fetch::Loaded(v),
            Err(e) => {
                let msg = e.to_string();
                Fetch::Failed(if msg.is_empty() { "An unknown error occurred".to_string() } else { msg })
            }
        }
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Fetch::Loaded(v) => Some(v),
            _ => None,
        }
    }

    /// Error text as shown to the reader.
    pub fn error_message(&self) -> Option<String> {
        match self {
            Fetch::Failed(msg) => Some(format_error_message(msg)),
            _ => None,
        }
    }
}

pub fn format_error_message(error: &str) -> String {
    if error.contains("404") {
        return "The requested content was not found. Please try again later.".to_string();
    }
    if error.contains("429") {
        return "Too many requests. Please wait a moment and try again.".to_string();
    }
    if error.contains("500") {
        return "Server error. Please try again later.".to_string();
    }
    error.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    enum TestError {
        Flaky,
        Fatal,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{self:?}")
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            matches!(self, TestError::Flaky)
        }
    }

    fn quick() -> RetryPolicy {
        RetryPolicy { initial_delay: Duration::from_millis(1), ..RetryPolicy::default() }
    }

    #[test]
    fn default_backoff_is_one_then_two_seconds() {
        let delays: Vec<_> = RetryPolicy::default().backoff().collect();
        assert_eq!(delays, vec![Duration::from_secs(1), Duration::from_secs(2)]);
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let out = fetch_with_retry(&quick(), || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 { Err(TestError::Flaky) } else { Ok(7) }
        })
        .await;
        assert_eq!(out.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_two_retries() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let out: Result<(), _> = fetch_with_retry(&quick(), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TestError::Flaky)
        })
        .await;
        assert!(matches!(out, Err(TestError::Flaky)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn api_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let out: Result<(), _> = fetch_with_retry(&quick(), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TestError::Fatal)
        })
        .await;
        assert!(matches!(out, Err(TestError::Fatal)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transport_errors_are_retryable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = reqwest::get(format!("http://{addr}/")).await.unwrap_err();
        assert!(ApiError::Network(err).is_retryable());
    }

    #[test]
    fn status_errors_are_final_for_the_api() {
        assert!(!ApiError::Status(503).is_retryable());
        assert!(!ApiError::CoverNotFound.is_retryable());
    }

    #[test]
    fn messages_are_friendly_for_known_statuses() {
        assert_eq!(format_error_message("API error: 404"), "The requested content was not found. Please try again later.");
        assert_eq!(format_error_message("API error: 429"), "Too many requests. Please wait a moment and try again.");
        assert_eq!(format_error_message("API error: 500"), "Server error. Please try again later.");
        assert_eq!(format_error_message("boom"), "boom");
        assert_eq!(format_error_message(""), "");
    }

    #[test]
    fn fetch_formats_failures_on_display() {
        let f: Fetch<u8> = Fetch::settle(Err(ApiError::Status(429)));
        assert_eq!(f, Fetch::Failed("API error: 429".to_string()));
        assert_eq!(f.error_message().unwrap(), "Too many requests. Please wait a moment and try again.");
        assert!(f.data().is_none());

        let ok: Fetch<u8> = Fetch::settle::<ApiError>(Ok(3));
        assert_eq!(ok.data(), Some(&3));
        assert!(Fetch::<u8>::Loading.data().is_none());
    }
}
