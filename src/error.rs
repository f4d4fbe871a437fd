use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("environment variable {0} must be set")]
    MissingEnv(&'static str),

    #[error("HTTP {status} from {url}: {body}")]
    Http {
        status: u16,
        url: String,
        body: String,
    },

    #[error("request to {url} failed on attempt {attempt}: {source}")]
    Transport {
        url: String,
        attempt: u32,
        #[source]
        source: reqwest::Error,
    },

    /// Row changed between read and write.
    #[error("product {id} was modified concurrently (expected updated_at {expected})")]
    Conflict { id: i64, expected: String },

    #[error("invalid ruleset: {0}")]
    InvalidRuleset(String),

    #[error("unsupported snapshot format: {0}")]
    UnsupportedFormat(String),

    #[error("unknown supplier '{0}'")]
    UnknownSupplier(String),
}

impl CatalogError {
    /// Worth another attempt: rate limiting or a server-side failure.
    pub fn is_retryable(&self) -> bool {
        match self {
            CatalogError::Http { status, .. } => *status == 429 || *status >= 500,
            CatalogError::Transport { .. } => true,
            _ => false,
        }
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or has
/// been tried `retries` times (at least once). Attempts are numbered from 1
/// and separated by a fixed `delay`.
pub async fn with_retry<T, F, Fut>(
    what: &str,
    retries: u32,
    delay: Duration,
    mut op: F,
) -> Result<T, CatalogError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, CatalogError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < retries && e.is_retryable() => {
                warn!(
                    "{} failed (attempt {}/{}): {}, retrying in {:.1}s",
                    what,
                    attempt,
                    retries,
                    e,
                    delay.as_secs_f64()
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn http(status: u16) -> CatalogError {
        CatalogError::Http {
            status,
            url: "https://example.supabase.co/rest/v1/products".into(),
            body: String::new(),
        }
    }

    #[test]
    fn retryable_statuses() {
        assert!(http(429).is_retryable());
        assert!(http(502).is_retryable());
        assert!(!http(400).is_retryable());
        assert!(!http(404).is_retryable());
        assert!(!CatalogError::MissingEnv("SUPABASE_URL").is_retryable());
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let res: Result<(), _> = with_retry("get", 3, Duration::ZERO, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(http(404)) }
        })
        .await;
        assert!(matches!(res, Err(CatalogError::Http { status: 404, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn server_errors_use_every_attempt() {
        let calls = AtomicU32::new(0);
        let res: Result<(), _> = with_retry("get", 3, Duration::ZERO, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(http(503)) }
        })
        .await;
        assert!(matches!(res, Err(CatalogError::Http { status: 503, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn recovers_after_one_failure() {
        let res = with_retry("get", 3, Duration::ZERO, |attempt| async move {
            if attempt == 1 {
                Err(http(429))
            } else {
                Ok(attempt)
            }
        })
        .await;
        assert_eq!(res.unwrap(), 2);
    }

    #[tokio::test]
    async fn zero_retries_still_tries_once() {
        let calls = AtomicU32::new(0);
        let res: Result<(), _> = with_retry("get", 0, Duration::ZERO, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(http(500)) }
        })
        .await;
        assert!(res.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transport_message_names_the_attempt() {
        let source = reqwest::Client::new().get("not a url").send().await.unwrap_err();
        let e = CatalogError::Transport {
            url: "not a url".into(),
            attempt: 2,
            source,
        };
        let msg = e.to_string();
        assert!(msg.starts_with("request to not a url failed on attempt 2: "), "{}", msg);
        assert!(e.is_retryable());
    }

    #[test]
    fn conflict_message_names_row() {
        let e = CatalogError::Conflict {
            id: 42,
            expected: "2025-01-01T00:00:00Z".into(),
        };
        assert!(e.to_string().contains("product 42"));
    }
}
