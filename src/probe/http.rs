//! HTTP probe implementation.

use std::time::{Duration, Instant};

use super::ProbeOutcome;

/// Run an HTTP GET probe against the given address.
///
/// Never fails: a connection error, timeout or any other transport error is
/// reported as code `0`. The body is drained so elapsed time covers the full
/// transfer.
pub async fn run_http_probe(client: &reqwest::Client, address: &str, timeout: Duration) -> ProbeOutcome {
    let url = normalize_url(address);
    let start = Instant::now();

    let code = match client.get(&url).timeout(timeout).send().await {
        Ok(response) => {
            let code = response.status().as_u16();
            if let Err(e) = response.bytes().await {
                tracing::debug!("Probe {}: body read failed after {}: {}", url, code, e);
            }
            code
        }
        Err(e) => {
            if e.is_timeout() {
                tracing::debug!("Probe {}: timed out after {:?}", url, timeout);
            } else {
                tracing::debug!("Probe {}: {}", url, e);
            }
            0
        }
    };

    ProbeOutcome {
        code,
        elapsed_ms: elapsed_millis(start.elapsed()),
    }
}

fn normalize_url(address: &str) -> String {
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    }
}

/// Whole milliseconds, rounded up.
fn elapsed_millis(elapsed: Duration) -> u64 {
    let micros = elapsed.as_micros();
    micros.div_ceil(1000) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_http_probe_invalid_url() {
        let client = reqwest::Client::new();
        let outcome = run_http_probe(&client, "http://256.256.256.256", Duration::from_millis(100)).await;
        assert_eq!(outcome.code, 0);
    }

    #[tokio::test]
    async fn test_http_probe_unresolvable_host() {
        let client = reqwest::Client::new();
        let outcome = run_http_probe(&client, "http://example.invalid", Duration::from_secs(5)).await;
        assert_eq!(outcome.code, 0);
        assert!(outcome.elapsed_ms > 0);
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("example.com"), "http://example.com");
        assert_eq!(normalize_url("https://example.com/x"), "https://example.com/x");
    }

    #[test]
    fn test_elapsed_rounds_up() {
        assert_eq!(elapsed_millis(Duration::from_micros(1)), 1);
        assert_eq!(elapsed_millis(Duration::from_millis(12)), 12);
        assert_eq!(elapsed_millis(Duration::from_micros(12_001)), 13);
        assert_eq!(elapsed_millis(Duration::ZERO), 0);
    }
}
