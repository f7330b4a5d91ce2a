use anyhow::{anyhow, bail, Context, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};
use url::Url;

/// One header set tried against the subscription server.
pub struct HeaderProfile {
  pub label: &'static str,
  pub headers: &'static [(&'static str, &'static str)],
}

pub const PROFILES: [HeaderProfile; 3] = [
  HeaderProfile {
    label: "desktop",
    headers: &[
      (
        "user-agent",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
      ),
      (
        "accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
      ),
      ("accept-language", "en-US,en;q=0.5"),
      ("upgrade-insecure-requests", "1"),
    ],
  },
  HeaderProfile {
    label: "clash",
    headers: &[("user-agent", "ClashforWindows/0.20.39"), ("accept", "*/*")],
  },
  HeaderProfile {
    label: "mobile",
    headers: &[
      (
        "user-agent",
        "Mozilla/5.0 (iPhone; CPU iPhone OS 16_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.0 Mobile/15E148 Safari/604.1",
      ),
      (
        "accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
      ),
    ],
  },
];

#[derive(Debug, Clone)]
pub struct FetchOptions {
  pub timeout_ms: u64,
  pub retries: usize,
  pub retry_delay_ms: u64,
  pub jitter_ms: u64,
}

impl Default for FetchOptions {
  fn default() -> Self {
    FetchOptions {
      timeout_ms: 60_000,
      retries: 3,
      retry_delay_ms: 1_000,
      jitter_ms: 0,
    }
  }
}

/// What to do after a non-success status.
#[derive(Debug, PartialEq, Eq)]
enum StatusAction {
  Retry,
  Abort,
}

fn classify_status(status: StatusCode) -> StatusAction {
  match status.as_u16() {
    403 | 404 | 500 | 502 | 503 => StatusAction::Retry,
    _ => StatusAction::Abort,
  }
}

fn header_map(profile: &HeaderProfile) -> HeaderMap {
  let mut map = HeaderMap::new();
  for &(k, v) in profile.headers {
    map.insert(HeaderName::from_static(k), HeaderValue::from_static(v));
  }
  map
}

fn build_client(profile: &HeaderProfile, timeout_ms: u64) -> Result<Client> {
  let builder = Client::builder()
    .default_headers(header_map(profile))
    .redirect(reqwest::redirect::Policy::limited(10))
    .danger_accept_invalid_certs(true)
    .timeout(Duration::from_millis(timeout_ms.max(1)));
  Ok(builder.build()?)
}

fn rand_jitter_ms(max_jitter: u64) -> u64 {
  if max_jitter == 0 {
    0
  } else {
    fastrand::u64(0..max_jitter)
  }
}

enum Attempt {
  Done(String),
  Retry(String),
  Abort(String),
}

async fn attempt_once(client: &Client, url: &str) -> Attempt {
  let res = match client.get(url).send().await {
    Ok(r) => r,
    Err(e) if e.is_timeout() => return Attempt::Retry("timeout".to_string()),
    Err(e) => return Attempt::Retry(e.to_string()),
  };
  let status = res.status();
  debug!(status = status.as_u16(), "response status");
  if !status.is_success() {
    let err = format!("http {status}");
    return match classify_status(status) {
      StatusAction::Retry => Attempt::Retry(err),
      StatusAction::Abort => Attempt::Abort(err),
    };
  }
  match res.text().await {
    Ok(t) if t.trim().is_empty() => Attempt::Retry("empty response body".to_string()),
    Ok(t) => Attempt::Done(t),
    Err(e) => Attempt::Retry(e.to_string()),
  }
}

/// Retrieves a subscription body, cycling through [`PROFILES`] with a bounded number of
/// attempts each. Fails when every attempt fails or a status is not worth retrying.
pub async fn fetch(url: &str, opts: &FetchOptions) -> Result<String> {
  let parsed = Url::parse(url.trim()).with_context(|| format!("invalid subscription url: {url}"))?;
  if !matches!(parsed.scheme(), "http" | "https") {
    bail!("unsupported url scheme: {}", parsed.scheme());
  }
  let url = parsed.as_str();
  let retries = opts.retries.max(1);
  let t0 = Instant::now();
  let mut last_error = String::new();

  for (idx, profile) in PROFILES.iter().enumerate() {
    info!(method = idx + 1, profile = profile.label, "fetching subscription");
    let client = build_client(profile, opts.timeout_ms)?;
    for attempt in 1..=retries {
      match attempt_once(&client, url).await {
        Attempt::Done(body) => {
          info!(
            chars = body.chars().count(),
            ms = t0.elapsed().as_millis() as u64,
            "subscription fetched"
          );
          return Ok(body);
        }
        Attempt::Abort(err) => {
          return Err(anyhow!("subscription request rejected: {err}"));
        }
        Attempt::Retry(err) => {
          warn!(attempt, profile = profile.label, error = %err, "fetch attempt failed");
          last_error = err;
        }
      }
      if attempt < retries {
        sleep(Duration::from_millis(
          opts.retry_delay_ms.saturating_add(rand_jitter_ms(opts.jitter_ms)),
        ))
        .await;
      }
    }
  }

  Err(anyhow!(
    "all request methods failed, could not fetch subscription (last error: {last_error})"
  ))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn profiles_build_valid_header_maps() {
    for p in &PROFILES {
      let map = header_map(p);
      assert!(map.contains_key("user-agent"), "{} lacks a user agent", p.label);
    }
    assert_eq!(PROFILES[1].headers[0].1, "ClashforWindows/0.20.39");
  }

  #[test]
  fn status_classification() {
    for code in [403u16, 404, 500, 502, 503] {
      assert_eq!(classify_status(StatusCode::from_u16(code).unwrap()), StatusAction::Retry);
    }
    for code in [400u16, 401, 429, 504] {
      assert_eq!(classify_status(StatusCode::from_u16(code).unwrap()), StatusAction::Abort);
    }
  }

  #[test]
  fn jitter_bounded() {
    assert_eq!(rand_jitter_ms(0), 0);
    assert!(rand_jitter_ms(5) < 5);
  }

  #[tokio::test]
  async fn rejects_non_http_urls_without_network() {
    let opts = FetchOptions::default();
    assert!(fetch("not a url", &opts).await.is_err());
    assert!(fetch("ftp://example.com/sub", &opts).await.is_err());
  }
}
