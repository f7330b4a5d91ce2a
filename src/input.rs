use crate::fetch::{fetch, FetchOptions};
use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use std::path::PathBuf;
use tokio::io::{AsyncReadExt, BufReader};

/// Where the subscription text comes from. With no source given, stdin is read.
#[derive(ClapArgs, Debug, Clone)]
pub struct InputArgs {
  /// Subscription URL to download.
  #[arg(long, conflicts_with_all = ["file", "text", "stdin"])]
  pub url: Option<String>,

  /// Read subscription text from a local file.
  #[arg(long, conflicts_with_all = ["text", "stdin"])]
  pub file: Option<PathBuf>,

  /// Subscription text provided directly as an argument. Prefer --stdin for large inputs.
  #[arg(long, conflicts_with = "stdin")]
  pub text: Option<String>,

  /// Read subscription text from stdin.
  #[arg(long, default_value_t = false)]
  pub stdin: bool,

  #[command(flatten)]
  pub fetch: FetchArgs,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct FetchArgs {
  /// Request timeout (ms).
  #[arg(long, default_value_t = 60_000)]
  pub timeout_ms: u64,

  /// Attempts per header profile before moving to the next one.
  #[arg(long, default_value_t = 3)]
  pub retries: usize,

  /// Pause between attempts (ms).
  #[arg(long, default_value_t = 1_000)]
  pub retry_delay_ms: u64,

  /// Random jitter added to the pause (ms, [0, jitter_ms)).
  #[arg(long, default_value_t = 0)]
  pub jitter_ms: u64,
}

impl FetchArgs {
  pub fn options(&self) -> FetchOptions {
    FetchOptions {
      timeout_ms: self.timeout_ms.clamp(1_000, 300_000),
      retries: self.retries.clamp(1, 10),
      retry_delay_ms: self.retry_delay_ms,
      jitter_ms: self.jitter_ms,
    }
  }
}

async fn read_stdin() -> Result<String> {
  let mut buf = String::new();
  let mut stdin = BufReader::new(tokio::io::stdin());
  stdin.read_to_string(&mut buf).await?;
  Ok(buf)
}

pub async fn read_input(args: &InputArgs) -> Result<String> {
  if let Some(url) = &args.url {
    return fetch(url, &args.fetch.options()).await;
  }
  if let Some(path) = &args.file {
    return tokio::fs::read_to_string(path)
      .await
      .with_context(|| format!("failed to read {}", path.display()));
  }
  match &args.text {
    Some(t) if !args.stdin => Ok(t.clone()),
    _ => read_stdin().await.context("failed to read stdin"),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::Parser;

  #[derive(Parser)]
  struct Cli {
    #[command(flatten)]
    input: InputArgs,
  }

  #[test]
  fn fetch_options_are_clamped() {
    let cli = Cli::parse_from(["t", "--url", "https://x.example/s", "--retries", "0", "--timeout-ms", "5"]);
    let o = cli.input.fetch.options();
    assert_eq!(o.retries, 1);
    assert_eq!(o.timeout_ms, 1_000);
    assert_eq!(o.retry_delay_ms, 1_000);
  }

  #[test]
  fn sources_conflict() {
    assert!(Cli::try_parse_from(["t", "--url", "u", "--file", "f"]).is_err());
    assert!(Cli::try_parse_from(["t", "--text", "x", "--stdin"]).is_err());
  }

  #[tokio::test]
  async fn reads_text_and_file() {
    let cli = Cli::parse_from(["t", "--text", "ss://m:p@h:1"]);
    assert_eq!(read_input(&cli.input).await.unwrap(), "ss://m:p@h:1");

    let path = std::env::temp_dir().join(format!("hulink-input-{}.txt", std::process::id()));
    tokio::fs::write(&path, "vmess://abc").await.unwrap();
    let cli = Cli::parse_from(["t", "--file", path.to_str().unwrap()]);
    assert_eq!(read_input(&cli.input).await.unwrap(), "vmess://abc");
    let _ = tokio::fs::remove_file(&path).await;
  }
}
