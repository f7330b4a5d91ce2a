use crate::container::decode;
use crate::detect::detect;
use crate::encode::{encode, OutputFormat};
use crate::error::ConvertError;
use crate::input::{read_input, InputArgs};
use crate::node::Node;
use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use std::path::{Path, PathBuf};
use tracing::info;

const TABLE_ROWS: usize = 10;
const PREVIEW_CHARS: usize = 500;

#[derive(ClapArgs, Debug, Clone)]
pub struct Args {
  #[command(flatten)]
  pub input: InputArgs,

  /// Target format.
  #[arg(long, value_enum, default_value_t = OutputFormat::Clash)]
  pub to: OutputFormat,

  /// Output file (default depends on --to: clash_config.yaml, shadowsocks_subscription.txt, v2ray_subscription.txt).
  #[arg(long)]
  pub output: Option<PathBuf>,

  /// Do not write a file.
  #[arg(long, default_value_t = false)]
  pub no_save: bool,

  /// Print the converted text to stdout.
  #[arg(long, default_value_t = false)]
  pub stdout: bool,

  /// Print the first 500 characters of the result to stderr.
  #[arg(long, default_value_t = false)]
  pub preview: bool,
}

/// Writes `text` to `path`.
pub async fn persist(text: &str, path: &Path) -> Result<()> {
  tokio::fs::write(path, text)
    .await
    .with_context(|| format!("failed to write {}", path.display()))
}

fn truncate_chars(s: &str, max: usize) -> String {
  if s.chars().count() > max {
    let head: String = s.chars().take(max).collect();
    format!("{head}...")
  } else {
    s.to_string()
  }
}

pub fn node_table(nodes: &[Node]) -> String {
  let mut out = format!("{:<6}{:<32}{:<8}{:<32}{}\n", "#", "name", "type", "server", "port");
  for (i, n) in nodes.iter().take(TABLE_ROWS).enumerate() {
    out.push_str(&format!(
      "{:<6}{:<32}{:<8}{:<32}{}\n",
      i + 1,
      truncate_chars(&n.name, 28),
      n.kind(),
      truncate_chars(&n.server, 28),
      n.port
    ));
  }
  if nodes.len() > TABLE_ROWS {
    out.push_str(&format!("{:<6}{} more nodes\n", "...", nodes.len() - TABLE_ROWS));
  }
  out
}

/// Detects, decodes and re-encodes. Zero decoded nodes is an error.
pub fn convert_text(text: &str, target: OutputFormat) -> Result<(Vec<Node>, String)> {
  let tag = detect(text);
  info!(format = %tag, chars = text.chars().count(), "detected subscription format");
  let nodes = decode(text, tag);
  if nodes.is_empty() {
    return Err(ConvertError::NoNodes(tag.to_string()).into());
  }
  let out = encode(&nodes, target)?;
  Ok((nodes, out))
}

pub async fn run(args: Args) -> Result<()> {
  let text = read_input(&args.input).await?;
  let (nodes, out) = convert_text(&text, args.to)?;

  eprintln!("parsed {} nodes", nodes.len());
  eprint!("{}", node_table(&nodes));

  if !args.no_save {
    let path = args
      .output
      .clone()
      .unwrap_or_else(|| PathBuf::from(args.to.default_file_name()));
    persist(&out, &path).await?;
    info!(path = %path.display(), format = %args.to, "saved");
  }
  if args.preview {
    eprintln!("--- preview ---\n{}", truncate_chars(&out, PREVIEW_CHARS));
  }
  if args.stdout {
    println!("{out}");
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::b64;

  #[test]
  fn converts_ss_link_to_clash() {
    let (nodes, out) = convert_text(
      "ss://YWVzLTI1Ni1nY206cGFzczEyMw==@example.com:8388#MyNode",
      OutputFormat::Clash,
    )
    .unwrap();
    assert_eq!(nodes.len(), 1);
    assert!(out.contains("MyNode"));
    assert!(out.contains("aes-256-gcm"));
  }

  #[test]
  fn empty_result_is_reported() {
    let err = convert_text("nothing to see", OutputFormat::Ss).unwrap_err();
    assert!(matches!(err.downcast_ref::<ConvertError>(), Some(ConvertError::NoNodes(_))));
    let err = convert_text("proxies: []\n", OutputFormat::Clash).unwrap_err();
    assert!(err.to_string().contains("clash-yaml"));
  }

  #[test]
  fn cross_kind_bundle_is_empty_but_not_an_error() {
    let (_, out) = convert_text("ss://m:p@h.example:1", OutputFormat::Vmess).unwrap();
    assert_eq!(out, "");
    assert_eq!(b64::decode_to_utf8(&out), None);
  }

  #[test]
  fn table_caps_rows() {
    let nodes: Vec<Node> = (0..12)
      .map(|i| Node::shadowsocks(&format!("n{i}"), "h", 1, "m", "p"))
      .collect();
    let t = node_table(&nodes);
    assert_eq!(t.lines().count(), 1 + TABLE_ROWS + 1);
    assert!(t.ends_with("2 more nodes\n"));
  }

  #[test]
  fn truncation_counts_chars() {
    assert_eq!(truncate_chars("香港香港", 2), "香港...");
    assert_eq!(truncate_chars("ab", 2), "ab");
  }

  #[tokio::test]
  async fn persist_writes_file() {
    let path = std::env::temp_dir().join(format!("hulink-out-{}.yaml", std::process::id()));
    persist("proxies: []\n", &path).await.unwrap();
    assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "proxies: []\n");
    let _ = tokio::fs::remove_file(&path).await;
  }
}
