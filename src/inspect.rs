use crate::container::decode;
use crate::detect::detect;
use crate::input::{read_input, InputArgs};
use anyhow::Result;
use clap::Args as ClapArgs;

#[derive(ClapArgs, Debug, Clone)]
pub struct Args {
  #[command(flatten)]
  pub input: InputArgs,
}

/// Prints the detected format tag.
pub async fn run_detect(args: Args) -> Result<()> {
  let text = read_input(&args.input).await?;
  println!("{}", detect(&text));
  Ok(())
}

/// Prints every decoded node as one JSON line.
pub async fn run_parse(args: Args) -> Result<()> {
  let text = read_input(&args.input).await?;
  let nodes = decode(&text, detect(&text));
  for n in nodes {
    println!("{}", serde_json::to_string(&n)?);
  }
  Ok(())
}

const FORMATS: [(&str, &str, &str, &str); 6] = [
  ("Shadowsocks", "ss:// URI, Base64", "ss:// Base64, Clash", "supported"),
  ("VMess", "vmess:// URI, Base64", "vmess:// Base64, Clash", "supported"),
  ("Clash", "YAML config", "YAML, ss://, vmess://", "supported"),
  ("V2Ray", "JSON config, vmess://", "vmess://, Clash", "supported"),
  ("Trojan", "trojan:// URI", "-", "not yet supported"),
  ("Surge", "config file", "-", "not yet supported"),
];

pub fn formats_table() -> String {
  let mut out = format!("{:<14}{:<26}{:<26}{}\n", "protocol", "input", "output", "status");
  for (proto, input, output, status) in FORMATS {
    out.push_str(&format!("{proto:<14}{input:<26}{output:<26}{status}\n"));
  }
  out
}

pub fn run_formats() -> Result<()> {
  print!("{}", formats_table());
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn formats_lists_unsupported_protocols() {
    let t = formats_table();
    assert_eq!(t.lines().count(), 1 + FORMATS.len());
    assert!(t.lines().any(|l| l.starts_with("Trojan") && l.ends_with("not yet supported")));
    assert!(t.lines().any(|l| l.starts_with("Surge")));
  }
}
