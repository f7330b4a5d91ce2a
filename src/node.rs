use serde::Serialize;
use std::fmt;

pub const DEFAULT_SS_NAME: &str = "Shadowsocks Node";
pub const DEFAULT_VMESS_NAME: &str = "VMess Node";

/// Protocol tag of a node. Trojan and Surge are recognised by the detector
/// but never produce a node, so they have no variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
  #[serde(rename = "ss")]
  Shadowsocks,
  Vmess,
}

impl fmt::Display for Kind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Kind::Shadowsocks => f.write_str("ss"),
      Kind::Vmess => f.write_str("vmess"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SsParams {
  pub cipher: String,
  pub password: String,
}

#[allow(non_snake_case)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VmessParams {
  pub uuid: String,
  pub alterId: u32,
  pub cipher: String,
  pub network: String,
  pub tls: bool,
  pub path: String,
  pub host: String,
}

impl Default for VmessParams {
  fn default() -> Self {
    VmessParams {
      uuid: String::new(),
      alterId: 0,
      cipher: "auto".to_string(),
      network: "tcp".to_string(),
      tls: false,
      path: String::new(),
      host: String::new(),
    }
  }
}

/// Protocol specific half of a node. Its variant is the node's only kind tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum Proto {
  #[serde(rename = "ss")]
  Shadowsocks(SsParams),
  #[serde(rename = "vmess")]
  Vmess(VmessParams),
}

/// Canonical proxy endpoint. Built once by a decoder, then only read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
  pub name: String,
  pub server: String,
  pub port: u16,
  #[serde(flatten)]
  pub proto: Proto,
}

impl Node {
  pub fn shadowsocks(name: &str, server: &str, port: u16, cipher: &str, password: &str) -> Node {
    Node {
      name: name_or_default(name, DEFAULT_SS_NAME),
      server: server.to_string(),
      port,
      proto: Proto::Shadowsocks(SsParams {
        cipher: cipher.to_string(),
        password: password.to_string(),
      }),
    }
  }

  pub fn vmess(name: &str, server: &str, port: u16, params: VmessParams) -> Node {
    Node {
      name: name_or_default(name, DEFAULT_VMESS_NAME),
      server: server.to_string(),
      port,
      proto: Proto::Vmess(params),
    }
  }

  pub fn kind(&self) -> Kind {
    match self.proto {
      Proto::Shadowsocks(_) => Kind::Shadowsocks,
      Proto::Vmess(_) => Kind::Vmess,
    }
  }
}

fn name_or_default(name: &str, default: &str) -> String {
  let t = name.trim();
  if t.is_empty() {
    default.to_string()
  } else {
    t.to_string()
  }
}

/// Positive port in `1..=65535` from a textual value.
pub fn parse_port(raw: &str) -> Option<u16> {
  match raw.trim().parse::<u16>() {
    Ok(0) | Err(_) => None,
    Ok(p) => Some(p),
  }
}

/// Positive port in `1..=65535` from an already parsed integer.
pub fn port_from(n: u64) -> Option<u16> {
  u16::try_from(n).ok().filter(|p| *p > 0)
}

/// Non-negative float with no fractional part, as sent by generators that write
/// every number as a double.
pub fn whole_number(f: f64) -> Option<u64> {
  if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 {
    Some(f as u64)
  } else {
    None
  }
}
