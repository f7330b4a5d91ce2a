use crate::b64;
use serde_json::Value as JsonValue;
use serde_yaml::Value as YamlValue;
use std::fmt;
use tracing::debug;

const CLASH_SIGNATURES: [&str; 13] = [
  "proxies:",
  "proxy-groups:",
  "rules:",
  "port:",
  "socks-port:",
  "allow-lan:",
  "mode:",
  "log-level:",
  "external-controller:",
  "- name:",
  "- type:",
  "- server:",
  "- port:",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UriScheme {
  Shadowsocks,
  Vmess,
  Trojan,
}

impl UriScheme {
  pub fn prefix(self) -> &'static str {
    match self {
      UriScheme::Shadowsocks => "ss://",
      UriScheme::Vmess => "vmess://",
      UriScheme::Trojan => "trojan://",
    }
  }

  pub fn of_line(line: &str) -> Option<UriScheme> {
    let s = line.trim();
    [UriScheme::Shadowsocks, UriScheme::Vmess, UriScheme::Trojan]
      .into_iter()
      .find(|sch| s.starts_with(sch.prefix()))
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatTag {
  ClashYaml,
  V2rayJson,
  ShadowsocksUri,
  VmessUri,
  /// Recognised but unsupported; decodes to zero nodes.
  TrojanUri,
  /// Whole text is Base64 whose decoded first line carries this scheme.
  Base64UriList(UriScheme),
  /// Clash parsing failed; treat as free-form URI lines.
  TextUri,
  Unknown,
}

impl FormatTag {
  fn from_scheme(s: UriScheme) -> FormatTag {
    match s {
      UriScheme::Shadowsocks => FormatTag::ShadowsocksUri,
      UriScheme::Vmess => FormatTag::VmessUri,
      UriScheme::Trojan => FormatTag::TrojanUri,
    }
  }

  /// The URI tag this value stands for, unwrapping `Base64UriList`.
  pub fn scheme(self) -> Option<UriScheme> {
    match self {
      FormatTag::ShadowsocksUri => Some(UriScheme::Shadowsocks),
      FormatTag::VmessUri => Some(UriScheme::Vmess),
      FormatTag::TrojanUri => Some(UriScheme::Trojan),
      FormatTag::Base64UriList(s) => Some(s),
      _ => None,
    }
  }
}

impl fmt::Display for FormatTag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      FormatTag::ClashYaml => f.write_str("clash-yaml"),
      FormatTag::V2rayJson => f.write_str("v2ray-json"),
      FormatTag::ShadowsocksUri => f.write_str("shadowsocks-uri"),
      FormatTag::VmessUri => f.write_str("vmess-uri"),
      FormatTag::TrojanUri => f.write_str("trojan-uri"),
      FormatTag::Base64UriList(s) => {
        write!(f, "base64-wrapped-uri-list({})", FormatTag::from_scheme(*s))
      }
      FormatTag::TextUri => f.write_str("text-uri"),
      FormatTag::Unknown => f.write_str("unknown"),
    }
  }
}

/// Parses as YAML whose root is a mapping or a sequence. A bare scalar does not count.
pub(crate) fn parse_structured_yaml(text: &str) -> Option<YamlValue> {
  match serde_yaml::from_str::<YamlValue>(text) {
    Ok(v @ (YamlValue::Mapping(_) | YamlValue::Sequence(_))) => Some(v),
    _ => None,
  }
}

pub(crate) fn parse_v2ray_json(text: &str) -> Option<JsonValue> {
  let v: JsonValue = serde_json::from_str(text).ok()?;
  let obj = v.as_object()?;
  if obj.contains_key("outbounds") || obj.contains_key("inbounds") {
    Some(v)
  } else {
    None
  }
}

fn first_line_scheme(text: &str) -> Option<UriScheme> {
  let first = text.trim().lines().next()?;
  UriScheme::of_line(first)
}

pub fn detect(text: &str) -> FormatTag {
  let content = text.trim();

  if CLASH_SIGNATURES.iter().any(|sig| content.contains(sig))
    && parse_structured_yaml(content).is_some()
  {
    debug!("clash signature found and yaml parses");
    return FormatTag::ClashYaml;
  }

  if parse_v2ray_json(content).is_some() {
    debug!("json document with outbounds/inbounds");
    return FormatTag::V2rayJson;
  }

  if let Some(s) = first_line_scheme(content) {
    return FormatTag::from_scheme(s);
  }

  if b64::looks_like_base64(content) {
    if let Some(decoded) = b64::decode_to_utf8(content) {
      if let Some(s) = first_line_scheme(&decoded) {
        debug!(scheme = s.prefix(), "base64 wrapped uri list");
        return FormatTag::Base64UriList(s);
      }
    }
  }

  FormatTag::Unknown
}
