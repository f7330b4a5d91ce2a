use crate::b64;
use crate::error::EncodeError;
use crate::node::{Kind, Node, Proto, SsParams, VmessParams};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

const SELECT_GROUP: &str = "🚀 节点选择";
const AUTO_GROUP: &str = "♻️ 自动选择";
const LATENCY_TEST_URL: &str = "http://www.gstatic.com/generate_204";
const LATENCY_TEST_INTERVAL: u32 = 300;

const RULES: [&str; 7] = [
  "DOMAIN-SUFFIX,local,DIRECT",
  "IP-CIDR,127.0.0.0/8,DIRECT",
  "IP-CIDR,172.16.0.0/12,DIRECT",
  "IP-CIDR,192.168.0.0/16,DIRECT",
  "IP-CIDR,10.0.0.0/8,DIRECT",
  "GEOIP,CN,DIRECT",
  "MATCH,🚀 节点选择",
];

/// Characters escaped in the `#name` fragment of an `ss://` link.
const FRAGMENT: &AsciiSet = &CONTROLS
  .add(b' ')
  .add(b'"')
  .add(b'#')
  .add(b'%')
  .add(b'<')
  .add(b'>')
  .add(b'`');

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
  /// Clash YAML configuration
  Clash,
  /// Base64 bundle of ss:// links
  Ss,
  /// Base64 bundle of vmess:// links
  Vmess,
}

impl OutputFormat {
  pub fn default_file_name(self) -> &'static str {
    match self {
      OutputFormat::Clash => "clash_config.yaml",
      OutputFormat::Ss => "shadowsocks_subscription.txt",
      OutputFormat::Vmess => "v2ray_subscription.txt",
    }
  }
}

impl fmt::Display for OutputFormat {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      OutputFormat::Clash => f.write_str("clash-yaml"),
      OutputFormat::Ss => f.write_str("shadowsocks-base64"),
      OutputFormat::Vmess => f.write_str("vmess-base64"),
    }
  }
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct ClashConfig<'a> {
  port: u16,
  socks_port: u16,
  allow_lan: bool,
  mode: &'static str,
  log_level: &'static str,
  external_controller: &'static str,
  proxies: Vec<ClashProxy<'a>>,
  proxy_groups: Vec<ProxyGroup<'a>>,
  rules: Vec<&'static str>,
}

#[allow(non_snake_case)]
#[derive(Serialize)]
struct ClashProxy<'a> {
  name: &'a str,
  #[serde(rename = "type")]
  kind: Kind,
  server: &'a str,
  port: u16,
  #[serde(skip_serializing_if = "Option::is_none")]
  uuid: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  alterId: Option<u32>,
  cipher: &'a str,
  #[serde(skip_serializing_if = "Option::is_none")]
  password: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  network: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  tls: Option<bool>,
  #[serde(rename = "ws-path", skip_serializing_if = "Option::is_none")]
  ws_path: Option<&'a str>,
  #[serde(rename = "ws-headers", skip_serializing_if = "Option::is_none")]
  ws_headers: Option<BTreeMap<&'static str, &'a str>>,
}

#[derive(Serialize)]
struct ProxyGroup<'a> {
  name: &'static str,
  #[serde(rename = "type")]
  kind: &'static str,
  proxies: Vec<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  url: Option<&'static str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  interval: Option<u32>,
}

fn non_empty(s: &str) -> Option<&str> {
  if s.is_empty() {
    None
  } else {
    Some(s)
  }
}

fn clash_proxy(node: &Node) -> ClashProxy<'_> {
  match &node.proto {
    Proto::Shadowsocks(SsParams { cipher, password }) => ClashProxy {
      name: &node.name,
      kind: node.kind(),
      server: &node.server,
      port: node.port,
      uuid: None,
      alterId: None,
      cipher: cipher.as_str(),
      password: Some(password.as_str()),
      network: None,
      tls: None,
      ws_path: None,
      ws_headers: None,
    },
    Proto::Vmess(p) => ClashProxy {
      name: &node.name,
      kind: node.kind(),
      server: &node.server,
      port: node.port,
      uuid: Some(p.uuid.as_str()),
      alterId: Some(p.alterId),
      cipher: &p.cipher,
      password: None,
      network: Some(p.network.as_str()),
      tls: p.tls.then_some(true),
      ws_path: non_empty(&p.path),
      ws_headers: non_empty(&p.host).map(|h| BTreeMap::from([("Host", h)])),
    },
  }
}

/// Fixed-skeleton Clash config with every node in `proxies` and in both groups.
pub fn to_clash(nodes: &[Node]) -> Result<String, EncodeError> {
  let mut select = ProxyGroup {
    name: SELECT_GROUP,
    kind: "select",
    proxies: vec![AUTO_GROUP, "DIRECT"],
    url: None,
    interval: None,
  };
  let mut auto = ProxyGroup {
    name: AUTO_GROUP,
    kind: "url-test",
    proxies: Vec::new(),
    url: Some(LATENCY_TEST_URL),
    interval: Some(LATENCY_TEST_INTERVAL),
  };
  let mut proxies = Vec::with_capacity(nodes.len());
  for node in nodes {
    proxies.push(clash_proxy(node));
    select.proxies.push(&node.name);
    auto.proxies.push(&node.name);
  }

  let cfg = ClashConfig {
    port: 7890,
    socks_port: 7891,
    allow_lan: false,
    mode: "rule",
    log_level: "info",
    external_controller: "127.0.0.1:9090",
    proxies,
    proxy_groups: vec![select, auto],
    rules: RULES.to_vec(),
  };
  Ok(serde_yaml::to_string(&cfg)?)
}

/// `ss://base64(cipher:password)@server:port#name`
pub fn ss_uri(node: &Node, p: &SsParams) -> String {
  let auth = b64::encode(&format!("{}:{}", p.cipher, p.password));
  format!(
    "ss://{auth}@{}:{}#{}",
    node.server,
    node.port,
    utf8_percent_encode(&node.name, FRAGMENT)
  )
}

#[derive(Serialize)]
struct VmessLink<'a> {
  v: &'static str,
  ps: &'a str,
  add: &'a str,
  port: String,
  id: &'a str,
  aid: String,
  scy: &'a str,
  net: &'a str,
  #[serde(rename = "type")]
  header_type: &'static str,
  host: &'a str,
  path: &'a str,
  tls: &'static str,
}

/// `vmess://base64(json)` in the v2rayN "v2" shape.
pub fn vmess_uri(node: &Node, p: &VmessParams) -> Result<String, EncodeError> {
  let link = VmessLink {
    v: "2",
    ps: &node.name,
    add: &node.server,
    port: node.port.to_string(),
    id: &p.uuid,
    aid: p.alterId.to_string(),
    scy: &p.cipher,
    net: &p.network,
    header_type: "none",
    host: &p.host,
    path: &p.path,
    tls: if p.tls { "tls" } else { "" },
  };
  let json = serde_json::to_string(&link)?;
  Ok(format!("vmess://{}", b64::encode(&json)))
}

/// Base64 of the newline-joined `ss://` links of every Shadowsocks node.
pub fn to_ss_bundle(nodes: &[Node]) -> String {
  let mut uris = Vec::new();
  for node in nodes {
    match &node.proto {
      Proto::Shadowsocks(p) => uris.push(ss_uri(node, p)),
      Proto::Vmess(_) => continue,
    }
  }
  b64::encode(&uris.join("\n"))
}

/// Base64 of the newline-joined `vmess://` links of every VMess node.
pub fn to_vmess_bundle(nodes: &[Node]) -> Result<String, EncodeError> {
  let mut uris = Vec::new();
  for node in nodes {
    match &node.proto {
      Proto::Vmess(p) => uris.push(vmess_uri(node, p)?),
      Proto::Shadowsocks(_) => continue,
    }
  }
  Ok(b64::encode(&uris.join("\n")))
}

pub fn encode(nodes: &[Node], target: OutputFormat) -> Result<String, EncodeError> {
  match target {
    OutputFormat::Clash => to_clash(nodes),
    OutputFormat::Ss => Ok(to_ss_bundle(nodes)),
    OutputFormat::Vmess => to_vmess_bundle(nodes),
  }
}
