use crate::b64;
use crate::detect::{parse_structured_yaml, parse_v2ray_json, FormatTag};
use crate::node::{port_from, whole_number, Node, VmessParams};
use crate::uri::{json_uint, parse_uri_line};
use serde_json::Value as JsonValue;
use serde_yaml::Value as YamlValue;
use tracing::{debug, info, warn};

const CLASH_LIST_KEYS: [&str; 5] = ["proxies", "proxy", "Proxy", "servers", "nodes"];

fn to_bool(v: &str) -> bool {
  let s = v.trim().to_lowercase();
  matches!(s.as_str(), "1" | "true" | "yes" | "y" | "on")
}

fn y_map_get<'a>(m: &'a serde_yaml::Mapping, key: &str) -> Option<&'a YamlValue> {
  m.iter()
    .find(|(k, _)| k.as_str() == Some(key))
    .map(|(_, v)| v)
}

fn y_path<'a>(m: &'a serde_yaml::Mapping, path: &[&str]) -> Option<&'a YamlValue> {
  let (last, parents) = path.split_last()?;
  let mut cur = m;
  for p in parents {
    cur = y_map_get(cur, p)?.as_mapping()?;
  }
  y_map_get(cur, last)
}

fn y_str(v: Option<&YamlValue>) -> String {
  match v {
    Some(YamlValue::String(s)) => s.trim().to_string(),
    Some(YamlValue::Number(n)) => n.to_string(),
    Some(YamlValue::Bool(b)) => b.to_string(),
    _ => String::new(),
  }
}

/// Same contract as `uri::json_uint`, for YAML scalars.
fn y_uint(v: Option<&YamlValue>) -> Result<Option<u64>, String> {
  match v {
    None | Some(YamlValue::Null) => Ok(None),
    Some(YamlValue::String(s)) if s.trim().is_empty() => Ok(None),
    Some(YamlValue::String(s)) => s.trim().parse::<u64>().map(Some).map_err(|_| s.clone()),
    Some(YamlValue::Number(n)) => n
      .as_u64()
      .or_else(|| n.as_f64().and_then(whole_number))
      .map(Some)
      .ok_or_else(|| n.to_string()),
    Some(other) => Err(format!("{other:?}")),
  }
}

fn y_u16(v: Option<&YamlValue>) -> Option<u16> {
  y_uint(v).ok().flatten().and_then(port_from)
}

/// Absent means 0; anything present must fit a `u32`.
fn parse_alter_id(raw: Result<Option<u64>, String>) -> Result<u32, String> {
  match raw? {
    None => Ok(0),
    Some(a) => u32::try_from(a).map_err(|_| a.to_string()),
  }
}

fn y_bool(v: Option<&YamlValue>) -> Option<bool> {
  let x = v?;
  if let Some(b) = x.as_bool() {
    return Some(b);
  }
  if let Some(n) = x.as_i64() {
    return Some(n != 0);
  }
  let t = x.as_str()?.trim();
  if t.is_empty() {
    return None;
  }
  Some(to_bool(t))
}

fn or_default(s: String, default: &str) -> String {
  if s.is_empty() {
    default.to_string()
  } else {
    s
  }
}

fn clash_proxy_to_node(map: &serde_yaml::Mapping) -> Option<Node> {
  let type_raw = y_str(y_map_get(map, "type")).to_lowercase();
  let name = y_str(y_map_get(map, "name"));
  let server = y_str(y_map_get(map, "server"));
  let port = y_u16(y_map_get(map, "port"))?;
  if server.is_empty() {
    return None;
  }

  match type_raw.as_str() {
    "ss" | "shadowsocks" => {
      let cipher = y_str(y_map_get(map, "cipher").or_else(|| y_map_get(map, "method")));
      let password = y_str(y_map_get(map, "password"));
      Some(Node::shadowsocks(&name, &server, port, &cipher, &password))
    }
    "vmess" => {
      let path = y_str(y_map_get(map, "ws-path").or_else(|| y_path(map, &["ws-opts", "path"])));
      let host = y_str(
        y_path(map, &["ws-headers", "Host"]).or_else(|| y_path(map, &["ws-opts", "headers", "Host"])),
      );
      let alter_id = match parse_alter_id(y_uint(y_map_get(map, "alterId"))) {
        Ok(a) => a,
        Err(raw) => {
          warn!(name = %name, alter_id = %raw, "skipping clash proxy with invalid alterId");
          return None;
        }
      };
      let params = VmessParams {
        uuid: y_str(y_map_get(map, "uuid")),
        alterId: alter_id,
        cipher: or_default(y_str(y_map_get(map, "cipher")), "auto"),
        network: or_default(y_str(y_map_get(map, "network")), "tcp"),
        tls: y_bool(y_map_get(map, "tls")).unwrap_or(false),
        path,
        host,
      };
      Some(Node::vmess(&name, &server, port, params))
    }
    other => {
      debug!(kind = other, name = %name, "skipping unsupported clash proxy type");
      None
    }
  }
}

fn clash_node_list(doc: &YamlValue) -> Option<&Vec<YamlValue>> {
  match doc {
    YamlValue::Mapping(m) => {
      for key in CLASH_LIST_KEYS {
        if let Some(v) = y_map_get(m, key) {
          debug!(key, "clash node list key");
          return v.as_sequence();
        }
      }
      let keys: Vec<String> = m.keys().map(|k| y_str(Some(k))).collect();
      warn!(?keys, "no proxy list key in clash document");
      None
    }
    YamlValue::Sequence(seq) => Some(seq),
    _ => None,
  }
}

/// Nodes of a parsed Clash document. Entries that are not mappings, lack a server or
/// port, or carry an unsupported `type` are skipped.
fn clash_nodes(doc: &YamlValue) -> Vec<Node> {
  let Some(list) = clash_node_list(doc) else {
    return vec![];
  };
  list
    .iter()
    .filter_map(|p| p.as_mapping())
    .filter_map(clash_proxy_to_node)
    .collect()
}

/// Clash YAML text to nodes; `None` when the text is not a structured YAML document.
pub fn parse_clash_document(yaml_text: &str) -> Option<Vec<Node>> {
  let doc = parse_structured_yaml(yaml_text)?;
  Some(clash_nodes(&doc))
}

fn json_str(v: Option<&JsonValue>) -> String {
  match v {
    Some(JsonValue::String(s)) => s.trim().to_string(),
    Some(JsonValue::Number(n)) => n.to_string(),
    _ => String::new(),
  }
}

fn json_port(v: Option<&JsonValue>) -> Option<u16> {
  json_uint(v).ok().flatten().and_then(port_from)
}

fn v2ray_outbound_nodes(ob: &JsonValue, out: &mut Vec<Node>) {
  let protocol = json_str(ob.get("protocol")).to_lowercase();
  let tag = json_str(ob.get("tag"));
  let settings = ob.get("settings");
  match protocol.as_str() {
    "vmess" => {
      let stream = ob.get("streamSettings");
      let network = or_default(json_str(stream.and_then(|s| s.get("network"))), "tcp");
      let tls = json_str(stream.and_then(|s| s.get("security"))) == "tls";
      let ws = stream.and_then(|s| s.get("wsSettings"));
      let path = json_str(ws.and_then(|w| w.get("path")));
      let host = json_str(ws.and_then(|w| w.get("headers")).and_then(|h| h.get("Host")));
      let vnext = settings.and_then(|s| s.get("vnext")).and_then(|v| v.as_array());
      for srv in vnext.into_iter().flatten() {
        let server = json_str(srv.get("address"));
        let Some(port) = json_port(srv.get("port")) else { continue };
        if server.is_empty() {
          continue;
        }
        let users = srv.get("users").and_then(|u| u.as_array());
        for user in users.into_iter().flatten() {
          let alter_id = match parse_alter_id(json_uint(user.get("alterId"))) {
            Ok(a) => a,
            Err(raw) => {
              warn!(tag = %tag, alter_id = %raw, "skipping v2ray user with invalid alterId");
              continue;
            }
          };
          let params = VmessParams {
            uuid: json_str(user.get("id")),
            alterId: alter_id,
            cipher: or_default(json_str(user.get("security")), "auto"),
            network: network.clone(),
            tls,
            path: path.clone(),
            host: host.clone(),
          };
          out.push(Node::vmess(&tag, &server, port, params));
        }
      }
    }
    "shadowsocks" => {
      let servers = settings.and_then(|s| s.get("servers")).and_then(|v| v.as_array());
      for srv in servers.into_iter().flatten() {
        let server = json_str(srv.get("address"));
        let Some(port) = json_port(srv.get("port")) else { continue };
        if server.is_empty() {
          continue;
        }
        out.push(Node::shadowsocks(
          &tag,
          &server,
          port,
          &json_str(srv.get("method")),
          &json_str(srv.get("password")),
        ));
      }
    }
    other => debug!(protocol = other, "skipping v2ray outbound"),
  }
}

/// Nodes from the `outbounds` of a V2Ray JSON config; `None` when the text is not one.
pub fn parse_v2ray_document(json_text: &str) -> Option<Vec<Node>> {
  let doc = parse_v2ray_json(json_text)?;
  let mut out = Vec::new();
  let outbounds = doc.get("outbounds").and_then(|v| v.as_array());
  for ob in outbounds.into_iter().flatten() {
    v2ray_outbound_nodes(ob, &mut out);
  }
  Some(out)
}

/// Salvage path: optional whole-text Base64 unwrap, then one URI per line. Lines that
/// fail to decode are dropped; order is preserved.
pub fn parse_line_batch(text: &str) -> Vec<Node> {
  let (body, unwrapped) = b64::unwrap_optional(text.trim());
  if unwrapped {
    debug!(decoded_len = body.len(), "base64 unwrapped subscription body");
  }
  let lines: Vec<&str> = body.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
  debug!(lines = lines.len(), "scanning uri lines");
  lines.into_iter().filter_map(parse_uri_line).collect()
}

/// Decodes `text` according to a previously detected tag. Never fails: whatever subset
/// parses is returned.
pub fn decode(text: &str, tag: FormatTag) -> Vec<Node> {
  if let Some(s) = tag.scheme() {
    debug!(scheme = s.prefix(), "line oriented subscription");
  }
  let (nodes, used) = match tag {
    FormatTag::ClashYaml => match parse_clash_document(text.trim()) {
      Some(nodes) => (nodes, tag),
      None => {
        warn!("clash document did not parse, retrying as uri lines");
        (parse_line_batch(text), FormatTag::TextUri)
      }
    },
    FormatTag::V2rayJson => match parse_v2ray_document(text.trim()) {
      Some(nodes) => (nodes, tag),
      None => {
        warn!("v2ray document did not parse, retrying as uri lines");
        (parse_line_batch(text), FormatTag::TextUri)
      }
    },
    FormatTag::ShadowsocksUri
    | FormatTag::VmessUri
    | FormatTag::TrojanUri
    | FormatTag::Base64UriList(_)
    | FormatTag::TextUri
    | FormatTag::Unknown => (parse_line_batch(text), tag),
  };
  info!(format = %used, count = nodes.len(), "decoded nodes");
  nodes
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::detect::detect;
  use crate::node::{Kind, Proto};

  const CLASH: &str = r#"
port: 7890
proxies:
  - name: "HK 01"
    type: ss
    server: hk.example
    port: 8388
    cipher: aes-256-gcm
    password: pw
  - name: "JP ws"
    type: vmess
    server: jp.example
    port: "443"
    uuid: 11111111-2222-3333-4444-555555555555
    alterId: 0
    cipher: auto
    network: ws
    tls: true
    ws-opts:
      path: /ray
      headers:
        Host: cdn.example
  - name: "TR"
    type: trojan
    server: tr.example
    port: 443
    password: x
  - name: "no port"
    type: ss
    server: bad.example
"#;

  #[test]
  fn clash_document_maps_supported_types_in_order() {
    let nodes = parse_clash_document(CLASH).unwrap();
    assert_eq!(nodes.len(), 2);
    assert_eq!(nodes[0].name, "HK 01");
    assert_eq!(nodes[0].kind(), Kind::Shadowsocks);
    assert_eq!(nodes[1].port, 443);
    let Proto::Vmess(p) = &nodes[1].proto else { panic!("not vmess") };
    assert!(p.tls);
    assert_eq!(p.network, "ws");
    assert_eq!(p.path, "/ray");
    assert_eq!(p.host, "cdn.example");
  }

  #[test]
  fn clash_legacy_ws_fields() {
    let y = "Proxy:\n  - {name: a, type: vmess, server: s, port: 1, uuid: u, ws-path: /p, ws-headers: {Host: h}}\n";
    let nodes = parse_clash_document(y).unwrap();
    assert_eq!(nodes.len(), 1);
    let Proto::Vmess(p) = &nodes[0].proto else { panic!("not vmess") };
    assert_eq!((p.path.as_str(), p.host.as_str()), ("/p", "h"));
    assert_eq!(p.cipher, "auto");
  }

  #[test]
  fn clash_shadowsocks_alias_with_method_and_string_port() {
    let y = "proxies:\n  - {name: alias, type: Shadowsocks, server: s.example, port: '8388', method: aes-128-gcm, password: pw}\n";
    let nodes = parse_clash_document(y).unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].kind(), Kind::Shadowsocks);
    assert_eq!(nodes[0].port, 8388);
    let Proto::Shadowsocks(p) = &nodes[0].proto else { panic!("not ss") };
    assert_eq!(p.cipher, "aes-128-gcm");
    assert_eq!(p.password, "pw");
  }

  #[test]
  fn clash_alter_id_as_float_or_invalid() {
    let y = "proxies:\n  - {name: f, type: vmess, server: s, port: 443.0, uuid: u, alterId: 2.0}\n  - {name: bad, type: vmess, server: s, port: 443, uuid: u, alterId: 2.5}\n  - {name: none, type: vmess, server: s, port: 443, uuid: u}\n";
    let nodes = parse_clash_document(y).unwrap();
    let names: Vec<&str> = nodes.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["f", "none"]);
    assert_eq!(nodes[0].port, 443);
    let Proto::Vmess(p) = &nodes[0].proto else { panic!("not vmess") };
    assert_eq!(p.alterId, 2);
    let Proto::Vmess(p) = &nodes[1].proto else { panic!("not vmess") };
    assert_eq!(p.alterId, 0);
  }

  #[test]
  fn clash_top_level_sequence() {
    let y = "- {name: a, type: ss, server: s, port: 1, cipher: m, password: p}\n";
    assert_eq!(parse_clash_document(y).unwrap().len(), 1);
  }

  #[test]
  fn clash_empty_proxies_is_zero_nodes() {
    let y = "proxies: []\nrules:\n  - MATCH,DIRECT\n";
    assert_eq!(detect(y), FormatTag::ClashYaml);
    assert!(decode(y, FormatTag::ClashYaml).is_empty());
  }

  #[test]
  fn clash_parse_failure_falls_back_to_lines() {
    let text = "ss://m:p@h.example:1#a\nmode: [";
    assert!(parse_clash_document(text).is_none());
    let nodes = decode(text, FormatTag::ClashYaml);
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].name, "a");
  }

  #[test]
  fn v2ray_outbounds() {
    let j = r#"{
      "outbounds": [
        {"tag": "proxy", "protocol": "vmess",
         "settings": {"vnext": [{"address": "v.example", "port": 443,
           "users": [{"id": "u", "alterId": 0, "security": "auto"}]}]},
         "streamSettings": {"network": "ws", "security": "tls",
           "wsSettings": {"path": "/ws", "headers": {"Host": "v.example"}}}},
        {"tag": "ss-out", "protocol": "shadowsocks",
         "settings": {"servers": [{"address": "s.example", "port": 8388,
           "method": "aes-128-gcm", "password": "pw"}]}},
        {"tag": "direct", "protocol": "freedom"}
      ]
    }"#;
    assert_eq!(detect(j), FormatTag::V2rayJson);
    let nodes = decode(j, FormatTag::V2rayJson);
    assert_eq!(nodes.len(), 2);
    assert_eq!(nodes[0].name, "proxy");
    let Proto::Vmess(p) = &nodes[0].proto else { panic!("not vmess") };
    assert!(p.tls);
    assert_eq!(p.path, "/ws");
    assert_eq!(nodes[1].kind(), Kind::Shadowsocks);
    assert_eq!(nodes[1].server, "s.example");
  }

  #[test]
  fn v2ray_alter_id_as_float_or_invalid() {
    let j = r#"{"outbounds": [{"tag": "v", "protocol": "vmess",
      "settings": {"vnext": [{"address": "v.example", "port": 443.0,
        "users": [{"id": "a", "alterId": 4.0}, {"id": "b", "alterId": "x"}, {"id": "c"}]}]}}]}"#;
    let nodes = parse_v2ray_document(j).unwrap();
    let ids: Vec<(String, u32)> = nodes
      .iter()
      .map(|n| match &n.proto {
        Proto::Vmess(p) => (p.uuid.clone(), p.alterId),
        other => panic!("unexpected {other:?}"),
      })
      .collect();
    assert_eq!(ids, vec![("a".to_string(), 4), ("c".to_string(), 0)]);
    assert_eq!(nodes[0].port, 443);
  }

  #[test]
  fn v2ray_parse_failure_falls_back_to_lines() {
    let text = "ss://m:p@h.example:1#salvaged\nvmess://!!!";
    assert!(parse_v2ray_document(text).is_none());
    let nodes = decode(text, FormatTag::V2rayJson);
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].name, "salvaged");
  }

  #[test]
  fn batch_keeps_valid_lines_in_order() {
    let text = [
      "ss://aes-128-gcm:a@one.example:1#one",
      "ss://garbage",
      "",
      "trojan://pw@t.example:443",
      "ss://aes-128-gcm:b@two.example:2#two",
      "vmess://!!!",
      "ss://aes-128-gcm:c@three.example:notaport",
      "ss://aes-128-gcm:d@four.example:4#four",
    ]
    .join("\n");
    let names: Vec<String> = parse_line_batch(&text).into_iter().map(|n| n.name).collect();
    assert_eq!(names, vec!["one", "two", "four"]);
  }

  #[test]
  fn batch_unwraps_base64_blob() {
    let inner = "ss://YWVzLTI1Ni1nY206cGFzczEyMw==@example.com:8388#MyNode\r\n";
    let blob = b64::encode(inner);
    let nodes = decode(&blob, detect(&blob));
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].server, "example.com");
  }

  #[test]
  fn unknown_garbage_yields_nothing() {
    assert!(decode("hello world", FormatTag::Unknown).is_empty());
    assert!(decode("", FormatTag::Unknown).is_empty());
  }
}
