use crate::b64;
use crate::detect::UriScheme;
use crate::error::DecodeError;
use crate::node::{parse_port, port_from, whole_number, Node, VmessParams};
use percent_encoding::percent_decode_str;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

fn percent_decode_to_string(s: &str) -> String {
  match percent_decode_str(s).decode_utf8() {
    Ok(cow) => cow.to_string(),
    Err(_) => s.to_string(),
  }
}

fn json_get_str(obj: &JsonValue, key: &str) -> String {
  let v = obj.get(key);
  if let Some(s) = v.and_then(|x| x.as_str()) {
    return s.trim().to_string();
  }
  if let Some(n) = v.and_then(|x| x.as_i64()) {
    return n.to_string();
  }
  if let Some(b) = v.and_then(|x| x.as_bool()) {
    return if b { "true".to_string() } else { "false".to_string() };
  }
  String::new()
}

/// Integer field sent as a number, a whole float or a numeric string. `Ok(None)` when
/// the key is absent, null or blank; `Err` carries the offending raw value.
pub(crate) fn json_uint(v: Option<&JsonValue>) -> Result<Option<u64>, String> {
  match v {
    None | Some(JsonValue::Null) => Ok(None),
    Some(JsonValue::String(s)) if s.trim().is_empty() => Ok(None),
    Some(JsonValue::String(s)) => s.trim().parse::<u64>().map(Some).map_err(|_| s.clone()),
    Some(JsonValue::Number(n)) => n
      .as_u64()
      .or_else(|| n.as_f64().and_then(whole_number))
      .map(Some)
      .ok_or_else(|| n.to_string()),
    Some(other) => Err(other.to_string()),
  }
}

fn json_or_default(obj: &JsonValue, key: &str, default: &str) -> String {
  let s = json_get_str(obj, key);
  if s.is_empty() {
    default.to_string()
  } else {
    s
  }
}

/// `ss://[base64(]method:password@server:port[)][#name]`, plus the SIP002 form where
/// only `method:password` is Base64.
pub fn parse_ss_uri(token: &str) -> Result<Node, DecodeError> {
  let raw = token.trim();
  let body = raw
    .strip_prefix(UriScheme::Shadowsocks.prefix())
    .ok_or(DecodeError::MissingPrefix(UriScheme::Shadowsocks.prefix()))?;

  let (body, name) = match body.split_once('#') {
    Some((b, frag)) => (b, percent_decode_to_string(frag)),
    None => (body, String::new()),
  };

  let (plain, _) = b64::unwrap_optional(body);

  let (auth, server_part) = plain.split_once('@').ok_or(DecodeError::MissingSeparator {
    sep: '@',
    part: "ss body",
  })?;

  let (cipher, password) = match auth.split_once(':') {
    Some((c, p)) => (c.to_string(), p.to_string()),
    None => {
      let decoded = b64::decode_to_utf8(auth).ok_or(DecodeError::MissingSeparator {
        sep: ':',
        part: "ss credentials",
      })?;
      let (c, p) = decoded.split_once(':').ok_or(DecodeError::MissingSeparator {
        sep: ':',
        part: "ss credentials",
      })?;
      (c.to_string(), p.to_string())
    }
  };

  // plugin query and SIP002 trailing slash
  let server_part = server_part.split('?').next().unwrap_or("").trim().trim_end_matches('/');
  let (server, port_raw) = server_part.split_once(':').ok_or(DecodeError::MissingSeparator {
    sep: ':',
    part: "ss server",
  })?;
  let server = server.trim();
  if server.is_empty() {
    return Err(DecodeError::MissingField("server"));
  }
  let port = parse_port(port_raw).ok_or_else(|| DecodeError::InvalidPort(port_raw.to_string()))?;

  Ok(Node::shadowsocks(&name, server, port, &cipher, &password))
}

/// `vmess://base64(json)` in the v2rayN "v2" shape.
pub fn parse_vmess_uri(token: &str) -> Result<Node, DecodeError> {
  let raw = token.trim();
  let body = raw
    .strip_prefix(UriScheme::Vmess.prefix())
    .ok_or(DecodeError::MissingPrefix(UriScheme::Vmess.prefix()))?;
  let json_text = b64::decode_to_utf8(body).ok_or(DecodeError::Base64)?;
  let obj: JsonValue = serde_json::from_str(&json_text)?;
  if !obj.is_object() {
    return Err(DecodeError::MissingField("add"));
  }

  let server = json_get_str(&obj, "add");
  if server.is_empty() {
    return Err(DecodeError::MissingField("add"));
  }
  let port = match json_uint(obj.get("port")).map_err(DecodeError::InvalidPort)? {
    None => 443,
    Some(p) => port_from(p).ok_or_else(|| DecodeError::InvalidPort(p.to_string()))?,
  };
  let alter_id = match json_uint(obj.get("aid")).map_err(|raw| DecodeError::InvalidField("aid", raw))? {
    None => 0,
    Some(a) => u32::try_from(a).map_err(|_| DecodeError::InvalidField("aid", a.to_string()))?,
  };

  let params = VmessParams {
    uuid: json_get_str(&obj, "id"),
    alterId: alter_id,
    cipher: json_or_default(&obj, "scy", "auto"),
    network: json_or_default(&obj, "net", "tcp"),
    tls: json_get_str(&obj, "tls") == "tls",
    path: json_get_str(&obj, "path"),
    host: json_get_str(&obj, "host"),
  };
  Ok(Node::vmess(&json_get_str(&obj, "ps"), &server, port, params))
}

/// Dispatches one subscription line by prefix. `None` for blank, unsupported or
/// malformed lines; the reason is logged.
pub fn parse_uri_line(line: &str) -> Option<Node> {
  let s = line.trim();
  let res = match UriScheme::of_line(s)? {
    UriScheme::Shadowsocks => parse_ss_uri(s),
    UriScheme::Vmess => parse_vmess_uri(s),
    UriScheme::Trojan => {
      warn!("trojan node found but not supported yet, skipping");
      return None;
    }
  };
  match res {
    Ok(node) => {
      debug!(name = %node.name, kind = %node.kind(), "decoded node");
      Some(node)
    }
    Err(e) => {
      let head: String = s.chars().take(50).collect();
      warn!(error = %e, line = %head, "skipping malformed link");
      None
    }
  }
}
