use base64::engine::general_purpose;
use base64::Engine;

fn is_b64_char(c: char) -> bool {
  c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=' | '-' | '_')
}

/// Cheap pre-filter: non-empty and every non-whitespace char is in the (standard or
/// URL-safe) Base64 alphabet.
pub fn looks_like_base64(text: &str) -> bool {
  let s = text.trim();
  if s.is_empty() {
    return false;
  }
  s.chars().filter(|c| !c.is_whitespace()).all(is_b64_char)
}

/// Decodes Base64 into UTF-8 text. Whitespace is ignored and missing padding is
/// repaired. Returns `None` for bad Base64, non UTF-8 payloads or blank output.
pub fn decode_to_utf8(s: &str) -> Option<String> {
  let cleaned: String = s.chars().filter(|c| !c.is_whitespace()).collect();
  if cleaned.is_empty() {
    return None;
  }
  let mut candidates = Vec::with_capacity(2);
  candidates.push(cleaned.clone());
  let rem = cleaned.len() % 4;
  if rem != 0 {
    candidates.push(format!("{cleaned}{}", "=".repeat(4 - rem)));
  }

  for cand in candidates {
    for engine in [&general_purpose::STANDARD, &general_purpose::URL_SAFE] {
      if let Ok(bytes) = engine.decode(&cand) {
        if let Ok(txt) = String::from_utf8(bytes) {
          if !txt.trim().is_empty() {
            return Some(txt);
          }
        }
      }
    }
  }
  None
}

/// The "optionally wrapped" decode: when `text` passes the alphabet check and decodes,
/// the decoded text is returned, otherwise `text` itself.
pub fn unwrap_optional(text: &str) -> (String, bool) {
  if looks_like_base64(text) {
    if let Some(decoded) = decode_to_utf8(text) {
      return (decoded, true);
    }
  }
  (text.to_string(), false)
}

pub fn encode(text: &str) -> String {
  general_purpose::STANDARD.encode(text.as_bytes())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn alphabet_check_rejects_uri_text() {
    assert!(looks_like_base64("YWVzLTI1Ni1nY206cGFzczEyMw=="));
    assert!(looks_like_base64("YWJj\nZGVm\r\n"));
    assert!(!looks_like_base64("ss://abc@host:1"));
    assert!(!looks_like_base64("   "));
  }

  #[test]
  fn decodes_unpadded_and_url_safe() {
    assert_eq!(decode_to_utf8("YWVzLTI1Ni1nY206cGFzczEyMw").as_deref(), Some("aes-256-gcm:pass123"));
    // "??>" encodes to "Pz8-" in the URL-safe alphabet
    assert_eq!(decode_to_utf8("Pz8-").as_deref(), Some("??>"));
    assert_eq!(decode_to_utf8("YWJj\nZGVm").as_deref(), Some("abcdef"));
  }

  #[test]
  fn rejects_invalid_utf8_and_blank() {
    // 0xff 0xff 0xbd
    assert_eq!(decode_to_utf8("//79"), None);
    assert_eq!(decode_to_utf8("ICAg"), None);
    assert_eq!(decode_to_utf8(""), None);
  }

  #[test]
  fn optional_unwrap_falls_back_to_raw() {
    let wrapped = encode("ss://x@y:1");
    assert_eq!(unwrap_optional(&wrapped), ("ss://x@y:1".to_string(), true));
    assert_eq!(unwrap_optional("ss://x@y:1"), ("ss://x@y:1".to_string(), false));
  }
}
