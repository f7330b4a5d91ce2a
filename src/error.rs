use thiserror::Error;

/// Why a single `ss://` or `vmess://` token was rejected. Never fatal to a batch.
#[derive(Debug, Error)]
pub enum DecodeError {
  #[error("token does not start with {0}")]
  MissingPrefix(&'static str),
  #[error("missing '{sep}' in {part}")]
  MissingSeparator { sep: char, part: &'static str },
  #[error("invalid port: {0:?}")]
  InvalidPort(String),
  #[error("payload is not valid base64 text")]
  Base64,
  #[error("payload is not a JSON object: {0}")]
  Json(#[from] serde_json::Error),
  #[error("invalid {0}: {1:?}")]
  InvalidField(&'static str, String),
  #[error("missing required field: {0}")]
  MissingField(&'static str),
}

#[derive(Debug, Error)]
pub enum EncodeError {
  #[error("yaml serialization failed: {0}")]
  Yaml(#[from] serde_yaml::Error),
  #[error("json serialization failed: {0}")]
  Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConvertError {
  #[error("no nodes found in subscription (detected format: {0})")]
  NoNodes(String),
}
