use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
  /// Provider unreachable, non-success status, or quota exhausted.
  #[error("transport error: {message}")]
  Transport {
    message: String,
    #[source]
    source: Option<reqwest::Error>,
  },

  #[error("parse error: {0}")]
  Parse(String),

  #[error("storage error: {message}")]
  Storage {
    message: String,
    #[source]
    source: Option<std::io::Error>,
  },

  #[error("configuration error: {0}")]
  Config(String),
}

impl ScanError {
  pub fn transport(message: impl Into<String>) -> Self {
    Self::Transport {
      message: message.into(),
      source: None,
    }
  }

  pub fn storage(message: impl Into<String>, source: std::io::Error) -> Self {
    Self::Storage {
      message: message.into(),
      source: Some(source),
    }
  }

  /// Failures that abandon a scan attempt rather than surface to the caller.
  pub fn abandons_attempt(&self) -> bool {
    matches!(self, Self::Transport { .. } | Self::Parse(_))
  }
}

impl From<reqwest::Error> for ScanError {
  fn from(e: reqwest::Error) -> Self {
    // reqwest's Display can include the full request URL, and ours carries the key.
    let e = e.without_url();
    Self::Transport {
      message: e.to_string(),
      source: Some(e),
    }
  }
}
