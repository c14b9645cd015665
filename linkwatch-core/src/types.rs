use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::{Duration, Instant};

use crate::provider::UrlReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
  Page,
  Script,
  Stylesheet,
  Image,
  Object,
  #[serde(alias = "xmlhttprequest")]
  Xhr,
  SubFrame,
}

impl ResourceKind {
  /// Maps a host request type to a scannable kind. Everything not listed is ignored.
  pub fn from_request_type(raw: &str) -> Option<Self> {
    match raw {
      "script" => Some(Self::Script),
      "stylesheet" => Some(Self::Stylesheet),
      "image" => Some(Self::Image),
      "object" => Some(Self::Object),
      "xmlhttprequest" | "xhr" => Some(Self::Xhr),
      "sub_frame" => Some(Self::SubFrame),
      _ => None,
    }
  }

  pub fn is_page(self) -> bool {
    self == Self::Page
  }

  /// Host-facing name, as it appears in notifications.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Page => "page",
      Self::Script => "script",
      Self::Stylesheet => "stylesheet",
      Self::Image => "image",
      Self::Object => "object",
      Self::Xhr => "xmlhttprequest",
      Self::SubFrame => "sub_frame",
    }
  }
}

impl fmt::Display for ResourceKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSubject {
  pub url: String,
  pub kind: ResourceKind,
  pub observed_at: Instant,
}

impl ScanSubject {
  pub fn new(url: impl Into<String>, kind: ResourceKind) -> Self {
    Self {
      url: url.into(),
      kind,
      observed_at: Instant::now(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  Safe,
  Warning,
  Danger,
}

impl Severity {
  pub fn from_detections(detection_count: u32) -> Self {
    match detection_count {
      0 => Self::Safe,
      1..=2 => Self::Warning,
      _ => Self::Danger,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Safe => "safe",
      Self::Warning => "warning",
      Self::Danger => "danger",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
  pub detection_count: u32,
  pub total_engines: u32,
  pub pending: bool,
}

impl Verdict {
  pub fn pending() -> Self {
    Self {
      detection_count: 0,
      total_engines: 0,
      pending: true,
    }
  }

  pub fn completed(detection_count: u32, total_engines: u32) -> Self {
    Self {
      detection_count,
      total_engines,
      pending: false,
    }
  }

  pub fn is_malicious(&self) -> bool {
    !self.pending && self.detection_count > 0
  }

  pub fn severity(&self) -> Severity {
    Severity::from_detections(self.detection_count)
  }
}

#[derive(Debug, Clone)]
pub struct ScanRecord {
  pub subject: ScanSubject,
  pub verdict: Verdict,
  pub report: UrlReport,
  pub fetched_at: Instant,
}

impl ScanRecord {
  pub fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
    now.saturating_duration_since(self.fetched_at) < ttl
  }
}

/// Drops the query string and fragment so tokens embedded in URLs stay out of logs.
pub fn redact_url_for_log(url: &str) -> String {
  let end = url.find(['?', '#']).unwrap_or(url.len());
  url[..end].to_string()
}

pub fn now_unix_ms() -> u64 {
  use std::time::{SystemTime, UNIX_EPOCH};
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .as_millis() as u64
}
