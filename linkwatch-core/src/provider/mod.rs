//! The external reputation service, seen only through its two calls.

use serde::{Deserialize, Serialize};

use crate::error::ScanError;

pub mod virustotal;

pub use virustotal::VirusTotalClient;

/// `response_code` values of the v2 URL report.
pub const RESPONSE_PRESENT: i64 = 1;
pub const RESPONSE_NOT_PRESENT: i64 = 0;
pub const RESPONSE_QUEUED: i64 = -2;

/// Report body as returned by the provider and as persisted under `data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlReport {
  pub response_code: i64,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub positives: Option<u32>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub total: Option<u32>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub scan_id: Option<String>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub scan_date: Option<String>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub permalink: Option<String>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub verbose_msg: Option<String>,
}

impl UrlReport {
  pub fn not_present() -> Self {
    Self {
      response_code: RESPONSE_NOT_PRESENT,
      positives: None,
      total: None,
      scan_id: None,
      scan_date: None,
      permalink: None,
      verbose_msg: None,
    }
  }

  pub fn completed(positives: u32, total: u32) -> Self {
    Self {
      response_code: RESPONSE_PRESENT,
      positives: Some(positives),
      total: Some(total),
      ..Self::not_present()
    }
  }

  pub fn is_not_yet_scanned(&self) -> bool {
    self.response_code == RESPONSE_NOT_PRESENT || self.response_code == RESPONSE_QUEUED
  }
}

/// Acknowledgement of a submit. Nothing in it is needed to reach a verdict.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitAck {
  #[serde(default)]
  pub response_code: Option<i64>,
  #[serde(default)]
  pub scan_id: Option<String>,
  #[serde(default)]
  pub verbose_msg: Option<String>,
}

/// Parses a report body; anything that is not a report object is a `Parse` error.
pub fn parse_report(body: &str) -> Result<UrlReport, ScanError> {
  serde_json::from_str(body).map_err(|e| ScanError::Parse(format!("report body: {e}")))
}

pub fn parse_submit_ack(body: &str) -> Result<SubmitAck, ScanError> {
  serde_json::from_str(body).map_err(|e| ScanError::Parse(format!("submit body: {e}")))
}

/// The scanning service. Implementations are driven from a single thread, so
/// futures need not be `Send`.
#[allow(async_fn_in_trait)]
pub trait ScanProvider {
  fn name(&self) -> &'static str;

  /// Queue `url` for analysis.
  async fn submit(&self, url: &str) -> Result<SubmitAck, ScanError>;

  /// Fetch whatever report currently exists for `url`.
  async fn report(&self, url: &str) -> Result<UrlReport, ScanError>;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn report_with_counts_parses() {
    let r = parse_report(
      r#"{"response_code":1,"positives":5,"total":60,"scan_date":"2024-01-01 00:00:00","permalink":"https://example.invalid/p","scans":{"Engine":{"detected":true}}}"#,
    )
    .unwrap();
    assert_eq!(r.positives, Some(5));
    assert_eq!(r.total, Some(60));
    assert_eq!(r.permalink.as_deref(), Some("https://example.invalid/p"));
    assert!(!r.is_not_yet_scanned());
  }

  #[test]
  fn not_present_and_queued_read_as_not_yet_scanned() {
    let r = parse_report(r#"{"response_code":0,"verbose_msg":"Resource does not exist"}"#).unwrap();
    assert!(r.is_not_yet_scanned());
    let r = parse_report(r#"{"response_code":-2}"#).unwrap();
    assert!(r.is_not_yet_scanned());
  }

  #[test]
  fn garbage_body_is_parse_error() {
    assert!(matches!(parse_report(""), Err(ScanError::Parse(_))));
    assert!(matches!(parse_report("<html>"), Err(ScanError::Parse(_))));
    assert!(matches!(parse_report(r#"{"positives":1}"#), Err(ScanError::Parse(_))));
  }

  #[test]
  fn persisted_form_omits_absent_fields() {
    let json = serde_json::to_string(&UrlReport::not_present()).unwrap();
    assert_eq!(json, r#"{"response_code":0}"#);
  }
}
