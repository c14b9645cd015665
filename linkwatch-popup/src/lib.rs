//! Popup view: renders the persisted scan results into status blocks.
//!
//! Reads the store only. Never touches the coordinator's cache or limiter.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use linkwatch_core::error::ScanError;
use linkwatch_core::provider::UrlReport;
use linkwatch_core::store::{JsonFileStore, PageScan, ResourceScan, ResultStore, StoredResults};
use linkwatch_core::types::Severity;

pub const MSG_READ_FAILED: &str = "Error retrieving scan results. Please try again.";
pub const MSG_NO_RESULTS: &str = "No scan results available";
pub const MSG_PAGE_NOT_SCANNED: &str = "This URL hasn't been scanned yet.";
pub const MSG_PAGE_SAFE: &str = "This site appears to be safe.";
pub const MSG_RESOURCE_NOT_SCANNED: &str = "This resource hasn't been scanned yet.";
pub const MSG_RESOURCE_SAFE: &str = "This resource appears to be safe.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusBlock {
  pub class: Severity,
  pub message: String,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub details: Vec<String>,
}

impl StatusBlock {
  fn notice(message: &str) -> Self {
    Self {
      class: Severity::Warning,
      message: message.to_string(),
      details: Vec::new(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PopupView {
  pub page: StatusBlock,
  pub resources: Vec<StatusBlock>,
}

pub fn load(results_path: &Path) -> PopupView {
  let store = JsonFileStore::new(results_path.to_path_buf());
  render(store.read_all())
}

/// A failed read degrades to one generic message.
pub fn render(snapshot: Result<StoredResults, ScanError>) -> PopupView {
  let results = match snapshot {
    Ok(results) => results,
    Err(e) => {
      tracing::error!(error = %e, "failed to read scan results");
      return PopupView {
        page: StatusBlock::notice(MSG_READ_FAILED),
        resources: Vec::new(),
      };
    }
  };

  let page = match &results.page {
    Some(scan) => page_block(scan),
    None => StatusBlock::notice(MSG_NO_RESULTS),
  };
  let resources = results
    .resources
    .iter()
    .map(|(url, scan)| resource_block(url, scan))
    .collect();

  PopupView { page, resources }
}

fn page_block(scan: &PageScan) -> StatusBlock {
  if scan.data.is_not_yet_scanned() {
    return StatusBlock::notice(MSG_PAGE_NOT_SCANNED);
  }
  let (positives, total) = counts(&scan.data);
  let message = if positives > 0 {
    format!("Warning: {positives} out of {total} security vendors flagged this site as malicious.")
  } else {
    MSG_PAGE_SAFE.to_string()
  };

  let mut details = vec![format!("Scanned URL: {}", scan.url)];
  details.extend(report_extras(&scan.data));
  StatusBlock {
    class: Severity::from_detections(positives),
    message,
    details,
  }
}

fn resource_block(url: &str, scan: &ResourceScan) -> StatusBlock {
  let mut details = vec![format!("Resource URL: {url}")];
  if let Some(kind) = scan.kind {
    details.push(format!("Type: {kind}"));
  }

  if scan.data.is_not_yet_scanned() {
    return StatusBlock {
      class: Severity::Warning,
      message: MSG_RESOURCE_NOT_SCANNED.to_string(),
      details,
    };
  }

  let (positives, total) = counts(&scan.data);
  let message = if positives > 0 {
    format!(
      "Warning: {positives} out of {total} security vendors flagged this resource as malicious."
    )
  } else {
    MSG_RESOURCE_SAFE.to_string()
  };
  details.extend(report_extras(&scan.data));
  StatusBlock {
    class: Severity::from_detections(positives),
    message,
    details,
  }
}

fn counts(report: &UrlReport) -> (u32, u32) {
  (report.positives.unwrap_or(0), report.total.unwrap_or(0))
}

fn report_extras(report: &UrlReport) -> Vec<String> {
  let mut out = Vec::new();
  if let Some(date) = &report.scan_date {
    out.push(format!("Scan date: {date}"));
  }
  if let Some(link) = &report.permalink {
    out.push(format!("Full report: {link}"));
  }
  out
}

impl fmt::Display for StatusBlock {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "[{}] {}", self.class.as_str(), self.message)?;
    for line in &self.details {
      writeln!(f, "    {line}")?;
    }
    Ok(())
  }
}

impl fmt::Display for PopupView {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.page)?;
    if !self.resources.is_empty() {
      writeln!(f)?;
      writeln!(f, "Resources ({}):", self.resources.len())?;
      for block in &self.resources {
        write!(f, "{block}")?;
      }
    }
    Ok(())
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupArgs {
  pub results: Option<PathBuf>,
  pub json: bool,
}

impl PopupArgs {
  pub fn from_args(args: &[String]) -> anyhow::Result<Self> {
    let mut results = None;
    if let Some(i) = args.iter().position(|a| a == "--results") {
      let path = args
        .get(i + 1)
        .ok_or_else(|| anyhow::anyhow!("expected: --results <path-to-results.json>"))?;
      results = Some(PathBuf::from(path));
    }
    Ok(Self {
      results,
      json: args.iter().any(|a| a == "--json"),
    })
  }
}
