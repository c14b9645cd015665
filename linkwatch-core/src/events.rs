//! Host events, one JSON object per line.

use serde::Deserialize;
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::types::{ResourceKind, ScanSubject};

pub const TAB_STATUS_COMPLETE: &str = "complete";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
  TabActivated {
    url: String,
  },
  TabUpdated {
    url: String,
    #[serde(default)]
    status: Option<String>,
  },
  ResourceLoaded {
    #[serde(rename = "type")]
    resource_type: String,
    url: String,
  },
}

impl HostEvent {
  /// The subject this event asks to scan, if any.
  pub fn into_subject(self) -> Option<ScanSubject> {
    let (url, kind) = match self {
      Self::TabActivated { url } => (url, ResourceKind::Page),
      Self::TabUpdated { url, status } => {
        if status.as_deref() != Some(TAB_STATUS_COMPLETE) {
          return None;
        }
        (url, ResourceKind::Page)
      }
      Self::ResourceLoaded { resource_type, url } => {
        (url, ResourceKind::from_request_type(&resource_type)?)
      }
    };
    if url.trim().is_empty() {
      return None;
    }
    Some(ScanSubject::new(url, kind))
  }
}

/// `Ok(None)` for blank lines.
pub fn parse_line(line: &str) -> Result<Option<HostEvent>, serde_json::Error> {
  let line = line.trim();
  if line.is_empty() {
    return Ok(None);
  }
  serde_json::from_str(line).map(Some)
}

/// Forwards every well-formed event from `reader` until EOF or until the receiver is gone.
/// Returns the number of events forwarded.
pub async fn pump<R>(reader: R, tx: mpsc::Sender<HostEvent>) -> std::io::Result<u64>
where
  R: AsyncBufRead + Unpin,
{
  let mut lines = reader.lines();
  let mut line_no: u64 = 0;
  let mut forwarded: u64 = 0;

  while let Some(line) = lines.next_line().await? {
    line_no += 1;
    match parse_line(&line) {
      Ok(Some(ev)) => {
        if tx.send(ev).await.is_err() {
          break;
        }
        forwarded += 1;
      }
      Ok(None) => {}
      Err(e) => {
        tracing::warn!(line = line_no, error = %e, "skipping malformed host event");
      }
    }
  }

  tracing::debug!(lines = line_no, forwarded, "event source closed");
  Ok(forwarded)
}

pub async fn pump_stdin(tx: mpsc::Sender<HostEvent>) -> std::io::Result<u64> {
  pump(BufReader::new(tokio::io::stdin()), tx).await
}

pub async fn pump_file(path: &Path, tx: mpsc::Sender<HostEvent>) -> std::io::Result<u64> {
  let file = tokio::fs::File::open(path).await?;
  tracing::info!(path = %path.display(), "replaying host events from file");
  pump(BufReader::new(file), tx).await
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tab_events_map_to_page_subjects() {
    let ev = parse_line(r#"{"event":"tab_activated","url":"https://example.com/"}"#)
      .unwrap()
      .unwrap();
    let s = ev.into_subject().unwrap();
    assert_eq!(s.kind, ResourceKind::Page);
    assert_eq!(s.url, "https://example.com/");

    let done = parse_line(r#"{"event":"tab_updated","url":"https://example.com/","status":"complete"}"#)
      .unwrap()
      .unwrap();
    assert!(done.into_subject().is_some());

    let loading = parse_line(r#"{"event":"tab_updated","url":"https://example.com/","status":"loading"}"#)
      .unwrap()
      .unwrap();
    assert!(loading.into_subject().is_none());
  }

  #[test]
  fn only_scannable_resource_types_yield_subjects() {
    for (ty, kind) in [
      ("script", Some(ResourceKind::Script)),
      ("xmlhttprequest", Some(ResourceKind::Xhr)),
      ("sub_frame", Some(ResourceKind::SubFrame)),
      ("font", None),
      ("main_frame", None),
      ("media", None),
    ] {
      let ev = HostEvent::ResourceLoaded {
        resource_type: ty.to_string(),
        url: "http://cdn.example/x".to_string(),
      };
      assert_eq!(ev.into_subject().map(|s| s.kind), kind, "{ty}");
    }
  }

  #[test]
  fn blank_url_and_blank_line_are_ignored() {
    assert!(parse_line("   ").unwrap().is_none());
    let ev = HostEvent::TabActivated { url: " ".to_string() };
    assert!(ev.into_subject().is_none());
  }

  #[test]
  fn unknown_event_is_an_error() {
    assert!(parse_line(r#"{"event":"window_closed"}"#).is_err());
    assert!(parse_line("not json").is_err());
  }

  #[tokio::test]
  async fn pump_skips_malformed_lines() {
    let input = concat!(
      "{\"event\":\"resource_loaded\",\"type\":\"script\",\"url\":\"http://a/1.js\"}\n",
      "garbage\n",
      "\n",
      "{\"event\":\"tab_activated\",\"url\":\"https://a/\"}\n",
    );
    let (tx, mut rx) = mpsc::channel(8);
    let n = pump(input.as_bytes(), tx).await.unwrap();
    assert_eq!(n, 2);

    assert!(matches!(rx.recv().await, Some(HostEvent::ResourceLoaded { .. })));
    assert!(matches!(rx.recv().await, Some(HostEvent::TabActivated { .. })));
    assert!(rx.recv().await.is_none());
  }

  #[tokio::test]
  async fn pump_file_reads_replay() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    std::fs::write(&path, "{\"event\":\"tab_activated\",\"url\":\"https://a/\"}\n").unwrap();

    let (tx, mut rx) = mpsc::channel(8);
    assert_eq!(pump_file(&path, tx).await.unwrap(), 1);
    assert!(rx.recv().await.is_some());
  }
}
