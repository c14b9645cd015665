//! Durable results shared with the popup view.
//!
//! The document is a flat key-value object. Only `scanResult` (latest page
//! scan) and `resourceScans` (url -> scan, never evicted) are owned here;
//! any other top-level keys are preserved on write.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::ScanError;
use crate::provider::UrlReport;
use crate::types::ResourceKind;

pub const PAGE_KEY: &str = "scanResult";
pub const RESOURCES_KEY: &str = "resourceScans";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageScan {
  pub url: String,
  pub data: UrlReport,
  #[serde(default)]
  pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceScan {
  pub data: UrlReport,
  pub timestamp: u64,
  #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
  pub kind: Option<ResourceKind>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResults {
  #[serde(rename = "scanResult", default, skip_serializing_if = "Option::is_none")]
  pub page: Option<PageScan>,
  #[serde(rename = "resourceScans", default)]
  pub resources: BTreeMap<String, ResourceScan>,
}

pub trait ResultStore {
  /// Replaces the single page slot.
  fn write_page(&self, scan: &PageScan) -> Result<(), ScanError>;

  /// Adds or overwrites one entry of the resource map, keeping all others.
  fn write_resource(&self, url: &str, scan: &ResourceScan) -> Result<(), ScanError>;

  fn read_all(&self) -> Result<StoredResults, ScanError>;
}

/// JSON document on disk, replaced atomically on each write.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
  path: PathBuf,
}

impl JsonFileStore {
  pub fn new(path: PathBuf) -> Self {
    Self { path }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn read_document(&self) -> Result<Map<String, Value>, ScanError> {
    let raw = match fs::read_to_string(&self.path) {
      Ok(raw) => raw,
      Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Map::new()),
      Err(e) => {
        return Err(ScanError::storage(
          format!("read {}", self.path.display()),
          e,
        ))
      }
    };
    if raw.trim().is_empty() {
      return Ok(Map::new());
    }
    serde_json::from_str(&raw).map_err(|e| ScanError::Storage {
      message: format!("parse {}: {e}", self.path.display()),
      source: None,
    })
  }

  fn write_document(&self, doc: &Map<String, Value>) -> Result<(), ScanError> {
    let raw = serde_json::to_string_pretty(doc).map_err(|e| ScanError::Storage {
      message: format!("encode results: {e}"),
      source: None,
    })?;
    write_atomic(&self.path, &raw)
  }
}

impl ResultStore for JsonFileStore {
  fn write_page(&self, scan: &PageScan) -> Result<(), ScanError> {
    let mut doc = self.read_document()?;
    doc.insert(PAGE_KEY.to_string(), to_value(scan)?);
    self.write_document(&doc)
  }

  fn write_resource(&self, url: &str, scan: &ResourceScan) -> Result<(), ScanError> {
    let mut doc = self.read_document()?;
    let resources = doc
      .entry(RESOURCES_KEY.to_string())
      .or_insert_with(|| Value::Object(Map::new()));
    if !resources.is_object() {
      *resources = Value::Object(Map::new());
    }
    if let Value::Object(map) = resources {
      map.insert(url.to_string(), to_value(scan)?);
    }
    self.write_document(&doc)
  }

  fn read_all(&self) -> Result<StoredResults, ScanError> {
    let doc = self.read_document()?;
    serde_json::from_value(Value::Object(doc)).map_err(|e| ScanError::Storage {
      message: format!("decode {}: {e}", self.path.display()),
      source: None,
    })
  }
}

fn to_value<T: Serialize>(v: &T) -> Result<Value, ScanError> {
  serde_json::to_value(v).map_err(|e| ScanError::Storage {
    message: format!("encode record: {e}"),
    source: None,
  })
}

fn write_atomic(path: &Path, contents: &str) -> Result<(), ScanError> {
  let parent = path.parent().ok_or_else(|| ScanError::Storage {
    message: format!("file path has no parent: {}", path.display()),
    source: None,
  })?;
  fs::create_dir_all(parent)
    .map_err(|e| ScanError::storage(format!("create {}", parent.display()), e))?;

  let tmp = parent.join(format!(
    ".{}.tmp",
    path.file_name().unwrap_or_default().to_string_lossy()
  ));
  fs::write(&tmp, contents)
    .map_err(|e| ScanError::storage(format!("write {}", tmp.display()), e))?;
  fs::rename(&tmp, path).map_err(|e| {
    ScanError::storage(format!("rename {} -> {}", tmp.display(), path.display()), e)
  })?;
  Ok(())
}
