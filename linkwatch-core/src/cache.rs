//! In-memory verdict cache with staleness-on-read.
//!
//! Entries are never purged. A stale entry reads as a miss and stays in the
//! map until a fresh scan overwrites it, so memory grows with the number of
//! distinct subjects seen during the process lifetime.

use std::collections::HashMap;
use tokio::time::{Duration, Instant};

use crate::types::ScanRecord;

#[derive(Debug)]
pub struct VerdictCache {
  ttl: Duration,
  entries: HashMap<String, ScanRecord>,
}

impl VerdictCache {
  pub fn new(ttl: Duration) -> Self {
    Self {
      ttl,
      entries: HashMap::new(),
    }
  }

  /// Returns the record only if it exists and is still fresh at `now`.
  pub fn lookup(&self, url: &str, now: Instant) -> Option<&ScanRecord> {
    self
      .entries
      .get(url)
      .filter(|record| record.is_fresh(now, self.ttl))
  }

  /// Inserts or overwrites; freshness is measured from `record.fetched_at`.
  pub fn store(&mut self, record: ScanRecord) {
    self.entries.insert(record.subject.url.clone(), record);
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

/// The two independent maps: the active-tab page and everything it loaded.
#[derive(Debug)]
pub struct CacheStore {
  pub page: VerdictCache,
  pub resources: VerdictCache,
}

impl CacheStore {
  pub fn new(ttl: Duration) -> Self {
    Self {
      page: VerdictCache::new(ttl),
      resources: VerdictCache::new(ttl),
    }
  }

  pub fn for_page(&self, is_page: bool) -> &VerdictCache {
    if is_page {
      &self.page
    } else {
      &self.resources
    }
  }

  pub fn for_page_mut(&mut self, is_page: bool) -> &mut VerdictCache {
    if is_page {
      &mut self.page
    } else {
      &mut self.resources
    }
  }
}
