//! In-process stand-ins for the provider, the host store, and the host UI.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use tokio::time::Instant;

use crate::error::ScanError;
use crate::presenter::{Badge, Notification, Presenter};
use crate::provider::{ScanProvider, SubmitAck, UrlReport};
use crate::store::{PageScan, ResourceScan, ResultStore, StoredResults};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
  Submit { url: String, at: Instant },
  Report { url: String, at: Instant },
}

impl ProviderCall {
  pub fn url(&self) -> &str {
    match self {
      Self::Submit { url, .. } | Self::Report { url, .. } => url,
    }
  }

  pub fn at(&self) -> Instant {
    match self {
      Self::Submit { at, .. } | Self::Report { at, .. } => *at,
    }
  }
}

#[derive(Debug, Default)]
struct FakeProviderState {
  reports: HashMap<String, UrlReport>,
  failing_submits: HashSet<String>,
  failing_reports: HashSet<String>,
  calls: Vec<ProviderCall>,
}

/// Answers from a table; unknown URLs come back clean (0/70).
#[derive(Debug, Clone, Default)]
pub struct FakeProvider {
  state: Rc<RefCell<FakeProviderState>>,
}

impl FakeProvider {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set_report(&self, url: &str, report: UrlReport) {
    self.state.borrow_mut().reports.insert(url.to_string(), report);
  }

  pub fn fail_submit(&self, url: &str) {
    self.state.borrow_mut().failing_submits.insert(url.to_string());
  }

  pub fn fail_report(&self, url: &str) {
    self.state.borrow_mut().failing_reports.insert(url.to_string());
  }

  pub fn calls(&self) -> Vec<ProviderCall> {
    self.state.borrow().calls.clone()
  }

  pub fn submit_times(&self) -> Vec<Instant> {
    self
      .calls()
      .into_iter()
      .filter(|c| matches!(c, ProviderCall::Submit { .. }))
      .map(|c| c.at())
      .collect()
  }

  pub fn submit_count(&self, url: &str) -> usize {
    self
      .calls()
      .iter()
      .filter(|c| matches!(c, ProviderCall::Submit { .. }) && c.url() == url)
      .count()
  }

  pub fn report_count(&self, url: &str) -> usize {
    self
      .calls()
      .iter()
      .filter(|c| matches!(c, ProviderCall::Report { .. }) && c.url() == url)
      .count()
  }
}

impl ScanProvider for FakeProvider {
  fn name(&self) -> &'static str {
    "fake"
  }

  async fn submit(&self, url: &str) -> Result<SubmitAck, ScanError> {
    let mut st = self.state.borrow_mut();
    st.calls.push(ProviderCall::Submit {
      url: url.to_string(),
      at: Instant::now(),
    });
    if st.failing_submits.contains(url) {
      return Err(ScanError::transport("connection refused"));
    }
    Ok(SubmitAck::default())
  }

  async fn report(&self, url: &str) -> Result<UrlReport, ScanError> {
    let mut st = self.state.borrow_mut();
    st.calls.push(ProviderCall::Report {
      url: url.to_string(),
      at: Instant::now(),
    });
    if st.failing_reports.contains(url) {
      return Err(ScanError::Parse("expected value at line 1 column 1".to_string()));
    }
    Ok(
      st.reports
        .get(url)
        .cloned()
        .unwrap_or_else(|| UrlReport::completed(0, 70)),
    )
  }
}

#[derive(Debug, Clone, Default)]
pub struct RecordingPresenter {
  badges: Rc<RefCell<Vec<Badge>>>,
  notifications: Rc<RefCell<Vec<Notification>>>,
}

impl RecordingPresenter {
  pub fn badges(&self) -> Vec<Badge> {
    self.badges.borrow().clone()
  }

  pub fn notifications(&self) -> Vec<Notification> {
    self.notifications.borrow().clone()
  }
}

impl Presenter for RecordingPresenter {
  fn set_badge(&self, badge: Badge) {
    self.badges.borrow_mut().push(badge);
  }

  fn notify(&self, notification: Notification) {
    self.notifications.borrow_mut().push(notification);
  }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
  results: Rc<RefCell<StoredResults>>,
  fail_writes: Rc<Cell<bool>>,
}

impl MemoryStore {
  pub fn failing() -> Self {
    let s = Self::default();
    s.fail_writes.set(true);
    s
  }

  pub fn snapshot(&self) -> StoredResults {
    self.results.borrow().clone()
  }

  fn check(&self) -> Result<(), ScanError> {
    if self.fail_writes.get() {
      return Err(ScanError::storage(
        "write results.json",
        std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
      ));
    }
    Ok(())
  }
}

impl ResultStore for MemoryStore {
  fn write_page(&self, scan: &PageScan) -> Result<(), ScanError> {
    self.check()?;
    self.results.borrow_mut().page = Some(scan.clone());
    Ok(())
  }

  fn write_resource(&self, url: &str, scan: &ResourceScan) -> Result<(), ScanError> {
    self.check()?;
    self
      .results
      .borrow_mut()
      .resources
      .insert(url.to_string(), scan.clone());
    Ok(())
  }

  fn read_all(&self) -> Result<StoredResults, ScanError> {
    Ok(self.snapshot())
  }
}
