//! Owns the scan pipeline: cache check, rate-limit gate, deferral, execution,
//! persistence and presentation.
//!
//! Everything runs on one thread inside a `LocalSet`. Scans interleave at
//! their `.await` points; the limiter's check-and-set never crosses one.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;

use crate::attempt::{Attempt, AttemptState};
use crate::cache::CacheStore;
use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::events::HostEvent;
use crate::executor::{self, ScanOutcome};
use crate::presenter::{self, Presenter};
use crate::provider::{ScanProvider, UrlReport};
use crate::rate_limit::{Acquire, RateLimiter};
use crate::scheduler::{DeferOutcome, RetryQueue};
use crate::store::{PageScan, ResourceScan, ResultStore};
use crate::types::{now_unix_ms, redact_url_for_log, ResourceKind, ScanRecord, ScanSubject};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
  pub observed: u64,
  pub cache_hits: u64,
  pub deferred: u64,
  pub coalesced: u64,
  pub started: u64,
  pub resolved: u64,
  pub abandoned: u64,
}

/// What happened to an attempt when it reached the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
  CacheHit,
  Deferred,
  Coalesced,
  GaveUp,
  Started,
}

pub struct Coordinator<P, S, N> {
  provider: P,
  store: S,
  presenter: N,
  settings: ScanConfig,
  caches: RefCell<CacheStore>,
  limiter: RefCell<RateLimiter>,
  in_flight: Cell<usize>,
  settled: Notify,
  stats: Cell<CoordinatorStats>,
}

impl<P, S, N> Coordinator<P, S, N>
where
  P: ScanProvider + 'static,
  S: ResultStore + 'static,
  N: Presenter + 'static,
{
  pub fn new(provider: P, store: S, presenter: N, settings: ScanConfig) -> Rc<Self> {
    Rc::new(Self {
      caches: RefCell::new(CacheStore::new(settings.cache_ttl())),
      limiter: RefCell::new(RateLimiter::new(settings.rate_limit_window())),
      provider,
      store,
      presenter,
      settings,
      in_flight: Cell::new(0),
      settled: Notify::new(),
      stats: Cell::new(CoordinatorStats::default()),
    })
  }

  /// Retry queue configured from the same settings; the delay is one rate-limit window.
  pub fn retry_queue(&self) -> RetryQueue {
    RetryQueue::new(
      self.settings.rate_limit_window(),
      self.settings.retry_cap(),
      self.settings.dedupe_pending_retries,
    )
  }

  pub fn stats(&self) -> CoordinatorStats {
    self.stats.get()
  }

  pub fn in_flight(&self) -> usize {
    self.in_flight.get()
  }

  pub fn cached_record(&self, url: &str, kind: ResourceKind) -> Option<ScanRecord> {
    self
      .caches
      .borrow()
      .for_page(kind.is_page())
      .lookup(url, Instant::now())
      .cloned()
  }

  /// Drives the pipeline until `stop` fires, or until the event source is
  /// closed and every deferred and in-flight attempt has finished.
  pub async fn run(
    self: &Rc<Self>,
    mut events: mpsc::Receiver<HostEvent>,
    mut stop: mpsc::UnboundedReceiver<()>,
  ) -> CoordinatorStats {
    let mut retries = self.retry_queue();
    let mut events_open = true;

    tracing::info!(
      provider = self.provider.name(),
      rate_limit_seconds = self.settings.rate_limit_seconds,
      cache_ttl_seconds = self.settings.cache_ttl_seconds,
      grace_period_seconds = self.settings.grace_period_seconds,
      "coordinator started"
    );

    loop {
      if !events_open && retries.is_empty() && self.in_flight.get() == 0 {
        tracing::info!("event source closed and pipeline drained");
        break;
      }

      tokio::select! {
        Some(()) = stop.recv() => {
          tracing::info!(
            pending_retries = retries.len(),
            in_flight = self.in_flight.get(),
            "stop requested"
          );
          break;
        }
        ev = events.recv(), if events_open => match ev {
          Some(ev) => {
            self.handle_event(ev, &mut retries);
          }
          None => {
            events_open = false;
            tracing::debug!(
              pending_retries = retries.len(),
              in_flight = self.in_flight.get(),
              "draining"
            );
          }
        },
        Some(attempt) = retries.next_due(), if !retries.is_empty() => {
          self.attempt(attempt, &mut retries);
        }
        _ = self.settled.notified(), if !events_open => {}
      }
    }

    let stats = self.stats();
    tracing::info!(
      observed = stats.observed,
      cache_hits = stats.cache_hits,
      started = stats.started,
      resolved = stats.resolved,
      abandoned = stats.abandoned,
      "coordinator stopped"
    );
    stats
  }

  pub fn handle_event(
    self: &Rc<Self>,
    event: HostEvent,
    retries: &mut RetryQueue,
  ) -> Option<AttemptOutcome> {
    let Some(subject) = event.into_subject() else {
      tracing::trace!("host event ignored");
      return None;
    };
    Some(self.observe(subject, retries))
  }

  pub fn observe(self: &Rc<Self>, subject: ScanSubject, retries: &mut RetryQueue) -> AttemptOutcome {
    self.bump(|s| s.observed += 1);
    let attempt = Attempt::new(subject);
    tracing::debug!(
      attempt_id = %attempt.id,
      kind = %attempt.subject.kind,
      subject = %redact_url_for_log(&attempt.subject.url),
      "subject observed"
    );
    self.attempt(attempt, retries)
  }

  /// One pass through the gate: fresh cache entry, then limiter, then either
  /// start the scan or park the attempt for one window.
  pub fn attempt(self: &Rc<Self>, mut attempt: Attempt, retries: &mut RetryQueue) -> AttemptOutcome {
    let now = Instant::now();
    let is_page = attempt.subject.kind.is_page();

    let hit = self
      .caches
      .borrow()
      .for_page(is_page)
      .lookup(&attempt.subject.url, now)
      .map(|record| record.verdict);
    if let Some(verdict) = hit {
      self.bump(|s| s.cache_hits += 1);
      if is_page {
        presenter::present(&self.presenter, &attempt.subject, &verdict);
      }
      attempt.advance(AttemptState::Resolved(verdict));
      return AttemptOutcome::CacheHit;
    }

    let acquire = self.limiter.borrow_mut().try_acquire(now);
    match acquire {
      Acquire::Granted => {
        self.bump(|s| s.started += 1);
        self.in_flight.set(self.in_flight.get() + 1);
        let this = Rc::clone(self);
        tokio::task::spawn_local(this.execute(attempt));
        AttemptOutcome::Started
      }
      Acquire::Denied { retry_after } => {
        attempt.denials += 1;
        attempt.advance(AttemptState::AwaitingRateLimitSlot);
        tracing::debug!(
          attempt_id = %attempt.id,
          denials = attempt.denials,
          retry_after_ms = retry_after.as_millis() as u64,
          "rate limited"
        );
        match retries.defer(attempt) {
          DeferOutcome::Queued { .. } => {
            self.bump(|s| s.deferred += 1);
            AttemptOutcome::Deferred
          }
          DeferOutcome::Coalesced(dup) => {
            self.bump(|s| s.coalesced += 1);
            tracing::debug!(
              attempt_id = %dup.id,
              subject = %redact_url_for_log(&dup.subject.url),
              "retry already pending; dropping duplicate"
            );
            AttemptOutcome::Coalesced
          }
          DeferOutcome::GaveUp(mut exhausted) => {
            self.bump(|s| s.abandoned += 1);
            tracing::warn!(
              attempt_id = %exhausted.id,
              kind = %exhausted.subject.kind,
              subject = %redact_url_for_log(&exhausted.subject.url),
              denials = exhausted.denials,
              "retry cap reached; abandoning"
            );
            exhausted.advance(AttemptState::Abandoned("retry cap reached".to_string()));
            AttemptOutcome::GaveUp
          }
        }
      }
    }
  }

  async fn execute(self: Rc<Self>, mut attempt: Attempt) {
    let grace = self.settings.grace_period();
    match executor::scan(&self.provider, &mut attempt, grace).await {
      Ok(outcome) => self.resolve(&mut attempt, outcome),
      Err(e) => {
        self.bump(|s| s.abandoned += 1);
        tracing::warn!(
          attempt_id = %attempt.id,
          kind = %attempt.subject.kind,
          subject = %redact_url_for_log(&attempt.subject.url),
          error = %e,
          "scan abandoned"
        );
        attempt.advance(AttemptState::Abandoned(e.to_string()));
      }
    }
    self.in_flight.set(self.in_flight.get().saturating_sub(1));
    self.settled.notify_one();
  }

  fn resolve(&self, attempt: &mut Attempt, outcome: ScanOutcome) {
    let ScanOutcome { verdict, report } = outcome;
    let subject = attempt.subject.clone();

    self
      .caches
      .borrow_mut()
      .for_page_mut(subject.kind.is_page())
      .store(ScanRecord {
        subject: subject.clone(),
        verdict,
        report: report.clone(),
        fetched_at: Instant::now(),
      });

    if let Err(e) = self.persist(&subject, report) {
      tracing::error!(
        attempt_id = %attempt.id,
        subject = %redact_url_for_log(&subject.url),
        error = %e,
        "failed to persist scan result"
      );
    }

    let presented = presenter::present(&self.presenter, &subject, &verdict);
    self.bump(|s| s.resolved += 1);
    tracing::info!(
      attempt_id = %attempt.id,
      kind = %subject.kind,
      subject = %redact_url_for_log(&subject.url),
      pending = verdict.pending,
      positives = verdict.detection_count,
      total = verdict.total_engines,
      severity = verdict.severity().as_str(),
      presented = ?presented,
      "scan resolved"
    );
    attempt.advance(AttemptState::Resolved(verdict));
  }

  fn persist(&self, subject: &ScanSubject, report: UrlReport) -> Result<(), ScanError> {
    let timestamp = now_unix_ms();
    if subject.kind.is_page() {
      self.store.write_page(&PageScan {
        url: subject.url.clone(),
        data: report,
        timestamp,
      })
    } else {
      self.store.write_resource(
        &subject.url,
        &ResourceScan {
          data: report,
          timestamp,
          kind: Some(subject.kind),
        },
      )
    }
  }

  fn bump(&self, f: impl FnOnce(&mut CoordinatorStats)) {
    let mut stats = self.stats.get();
    f(&mut stats);
    self.stats.set(stats);
  }
}
