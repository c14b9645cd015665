//! Deferred scan attempts.
//!
//! An attempt that loses the rate-limit race is parked here for one full
//! rate-limit window and then re-enters the pipeline from the cache check.
//! By default there is no attempt cap and no dedup: the same URL observed
//! twice may have two independent retries pending.

use std::collections::HashMap;
use std::future::poll_fn;
use tokio::time::Duration;
use tokio_util::time::DelayQueue;

use crate::attempt::Attempt;

#[derive(Debug)]
pub enum DeferOutcome {
  Queued { denials: u32 },
  /// A retry for this URL already waits and dedup is on. The attempt is handed back.
  Coalesced(Attempt),
  /// The attempt cap was reached. The attempt is handed back to be abandoned.
  GaveUp(Attempt),
}

#[derive(Debug)]
pub struct RetryQueue {
  delay: Duration,
  max_attempts: Option<u32>,
  dedupe: bool,
  queue: DelayQueue<Attempt>,
  pending_by_url: HashMap<String, usize>,
}

impl RetryQueue {
  pub fn new(delay: Duration, max_attempts: Option<u32>, dedupe: bool) -> Self {
    Self {
      delay,
      max_attempts,
      dedupe,
      queue: DelayQueue::new(),
      pending_by_url: HashMap::new(),
    }
  }

  /// `attempt.denials` must already count the denial that caused this call.
  pub fn defer(&mut self, attempt: Attempt) -> DeferOutcome {
    if let Some(cap) = self.max_attempts {
      if attempt.denials > cap {
        return DeferOutcome::GaveUp(attempt);
      }
    }
    if self.dedupe && self.pending_for(&attempt.subject.url) > 0 {
      return DeferOutcome::Coalesced(attempt);
    }

    let denials = attempt.denials;
    *self
      .pending_by_url
      .entry(attempt.subject.url.clone())
      .or_default() += 1;
    self.queue.insert(attempt, self.delay);
    DeferOutcome::Queued { denials }
  }

  /// Resolves when the earliest retry is due. Returns `None` immediately when empty.
  pub async fn next_due(&mut self) -> Option<Attempt> {
    if self.queue.is_empty() {
      return None;
    }
    let expired = poll_fn(|cx| self.queue.poll_expired(cx)).await?;
    let attempt = expired.into_inner();
    if let Some(n) = self.pending_by_url.get_mut(&attempt.subject.url) {
      *n = n.saturating_sub(1);
      if *n == 0 {
        self.pending_by_url.remove(&attempt.subject.url);
      }
    }
    Some(attempt)
  }

  pub fn pending_for(&self, url: &str) -> usize {
    self.pending_by_url.get(url).copied().unwrap_or(0)
  }

  pub fn len(&self) -> usize {
    self.queue.len()
  }

  pub fn is_empty(&self) -> bool {
    self.queue.is_empty()
  }
}
