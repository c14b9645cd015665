use uuid::Uuid;

use crate::types::{redact_url_for_log, ScanSubject, Verdict};

/// Lifecycle of one scan attempt for one subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptState {
  Observed,
  /// Lost the rate-limit race; may loop on itself any number of times.
  AwaitingRateLimitSlot,
  Submitted,
  AwaitingReport,
  Resolved(Verdict),
  Abandoned(String),
}

impl AttemptState {
  pub fn is_terminal(&self) -> bool {
    matches!(self, Self::Resolved(_) | Self::Abandoned(_))
  }

  pub fn name(&self) -> &'static str {
    match self {
      Self::Observed => "observed",
      Self::AwaitingRateLimitSlot => "awaiting_rate_limit_slot",
      Self::Submitted => "submitted",
      Self::AwaitingReport => "awaiting_report",
      Self::Resolved(_) => "resolved",
      Self::Abandoned(_) => "abandoned",
    }
  }

  /// A fresh cache entry resolves an attempt before it ever reaches the provider.
  pub fn can_advance_to(&self, next: &AttemptState) -> bool {
    use AttemptState::*;
    matches!(
      (self, next),
      (Observed, AwaitingRateLimitSlot)
        | (Observed, Submitted)
        | (Observed, Resolved(_))
        | (AwaitingRateLimitSlot, AwaitingRateLimitSlot)
        | (AwaitingRateLimitSlot, Submitted)
        | (AwaitingRateLimitSlot, Resolved(_))
        | (AwaitingRateLimitSlot, Abandoned(_))
        | (Submitted, AwaitingReport)
        | (Submitted, Abandoned(_))
        | (AwaitingReport, Resolved(_))
        | (AwaitingReport, Abandoned(_))
    )
  }
}

#[derive(Debug, Clone)]
pub struct Attempt {
  pub id: Uuid,
  pub subject: ScanSubject,
  /// Times this attempt was refused a rate-limit slot.
  pub denials: u32,
  state: AttemptState,
}

impl Attempt {
  pub fn new(subject: ScanSubject) -> Self {
    Self {
      id: Uuid::new_v4(),
      subject,
      denials: 0,
      state: AttemptState::Observed,
    }
  }

  pub fn state(&self) -> &AttemptState {
    &self.state
  }

  pub fn advance(&mut self, next: AttemptState) {
    if !self.state.can_advance_to(&next) {
      tracing::error!(
        attempt_id = %self.id,
        from = self.state.name(),
        to = next.name(),
        "invalid attempt transition"
      );
    }
    tracing::debug!(
      attempt_id = %self.id,
      kind = %self.subject.kind,
      subject = %redact_url_for_log(&self.subject.url),
      from = self.state.name(),
      to = next.name(),
      "attempt state"
    );
    self.state = next;
  }
}
