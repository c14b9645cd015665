use tokio::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
  Granted,
  Denied { retry_after: Duration },
}

impl Acquire {
  pub fn is_granted(&self) -> bool {
    matches!(self, Self::Granted)
  }
}

/// One gate for every outbound provider call, page or resource.
#[derive(Debug, Clone)]
pub struct RateLimiter {
  window: Duration,
  last_call_at: Option<Instant>,
}

impl RateLimiter {
  pub fn new(window: Duration) -> Self {
    Self {
      window,
      last_call_at: None,
    }
  }

  pub fn window(&self) -> Duration {
    self.window
  }

  pub fn last_call_at(&self) -> Option<Instant> {
    self.last_call_at
  }

  /// Check-and-set in one step. Must never be split across an `.await`.
  pub fn try_acquire(&mut self, now: Instant) -> Acquire {
    if let Some(last) = self.last_call_at {
      let elapsed = now.saturating_duration_since(last);
      if elapsed < self.window {
        return Acquire::Denied {
          retry_after: self.window - elapsed,
        };
      }
    }
    self.last_call_at = Some(now);
    Acquire::Granted
  }
}
