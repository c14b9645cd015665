//! Two-phase scan protocol: submit, wait out the grace period, fetch the report.
//!
//! Failures are returned, never retried here. The grace period is a heuristic;
//! a report fetched after it may still say "not yet scanned".

use tokio::time::Duration;

use crate::attempt::{Attempt, AttemptState};
use crate::error::ScanError;
use crate::provider::{ScanProvider, UrlReport, RESPONSE_PRESENT};
use crate::types::Verdict;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOutcome {
  pub verdict: Verdict,
  pub report: UrlReport,
}

pub async fn scan<P: ScanProvider>(
  provider: &P,
  attempt: &mut Attempt,
  grace: Duration,
) -> Result<ScanOutcome, ScanError> {
  let url = attempt.subject.url.clone();

  attempt.advance(AttemptState::Submitted);
  provider.submit(&url).await?;

  attempt.advance(AttemptState::AwaitingReport);
  tokio::time::sleep(grace).await;

  let report = provider.report(&url).await?;
  let verdict = interpret(&report)?;
  Ok(ScanOutcome { verdict, report })
}

pub fn interpret(report: &UrlReport) -> Result<Verdict, ScanError> {
  if report.is_not_yet_scanned() {
    return Ok(Verdict::pending());
  }
  if report.response_code != RESPONSE_PRESENT {
    return Err(ScanError::Parse(format!(
      "unexpected response_code {}",
      report.response_code
    )));
  }
  match (report.positives, report.total) {
    (Some(positives), Some(total)) => Ok(Verdict::completed(positives, total)),
    _ => Err(ScanError::Parse(
      "report is missing positives/total".to_string(),
    )),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::{FakeProvider, ProviderCall};
  use crate::types::{ResourceKind, ScanSubject};
  use tokio::time::Instant;

  #[test]
  fn interpret_maps_counts_and_pending() {
    assert_eq!(
      interpret(&UrlReport::completed(5, 60)).unwrap(),
      Verdict::completed(5, 60)
    );
    assert_eq!(
      interpret(&UrlReport::not_present()).unwrap(),
      Verdict::pending()
    );

    let mut missing = UrlReport::completed(1, 1);
    missing.total = None;
    assert!(matches!(interpret(&missing), Err(ScanError::Parse(_))));

    let mut odd = UrlReport::completed(1, 1);
    odd.response_code = 7;
    assert!(matches!(interpret(&odd), Err(ScanError::Parse(_))));
  }

  #[tokio::test(start_paused = true)]
  async fn submit_then_report_after_grace() {
    let provider = FakeProvider::new();
    provider.set_report("http://example.com/a.js", UrlReport::completed(0, 70));
    let mut attempt = Attempt::new(ScanSubject::new("http://example.com/a.js", ResourceKind::Script));

    let t0 = Instant::now();
    let outcome = scan(&provider, &mut attempt, Duration::from_secs(3)).await.unwrap();

    assert_eq!(outcome.verdict, Verdict::completed(0, 70));
    assert_eq!(attempt.state(), &AttemptState::AwaitingReport);

    let calls = provider.calls();
    assert_eq!(calls.len(), 2);
    assert!(matches!(&calls[0], ProviderCall::Submit { at, .. } if *at == t0));
    assert!(
      matches!(&calls[1], ProviderCall::Report { at, .. } if *at - t0 == Duration::from_secs(3))
    );
  }

  #[tokio::test(start_paused = true)]
  async fn submit_failure_skips_report() {
    let provider = FakeProvider::new();
    provider.fail_submit("http://example.com/a.js");
    let mut attempt = Attempt::new(ScanSubject::new("http://example.com/a.js", ResourceKind::Script));

    let err = scan(&provider, &mut attempt, Duration::from_secs(3)).await.unwrap_err();
    assert!(matches!(err, ScanError::Transport { .. }));
    assert_eq!(provider.submit_count("http://example.com/a.js"), 1);
    assert_eq!(provider.report_count("http://example.com/a.js"), 0);
  }
}
