use serde::Serialize;
use std::io::Write;

use crate::types::{ScanSubject, Verdict};

pub const NOTIFICATION_TITLE: &str = "Malicious Resource Detected";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Badge {
  pub text: &'static str,
  pub color: &'static str,
}

pub const BADGE_MALICIOUS: Badge = Badge {
  text: "!",
  color: "#d9534f",
};

pub const BADGE_CLEAN: Badge = Badge {
  text: "\u{2713}",
  color: "#5cb85c",
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
  pub title: String,
  pub message: String,
}

impl Notification {
  pub fn malicious_resource(subject: &ScanSubject, verdict: &Verdict) -> Self {
    Self {
      title: NOTIFICATION_TITLE.to_string(),
      message: format!(
        "Warning: Malicious resource detected!\nType: {}\nURL: {}\nDetections: {}/{}",
        subject.kind, subject.url, verdict.detection_count, verdict.total_engines
      ),
    }
  }
}

/// Host facilities for user-visible signals.
pub trait Presenter {
  fn set_badge(&self, badge: Badge);
  fn notify(&self, notification: Notification);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presented {
  Badge(Badge),
  Notification(Notification),
  Nothing,
}

/// Page verdicts drive the badge; malicious resource verdicts raise a notification.
/// Pending verdicts change nothing, and pages never notify.
pub fn present<N: Presenter + ?Sized>(
  presenter: &N,
  subject: &ScanSubject,
  verdict: &Verdict,
) -> Presented {
  if verdict.pending {
    return Presented::Nothing;
  }

  if subject.kind.is_page() {
    let badge = if verdict.is_malicious() {
      BADGE_MALICIOUS
    } else {
      BADGE_CLEAN
    };
    presenter.set_badge(badge);
    return Presented::Badge(badge);
  }

  if verdict.is_malicious() {
    let n = Notification::malicious_resource(subject, verdict);
    presenter.notify(n.clone());
    return Presented::Notification(n);
  }

  Presented::Nothing
}

#[derive(Debug, Serialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
enum HostSignal<'a> {
  Badge(&'a Badge),
  Notification(&'a Notification),
}

/// Writes each signal to stdout as one JSON line for the host to render.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutPresenter;

impl StdoutPresenter {
  fn emit(&self, signal: &HostSignal<'_>) {
    let line = match serde_json::to_string(signal) {
      Ok(line) => line,
      Err(e) => {
        tracing::error!(error = %e, "failed to encode host signal");
        return;
      }
    };
    let mut out = std::io::stdout().lock();
    if let Err(e) = writeln!(out, "{line}").and_then(|_| out.flush()) {
      tracing::warn!(error = %e, "failed to write host signal");
    }
  }
}

impl Presenter for StdoutPresenter {
  fn set_badge(&self, badge: Badge) {
    tracing::info!(text = badge.text, color = badge.color, "badge updated");
    self.emit(&HostSignal::Badge(&badge));
  }

  fn notify(&self, notification: Notification) {
    tracing::warn!(title = %notification.title, "user notification raised");
    self.emit(&HostSignal::Notification(&notification));
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::RecordingPresenter;
  use crate::types::ResourceKind;

  #[test]
  fn malicious_page_sets_red_badge_without_notification() {
    let p = RecordingPresenter::default();
    let page = ScanSubject::new("https://bad.example/", ResourceKind::Page);
    let out = present(&p, &page, &Verdict::completed(5, 60));

    assert_eq!(out, Presented::Badge(BADGE_MALICIOUS));
    assert_eq!(p.badges(), vec![BADGE_MALICIOUS]);
    assert!(p.notifications().is_empty());
  }

  #[test]
  fn clean_page_sets_green_badge() {
    let p = RecordingPresenter::default();
    let page = ScanSubject::new("https://ok.example/", ResourceKind::Page);
    present(&p, &page, &Verdict::completed(0, 60));
    assert_eq!(p.badges(), vec![BADGE_CLEAN]);
    assert_eq!(BADGE_CLEAN.text, "✓");
  }

  #[test]
  fn malicious_resource_notifies_with_counts() {
    let p = RecordingPresenter::default();
    let script = ScanSubject::new("http://cdn.example/evil.js", ResourceKind::Xhr);
    present(&p, &script, &Verdict::completed(2, 70));

    let n = p.notifications();
    assert_eq!(n.len(), 1);
    assert_eq!(n[0].title, "Malicious Resource Detected");
    assert_eq!(
      n[0].message,
      "Warning: Malicious resource detected!\nType: xmlhttprequest\nURL: http://cdn.example/evil.js\nDetections: 2/70"
    );
    assert!(p.badges().is_empty());
  }

  #[test]
  fn clean_or_pending_resource_is_silent() {
    let p = RecordingPresenter::default();
    let img = ScanSubject::new("http://cdn.example/a.png", ResourceKind::Image);
    assert_eq!(present(&p, &img, &Verdict::completed(0, 70)), Presented::Nothing);
    assert_eq!(present(&p, &img, &Verdict::pending()), Presented::Nothing);

    let page = ScanSubject::new("https://new.example/", ResourceKind::Page);
    assert_eq!(present(&p, &page, &Verdict::pending()), Presented::Nothing);
    assert!(p.badges().is_empty());
    assert!(p.notifications().is_empty());
  }

  #[test]
  fn repeated_detections_each_notify() {
    let p = RecordingPresenter::default();
    let s = ScanSubject::new("http://cdn.example/evil.js", ResourceKind::Script);
    present(&p, &s, &Verdict::completed(3, 70));
    present(&p, &s, &Verdict::completed(3, 70));
    assert_eq!(p.notifications().len(), 2);
  }

  #[test]
  fn host_signal_is_tagged_json() {
    let line = serde_json::to_string(&HostSignal::Badge(&BADGE_MALICIOUS)).unwrap();
    assert_eq!(line, r##"{"signal":"badge","text":"!","color":"#d9534f"}"##);
  }
}
