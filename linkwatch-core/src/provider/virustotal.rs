use reqwest::header::USER_AGENT;
use reqwest::redirect::Policy;
use reqwest::{Client, Response, StatusCode, Url};
use std::time::Instant;

use super::{parse_report, parse_submit_ack, ScanProvider, SubmitAck, UrlReport};
use crate::config::ProviderConfig;
use crate::error::ScanError;

const MAX_RESPONSE_BYTES: usize = 1024 * 1024;

/// VirusTotal public API v2, URL endpoints.
pub struct VirusTotalClient {
  client: Client,
  base_url: String,
  api_key: String,
}

impl VirusTotalClient {
  /// Fails with `ScanError::Config` when no key is configured.
  pub fn from_config(cfg: &ProviderConfig) -> Result<Self, ScanError> {
    let api_key = cfg.api_key()?.to_string();

    let mut builder = Client::builder().redirect(Policy::none());
    if let Some(timeout) = cfg.timeout() {
      builder = builder.timeout(timeout);
    }
    let client = builder
      .build()
      .map_err(|e| ScanError::Config(format!("build HTTP client: {e}")))?;

    Ok(Self {
      client,
      base_url: cfg.base_url.trim().trim_end_matches('/').to_string(),
      api_key,
    })
  }

  fn endpoint(&self, path: &str) -> String {
    format!("{}/{}", self.base_url, path)
  }
}

impl ScanProvider for VirusTotalClient {
  fn name(&self) -> &'static str {
    "VT"
  }

  async fn submit(&self, url: &str) -> Result<SubmitAck, ScanError> {
    let endpoint = self.endpoint("url/scan");
    let start = Instant::now();
    let response = self
      .client
      .post(&endpoint)
      .header(USER_AGENT, user_agent())
      .form(&[("apikey", self.api_key.as_str()), ("url", url)])
      .send()
      .await?;

    let body = read_success_body(response, &endpoint).await?;
    let ack = parse_submit_ack(&body)?;
    tracing::debug!(
      endpoint = %safe_url_label(&endpoint),
      elapsed_ms = start.elapsed().as_millis() as u64,
      scan_id = ack.scan_id.as_deref().unwrap_or(""),
      "submit accepted"
    );
    Ok(ack)
  }

  async fn report(&self, url: &str) -> Result<UrlReport, ScanError> {
    let endpoint = self.endpoint("url/report");
    let start = Instant::now();
    let response = self
      .client
      .get(&endpoint)
      .header(USER_AGENT, user_agent())
      .query(&[("apikey", self.api_key.as_str()), ("resource", url)])
      .send()
      .await?;

    let body = read_success_body(response, &endpoint).await?;
    let report = parse_report(&body)?;
    tracing::debug!(
      endpoint = %safe_url_label(&endpoint),
      elapsed_ms = start.elapsed().as_millis() as u64,
      response_code = report.response_code,
      "report fetched"
    );
    Ok(report)
  }
}

async fn read_success_body(response: Response, endpoint: &str) -> Result<String, ScanError> {
  let status = response.status();
  let label = safe_url_label(endpoint);

  // v2 signals an exhausted quota with an empty 204.
  if status == StatusCode::NO_CONTENT {
    return Err(ScanError::transport(format!(
      "provider quota exceeded (HTTP 204) for {label}"
    )));
  }

  if !status.is_success() {
    let body = response.text().await.unwrap_or_default();
    tracing::warn!(
      status = status.as_u16(),
      endpoint = %label,
      body = %body.chars().take(256).collect::<String>(),
      "provider returned non-success status"
    );
    return Err(ScanError::transport(format!(
      "unexpected HTTP status {} for {label}",
      status.as_u16()
    )));
  }

  let bytes = response.bytes().await?;
  if bytes.len() > MAX_RESPONSE_BYTES {
    return Err(ScanError::Parse(format!(
      "response exceeds max size {MAX_RESPONSE_BYTES} bytes"
    )));
  }
  String::from_utf8(bytes.to_vec()).map_err(|e| ScanError::Parse(format!("response not UTF-8: {e}")))
}

fn user_agent() -> String {
  format!("LinkWatch/{}", env!("CARGO_PKG_VERSION"))
}

/// `host/path` only; never the query, which carries the API key.
pub fn safe_url_label(raw: &str) -> String {
  let Ok(url) = Url::parse(raw) else {
    return "<provider>".to_string();
  };
  let host = url.host_str().unwrap_or("<no-host>");
  let mut path = url.path().to_string();
  if path.is_empty() {
    path = "/".to_string();
  }
  format!("{host}{path}")
}
