//! NOAA CO-OPS datagetter client
//!
//! Fetches a single series (water temperature or hi/lo tide predictions) for
//! one station and checks that the response looks like real data before
//! handing it back. This client never retries and never logs; callers decide
//! what a failure means.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use thiserror::Error;

use super::SeriesKind;
use crate::clock::Clock;
use crate::config::HttpConfig;

/// Base URL for the NOAA CO-OPS data API
pub const NOAA_BASE_URL: &str = "https://api.tidesandcurrents.noaa.gov/api/prod/datagetter";

/// Request timeout per series
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Identifies this client to the provider
pub const DEFAULT_USER_AGENT: &str = "URI Tides Updater";

/// Fields whose presence marks a usable response body
const PAYLOAD_MARKERS: [&str; 2] = ["metadata", "predictions"];

/// Errors that can occur when fetching a series
///
/// Callers treat every variant the same way; the split only matters for logs.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Connection failure, timeout, or an unreadable body
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider answered with something other than 200
    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    /// 200 with nothing in it
    #[error("Empty response body")]
    EmptyBody,

    /// Body is not JSON
    #[error("Failed to parse JSON response: {0}")]
    Malformed(#[from] serde_json::Error),

    /// JSON without a `metadata` or `predictions` field
    #[error("Response has no metadata or predictions field")]
    MissingMarker,
}

/// Something that can fetch one series for a station
#[async_trait]
pub trait SeriesSource: Send + Sync {
    /// Fetches `kind` for `station`, returning the decoded response body
    async fn fetch_series(&self, kind: SeriesKind, station: &str) -> Result<Value, UpstreamError>;
}

#[async_trait]
impl<T: SeriesSource + ?Sized> SeriesSource for Arc<T> {
    async fn fetch_series(&self, kind: SeriesKind, station: &str) -> Result<Value, UpstreamError> {
        (**self).fetch_series(kind, station).await
    }
}

/// Client for the NOAA CO-OPS datagetter endpoint
#[derive(Clone)]
pub struct NoaaClient {
    http_client: Client,
    base_url: String,
    clock: Arc<dyn Clock>,
}

impl NoaaClient {
    /// Creates a client with the default endpoint, timeout and user agent
    pub fn new(clock: Arc<dyn Clock>) -> Result<Self, UpstreamError> {
        Self::with_settings(clock, NOAA_BASE_URL, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT)
    }

    /// Creates a client from the `[http]` config section
    pub fn from_config(config: &HttpConfig, clock: Arc<dyn Clock>) -> Result<Self, UpstreamError> {
        Self::with_settings(
            clock,
            &config.base_url,
            Duration::from_secs(config.timeout_secs),
            &config.user_agent,
        )
    }

    /// Creates a client with explicit settings
    pub fn with_settings(
        clock: Arc<dyn Clock>,
        base_url: &str,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self, UpstreamError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.to_string(),
            clock,
        })
    }

    /// Builds the request URL for `kind` at `station`, dated from the clock
    pub fn series_url(&self, kind: SeriesKind, station: &str) -> String {
        build_url(&self.base_url, kind, station, self.clock.now().date_naive())
    }
}

#[async_trait]
impl SeriesSource for NoaaClient {
    async fn fetch_series(&self, kind: SeriesKind, station: &str) -> Result<Value, UpstreamError> {
        let url = self.series_url(kind, station);

        let response = self.http_client.get(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        validate_response(status, &body)
    }
}

/// Builds a datagetter URL
///
/// Temperature asks for the latest 6-minute reading. Tide asks for hi/lo
/// predictions from yesterday through two days after `today`, MLLW datum.
/// Both use English units and GMT.
pub fn build_url(base_url: &str, kind: SeriesKind, station: &str, today: NaiveDate) -> String {
    match kind {
        SeriesKind::Temperature => format!(
            "{}?product=water_temperature&application=NOS.COOPS.TAC.PHYSOCEAN&date=latest&station={}&time_zone=GMT&units=english&interval=6&format=json",
            base_url, station
        ),
        SeriesKind::Tide => {
            let begin = today - ChronoDuration::days(1);
            let end = today + ChronoDuration::days(2);
            format!(
                "{}?product=predictions&application=NOS.COOPS.TAC.WL&begin_date={}&end_date={}&datum=MLLW&station={}&time_zone=GMT&units=english&interval=hilo&format=json",
                base_url,
                begin.format("%Y%m%d"),
                end.format("%Y%m%d"),
                station
            )
        }
    }
}

/// Accepts a response only if it is a 200 with a JSON body carrying a
/// non-null `metadata` or `predictions` field
pub fn validate_response(status: StatusCode, body: &str) -> Result<Value, UpstreamError> {
    if status != StatusCode::OK {
        return Err(UpstreamError::Status(status.as_u16()));
    }

    if body.trim().is_empty() {
        return Err(UpstreamError::EmptyBody);
    }

    let data: Value = serde_json::from_str(body)?;

    let has_marker = data
        .as_object()
        .map(|obj| {
            PAYLOAD_MARKERS
                .iter()
                .any(|marker| obj.get(*marker).is_some_and(|v| !v.is_null()))
        })
        .unwrap_or(false);

    if has_marker {
        Ok(data)
    } else {
        Err(UpstreamError::MissingMarker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{TimeZone, Utc};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Sample water temperature response (trimmed)
    const TEMPERATURE_RESPONSE: &str = r#"{
        "metadata": {"id": "8452660", "name": "Newport", "lat": "41.5043", "lon": "-71.3261"},
        "data": [{"t": "2026-07-04 11:54", "v": "68.4", "f": "0,0,0"}]
    }"#;

    /// Sample hi/lo predictions response (trimmed)
    const TIDE_RESPONSE: &str = r#"{
        "predictions": [
            {"t": "2026-07-03 02:41", "v": "3.912", "type": "H"},
            {"t": "2026-07-03 08:58", "v": "0.214", "type": "L"}
        ]
    }"#;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn test_clock() -> Arc<dyn Clock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 7, 4, 12, 0, 0).unwrap(),
        ))
    }

    /// Serves one canned HTTP response and reports the raw request it saw
    async fn serve_once(response: String) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let _ = tx.send(String::from_utf8_lossy(&request).to_string());
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });

        (format!("http://{}/datagetter", addr), rx)
    }

    fn http_response(status_line: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        )
    }

    #[test]
    fn test_temperature_url() {
        let url = build_url(NOAA_BASE_URL, SeriesKind::Temperature, "8452660", date(2026, 7, 4));

        assert!(url.starts_with(NOAA_BASE_URL));
        assert!(url.contains("product=water_temperature"));
        assert!(url.contains("application=NOS.COOPS.TAC.PHYSOCEAN"));
        assert!(url.contains("date=latest"));
        assert!(url.contains("station=8452660"));
        assert!(url.contains("time_zone=GMT"));
        assert!(url.contains("units=english"));
        assert!(url.contains("interval=6"));
        assert!(url.contains("format=json"));
    }

    #[test]
    fn test_tide_url_spans_yesterday_to_two_days_ahead() {
        let url = build_url(NOAA_BASE_URL, SeriesKind::Tide, "8452660", date(2026, 7, 4));

        assert!(url.contains("product=predictions"));
        assert!(url.contains("application=NOS.COOPS.TAC.WL"));
        assert!(url.contains("begin_date=20260703"));
        assert!(url.contains("end_date=20260706"));
        assert!(url.contains("datum=MLLW"));
        assert!(url.contains("interval=hilo"));
        assert!(url.contains("time_zone=GMT"));
    }

    #[test]
    fn test_tide_url_crosses_month_boundary() {
        let url = build_url(NOAA_BASE_URL, SeriesKind::Tide, "8452660", date(2026, 3, 1));

        assert!(url.contains("begin_date=20260228"));
        assert!(url.contains("end_date=20260303"));
    }

    #[test]
    fn test_series_url_is_dated_from_clock() {
        let client = NoaaClient::new(test_clock()).unwrap();
        let url = client.series_url(SeriesKind::Tide, "8454049");

        assert!(url.contains("begin_date=20260703"));
        assert!(url.contains("station=8454049"));
    }

    #[test]
    fn test_validate_accepts_temperature_response() {
        let value = validate_response(StatusCode::OK, TEMPERATURE_RESPONSE).unwrap();
        assert_eq!(value["metadata"]["id"], "8452660");
    }

    #[test]
    fn test_validate_accepts_tide_response() {
        let value = validate_response(StatusCode::OK, TIDE_RESPONSE).unwrap();
        assert_eq!(value["predictions"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_validate_rejects_missing_marker() {
        let result = validate_response(StatusCode::OK, r#"{"foo": 1}"#);
        assert!(matches!(result, Err(UpstreamError::MissingMarker)));
    }

    #[test]
    fn test_validate_rejects_provider_error_body() {
        let body = r#"{"error": {"message": "No data was found."}}"#;
        let result = validate_response(StatusCode::OK, body);
        assert!(matches!(result, Err(UpstreamError::MissingMarker)));
    }

    #[test]
    fn test_validate_rejects_null_marker() {
        let result = validate_response(StatusCode::OK, r#"{"metadata": null}"#);
        assert!(matches!(result, Err(UpstreamError::MissingMarker)));
    }

    #[test]
    fn test_validate_rejects_non_object_json() {
        let result = validate_response(StatusCode::OK, r#"["metadata"]"#);
        assert!(matches!(result, Err(UpstreamError::MissingMarker)));
    }

    #[test]
    fn test_validate_rejects_non_200() {
        let result = validate_response(StatusCode::SERVICE_UNAVAILABLE, TIDE_RESPONSE);
        assert!(matches!(result, Err(UpstreamError::Status(503))));
    }

    #[test]
    fn test_validate_rejects_empty_body() {
        assert!(matches!(
            validate_response(StatusCode::OK, ""),
            Err(UpstreamError::EmptyBody)
        ));
        assert!(matches!(
            validate_response(StatusCode::OK, "  \n"),
            Err(UpstreamError::EmptyBody)
        ));
    }

    #[test]
    fn test_validate_rejects_malformed_json() {
        let result = validate_response(StatusCode::OK, "<html>busy</html>");
        assert!(matches!(result, Err(UpstreamError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_fetch_series_returns_payload_and_sends_user_agent() {
        let (base_url, request_rx) = serve_once(http_response("200 OK", TIDE_RESPONSE)).await;
        let client =
            NoaaClient::with_settings(test_clock(), &base_url, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT)
                .unwrap();

        let value = client
            .fetch_series(SeriesKind::Tide, "8452660")
            .await
            .expect("fetch should succeed");

        assert!(value.get("predictions").is_some());

        let request = request_rx.await.unwrap().to_lowercase();
        assert!(request.starts_with("get /datagetter?product=predictions"));
        assert!(request.contains("user-agent: uri tides updater"));
    }

    #[tokio::test]
    async fn test_fetch_series_rejects_server_error() {
        let (base_url, _rx) =
            serve_once(http_response("500 Internal Server Error", TIDE_RESPONSE)).await;
        let client =
            NoaaClient::with_settings(test_clock(), &base_url, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT)
                .unwrap();

        let result = client.fetch_series(SeriesKind::Tide, "8452660").await;
        assert!(matches!(result, Err(UpstreamError::Status(500))));
    }

    #[tokio::test]
    async fn test_fetch_series_connection_refused_is_transport_error() {
        // Bind then drop to get a port nothing listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = NoaaClient::with_settings(
            test_clock(),
            &format!("http://{}/datagetter", addr),
            DEFAULT_TIMEOUT,
            DEFAULT_USER_AGENT,
        )
        .unwrap();

        let result = client.fetch_series(SeriesKind::Temperature, "8452660").await;
        assert!(matches!(result, Err(UpstreamError::Transport(_))));
    }

    #[tokio::test]
    async fn test_fetch_series_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Accept and hold the connection without answering
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let client = NoaaClient::with_settings(
            test_clock(),
            &format!("http://{}/datagetter", addr),
            Duration::from_millis(200),
            DEFAULT_USER_AGENT,
        )
        .unwrap();

        let result = client.fetch_series(SeriesKind::Temperature, "8452660").await;
        match result {
            Err(UpstreamError::Transport(e)) => assert!(e.is_timeout()),
            other => panic!("expected timeout, got {:?}", other.map(|_| ())),
        }
    }
}
