//! HTTP and TCP health checks of external services
//!
//! Each active `ServiceHealth` row is probed when its own `check_interval`
//! has elapsed. The result overwrites the row's rolling status.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::Client;
use reqwest::redirect::Policy;
use serde::Serialize;
use tokio::net::{TcpStream, lookup_host};
use tracing::{debug, error, instrument, warn};

use crate::storage::{ServiceHealth, ServiceStatusUpdate, StorageBackend};

/// Scheduler ticks are not perfectly spaced, so a service counts as due
/// slightly before its interval has fully elapsed
const DUE_SLACK_SECS: i64 = 1;

const MAX_REDIRECTS: usize = 10;

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// One GET against `url`; 2xx and 3xx count as up
pub async fn check_http_service(
    client: &Client,
    url: &str,
    timeout_secs: u32,
) -> ServiceStatusUpdate {
    let start = Instant::now();

    match client
        .get(url)
        .timeout(Duration::from_secs(u64::from(timeout_secs)))
        .send()
        .await
    {
        Ok(response) => {
            let status = response.status().as_u16();
            ServiceStatusUpdate {
                is_up: (200..400).contains(&status),
                status_code: Some(status),
                response_time_ms: Some(elapsed_ms(start)),
                error_message: None,
            }
        }
        Err(e) => {
            let error_message = if e.is_timeout() {
                format!("Timeout after {timeout_secs} seconds")
            } else if e.is_connect() {
                format!("Connection error: {e}")
            } else {
                format!("Request failed: {e}")
            };
            ServiceStatusUpdate {
                is_up: false,
                status_code: None,
                response_time_ms: None,
                error_message: Some(error_message),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TcpCheck {
    pub is_up: bool,
    pub response_time_ms: Option<f64>,
    pub error_message: Option<String>,
}

enum TcpFailure {
    Resolve(io::Error),
    Connect(io::Error),
}

impl TcpFailure {
    fn message(&self) -> String {
        match self {
            TcpFailure::Resolve(e) => format!("DNS resolution failed: {e}"),
            TcpFailure::Connect(e) => match e.raw_os_error() {
                Some(code) => format!("Connection refused (error code: {code})"),
                None => format!("Unexpected error: {e}"),
            },
        }
    }
}

async fn connect_tcp(host: &str, port: u16) -> Result<(), TcpFailure> {
    let addrs: Vec<_> = lookup_host((host, port))
        .await
        .map_err(TcpFailure::Resolve)?
        .collect();
    if addrs.is_empty() {
        return Err(TcpFailure::Resolve(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no addresses for {host}"),
        )));
    }

    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(_stream) => return Ok(()),
            Err(e) => last_error = Some(e),
        }
    }
    Err(TcpFailure::Connect(last_error.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotConnected, "no address accepted")
    })))
}

/// Whether a TCP connection to `host:port` can be opened within the timeout
pub async fn check_tcp_service(host: &str, port: u16, timeout_secs: u32) -> TcpCheck {
    let start = Instant::now();
    let connect = connect_tcp(host, port);

    match tokio::time::timeout(Duration::from_secs(u64::from(timeout_secs)), connect).await {
        Ok(Ok(())) => TcpCheck {
            is_up: true,
            response_time_ms: Some(elapsed_ms(start)),
            error_message: None,
        },
        Ok(Err(failure)) => TcpCheck {
            is_up: false,
            response_time_ms: None,
            error_message: Some(failure.message()),
        },
        Err(_) => TcpCheck {
            is_up: false,
            response_time_ms: None,
            error_message: Some(format!("Timeout after {timeout_secs} seconds")),
        },
    }
}

/// Share of successful checks in percent; 100 when nothing was checked yet
pub fn uptime_percentage(total_checks: u64, successful_checks: u64) -> f64 {
    if total_checks == 0 {
        return 100.0;
    }
    successful_checks as f64 / total_checks as f64 * 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusColor {
    Green,
    Yellow,
    Red,
}

impl StatusColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusColor::Green => "green",
            StatusColor::Yellow => "yellow",
            StatusColor::Red => "red",
        }
    }
}

pub fn status_color(is_up: bool, response_time_ms: Option<f64>) -> StatusColor {
    match (is_up, response_time_ms) {
        (false, _) => StatusColor::Red,
        (true, Some(ms)) if ms > 1000.0 => StatusColor::Yellow,
        (true, _) => StatusColor::Green,
    }
}

/// Whether `service` should be probed at `now`
pub fn is_due(service: &ServiceHealth, now: DateTime<Utc>) -> bool {
    match service.last_check_time {
        None => true,
        Some(last) => {
            (now - last).num_seconds() + DUE_SLACK_SECS >= i64::from(service.check_interval)
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthReport {
    pub checked: usize,
    pub up: usize,
    pub down: usize,
    /// Checks whose result could not be stored
    pub failed: usize,
}

pub struct HealthChecker {
    storage: Arc<dyn StorageBackend>,
    client: Client,
    concurrency: usize,
}

impl HealthChecker {
    pub fn new(storage: Arc<dyn StorageBackend>, concurrency: usize) -> anyhow::Result<Self> {
        let client = Client::builder()
            .redirect(Policy::limited(MAX_REDIRECTS))
            .build()
            .context("failed to build health check HTTP client")?;

        Ok(Self {
            storage,
            client,
            concurrency: concurrency.max(1),
        })
    }

    pub async fn run_health_checks(&self) -> HealthReport {
        self.run_health_checks_at(Utc::now()).await
    }

    /// Probe every active service that is due at `now`
    #[instrument(skip(self))]
    pub async fn run_health_checks_at(&self, now: DateTime<Utc>) -> HealthReport {
        let services = match self.storage.active_services().await {
            Ok(services) => services,
            Err(e) => {
                error!("Error loading monitored services: {e}");
                return HealthReport::default();
            }
        };

        let due: Vec<ServiceHealth> = services
            .into_iter()
            .filter(|service| is_due(service, now))
            .collect();
        debug!(due = due.len(), "running health checks");

        let results: Vec<anyhow::Result<bool>> = futures::stream::iter(due)
            .map(|service| self.check_service(service, now))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = HealthReport::default();
        for result in results {
            report.checked += 1;
            match result {
                Ok(true) => report.up += 1,
                Ok(false) => report.down += 1,
                Err(e) => {
                    report.failed += 1;
                    error!("Error checking service: {e:#}");
                }
            }
        }
        report
    }

    async fn check_service(
        &self,
        service: ServiceHealth,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let update = check_http_service(&self.client, &service.url, service.timeout).await;
        let is_up = update.is_up;

        if let Some(reason) = &update.error_message {
            warn!(service = %service.name, url = %service.url, "service down: {reason}");
        } else if !is_up {
            warn!(
                service = %service.name,
                status = ?update.status_code,
                "service returned an error status"
            );
        }

        self.storage
            .update_service_status(service.id, update, now)
            .await
            .with_context(|| format!("failed to store health of service {}", service.name))?;

        Ok(is_up)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::NewService;
    use crate::storage::memory::MemoryBackend;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_http_status_ranges() {
        let mock = MockServer::start().await;
        Mock::given(path("/ok"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&mock)
            .await;
        Mock::given(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock)
            .await;

        let client = Client::new();
        let ok = check_http_service(&client, &format!("{}/ok", mock.uri()), 5).await;
        assert!(ok.is_up);
        assert_eq!(ok.status_code, Some(204));
        assert!(ok.response_time_ms.is_some());

        let missing = check_http_service(&client, &format!("{}/missing", mock.uri()), 5).await;
        assert!(!missing.is_up);
        assert_eq!(missing.status_code, Some(404));
        assert_eq!(missing.error_message, None);
    }

    #[tokio::test]
    async fn test_redirects_are_followed() {
        let mock = MockServer::start().await;
        Mock::given(path("/old"))
            .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
            .mount(&mock)
            .await;
        Mock::given(path("/new"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock)
            .await;

        let update = check_http_service(&Client::new(), &format!("{}/old", mock.uri()), 5).await;
        assert_eq!(update.status_code, Some(200));
    }

    #[tokio::test]
    async fn test_timeout_marks_down() {
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&mock)
            .await;

        let update = check_http_service(&Client::new(), &mock.uri(), 1).await;
        assert!(!update.is_up);
        assert_eq!(update.status_code, None);
        assert_eq!(update.response_time_ms, None);
        assert_eq!(update.error_message.as_deref(), Some("Timeout after 1 seconds"));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let update =
            check_http_service(&Client::new(), &format!("http://127.0.0.1:{port}/"), 2).await;
        assert!(!update.is_up);
        assert_matches!(update.error_message, Some(msg) if msg.starts_with("Connection error:"));

        let tcp = check_tcp_service("127.0.0.1", port, 2).await;
        assert!(!tcp.is_up);
        assert_matches!(
            tcp.error_message,
            Some(msg) if msg.starts_with("Connection refused (error code: ")
        );
    }

    #[tokio::test]
    async fn test_tcp_unresolvable_host() {
        let tcp = check_tcp_service("monitor.invalid", 80, 10).await;
        assert!(!tcp.is_up);
        assert_eq!(tcp.response_time_ms, None);
        assert_matches!(
            tcp.error_message,
            Some(msg) if msg.starts_with("DNS resolution failed: ")
        );
    }

    #[tokio::test]
    async fn test_tcp_service_up() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let tcp = check_tcp_service("127.0.0.1", port, 2).await;
        assert!(tcp.is_up);
        assert!(tcp.response_time_ms.is_some());
    }

    #[test]
    fn test_uptime_and_color() {
        assert_eq!(uptime_percentage(0, 0), 100.0);
        assert_eq!(uptime_percentage(4, 3), 75.0);

        assert_eq!(status_color(false, Some(10.0)), StatusColor::Red);
        assert_eq!(status_color(true, Some(1500.0)), StatusColor::Yellow);
        assert_eq!(status_color(true, Some(1000.0)), StatusColor::Green);
        assert_eq!(status_color(true, None).as_str(), "green");
    }

    #[tokio::test]
    async fn test_run_honors_check_interval() {
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock)
            .await;

        let storage = Arc::new(MemoryBackend::new());
        let mut fast = NewService::new("fast", mock.uri());
        fast.check_interval = 60;
        let mut slow = NewService::new("slow", mock.uri());
        slow.check_interval = 300;
        let fast = storage.insert_service(fast).await.unwrap();
        let slow = storage.insert_service(slow).await.unwrap();

        let checker = HealthChecker::new(storage.clone(), 4).unwrap();
        let start = Utc::now();

        let report = checker.run_health_checks_at(start).await;
        assert_eq!(report.checked, 2);
        assert_eq!(report.up, 2);

        let report = checker
            .run_health_checks_at(start + chrono::Duration::seconds(60))
            .await;
        assert_eq!(report.checked, 1);

        let fast = storage.service(fast.id).await.unwrap().unwrap();
        let slow = storage.service(slow.id).await.unwrap().unwrap();
        assert_eq!(fast.last_check_time, Some(start + chrono::Duration::seconds(60)));
        assert_eq!(slow.last_check_time, Some(start));
        assert!(fast.is_up);
        assert_eq!(fast.status_code, Some(200));
    }
}
