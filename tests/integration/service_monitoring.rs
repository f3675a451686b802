//! Integration tests for service health checks
//!
//! These tests verify that:
//! - Healthy endpoints are stored as up with status and response time
//! - Timeouts mark a service down without a status code
//! - Each service's own check interval is honoured

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pretty_assertions::assert_eq;
use system_monitor::health::{HealthChecker, StatusColor, status_color};
use system_monitor::storage::memory::MemoryBackend;
use system_monitor::storage::{NewService, StorageBackend};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_healthy_service_is_up() {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock)
        .await;

    let storage = Arc::new(MemoryBackend::new());
    let service = storage
        .insert_service(NewService::new("api", format!("{}/health", mock.uri())))
        .await
        .unwrap();

    let checker = HealthChecker::new(storage.clone(), 2).unwrap();
    let report = checker.run_health_checks().await;
    assert_eq!(report.up, 1);

    let service = storage.service(service.id).await.unwrap().unwrap();
    assert!(service.is_up);
    assert_eq!(service.status_code, Some(200));
    assert_eq!(service.error_message, None);
    assert!(service.last_check_time.is_some());
    assert_eq!(
        status_color(service.is_up, service.response_time),
        StatusColor::Green
    );
}

#[tokio::test]
async fn test_timeout_marks_service_down() {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&mock)
        .await;

    let storage = Arc::new(MemoryBackend::new());
    let mut new_service = NewService::new("slow", mock.uri());
    new_service.timeout = 1;
    let service = storage.insert_service(new_service).await.unwrap();

    let checker = HealthChecker::new(storage.clone(), 2).unwrap();
    let report = checker.run_health_checks().await;
    assert_eq!(report.down, 1);

    let service = storage.service(service.id).await.unwrap().unwrap();
    assert!(!service.is_up);
    assert_eq!(service.status_code, None);
    assert_eq!(service.response_time, None);
    assert!(service.error_message.unwrap().contains("Timeout"));
}

#[tokio::test]
async fn test_server_error_and_inactive_services() {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock)
        .await;

    let storage = Arc::new(MemoryBackend::new());
    let failing = storage
        .insert_service(NewService::new("failing", mock.uri()))
        .await
        .unwrap();
    let mut paused = NewService::new("paused", mock.uri());
    paused.is_active = false;
    let paused = storage.insert_service(paused).await.unwrap();

    let checker = HealthChecker::new(storage.clone(), 1).unwrap();
    let report = checker.run_health_checks_at(Utc::now()).await;
    assert_eq!(report.checked, 1);

    let failing = storage.service(failing.id).await.unwrap().unwrap();
    assert!(!failing.is_up);
    assert_eq!(failing.status_code, Some(503));

    let paused = storage.service(paused.id).await.unwrap().unwrap();
    assert_eq!(paused.last_check_time, None);
}

#[tokio::test]
async fn test_many_services_with_bounded_concurrency() {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(50)))
        .expect(6)
        .mount(&mock)
        .await;

    let storage = Arc::new(MemoryBackend::new());
    for i in 0..6 {
        storage
            .insert_service(NewService::new(format!("svc-{i}"), mock.uri()))
            .await
            .unwrap();
    }

    let checker = HealthChecker::new(storage.clone(), 2).unwrap();
    let report = checker.run_health_checks().await;

    assert_eq!(report.checked, 6);
    assert_eq!(report.up, 6);
    assert!(
        storage
            .active_services()
            .await
            .unwrap()
            .iter()
            .all(|service| service.is_up)
    );
}
