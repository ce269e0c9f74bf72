use std::collections::BTreeMap;
use std::time::Duration;

use bulwark::{LoadRunnerBuilder, RunError, probe};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_status(server: &MockServer, status: u16) {
    Mock::given(method("GET"))
        .and(path("/demo"))
        .respond_with(ResponseTemplate::new(status).set_body_string("body"))
        .mount(server)
        .await;
}

/// An address nothing listens on
async fn closed_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/demo", addr)
}

/// A target that sends a 200 status line, then stalls halfway through the body
async fn stalled_body_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\npartial")
                    .await;
                let _ = socket.flush().await;
                tokio::time::sleep(Duration::from_secs(10)).await;
            });
        }
    });

    format!("http://{}/demo", addr)
}

#[tokio::test]
async fn test_all_probes_succeed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/demo"))
        .respond_with(ResponseTemplate::new(200).set_body_string("PROTECTED"))
        .expect(10)
        .mount(&server)
        .await;

    let runner = LoadRunnerBuilder::new().build().unwrap();
    let summary = runner
        .run(&format!("{}/demo", server.uri()), 10, "protected")
        .await
        .unwrap();

    assert_eq!(summary.total_requests, 10);
    assert_eq!(summary.requests.len(), 10);
    assert_eq!(summary.success_count, 10);
    assert_eq!(summary.rejected_count, 0);
    assert_eq!(summary.success_rate, "100%");
    assert_eq!(summary.kind, "protected");
    assert!(summary.requests.iter().all(|r| r.error.is_none() && r.kind == "protected"));
}

#[tokio::test]
async fn test_mixed_statuses_are_tallied() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/demo"))
        .respond_with(ResponseTemplate::new(200))
        .up_to_n_times(3)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_status(&server, 429).await;

    let runner = LoadRunnerBuilder::new().build().unwrap();
    let summary = runner
        .run(&format!("{}/demo", server.uri()), 5, "protected")
        .await
        .unwrap();

    let expected: BTreeMap<String, usize> =
        [("200".to_string(), 3), ("429".to_string(), 2)].into_iter().collect();
    assert_eq!(summary.success_count, 3);
    assert_eq!(summary.rejected_count, 2);
    assert_eq!(summary.status_codes, expected);
    assert_eq!(summary.success_rate, "60%");
}

#[tokio::test]
async fn test_invariants_hold_for_various_sizes() {
    let server = MockServer::start().await;
    mount_status(&server, 503).await;
    let runner = LoadRunnerBuilder::new().build().unwrap();
    let url = format!("{}/demo", server.uri());

    for n in [1usize, 7, 64] {
        let summary = runner.run(&url, n, "unprotected").await.unwrap();

        assert_eq!(summary.requests.len(), n);
        assert_eq!(summary.total_requests, n);
        assert_eq!(summary.success_count + summary.rejected_count, summary.total_requests);
        assert_eq!(summary.status_codes.values().sum::<usize>(), summary.total_requests);
        assert_eq!(summary.success_rate, "0%");

        let ids: Vec<u32> = summary.requests.iter().map(|r| r.id).collect();
        assert_eq!(ids, (1..=n as u32).collect::<Vec<_>>());

        let mean = summary.response_times.iter().sum::<f64>() / n as f64;
        assert!((summary.avg_time - mean).abs() < 1e-12);
        assert!(summary.response_times.iter().all(|t| *t >= 0.0));
    }
}

#[tokio::test]
async fn test_unreachable_host_yields_status_zero() {
    let client = reqwest::Client::new();
    let url = url::Url::parse(&closed_url().await).unwrap();

    let result = probe(&client, url, 1, "unprotected".to_string()).await;

    assert_eq!(result.status, 0);
    assert!(result.error.is_some());
    assert!(!result.is_success());
}

#[tokio::test]
async fn test_unreachable_run_is_not_an_error() {
    let runner = LoadRunnerBuilder::new().build().unwrap();
    let summary = runner.run(&closed_url().await, 4, "unprotected").await.unwrap();

    assert_eq!(summary.rejected_count, 4);
    assert_eq!(summary.status_codes.get("0"), Some(&4));
    assert!(summary.requests.iter().all(|r| r.error.is_some()));
}

#[tokio::test]
async fn test_timeout_yields_status_zero() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let runner = LoadRunnerBuilder::new()
        .timeout(Duration::from_millis(200))
        .build()
        .unwrap();
    let summary = runner
        .run(&format!("{}/slow", server.uri()), 3, "protected")
        .await
        .unwrap();

    assert_eq!(summary.success_count, 0);
    assert!(summary.requests.iter().all(|r| r.status == 0 && r.error.is_some()));
    assert!(summary.response_times.iter().all(|t| *t < 5.0));
}

#[tokio::test]
async fn test_body_timeout_is_not_a_success() {
    let runner = LoadRunnerBuilder::new()
        .timeout(Duration::from_millis(300))
        .build()
        .unwrap();
    let summary = runner.run(&stalled_body_url().await, 2, "protected").await.unwrap();

    assert_eq!(summary.success_count, 0);
    assert_eq!(summary.rejected_count, 2);
    assert_eq!(summary.status_codes.get("0"), Some(&2));
    assert!(summary.status_codes.get("200").is_none());
    assert!(summary.requests.iter().all(|r| {
        r.error
            .as_deref()
            .is_some_and(|e| e.starts_with("Failed to read response body"))
    }));
}

#[tokio::test]
async fn test_observer_sees_every_probe() {
    let server = MockServer::start().await;
    mount_status(&server, 200).await;
    let runner = LoadRunnerBuilder::new().build().unwrap();

    let mut seen = Vec::new();
    let summary = runner
        .run_observed(&format!("{}/demo", server.uri()), 12, "protected", |r| seen.push(r.id))
        .await
        .unwrap();

    seen.sort();
    assert_eq!(seen, (1..=12).collect::<Vec<u32>>());
    assert_eq!(summary.total_requests, 12);
}

#[tokio::test]
async fn test_request_count_bounds() {
    let runner = LoadRunnerBuilder::new().build().unwrap();

    assert!(matches!(
        runner.run("http://127.0.0.1:9/demo", 0, "protected").await,
        Err(RunError::InvalidCount(0))
    ));
    assert!(matches!(
        runner.run("http://127.0.0.1:9/demo", 1001, "protected").await,
        Err(RunError::InvalidCount(1001))
    ));
    assert!(matches!(
        runner.run("not a url", 5, "protected").await,
        Err(RunError::InvalidUrl(_))
    ));
}
