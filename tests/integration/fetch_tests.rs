//! Integration tests for the HTTP fetcher
//!
//! These tests use wiremock to check retry, backoff and error mapping
//! against a real HTTP server.

use broker_sieve::config::HttpConfig;
use broker_sieve::crawler::{FetchError, FetchRender, HttpFetcher};
use broker_sieve::{classify, FailureType};
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_config(max_attempts: u32) -> HttpConfig {
    HttpConfig {
        user_agent: "broker-sieve-test/0.1".to_string(),
        timeout_secs: 5,
        connect_timeout_secs: 2,
        max_attempts,
        backoff_base_ms: 1,
        backoff_cap_ms: 10,
    }
}

fn url(server: &MockServer, p: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), p)).unwrap()
}

#[tokio::test]
async fn test_fetch_returns_page() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/listings"))
        .and(header("user-agent", "broker-sieve-test/0.1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>ok</body></html>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let fetcher = HttpFetcher::new(&fast_config(3)).unwrap();
    let page = fetcher
        .fetch_render(&url(&mock_server, "/listings"))
        .await
        .unwrap();

    assert_eq!(page.status, 200);
    assert!(page.html.contains("ok"));
    assert_eq!(page.final_url.path(), "/listings");
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let mock_server = MockServer::start().await;

    // Mounted first, so it answers the first request only
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>recovered</html>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let fetcher = HttpFetcher::new(&fast_config(3)).unwrap();
    let page = fetcher
        .fetch_render(&url(&mock_server, "/flaky"))
        .await
        .unwrap();

    assert!(page.html.contains("recovered"));
}

#[tokio::test]
async fn test_rate_limit_exhausts_attempts() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&mock_server)
        .await;

    let fetcher = HttpFetcher::new(&fast_config(3)).unwrap();
    let err = fetcher
        .fetch_render(&url(&mock_server, "/busy"))
        .await
        .unwrap_err();

    assert_eq!(err.http_status(), Some(429));
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let fetcher = HttpFetcher::new(&fast_config(5)).unwrap();
    let err = fetcher
        .fetch_render(&url(&mock_server, "/gone"))
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Status { status: 404, .. }));
    let (kind, _) = classify(&err.to_string(), err.http_status(), None);
    assert_eq!(kind, FailureType::NotFound);
}

#[tokio::test]
async fn test_forbidden_classifies_as_blocked() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/private"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&mock_server)
        .await;

    let fetcher = HttpFetcher::new(&fast_config(5)).unwrap();
    let err = fetcher
        .fetch_render(&url(&mock_server, "/private"))
        .await
        .unwrap_err();

    let (kind, _) = classify(&err.to_string(), err.http_status(), None);
    assert_eq!(kind, FailureType::Blocked);
}

#[tokio::test]
async fn test_download_file_bytes() {
    let mock_server = MockServer::start().await;
    let body = "Business Name,Asking Price\nSparkle Janitorial,\"$240,000\"\n";
    Mock::given(method("GET"))
        .and(path("/inventory.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&mock_server)
        .await;

    let fetcher = HttpFetcher::new(&fast_config(2)).unwrap();
    let bytes = fetcher
        .download_file(&url(&mock_server, "/inventory.csv"))
        .await
        .unwrap();

    assert_eq!(bytes, body.as_bytes());
}

#[tokio::test]
async fn test_redirect_reports_final_url() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old-listings"))
        .respond_with(
            ResponseTemplate::new(301).insert_header("location", "/businesses-for-sale"),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/businesses-for-sale"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>moved</html>"))
        .mount(&mock_server)
        .await;

    let fetcher = HttpFetcher::new(&fast_config(2)).unwrap();
    let page = fetcher
        .fetch_render(&url(&mock_server, "/old-listings"))
        .await
        .unwrap();

    assert_eq!(page.final_url.path(), "/businesses-for-sale");
}
