use std::str::FromStr;
use std::time::Instant;

use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pipg_client::{Error, RegistryClientBuilder};
use pipg_normalize::PackageName;
use tokio_util::sync::CancellationToken;

fn package_body(name: &str, version: &str) -> serde_json::Value {
    serde_json::json!({
        "info": {"name": name, "version": version, "requires_dist": []},
        "urls": [],
        "releases": {version: []}
    })
}

#[tokio::test]
async fn get_package_hits_json_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/six/json"))
        .and(header("Accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(package_body("six", "1.17.0")))
        .expect(1)
        .mount(&server)
        .await;

    let client = RegistryClientBuilder::default()
        .index(Url::parse(&server.uri()).unwrap())
        .build();
    let info = client
        .get_package(&PackageName::from_str("six").unwrap())
        .await
        .unwrap();
    assert_eq!(info.info.version, "1.17.0");
}

#[tokio::test]
async fn get_version_hits_pinned_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flask/3.0.0/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(package_body("flask", "3.0.0")))
        .expect(1)
        .mount(&server)
        .await;

    let client = RegistryClientBuilder::default()
        .index(Url::parse(&server.uri()).unwrap())
        .build();
    let info = client
        .get_version(&PackageName::from_str("flask").unwrap(), "3.0.0")
        .await
        .unwrap();
    assert_eq!(info.info.version, "3.0.0");
}

#[tokio::test]
async fn not_found_is_terminal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/nonexistent/json"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = RegistryClientBuilder::default()
        .index(Url::parse(&server.uri()).unwrap())
        .build();
    let err = client
        .get_package(&PackageName::from_str("nonexistent").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PackageNotFound(name) if name == "nonexistent"));
}

#[tokio::test]
async fn server_errors_are_retried_with_backoff() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky/json"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(package_body("flaky", "1.0.0")))
        .expect(1)
        .mount(&server)
        .await;

    let client = RegistryClientBuilder::default()
        .index(Url::parse(&server.uri()).unwrap())
        .build();

    let start = Instant::now();
    let info = client
        .get_package(&PackageName::from_str("flaky").unwrap())
        .await
        .unwrap();
    assert_eq!(info.info.version, "1.0.0");
    // Two failures mean backoffs of 500ms and 1000ms before the success.
    assert!(start.elapsed().as_millis() >= 1500);
}

#[tokio::test]
async fn retries_are_exhausted_after_three_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/broken/json"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let client = RegistryClientBuilder::default()
        .index(Url::parse(&server.uri()).unwrap())
        .build();
    let err = client
        .get_package(&PackageName::from_str("broken").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::ServerError {
            status: 500,
            attempts: 3,
            ..
        }
    ));
}

#[tokio::test]
async fn bad_json_is_terminal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/garbled/json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .expect(1)
        .mount(&server)
        .await;

    let client = RegistryClientBuilder::default()
        .index(Url::parse(&server.uri()).unwrap())
        .build();
    let err = client
        .get_package(&PackageName::from_str("garbled").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BadJson { .. }));
}

#[tokio::test]
async fn cancellation_during_backoff() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow/json"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let client = RegistryClientBuilder::default()
        .index(Url::parse(&server.uri()).unwrap())
        .cancel(cancel.clone())
        .build();

    let request = tokio::spawn({
        let name = PackageName::from_str("slow").unwrap();
        async move { client.get_package(&name).await }
    });
    // Give the first attempt time to fail, then cancel mid-backoff.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    cancel.cancel();

    let err = request.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Canceled));
}
