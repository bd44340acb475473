//! Full conversion lifecycles against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port, then drives `Conversion` over real
//! HTTP through the default `ureq` client. Validates path resolution, request
//! encoding and response handling end to end.

use std::time::Duration;

use convertio_core::{Api, ApiConfig, Conversion, ConvertioError, Protocol, Step, UreqClient};
use mock_server::{MockConfig, FAILING_FORMAT, UNSUPPORTED_FORMAT};
use serde_json::{json, Map, Value};

/// Start the mock server in a background thread and return its `host:port`.
fn spawn_server() -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run_with(listener, MockConfig::default()).await
        })
        .unwrap();
    });

    addr.to_string()
}

fn conversion(host: &str, api_key: &str) -> Conversion {
    let mut config = ApiConfig::new(api_key).unwrap();
    config
        .set_host(host)
        .unwrap()
        .set_connect_timeout(5)
        .unwrap()
        .set_total_timeout(30)
        .unwrap()
        .set_protocol(Protocol::Http);
    Conversion::with_api(Api::from_config(config, UreqClient))
        .with_poll_interval(Duration::from_millis(10))
}

fn no_options() -> Map<String, Value> {
    Map::new()
}

#[test]
fn upload_lifecycle() {
    let host = spawn_server();
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("quarterly report.txt");
    std::fs::write(&source, b"numbers went up").unwrap();
    let target = dir.path().join("quarterly report.pdf");

    let mut conv = conversion(&host, "test-key");

    // Step 1: start from a local file (POST + PUT).
    conv.start(&source, "pdf", &no_options()).unwrap();
    assert_eq!(conv.step(), &Step::Convert);
    let id = conv.convert_id().unwrap().to_string();
    assert_eq!(id.len(), 32);

    // Step 2: wait until the mock reports finish.
    conv.wait().unwrap();
    assert_eq!(conv.step(), &Step::Finish);
    assert_eq!(conv.step_percent(), 100);
    assert_eq!(conv.result_size(), Some(15));
    assert!(conv.result_public_url().unwrap().contains(&id));

    // Step 3: status on a finished conversion still answers.
    conv.status().unwrap();
    assert_eq!(conv.step(), &Step::Finish);

    // Step 4: download writes the echoed bytes.
    conv.download(&target).unwrap();
    assert_eq!(std::fs::read(&target).unwrap(), b"numbers went up");

    // Step 5: delete, then the service no longer knows the id.
    conv.delete().unwrap();
    let err = conv.delete().unwrap_err();
    assert!(matches!(err, ConvertioError::Service { code: Some(404), .. }));
}

#[test]
fn content_round_trip() {
    let host = spawn_server();
    let payload = b"\x00raw\xffbytes\n".to_vec();
    let mut conv = conversion(&host, "test-key");

    conv.start_from_content(&payload, "txt", "pdf", &no_options())
        .unwrap()
        .wait()
        .unwrap()
        .fetch_result_content()
        .unwrap();

    assert_eq!(conv.result_content(), Some(payload.as_slice()));
}

#[test]
fn url_conversion_with_options() {
    let host = spawn_server();
    let mut options = Map::new();
    options.insert("ocr_enabled".to_string(), json!(false));
    let mut conv = conversion(&host, "test-key");

    conv.start_from_url("https://example.com/page.html", "png", &options)
        .unwrap()
        .wait()
        .unwrap();

    assert_eq!(conv.step(), &Step::Finish);
    assert!(conv.result_public_url().unwrap().ends_with(".png"));
}

#[test]
fn invalid_key_is_absorbed_by_start() {
    let host = spawn_server();
    let mut conv = conversion(&host, "wrong-key");

    conv.start_from_url("https://example.com", "pdf", &no_options())
        .unwrap()
        .wait()
        .unwrap();

    assert_eq!(conv.step(), &Step::Error);
    assert_eq!(conv.error_message(), Some("Invalid API Key"));
    assert!(conv.convert_id().is_none());
}

#[test]
fn rejected_start_skips_upload() {
    let host = spawn_server();
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("in.txt");
    std::fs::write(&source, b"x").unwrap();
    let mut conv = conversion(&host, "test-key");

    conv.start(&source, UNSUPPORTED_FORMAT, &no_options()).unwrap();

    assert_eq!(conv.step(), &Step::Error);
    assert_eq!(
        conv.error_message(),
        Some("This type of conversion is not supported")
    );
}

#[test]
fn failed_conversion_surfaces_through_wait() {
    let host = spawn_server();
    let mut conv = conversion(&host, "test-key");

    conv.start_from_content(b"abc", "txt", FAILING_FORMAT, &no_options())
        .unwrap();
    let err = conv.wait().unwrap_err();

    assert!(matches!(err, ConvertioError::Service { .. }));
    assert_eq!(conv.step(), &Step::Error);
    assert_eq!(conv.error_message(), Some("Conversion failed"));
}

#[test]
fn unreachable_service_is_a_transport_error() {
    // Bind and drop to get a port nobody listens on.
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let mut conv = conversion(&format!("127.0.0.1:{port}"), "test-key");

    let err = conv
        .start_from_url("https://example.com", "pdf", &no_options())
        .unwrap_err();

    assert!(matches!(err, ConvertioError::Transport { .. }));
    assert_eq!(conv.step(), &Step::NotStarted);
}
