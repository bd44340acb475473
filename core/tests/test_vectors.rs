//! Verify URL resolution and response parsing against JSON test vectors
//! stored in `test-vectors/`.
//!
//! Each vector file lists inputs and the expected outcome. Comparing parsed
//! JSON values (not raw strings) avoids false negatives from field ordering.

use convertio_core::{Api, ApiConfig, ApiResponse, ConvertioError, HttpResponse, Protocol, UreqClient};

fn api(protocol: &str) -> Api {
    let mut config = ApiConfig::new("vector-key").unwrap();
    config.set_protocol(protocol.parse::<Protocol>().unwrap());
    Api::from_config(config, UreqClient)
}

// ---------------------------------------------------------------------------
// URL resolution
// ---------------------------------------------------------------------------

#[test]
fn resolve_url_test_vectors() {
    let raw = include_str!("../../test-vectors/resolve_url.json");
    let vectors: serde_json::Value = serde_json::from_str(raw).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let api = api(case["protocol"].as_str().unwrap());
        let url = api.resolve_url(case["path"].as_str().unwrap());
        assert_eq!(url, case["expected_url"].as_str().unwrap(), "{name}");
    }
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

#[test]
fn response_test_vectors() {
    let raw = include_str!("../../test-vectors/responses.json");
    let vectors: serde_json::Value = serde_json::from_str(raw).unwrap();

    let api = api("https");
    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let headers = case["content_type"]
            .as_str()
            .map(|ct| vec![("Content-Type".to_string(), ct.to_string())])
            .unwrap_or_default();
        let response = HttpResponse {
            status: case["status"].as_u64().unwrap() as u16,
            headers,
            body: case["body"].as_str().unwrap().as_bytes().to_vec(),
        };

        let expected = &case["expected"];
        let result = api.parse_response(response);
        match expected["kind"].as_str().unwrap() {
            "json" => {
                assert_eq!(
                    result.unwrap(),
                    ApiResponse::Json(expected["value"].clone()),
                    "{name}"
                );
            }
            "raw" => {
                let body = expected["body"].as_str().unwrap().as_bytes().to_vec();
                assert_eq!(result.unwrap(), ApiResponse::Raw(body), "{name}");
            }
            "service_error" => match result {
                Err(ConvertioError::Service { message, code }) => {
                    assert_eq!(message, expected["message"].as_str().unwrap(), "{name}");
                    assert_eq!(code, expected["code"].as_i64(), "{name}");
                }
                other => panic!("{name}: expected Service error, got {other:?}"),
            },
            "protocol_error" => {
                assert!(
                    matches!(result, Err(ConvertioError::Protocol(_))),
                    "{name}: got {result:?}"
                );
            }
            other => panic!("{name}: unknown expectation kind {other}"),
        }
    }
}
