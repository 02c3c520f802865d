//! HTTP client behaviour against a mock upstream.

use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use genmedia_core::error::RETRYABLE_STATUSES;
use genmedia_core::{MediaError, MediaTransport, RequestOptions, ResponseKind};
use genmedia_server::{MediaApiClient, RetryConfig};
use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Fast retries so tests do not sleep for seconds.
fn client(server: &MockServer, key: Option<&str>) -> MediaApiClient {
    MediaApiClient::with_retry_config(
        Url::parse(&server.uri()).unwrap(),
        key.map(|k| SecretString::from(k.to_string())),
        RetryConfig::new(2, 10, 50, 0.1),
        Duration::from_secs(5),
    )
    .unwrap()
}

async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.unwrap_or_default().len()
}

#[tokio::test]
async fn retries_service_unavailable_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sdxl1.0-txt2img"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sdxl1.0-txt2img"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"image": "AAAA"})))
        .mount(&server)
        .await;

    let envelope = client(&server, Some("test-key"))
        .request("/sdxl1.0-txt2img", RequestOptions::post(json!({"prompt": "fox"})))
        .await
        .unwrap();

    assert_eq!(envelope.data_str("image"), Some("AAAA"));
    assert_eq!(request_count(&server).await, 3);
}

#[tokio::test]
async fn exhausted_retries_surface_the_last_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let err = client(&server, Some("test-key"))
        .request("/kling-2.1", RequestOptions::post(json!({})))
        .await
        .unwrap_err();

    match err {
        MediaError::Generation { status, message, .. } => {
            assert_eq!(status, Some(502));
            assert!(message.contains("bad gateway"), "{message}");
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(request_count(&server).await, 3);
}

#[tokio::test]
async fn rate_limits_honour_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "1"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"ok": true}})))
        .mount(&server)
        .await;

    let started = Instant::now();
    let envelope = client(&server, Some("test-key"))
        .request("/lyria-2", RequestOptions::post(json!({"prompt": "jazz"})))
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_millis(1000));
    assert_eq!(envelope.data, Some(json!({"ok": true})));
    assert_eq!(request_count(&server).await, 2);
}

#[tokio::test]
async fn persistent_rate_limits_become_rate_limit_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let err = client(&server, Some("test-key"))
        .request("/lyria-2", RequestOptions::post(json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, MediaError::RateLimit { .. }), "{err:?}");
    assert_eq!(request_count(&server).await, 3);
}

#[tokio::test]
async fn every_retryable_status_gets_a_second_attempt() {
    for status in RETRYABLE_STATUSES {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(status).set_body_string("transient"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"image": "AAAA"})))
            .mount(&server)
            .await;

        let envelope = client(&server, Some("test-key"))
            .request("/sdxl1.0-txt2img", RequestOptions::post(json!({})))
            .await
            .unwrap_or_else(|e| panic!("{status} was not retried: {e:?}"));

        assert_eq!(envelope.data_str("image"), Some("AAAA"), "{status}");
        assert_eq!(request_count(&server).await, 2, "{status}");
    }
}

#[tokio::test]
async fn client_errors_make_a_single_attempt() {
    for status in [400_u16, 404, 406, 422] {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(status).set_body_json(json!({"error": "bad request"})),
            )
            .mount(&server)
            .await;

        let err = client(&server, Some("test-key"))
            .request("/sdxl1.0-txt2img", RequestOptions::post(json!({})))
            .await
            .unwrap_err();

        match err {
            MediaError::Generation { status: got, message, .. } => {
                assert_eq!(got, Some(status));
                assert!(message.contains("bad request"), "{message}");
            }
            other => panic!("{status}: unexpected {other:?}"),
        }
        assert_eq!(request_count(&server).await, 1, "{status}");
    }
}

#[tokio::test]
async fn credit_errors_on_not_acceptable_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(406).set_body_json(json!({"error": "Not enough credits"})),
        )
        .mount(&server)
        .await;

    let err = client(&server, Some("test-key"))
        .request("/flux-1.1-pro", RequestOptions::post(json!({})))
        .await
        .unwrap_err();

    assert!(matches!(err, MediaError::InsufficientCredits(_)), "{err:?}");
    assert_eq!(request_count(&server).await, 1);
}

#[tokio::test]
async fn error_field_fails_a_200_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"error": "NSFW content detected"})),
        )
        .mount(&server)
        .await;

    let err = client(&server, Some("test-key"))
        .request("/sdxl1.0-txt2img", RequestOptions::post(json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, MediaError::Generation { .. }));
    assert_eq!(err.to_string(), "NSFW content detected");
    assert_eq!(request_count(&server).await, 1);
}

#[tokio::test]
async fn binary_images_are_base64_encoded() {
    let png = [0x89_u8, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sdxl1.0-txt2img"))
        .and(header("x-api-key", "test-key"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(png.to_vec(), "image/png")
                .insert_header("x-credits-consumed", "0.5")
                .insert_header("x-remaining-credits", "99.5"),
        )
        .mount(&server)
        .await;

    let envelope = client(&server, Some("test-key"))
        .generate_image("sdxl", json!({"prompt": "fox"}), RequestOptions::default())
        .await
        .unwrap();

    let data = envelope.data.unwrap();
    assert_eq!(data["image"], STANDARD.encode(png));
    assert_eq!(data["format"], "png");
    assert_eq!(data["size"], 8);
    let credits = envelope.credits.unwrap();
    assert_eq!(credits.used, Some(0.5));
    assert_eq!(credits.remaining, Some(99.5));
}

#[tokio::test]
async fn missing_key_fails_without_a_request() {
    let server = MockServer::start().await;

    let err = client(&server, None)
        .request("/sdxl1.0-txt2img", RequestOptions::post(json!({})))
        .await
        .unwrap_err();

    assert!(matches!(err, MediaError::Authentication(_)));
    assert_eq!(request_count(&server).await, 0);
}

#[tokio::test]
async fn auth_and_billing_failures_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(path("/auth"))
        .respond_with(ResponseTemplate::new(401).set_body_string("nope"))
        .mount(&server)
        .await;
    Mock::given(path("/billing"))
        .respond_with(ResponseTemplate::new(402).set_body_json(json!({"message": "top up"})))
        .mount(&server)
        .await;

    let client = client(&server, Some("bad-key"));
    let auth = client
        .request("/auth", RequestOptions::post(json!({})))
        .await
        .unwrap_err();
    let billing = client
        .request("/billing", RequestOptions::post(json!({})))
        .await
        .unwrap_err();

    assert!(matches!(auth, MediaError::Authentication(_)));
    assert!(matches!(billing, MediaError::InsufficientCredits(_)));
    assert!(billing.to_string().contains("top up"));
    assert_eq!(request_count(&server).await, 2);
}

#[tokio::test]
async fn slow_responses_time_out_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"ok": true}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let err = client(&server, Some("test-key"))
        .request(
            "/seedance-v1-lite-text-to-video",
            RequestOptions::post(json!({}))
                .expect(ResponseKind::Video)
                .timeout(Duration::from_millis(100)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, MediaError::Timeout(_)), "{err:?}");
    assert!(err.to_string().starts_with("Video generation failed"));
    assert_eq!(request_count(&server).await, 1);
}

#[tokio::test]
async fn credit_balance_reads_bare_numbers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/credits"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"credits": 42.0})))
        .mount(&server)
        .await;

    let credits = client(&server, Some("test-key")).credit_balance().await.unwrap();
    assert_eq!(credits.remaining, Some(42.0));
}
