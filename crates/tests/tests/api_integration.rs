use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use leafcare_agents::PlantCareAdvisor;
use leafcare_api::{build_app, build_router, ApiState, IpRateLimiter, DEFAULT_API_KEY};
use leafcare_core::{AppConfig, KnowledgeBase};
use leafcare_observability::AppMetrics;
use serde_json::{json, Value};
use tower::ServiceExt;

fn workspace_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..")
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 200) as u8, 150, (y % 120) as u8])
    });
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

async fn app() -> Router {
    let root = workspace_root();
    build_app(Some(root.join("config.yaml")), root.join("kb"))
        .await
        .expect("app should build")
}

fn custom_app(config: AppConfig, limiter: IpRateLimiter) -> Router {
    let kb = KnowledgeBase::load(workspace_root().join("kb")).unwrap();
    let advisor = PlantCareAdvisor::new(config, Arc::new(kb), AppMetrics::shared());
    build_router(ApiState::new(advisor, DEFAULT_API_KEY, limiter))
}

fn detect_request(uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/octet-stream")
        .header("x-api-key", DEFAULT_API_KEY)
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let response = app()
        .await
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let parsed = json_body(response).await;
    assert_eq!(parsed["status"], "healthy");
    assert_eq!(parsed["features"]["mock_mode"], true);
    assert_eq!(parsed["model"]["backend"], "mock");
    assert!(parsed.get("timestamp_utc").is_some());
    assert!(parsed["metrics"].get("requests_total").is_some());
    assert_eq!(parsed["supported_languages"].as_array().map(Vec::len), Some(5));
}

#[tokio::test]
async fn detect_requires_api_key() {
    let request = Request::builder()
        .method("POST")
        .uri("/v1/detect?filename=leaf.png")
        .body(Body::from(png(300, 300)))
        .unwrap();

    let response = app().await.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn detect_returns_structured_payload() {
    let response = app()
        .await
        .oneshot(detect_request(
            "/v1/detect?filename=leaf.png&language=es&crop_type=tomato&growth_stage=flowering",
            png(300, 300),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let parsed = json_body(response).await;
    let confidence = parsed["disease"]["confidence"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&confidence));
    assert_eq!(parsed["metadata"]["language"], "es");
    assert_eq!(parsed["metadata"]["recommendation_metadata"]["crop_type"], "tomato");
    assert_eq!(
        parsed["metadata"]["recommendation_metadata"]["growth_stage"],
        "flowering"
    );
    assert_eq!(parsed["metadata"]["model_info"]["mock_mode"], true);
    assert!(parsed["labels"].get("disease_detected").is_some());

    for treatment in parsed["recommended_treatments"].as_array().unwrap() {
        assert!(treatment["indicators"]["badge"].is_string());
        assert!(treatment.get("cost_display").is_some());
    }
}

#[tokio::test]
async fn unsupported_extension_is_415() {
    let response = app()
        .await
        .oneshot(detect_request("/v1/detect?filename=leaf.bmp", png(300, 300)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let parsed = json_body(response).await;
    assert_eq!(parsed["error"], true);
    assert_eq!(parsed["error_code"], "UNSUPPORTED_FORMAT");
}

#[tokio::test]
async fn small_and_corrupt_uploads_are_422() {
    let small = app()
        .await
        .oneshot(detect_request("/v1/detect?filename=leaf.png", png(100, 100)))
        .await
        .unwrap();
    assert_eq!(small.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json_body(small).await["error_code"], "TOO_SMALL");

    let corrupt = app()
        .await
        .oneshot(detect_request(
            "/v1/detect?filename=leaf.jpg&language=fr",
            b"definitely not a jpeg".to_vec(),
        ))
        .await
        .unwrap();
    assert_eq!(corrupt.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let parsed = json_body(corrupt).await;
    assert_eq!(parsed["error_code"], "CORRUPT_IMAGE");
    assert_eq!(parsed["language"], "fr");
}

#[tokio::test]
async fn unknown_growth_stage_is_400() {
    let response = app()
        .await
        .oneshot(detect_request(
            "/v1/detect?filename=leaf.png&growth_stage=dormant",
            png(300, 300),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oversize_uploads_are_413() {
    let config = AppConfig {
        image: leafcare_core::ImageConfig {
            max_size_mb: 1.0,
            ..Default::default()
        },
        ..AppConfig::default()
    };
    let limiter = IpRateLimiter::new(Duration::from_secs(60), 100);

    // Inside the transport limit: the validator rejects it with a structured body.
    let response = custom_app(config.clone(), limiter.clone())
        .oneshot(detect_request(
            "/v1/detect?filename=leaf.png",
            vec![0u8; 1_500_000],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json_body(response).await["error_code"], "TOO_LARGE");

    // Beyond the transport limit: still the structured, localized body.
    let response = custom_app(config.clone(), limiter.clone())
        .oneshot(detect_request(
            "/v1/detect?filename=leaf.png&language=es",
            vec![0u8; 3 * 1024 * 1024],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let parsed = json_body(response).await;
    assert_eq!(parsed["error_code"], "TOO_LARGE");
    assert_eq!(parsed["language"], "es");

    // A declared content-length over the limit is refused up front, same body.
    let mut declared = detect_request("/v1/detect?filename=leaf.png", vec![0u8; 3 * 1024 * 1024]);
    declared
        .headers_mut()
        .insert("content-length", (3 * 1024 * 1024).to_string().parse().unwrap());
    let response = custom_app(config, limiter).oneshot(declared).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json_body(response).await["error_code"], "TOO_LARGE");
}

#[tokio::test]
async fn detection_is_rate_limited_per_ip() {
    let app = custom_app(
        AppConfig::default(),
        IpRateLimiter::new(Duration::from_secs(60), 1),
    );

    let mut first = detect_request("/v1/detect?filename=leaf.png", png(300, 300));
    first
        .headers_mut()
        .insert("x-forwarded-for", "198.51.100.4".parse().unwrap());
    let response = app.clone().oneshot(first).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut second = detect_request("/v1/detect?filename=leaf.png", png(300, 300));
    second
        .headers_mut()
        .insert("x-forwarded-for", "198.51.100.4".parse().unwrap());
    let response = app.clone().oneshot(second).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // Lookups are not counted against the detection budget.
    let lookup = Request::builder()
        .uri("/v1/diseases")
        .header("x-api-key", DEFAULT_API_KEY)
        .header("x-forwarded-for", "198.51.100.4")
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.oneshot(lookup).await.unwrap().status(), StatusCode::OK);
}

#[tokio::test]
async fn unauthenticated_detections_do_not_spend_budget() {
    let app = custom_app(
        AppConfig::default(),
        IpRateLimiter::new(Duration::from_secs(60), 1),
    );

    for _ in 0..3 {
        let anonymous = Request::builder()
            .method("POST")
            .uri("/v1/detect?filename=leaf.png")
            .header("x-forwarded-for", "198.51.100.8")
            .body(Body::from(png(300, 300)))
            .unwrap();
        let response = app.clone().oneshot(anonymous).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let mut first = detect_request("/v1/detect?filename=leaf.png", png(300, 300));
    first
        .headers_mut()
        .insert("x-forwarded-for", "198.51.100.8".parse().unwrap());
    assert_eq!(app.clone().oneshot(first).await.unwrap().status(), StatusCode::OK);

    let mut second = detect_request("/v1/detect?filename=leaf.png", png(300, 300));
    second
        .headers_mut()
        .insert("x-forwarded-for", "198.51.100.8".parse().unwrap());
    let response = app.oneshot(second).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));
}

#[tokio::test]
async fn treatment_lookup_found_and_missing() {
    let app = app().await;

    let found = Request::builder()
        .uri("/v1/treatments/rust?language=hi")
        .header("x-api-key", DEFAULT_API_KEY)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(found).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let parsed = json_body(response).await;
    assert_eq!(parsed["disease"]["id"], "rust");
    assert_eq!(parsed["metadata"]["source"], "offline_lookup");
    assert_eq!(parsed["treatments"].as_array().map(Vec::len), Some(4));

    let missing = Request::builder()
        .uri("/v1/treatments/leaf_curl")
        .header("x-api-key", DEFAULT_API_KEY)
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(missing).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let parsed = json_body(response).await;
    assert_eq!(parsed["error"], "Treatment not found");
    assert_eq!(parsed["treatments"], json!([]));
}

#[tokio::test]
async fn diseases_are_listed_in_id_order() {
    let request = Request::builder()
        .uri("/v1/diseases")
        .header("x-api-key", DEFAULT_API_KEY)
        .body(Body::empty())
        .unwrap();
    let response = app().await.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let parsed = json_body(response).await;
    let ids = parsed
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["id"].as_str().unwrap().to_string())
        .collect::<Vec<_>>();
    assert_eq!(ids, ["bacterial_spot", "healthy", "powdery_mildew", "rust"]);
}

#[tokio::test]
async fn dosage_validation_reports_three_outcomes() {
    let app = app().await;
    let check = |dosage: &str| {
        Request::builder()
            .method("POST")
            .uri("/v1/dosage/validate")
            .header("content-type", "application/json")
            .header("x-api-key", DEFAULT_API_KEY)
            .body(Body::from(
                json!({
                    "disease_id": "powdery_mildew",
                    "remedy_name": "Neem oil 1% spray",
                    "requested_dosage": dosage
                })
                .to_string(),
            ))
            .unwrap()
    };

    let approved = json_body(app.clone().oneshot(check("10 ml per L")).await.unwrap()).await;
    assert_eq!(approved["valid"], true);
    assert_eq!(approved["requires_confirmation"], false);

    let confirm = json_body(app.clone().oneshot(check("18 ml per L")).await.unwrap()).await;
    assert_eq!(confirm["valid"], true);
    assert_eq!(confirm["requires_confirmation"], true);

    let blocked = json_body(app.oneshot(check("25 ml per L")).await.unwrap()).await;
    assert_eq!(blocked["valid"], false);
    assert_eq!(blocked["blocked"], true);
    assert!(blocked["warning"]
        .as_str()
        .unwrap()
        .contains("exceeds maximum allowed"));
}
