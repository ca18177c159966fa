//! API integration tests for tile retrieval and error handling.
//!
//! Tests verify:
//! - Tile and associated image retrieval over HTTP
//! - Error bodies and status codes
//! - Cache and CORS headers

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use dicom_wsi_streamer::tile::{DicomTileSource, OpenOptions, SourceDescriptor};
use dicom_wsi_streamer::{create_router, RouterConfig};

use super::test_utils::{spawn_archive, three_level_slide, write_slide_dir, FakeArchive};

async fn local_router(name: &str, config: RouterConfig) -> Router {
    let path = write_slide_dir(name, &three_level_slide());
    let source = DicomTileSource::open(&SourceDescriptor::from(path), &OpenOptions::default())
        .await
        .unwrap();
    create_router(source, config.with_tracing(false))
}

struct TestResponse {
    status: StatusCode,
    content_type: Option<String>,
    cache_control: Option<String>,
    body: Vec<u8>,
}

impl TestResponse {
    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

async fn request(router: &Router, uri: &str) -> TestResponse {
    let response = router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let header = |name| {
        response
            .headers()
            .get(name)
            .map(|v: &axum::http::HeaderValue| v.to_str().unwrap().to_string())
    };
    let status = response.status();
    let content_type = header("content-type");
    let cache_control = header("cache-control");
    let body = response.into_body().collect().await.unwrap().to_bytes();
    TestResponse {
        status,
        content_type,
        cache_control,
        body: body.to_vec(),
    }
}

// =============================================================================
// Tile Retrieval
// =============================================================================

#[tokio::test]
async fn test_tile_retrieval_success() {
    let router = local_router("api_tile", RouterConfig::new()).await;

    let response = request(&router, "/tiles/0/0/0.jpg").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.content_type.as_deref(), Some("image/jpeg"));
    assert_eq!(
        response.cache_control.as_deref(),
        Some("public, max-age=3600")
    );
    assert_eq!(&response.body[..2], &[0xFF, 0xD8]);

    let decoded = image::load_from_memory(&response.body).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (256, 256));
}

#[tokio::test]
async fn test_tile_encodings() {
    let router = local_router("api_encodings", RouterConfig::new()).await;

    let png = request(&router, "/tiles/2/3/3.png").await;
    assert_eq!(png.status, StatusCode::OK);
    assert_eq!(png.content_type.as_deref(), Some("image/png"));

    let raw = request(&router, "/tiles/2/3/3?encoding=raw").await;
    assert_eq!(raw.status, StatusCode::OK);
    assert_eq!(
        raw.content_type.as_deref(),
        Some("application/octet-stream")
    );
    assert_eq!(raw.body.len(), 256 * 256 * 3);

    let low = request(&router, "/tiles/2/3/3.jpg?quality=10").await;
    let high = request(&router, "/tiles/2/3/3.jpg?quality=100").await;
    assert_eq!(low.status, StatusCode::OK);
    assert!(low.body.len() <= high.body.len());
}

#[tokio::test]
async fn test_custom_cache_max_age() {
    let router = local_router("api_cache", RouterConfig::new().with_cache_max_age(60)).await;
    let response = request(&router, "/tiles/1/0/0.jpg").await;
    assert_eq!(response.cache_control.as_deref(), Some("public, max-age=60"));
}

// =============================================================================
// Errors
// =============================================================================

#[tokio::test]
async fn test_tile_out_of_range() {
    let router = local_router("api_range", RouterConfig::new()).await;

    for uri in ["/tiles/3/0/0.jpg", "/tiles/2/4/0.jpg", "/tiles/0/0/1.jpg", "/tiles/1/-1/0.jpg"] {
        let response = request(&router, uri).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "{}", uri);
        let json = response.json();
        assert_eq!(json["error"], "tile_out_of_range");
        assert_eq!(json["status"], 400);
    }
}

#[tokio::test]
async fn test_invalid_requests() {
    let router = local_router("api_invalid", RouterConfig::new()).await;

    let response = request(&router, "/tiles/0/0/zero.jpg").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["error"], "invalid_request");

    let response = request(&router, "/tiles/0/0/0.jpg?encoding=webp").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["error"], "invalid_request");

    let response = request(&router, "/tiles/0/0/0.jpg?quality=0").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_route() {
    let router = local_router("api_unknown", RouterConfig::new()).await;
    let response = request(&router, "/slides").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

// =============================================================================
// Metadata and Associated Images
// =============================================================================

#[tokio::test]
async fn test_metadata_endpoint() {
    let router = local_router("api_metadata", RouterConfig::new()).await;

    let json = request(&router, "/metadata").await.json();
    assert_eq!(json["tileWidth"], 256);
    assert_eq!(json["tileHeight"], 256);
    assert_eq!(json["sizeX"], 1024);
    assert_eq!(json["sizeY"], 1024);
    assert_eq!(json["levels"], 3);
    assert_eq!(json["mm_x"], 0.00025);

    let json = request(&router, "/metadata/internal").await.json();
    assert_eq!(json["dicom"]["DimensionOrganizationType"], "TILED_FULL");
}

#[tokio::test]
async fn test_associated_endpoints() {
    let router = local_router("api_associated", RouterConfig::new()).await;

    let json = request(&router, "/associated").await.json();
    assert_eq!(json["images"], serde_json::json!(["label", "macro"]));

    let label = request(&router, "/associated/label").await;
    assert_eq!(label.status, StatusCode::OK);
    assert_eq!(label.content_type.as_deref(), Some("image/jpeg"));

    let overview = request(&router, "/associated/macro.png").await;
    assert_eq!(overview.content_type.as_deref(), Some("image/png"));
    let decoded = image::load_from_memory(&overview.body).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (256, 128));

    let missing = request(&router, "/associated/thumbnail").await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert_eq!(missing.json()["error"], "not_found");
}

// =============================================================================
// Remote Slide
// =============================================================================

#[tokio::test]
async fn test_router_over_dicomweb_slide() {
    let url = spawn_archive(FakeArchive::new(three_level_slide())).await;
    let descriptor = SourceDescriptor::DicomWeb(dicom_wsi_streamer::DicomWebDescriptor {
        url,
        study_uid: super::test_utils::STUDY_UID.to_string(),
        series_uid: super::test_utils::SERIES_UID.to_string(),
        qido_prefix: None,
        wado_prefix: None,
        auth: None,
    });
    let source = DicomTileSource::open(&descriptor, &OpenOptions::default())
        .await
        .unwrap();
    let router = create_router(source, RouterConfig::new().with_tracing(false));

    let response = request(&router, "/tiles/1/1/0.jpg").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.content_type.as_deref(), Some("image/jpeg"));

    let json = request(&router, "/health").await.json();
    assert_eq!(json["status"], "healthy");
}
