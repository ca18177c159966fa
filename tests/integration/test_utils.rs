//! Test utilities for integration tests.
//!
//! This module writes synthetic DICOM WSI instances, both as Part 10 files
//! and as DICOM JSON records, and runs an in-process fake DICOMweb server.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use serde_json::{json, Value};

use dicom_wsi_streamer::dicom::tags::{self, Tag, Vr};
use dicom_wsi_streamer::dicom::{TransferSyntax, MAGIC, PREAMBLE_LENGTH};

const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;

// =============================================================================
// Synthetic Instances
// =============================================================================

/// One level or associated image of a synthetic slide.
#[derive(Debug, Clone)]
pub struct TestInstance {
    pub uid: String,
    pub image_type: &'static str,
    pub total: (u32, u32),
    pub tile: (u32, u32),
    pub spacing_mm: f64,
    pub color: [u8; 3],
}

impl TestInstance {
    pub fn new(
        uid: &str,
        image_type: &'static str,
        total: (u32, u32),
        tile: (u32, u32),
        spacing_mm: f64,
        color: [u8; 3],
    ) -> Self {
        Self {
            uid: uid.to_string(),
            image_type,
            total,
            tile,
            spacing_mm,
            color,
        }
    }

    pub fn frame_count(&self) -> u32 {
        self.total.0.div_ceil(self.tile.0) * self.total.1.div_ceil(self.tile.1)
    }

    /// Solid-color JPEG frame of this instance.
    pub fn frame(&self) -> Vec<u8> {
        jpeg_frame(self.tile.0, self.tile.1, self.color)
    }

    /// DICOM JSON record as returned by WADO-RS series metadata.
    pub fn record(&self) -> Value {
        json!({
            "00080008": {"vr": "CS", "Value": ["ORIGINAL", "PRIMARY", self.image_type, "NONE"]},
            "00080018": {"vr": "UI", "Value": [self.uid]},
            "0020000D": {"vr": "UI", "Value": [STUDY_UID]},
            "0020000E": {"vr": "UI", "Value": [SERIES_UID]},
            "00209311": {"vr": "CS", "Value": ["TILED_FULL"]},
            "00280002": {"vr": "US", "Value": [3]},
            "00280004": {"vr": "CS", "Value": ["YBR_FULL_422"]},
            "00280008": {"vr": "IS", "Value": [self.frame_count()]},
            "00280010": {"vr": "US", "Value": [self.tile.1]},
            "00280011": {"vr": "US", "Value": [self.tile.0]},
            "00280100": {"vr": "US", "Value": [8]},
            "00480006": {"vr": "UL", "Value": [self.total.0]},
            "00480007": {"vr": "UL", "Value": [self.total.1]},
            "52009229": {"vr": "SQ", "Value": [{
                "00289110": {"vr": "SQ", "Value": [{
                    "00280030": {"vr": "DS", "Value": [self.spacing_mm, self.spacing_mm]}
                }]}
            }]}
        })
    }

    /// TILED_FULL Part 10 file with JPEG baseline frames.
    pub fn part10(&self) -> Vec<u8> {
        let frames: Vec<Vec<u8>> = (0..self.frame_count()).map(|_| self.frame()).collect();
        let spacing = format!("{}\\{}", self.spacing_mm, self.spacing_mm);
        let measures = ElementWriter::new().str(tags::PIXEL_SPACING, Vr::DS, &spacing);
        let shared = ElementWriter::new().sequence(tags::PIXEL_MEASURES_SEQUENCE, vec![measures]);

        ElementWriter::new()
            .str(
                tags::IMAGE_TYPE,
                Vr::CS,
                &format!("ORIGINAL\\PRIMARY\\{}\\NONE", self.image_type),
            )
            .str(tags::SOP_INSTANCE_UID, Vr::UI, &self.uid)
            .str(tags::STUDY_INSTANCE_UID, Vr::UI, STUDY_UID)
            .str(tags::SERIES_INSTANCE_UID, Vr::UI, SERIES_UID)
            .str(tags::DIMENSION_ORGANIZATION_TYPE, Vr::CS, "TILED_FULL")
            .u16(tags::SAMPLES_PER_PIXEL, 3)
            .str(tags::PHOTOMETRIC_INTERPRETATION, Vr::CS, "YBR_FULL_422")
            .str(tags::NUMBER_OF_FRAMES, Vr::IS, &frames.len().to_string())
            .u16(tags::ROWS, self.tile.1 as u16)
            .u16(tags::COLUMNS, self.tile.0 as u16)
            .u16(tags::BITS_ALLOCATED, 8)
            .u32(tags::TOTAL_PIXEL_MATRIX_COLUMNS, self.total.0)
            .u32(tags::TOTAL_PIXEL_MATRIX_ROWS, self.total.1)
            .sequence(tags::SHARED_FUNCTIONAL_GROUPS_SEQUENCE, vec![shared])
            .encapsulated(&frames)
            .into_file(TransferSyntax::JpegBaseline8Bit)
    }
}

pub const STUDY_UID: &str = "1.2.826.0.1.1";
pub const SERIES_UID: &str = "1.2.826.0.1.1.1";

/// Three-level slide (1024, 512, 256 px) plus a label and an overview.
pub fn three_level_slide() -> Vec<TestInstance> {
    vec![
        TestInstance::new("1.2.826.0.1.1.1.1", "VOLUME", (1024, 1024), (256, 256), 0.00025, [200, 40, 40]),
        TestInstance::new("1.2.826.0.1.1.1.2", "VOLUME", (512, 512), (256, 256), 0.0005, [40, 200, 40]),
        TestInstance::new("1.2.826.0.1.1.1.3", "VOLUME", (256, 256), (256, 256), 0.001, [40, 40, 200]),
        TestInstance::new("1.2.826.0.1.1.1.4", "LABEL", (128, 64), (128, 64), 0.01, [250, 250, 250]),
        TestInstance::new("1.2.826.0.1.1.1.5", "OVERVIEW", (256, 128), (256, 128), 0.004, [90, 90, 90]),
    ]
}

pub fn jpeg_frame(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb(color));
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, 95)
        .encode_image(&image)
        .unwrap();
    out
}

/// Write every instance as a Part 10 file into a fresh directory.
///
/// Returns the path of the first file.
pub fn write_slide_dir(name: &str, instances: &[TestInstance]) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("wsi_it_{}_{}", std::process::id(), name));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    for (i, instance) in instances.iter().enumerate() {
        std::fs::write(dir.join(format!("instance_{}.dcm", i)), instance.part10()).unwrap();
    }
    dir.join("instance_0.dcm")
}

/// Mean color of an RGB image, rounded per channel.
pub fn mean_color(image: &RgbImage) -> [u8; 3] {
    let mut sum = [0u64; 3];
    for pixel in image.pixels() {
        for c in 0..3 {
            sum[c] += pixel.0[c] as u64;
        }
    }
    let n = (image.width() as u64 * image.height() as u64).max(1);
    [(sum[0] / n) as u8, (sum[1] / n) as u8, (sum[2] / n) as u8]
}

pub fn assert_color_near(actual: [u8; 3], expected: [u8; 3], tolerance: u8) {
    for c in 0..3 {
        assert!(
            actual[c].abs_diff(expected[c]) <= tolerance,
            "channel {}: {:?} vs {:?}",
            c,
            actual,
            expected
        );
    }
}

// =============================================================================
// Part 10 Writer
// =============================================================================

/// Explicit VR little endian element stream.
pub struct ElementWriter {
    buf: Vec<u8>,
}

impl ElementWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    fn header(&mut self, tag: Tag, vr: Vr, length: u32) {
        self.buf.extend_from_slice(&tag.group.to_le_bytes());
        self.buf.extend_from_slice(&tag.element.to_le_bytes());
        self.buf.extend_from_slice(&vr.0);
        if vr.has_long_length() {
            self.buf.extend_from_slice(&[0, 0]);
            self.buf.extend_from_slice(&length.to_le_bytes());
        } else {
            self.buf.extend_from_slice(&(length as u16).to_le_bytes());
        }
    }

    fn delimiter(&mut self, tag: Tag, length: u32) {
        self.buf.extend_from_slice(&tag.group.to_le_bytes());
        self.buf.extend_from_slice(&tag.element.to_le_bytes());
        self.buf.extend_from_slice(&length.to_le_bytes());
    }

    pub fn str(mut self, tag: Tag, vr: Vr, value: &str) -> Self {
        let mut bytes = value.as_bytes().to_vec();
        if bytes.len() % 2 == 1 {
            bytes.push(if vr == Vr::UI { 0 } else { b' ' });
        }
        self.header(tag, vr, bytes.len() as u32);
        self.buf.extend(bytes);
        self
    }

    pub fn u16(mut self, tag: Tag, value: u16) -> Self {
        self.header(tag, Vr::US, 2);
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn u32(mut self, tag: Tag, value: u32) -> Self {
        self.header(tag, Vr::UL, 4);
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn sequence(mut self, tag: Tag, items: Vec<ElementWriter>) -> Self {
        self.header(tag, Vr::SQ, UNDEFINED_LENGTH);
        for item in items {
            self.delimiter(tags::ITEM, UNDEFINED_LENGTH);
            self.buf.extend(item.buf);
            self.delimiter(tags::ITEM_DELIMITATION, 0);
        }
        self.delimiter(tags::SEQUENCE_DELIMITATION, 0);
        self
    }

    /// Encapsulated pixel data with an empty basic offset table.
    pub fn encapsulated(mut self, fragments: &[Vec<u8>]) -> Self {
        self.header(tags::PIXEL_DATA, Vr::OB, UNDEFINED_LENGTH);
        self.delimiter(tags::ITEM, 0);
        for fragment in fragments {
            self.delimiter(tags::ITEM, fragment.len() as u32);
            self.buf.extend_from_slice(fragment);
        }
        self.delimiter(tags::SEQUENCE_DELIMITATION, 0);
        self
    }

    pub fn into_file(self, syntax: TransferSyntax) -> Vec<u8> {
        let meta = ElementWriter::new().str(tags::TRANSFER_SYNTAX_UID, Vr::UI, syntax.uid());
        let mut out = vec![0u8; PREAMBLE_LENGTH];
        out.extend_from_slice(MAGIC);
        out.extend(meta.buf);
        out.extend(self.buf);
        out
    }
}

// =============================================================================
// Fake DICOMweb Server
// =============================================================================

const BOUNDARY: &str = "fake-dicomweb-boundary";

/// Shared state of the fake DICOMweb server.
#[derive(Clone)]
pub struct FakeArchive {
    pub instances: Arc<Vec<TestInstance>>,
    /// Values of AvailableTransferSyntaxUID per instance; None omits the attribute
    pub available_syntaxes: Option<Vec<String>>,
    /// Required `Authorization` header value, if any
    pub required_auth: Option<String>,
    /// Accept headers of every frame request
    pub frame_accepts: Arc<Mutex<Vec<String>>>,
    /// Query strings of every QIDO request
    pub searches: Arc<Mutex<Vec<HashMap<String, String>>>>,
}

impl FakeArchive {
    pub fn new(instances: Vec<TestInstance>) -> Self {
        Self {
            instances: Arc::new(instances),
            available_syntaxes: Some(vec![TransferSyntax::JpegBaseline8Bit.uid().to_string()]),
            required_auth: None,
            frame_accepts: Arc::new(Mutex::new(Vec::new())),
            searches: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_available(mut self, uids: Option<Vec<&str>>) -> Self {
        self.available_syntaxes = uids.map(|u| u.into_iter().map(String::from).collect());
        self
    }

    pub fn with_required_auth(mut self, value: &str) -> Self {
        self.required_auth = Some(value.to_string());
        self
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        match &self.required_auth {
            None => true,
            Some(expected) => headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v == expected.as_str()),
        }
    }

    fn series_matches(&self, study: &str, series: &str) -> bool {
        study == STUDY_UID && series == SERIES_UID
    }
}

/// Launch the fake server on an ephemeral port and return its service root.
pub async fn spawn_archive(archive: FakeArchive) -> String {
    let prefix = "/dicomweb/studies/{study}/series/{series}";
    let router = Router::new()
        .route(&format!("{}/instances", prefix), get(search_handler))
        .route(&format!("{}/metadata", prefix), get(metadata_handler))
        .route(
            &format!("{}/instances/{{instance}}/frames/{{frames}}", prefix),
            get(frames_handler),
        )
        .with_state(archive);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}/dicomweb", addr)
}

async fn search_handler(
    State(archive): State<FakeArchive>,
    Path((study, series)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if !archive.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    archive.searches.lock().unwrap().push(query.clone());
    if !archive.series_matches(&study, &series) {
        return StatusCode::NO_CONTENT.into_response();
    }

    let limit = query
        .get("limit")
        .and_then(|l| l.parse::<usize>().ok())
        .unwrap_or(usize::MAX);
    let results: Vec<Value> = archive
        .instances
        .iter()
        .take(limit)
        .map(|instance| {
            let mut result = json!({
                "00080018": {"vr": "UI", "Value": [instance.uid]},
            });
            if let Some(uids) = &archive.available_syntaxes {
                result["00083002"] = if uids.is_empty() {
                    json!({"vr": "UI"})
                } else {
                    json!({"vr": "UI", "Value": uids})
                };
            }
            result
        })
        .collect();
    (
        [(header::CONTENT_TYPE, "application/dicom+json")],
        Json(results),
    )
        .into_response()
}

async fn metadata_handler(
    State(archive): State<FakeArchive>,
    Path((study, series)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if !archive.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if !archive.series_matches(&study, &series) {
        return StatusCode::NOT_FOUND.into_response();
    }
    let records: Vec<Value> = archive.instances.iter().map(TestInstance::record).collect();
    Json(records).into_response()
}

async fn frames_handler(
    State(archive): State<FakeArchive>,
    Path((_study, _series, instance, frames)): Path<(String, String, String, String)>,
    headers: HeaderMap,
) -> Response {
    if !archive.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    archive.frame_accepts.lock().unwrap().push(accept);

    let Some(source) = archive.instances.iter().find(|i| i.uid == instance) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let numbers: Vec<u32> = match frames.split(',').map(|f| f.parse()).collect() {
        Ok(numbers) => numbers,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };
    if numbers.iter().any(|&n| n == 0 || n > source.frame_count()) {
        return StatusCode::NOT_FOUND.into_response();
    }

    let frame = source.frame();
    let mut body = Vec::new();
    for _ in &numbers {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
        body.extend_from_slice(&frame);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    (
        [(
            header::CONTENT_TYPE,
            format!(
                "multipart/related; type=\"image/jpeg\"; boundary={}",
                BOUNDARY
            ),
        )],
        body,
    )
        .into_response()
}
