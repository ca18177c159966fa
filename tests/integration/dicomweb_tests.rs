//! End-to-end tests against an in-process DICOMweb server.

use std::time::Duration;

use dicom_wsi_streamer::error::TileSourceError;
use dicom_wsi_streamer::tile::{DicomTileSource, OpenOptions, OutputOptions, SourceDescriptor};
use dicom_wsi_streamer::web::{DicomWebDescriptor, WebAuth};

use super::test_utils::{
    assert_color_near, mean_color, spawn_archive, three_level_slide, FakeArchive, SERIES_UID,
    STUDY_UID,
};

fn descriptor(url: String) -> DicomWebDescriptor {
    DicomWebDescriptor {
        url,
        study_uid: STUDY_UID.to_string(),
        series_uid: SERIES_UID.to_string(),
        qido_prefix: None,
        wado_prefix: None,
        auth: None,
    }
}

fn options() -> OpenOptions {
    OpenOptions {
        timeout: Duration::from_secs(10),
        ..OpenOptions::default()
    }
}

async fn open(
    descriptor: DicomWebDescriptor,
) -> Result<DicomTileSource, TileSourceError> {
    DicomTileSource::open(&SourceDescriptor::DicomWeb(descriptor), &options()).await
}

#[tokio::test]
async fn test_remote_metadata() {
    let url = spawn_archive(FakeArchive::new(three_level_slide())).await;
    let source = open(descriptor(url)).await.unwrap();

    let metadata = source.get_metadata();
    assert_eq!(metadata.size_x, 1024);
    assert_eq!(metadata.levels, 3);
    assert_eq!(source.get_associated_images_list(), vec!["label", "macro"]);

    let internal = source.get_internal_metadata();
    assert_eq!(internal["dicom"]["SeriesInstanceUID"], SERIES_UID);

    source.close();
}

#[tokio::test]
async fn test_remote_tiles_negotiate_jpeg_baseline() {
    let archive = FakeArchive::new(three_level_slide());
    let accepts = archive.frame_accepts.clone();
    let url = spawn_archive(archive).await;
    let source = open(descriptor(url)).await.unwrap();

    let coarse = source.get_tile_image(0, 0, 0).await.unwrap();
    assert_eq!(coarse.dimensions(), (256, 256));
    assert_color_near(mean_color(&coarse), [40, 40, 200], 8);

    let base = source.get_tile(1, 2, 2, &OutputOptions::png()).await.unwrap();
    assert_eq!(base.mime_type, "image/png");

    let accepts = accepts.lock().unwrap().clone();
    assert!(accepts.len() >= 2);
    for accept in accepts {
        assert!(accept.starts_with("multipart/related"));
        assert!(accept.contains("type=\"image/jpeg\""));
        assert!(accept.contains("transfer-syntax=1.2.840.10008.1.2.4.50"));
    }

    source.close();
}

#[tokio::test]
async fn test_remote_associated_image() {
    let url = spawn_archive(FakeArchive::new(three_level_slide())).await;
    let source = open(descriptor(url)).await.unwrap();

    let label = source.get_associated_image("label").await.unwrap();
    assert_eq!(label.dimensions(), (128, 64));
    assert_color_near(mean_color(&label), [250, 250, 250], 8);

    source.close();
}

#[tokio::test]
async fn test_remote_prefers_baseline_over_other_offers() {
    let archive = FakeArchive::new(three_level_slide()).with_available(Some(vec![
        "1.2.840.10008.1.2.4.90",
        "1.2.840.10008.1.2.4.51",
        "1.2.840.10008.1.2.4.50",
    ]));
    let accepts = archive.frame_accepts.clone();
    let url = spawn_archive(archive).await;
    let source = open(descriptor(url)).await.unwrap();

    source.get_tile_image(0, 0, 0).await.unwrap();
    let accepts = accepts.lock().unwrap().clone();
    assert!(accepts[0].contains("transfer-syntax=1.2.840.10008.1.2.4.50"));

    source.close();
}

#[tokio::test]
async fn test_remote_falls_back_without_advertised_syntaxes() {
    for available in [None, Some(vec![])] {
        let archive = FakeArchive::new(three_level_slide()).with_available(available);
        let accepts = archive.frame_accepts.clone();
        let url = spawn_archive(archive).await;
        let source = open(descriptor(url)).await.unwrap();

        // The fake server still sends JPEG, which the JPEG 2000 decoder rejects
        let result = source.get_tile_image(0, 0, 0).await;
        assert!(matches!(result, Err(TileSourceError::Decode { .. })));

        let accepts = accepts.lock().unwrap().clone();
        assert!(accepts[0].contains("transfer-syntax=1.2.840.10008.1.2.4.90"));
        assert!(accepts[0].contains("type=\"image/jp2\""));

        source.close();
    }
}

#[tokio::test]
async fn test_remote_negotiation_failure() {
    let archive = FakeArchive::new(three_level_slide())
        .with_available(Some(vec!["1.2.840.10008.1.2.4.80"]));
    let url = spawn_archive(archive).await;

    match open(descriptor(url)).await {
        Err(TileSourceError::Negotiation { available }) => {
            assert_eq!(available, vec!["1.2.840.10008.1.2.4.80".to_string()]);
        }
        Err(e) => panic!("expected negotiation error, got {}", e),
        Ok(_) => panic!("expected negotiation error"),
    }
}

#[tokio::test]
async fn test_remote_unknown_series() {
    let url = spawn_archive(FakeArchive::new(three_level_slide())).await;
    let mut descriptor = descriptor(url);
    descriptor.series_uid = "9.9.9".to_string();

    let result = open(descriptor).await;
    assert!(matches!(result, Err(TileSourceError::Open { .. })));
}

#[tokio::test]
async fn test_remote_bearer_auth() {
    let archive = FakeArchive::new(three_level_slide()).with_required_auth("Bearer secret-token");
    let url = spawn_archive(archive).await;

    let result = open(descriptor(url.clone())).await;
    assert!(matches!(result, Err(TileSourceError::Open { .. })));

    let mut authorized = descriptor(url);
    authorized.auth = Some(WebAuth::Bearer {
        token: "secret-token".to_string(),
    });
    let source = open(authorized).await.unwrap();
    let tile = source.get_tile_image(0, 0, 2).await.unwrap();
    assert_color_near(mean_color(&tile), [200, 40, 40], 8);
    source.close();
}

#[tokio::test]
async fn test_remote_unreachable_server() {
    let result = open(descriptor("http://127.0.0.1:9/dicomweb".to_string())).await;
    assert!(matches!(result, Err(TileSourceError::Open { .. })));
}
