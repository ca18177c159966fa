//! End-to-end tests over Part 10 files on disk.

use std::path::PathBuf;

use dicom_wsi_streamer::error::TileSourceError;
use dicom_wsi_streamer::tile::{
    DicomTileSource, OpenOptions, OutputOptions, SourceDescriptor, TieBreak, TileEncoding,
};

use super::test_utils::{
    assert_color_near, mean_color, three_level_slide, write_slide_dir, TestInstance,
};

const RED: [u8; 3] = [200, 40, 40];
const GREEN: [u8; 3] = [40, 200, 40];
const BLUE: [u8; 3] = [40, 40, 200];

async fn open(name: &str, instances: &[TestInstance]) -> DicomTileSource {
    let path = write_slide_dir(name, instances);
    DicomTileSource::open(&SourceDescriptor::from(path), &OpenOptions::default())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_local_metadata() {
    let source = open("metadata", &three_level_slide()).await;
    let metadata = source.get_metadata();

    assert_eq!(metadata.size_x, 1024);
    assert_eq!(metadata.size_y, 1024);
    assert_eq!(metadata.tile_width, 256);
    assert_eq!(metadata.tile_height, 256);
    assert_eq!(metadata.levels, 3);
    assert!((metadata.magnification.unwrap() - 40.0).abs() < 1e-9);
    assert_eq!(metadata.mm_x, Some(0.00025));

    source.close();
}

#[tokio::test]
async fn test_local_tiles_read_matching_level() {
    let source = open("levels", &three_level_slide()).await;

    // Each zoom level maps exactly onto one native level
    let coarse = source.get_tile_image(0, 0, 0).await.unwrap();
    assert_eq!(coarse.dimensions(), (256, 256));
    assert_color_near(mean_color(&coarse), BLUE, 8);

    let middle = source.get_tile_image(1, 1, 1).await.unwrap();
    assert_color_near(mean_color(&middle), GREEN, 8);

    let base = source.get_tile_image(3, 2, 2).await.unwrap();
    assert_color_near(mean_color(&base), RED, 8);

    source.close();
}

#[tokio::test]
async fn test_local_missing_levels_are_synthesized() {
    // Only the base level exists; coarse tiles are downsampled from it
    let instances = vec![TestInstance::new(
        "1.2.826.0.1.9.1",
        "VOLUME",
        (1024, 768),
        (256, 256),
        0.0005,
        RED,
    )];
    let source = open("synth", &instances).await;
    assert_eq!(source.get_metadata().levels, 3);

    let tile = source.get_tile_image(0, 0, 0).await.unwrap();
    assert_eq!(tile.dimensions(), (256, 256));
    // 1024x768 at step 4 covers 256x192 of the tile; the rest is padding
    assert_color_near(tile.get_pixel(100, 100).0, RED, 10);
    assert_eq!(tile.get_pixel(100, 250).0, [0, 0, 0]);

    source.close();
}

#[tokio::test]
async fn test_local_out_of_range() {
    let source = open("range", &three_level_slide()).await;

    for (x, y, z) in [(4, 0, 2), (0, 4, 2), (1, 0, 0), (0, 0, 3), (-1, 0, 1), (0, 0, -1)] {
        let result = source.get_tile(x, y, z, &OutputOptions::default()).await;
        assert!(
            matches!(result, Err(TileSourceError::OutOfRange { .. })),
            "({}, {}, {}) should be out of range",
            x,
            y,
            z
        );
    }

    source.close();
}

#[tokio::test]
async fn test_local_encodings() {
    let source = open("encodings", &three_level_slide()).await;

    let jpeg = source.get_tile(0, 0, 1, &OutputOptions::default()).await.unwrap();
    assert_eq!(jpeg.mime_type, "image/jpeg");
    assert_eq!(&jpeg.data[..2], &[0xFF, 0xD8]);

    let png = source.get_tile(0, 0, 1, &OutputOptions::png()).await.unwrap();
    assert_eq!(png.mime_type, "image/png");
    assert_eq!(&png.data[1..4], b"PNG");

    let raw = OutputOptions {
        encoding: TileEncoding::Raw,
        ..OutputOptions::default()
    };
    let raw = source.get_tile(0, 0, 1, &raw).await.unwrap();
    assert_eq!(raw.data.len(), 256 * 256 * 3);

    source.close();
}

#[tokio::test]
async fn test_local_associated_images() {
    let source = open("associated", &three_level_slide()).await;

    assert_eq!(source.get_associated_images_list(), vec!["label", "macro"]);

    let label = source.get_associated_image("label").await.unwrap();
    assert_eq!(label.dimensions(), (128, 64));
    assert_color_near(mean_color(&label), [250, 250, 250], 8);

    let overview = source.get_associated_image("macro").await.unwrap();
    assert_eq!(overview.dimensions(), (256, 128));

    let result = source.get_associated_image("thumbnail").await;
    assert!(matches!(
        result,
        Err(TileSourceError::UnknownAssociatedImage { .. })
    ));

    source.close();
}

#[tokio::test]
async fn test_local_internal_metadata() {
    let source = open("internal", &three_level_slide()).await;
    let internal = source.get_internal_metadata();
    let dicom = internal["dicom"].as_object().unwrap();

    assert_eq!(dicom["StudyInstanceUID"], "1.2.826.0.1.1");
    assert_eq!(dicom["TotalPixelMatrixColumns"], 1024);
    // Values that differ between levels are kept under ordinal keys
    assert!(dicom.contains_key("TotalPixelMatrixColumns:1"));
    assert!(!dicom.contains_key("PixelData"));

    source.close();
}

#[tokio::test]
async fn test_local_derived_view() {
    let source = open("derived", &three_level_slide()).await;
    let view = source.derive();
    assert!(source.is_owner());
    assert!(!view.is_owner());

    view.close();
    // The owner keeps reading after a view is released
    let tile = source.get_tile_image(0, 0, 0).await.unwrap();
    assert_color_near(mean_color(&tile), BLUE, 8);

    source.close();
}

#[tokio::test]
async fn test_local_tie_break() {
    // Two native levels share the 2x downsample
    let mut instances = three_level_slide();
    instances.insert(
        2,
        TestInstance::new("1.2.826.0.1.1.1.9", "VOLUME", (500, 500), (250, 250), 0.000512, [200, 200, 40]),
    );
    let path = write_slide_dir("tie", &instances);

    for (tie_break, expected) in [(TieBreak::Coarsest, [200, 200, 40]), (TieBreak::Finest, GREEN)] {
        let options = OpenOptions {
            tie_break,
            ..OpenOptions::default()
        };
        let source = DicomTileSource::open(&SourceDescriptor::from(path.clone()), &options)
            .await
            .unwrap();
        let tile = source.get_tile_image(0, 0, 1).await.unwrap();
        assert_color_near(tile.get_pixel(10, 10).0, expected, 10);
        source.close();
    }
}

#[tokio::test]
async fn test_local_open_errors() {
    let missing = SourceDescriptor::from(PathBuf::from("/nonexistent/slide.dcm"));
    let result = DicomTileSource::open(&missing, &OpenOptions::default()).await;
    assert!(matches!(result, Err(TileSourceError::Open { .. })));

    let dir = std::env::temp_dir().join(format!("wsi_it_{}_garbage", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let garbage = dir.join("garbage.dcm");
    std::fs::write(&garbage, vec![0x42u8; 512]).unwrap();
    let result = DicomTileSource::open(&SourceDescriptor::from(garbage), &OpenOptions::default()).await;
    assert!(matches!(result, Err(TileSourceError::Open { .. })));
}
