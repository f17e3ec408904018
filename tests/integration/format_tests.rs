//! Tiled TIFF decoding through [`TiffSlideOpener`].

use std::sync::Arc;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use ndpi_tiler::error::{DecodeError, TiffError};
use ndpi_tiler::job::{inspect_slide, Extractor};
use ndpi_tiler::slide::{SlideDecoder, SlideOpener, TiffSlideOpener};

use super::test_utils::{
    job_config, load_metadata, pattern_image, png_spec, write_slide, ByteOrderType,
    SlideTiffBuilder, TileCompression,
};

/// Region bytes of `image` cropped at `(x, y)`.
fn crop(image: &image::RgbImage, x: u32, y: u32, width: u32, height: u32) -> Vec<u8> {
    image::imageops::crop_imm(image, x, y, width, height)
        .to_image()
        .into_raw()
}

// =============================================================================
// Container Variants
// =============================================================================

async fn assert_reads_pattern(builder: SlideTiffBuilder) {
    let dir = TempDir::new().unwrap();
    let source = pattern_image(100, 70, 7);
    let path = write_slide(dir.path(), "S1.ndpi", &builder.add_plane(source.clone(), 32, None).build());

    let mut decoder = TiffSlideOpener::new().open(&path).await.unwrap();
    let meta = decoder.metadata().unwrap();
    assert_eq!((meta.width, meta.height, meta.z_planes), (100, 70, 1));

    // spans four source tiles
    let region = decoder.read_region(0, 20, 20, 40, 30).await.unwrap();
    assert_eq!(region, crop(&source, 20, 20, 40, 30));

    // touches the padded edge tiles
    let edge = decoder.read_region(0, 90, 60, 10, 10).await.unwrap();
    assert_eq!(edge, crop(&source, 90, 60, 10, 10));
}

#[tokio::test]
async fn test_little_endian_tiff() {
    assert_reads_pattern(SlideTiffBuilder::new()).await;
}

#[tokio::test]
async fn test_big_endian_tiff() {
    assert_reads_pattern(SlideTiffBuilder::new().with_byte_order(ByteOrderType::BigEndian)).await;
}

#[tokio::test]
async fn test_bigtiff() {
    assert_reads_pattern(SlideTiffBuilder::new().with_bigtiff(true)).await;
}

#[tokio::test]
async fn test_big_endian_bigtiff() {
    assert_reads_pattern(
        SlideTiffBuilder::new()
            .with_bigtiff(true)
            .with_byte_order(ByteOrderType::BigEndian),
    )
    .await;
}

#[tokio::test]
async fn test_jpeg_tiles() {
    let dir = TempDir::new().unwrap();
    let source = image::RgbImage::from_pixel(64, 64, image::Rgb([200, 120, 40]));
    let data = SlideTiffBuilder::new()
        .with_compression(TileCompression::Jpeg)
        .add_plane(source, 32, None)
        .build();
    let path = write_slide(dir.path(), "S1.ndpi", &data);

    let mut decoder = TiffSlideOpener::new().open(&path).await.unwrap();
    let region = decoder.read_region(0, 16, 16, 32, 32).await.unwrap();

    assert_eq!(region.len(), 32 * 32 * 3);
    for pixel in region.chunks(3) {
        assert!(pixel[0].abs_diff(200) <= 8, "red {}", pixel[0]);
        assert!(pixel[1].abs_diff(120) <= 8, "green {}", pixel[1]);
        assert!(pixel[2].abs_diff(40) <= 8, "blue {}", pixel[2]);
    }
}

// =============================================================================
// Slide Structure
// =============================================================================

#[tokio::test]
async fn test_focal_planes_ordered_by_z_offset() {
    let dir = TempDir::new().unwrap();
    let data = SlideTiffBuilder::new()
        .add_plane(pattern_image(64, 64, 10), 32, Some(0))
        .add_plane(pattern_image(64, 64, 20), 32, Some(-1200))
        .add_plane(pattern_image(64, 64, 30), 32, Some(1200))
        .build();
    let path = write_slide(dir.path(), "S1.ndpi", &data);

    let mut decoder = TiffSlideOpener::new().open(&path).await.unwrap();
    assert_eq!(decoder.metadata().unwrap().z_planes, 3);

    let mut seeds = Vec::new();
    for z in 0..3 {
        let region = decoder.read_region(z, 0, 0, 1, 1).await.unwrap();
        seeds.push(region[2]);
    }
    assert_eq!(seeds, vec![20, 10, 30]);
}

#[tokio::test]
async fn test_reduced_resolution_images_ignored() {
    let dir = TempDir::new().unwrap();
    let data = SlideTiffBuilder::new()
        .add_plane(pattern_image(128, 96, 1), 32, None)
        .add_plane(pattern_image(32, 24, 2), 32, None)
        .build();
    let path = write_slide(dir.path(), "S1.ndpi", &data);

    let decoder = TiffSlideOpener::new().open(&path).await.unwrap();
    let meta = decoder.metadata().unwrap();

    assert_eq!((meta.width, meta.height, meta.z_planes), (128, 96, 1));
}

#[tokio::test]
async fn test_calibration_from_resolution() {
    let dir = TempDir::new().unwrap();
    let data = SlideTiffBuilder::new()
        .with_resolution_per_cm(40_000)
        .add_plane(pattern_image(64, 64, 0), 32, None)
        .build();
    let path = write_slide(dir.path(), "S1.ndpi", &data);

    let decoder = TiffSlideOpener::new().open(&path).await.unwrap();
    let meta = decoder.metadata().unwrap();

    let calibration = meta.calibration.unwrap();
    assert!((calibration - 0.25).abs() < 1e-9);
    assert_eq!(meta.calibration_unit.as_deref(), Some("µm"));
}

#[tokio::test]
async fn test_missing_resolution_leaves_calibration_empty() {
    let dir = TempDir::new().unwrap();
    let data = SlideTiffBuilder::new()
        .add_plane(pattern_image(64, 64, 0), 32, None)
        .build();
    let path = write_slide(dir.path(), "S1.ndpi", &data);

    let decoder = TiffSlideOpener::new().open(&path).await.unwrap();
    let meta = decoder.metadata().unwrap();

    assert_eq!(meta.calibration, None);
    assert_eq!(meta.calibration_unit, None);
}

// =============================================================================
// Errors
// =============================================================================

#[tokio::test]
async fn test_strip_layout_unsupported() {
    let dir = TempDir::new().unwrap();
    let data = SlideTiffBuilder::new()
        .add_strip_image(pattern_image(64, 64, 0))
        .build();
    let path = write_slide(dir.path(), "S1.ndpi", &data);

    let result = TiffSlideOpener::new().open(&path).await;

    assert!(matches!(result, Err(DecodeError::Unsupported { .. })));
}

#[tokio::test]
async fn test_not_a_tiff() {
    let dir = TempDir::new().unwrap();
    let path = write_slide(dir.path(), "S1.ndpi", b"PK\x03\x04 definitely not a tiff");

    let result = TiffSlideOpener::new().open(&path).await;

    assert!(matches!(
        result,
        Err(DecodeError::Tiff(TiffError::InvalidMagic(_)))
    ));
}

#[tokio::test]
async fn test_missing_file() {
    let dir = TempDir::new().unwrap();

    let result = TiffSlideOpener::new()
        .open(&dir.path().join("absent.ndpi"))
        .await;

    assert!(matches!(result, Err(DecodeError::Io(_))));
}

#[tokio::test]
async fn test_region_outside_slide() {
    let dir = TempDir::new().unwrap();
    let data = SlideTiffBuilder::new()
        .add_plane(pattern_image(64, 64, 0), 32, None)
        .build();
    let path = write_slide(dir.path(), "S1.ndpi", &data);
    let mut decoder = TiffSlideOpener::new().open(&path).await.unwrap();

    let result = decoder.read_region(0, 40, 40, 32, 32).await;
    assert!(matches!(result, Err(DecodeError::RegionOutOfBounds { .. })));

    let result = decoder.read_region(1, 0, 0, 8, 8).await;
    assert!(matches!(
        result,
        Err(DecodeError::PlaneOutOfRange { z: 1, z_planes: 1 })
    ));
}

// =============================================================================
// End to End
// =============================================================================

#[tokio::test]
async fn test_extract_real_tiff() {
    let dir = TempDir::new().unwrap();
    let near = pattern_image(300, 220, 11);
    let far = pattern_image(300, 220, 22);
    let data = SlideTiffBuilder::new()
        .with_resolution_per_cm(44_000)
        .add_plane(near.clone(), 64, Some(0))
        .add_plane(far.clone(), 64, Some(800))
        .build();
    write_slide(dir.path(), "S1.ndpi", &data);

    let summary = Extractor::new(
        Arc::new(TiffSlideOpener::new()),
        job_config(dir.path(), "S1.ndpi", 100),
        CancellationToken::new(),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(summary.written, 4);
    assert!(summary.failed.is_empty());

    let tile = image::open(dir.path().join("S1/100x_100y/1z.png"))
        .unwrap()
        .to_rgb8();
    assert_eq!(tile.into_raw(), crop(&far, 100, 100, 100, 100));

    let tile = image::open(dir.path().join("S1/0x_0y/0z.png"))
        .unwrap()
        .to_rgb8();
    assert_eq!(tile.into_raw(), crop(&near, 0, 0, 100, 100));

    let meta = load_metadata(&dir.path().join("S1")).await;
    assert_eq!(meta.ome_metadata.z_planes, 2);
    assert!(meta.ome_metadata.calibration.is_some());
}

#[tokio::test]
async fn test_inspect_real_tiff() {
    let dir = TempDir::new().unwrap();
    let data = SlideTiffBuilder::new()
        .add_plane(pattern_image(300, 220, 0), 64, None)
        .build();
    let path = write_slide(dir.path(), "S1.ndpi", &data);

    let inspection = inspect_slide(&TiffSlideOpener::new(), &path, &png_spec(100, 0))
        .await
        .unwrap();

    assert_eq!(inspection.slide, "S1");
    assert_eq!(inspection.tiles_across, 2);
    assert_eq!(inspection.tiles_down, 2);
    assert_eq!(inspection.total_tile_count, 4);
    assert!(!dir.path().join("S1").exists());
}
