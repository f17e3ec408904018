//! End-to-end extraction runs against the mock decoder.

use std::sync::Arc;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use ndpi_tiler::error::{DecodeError, JobError};
use ndpi_tiler::job::{Extractor, JobState};

use super::test_utils::{
    files_in, job_config, load_metadata, mock_pixel, snapshot, tile_dirs, MockSlideOpener,
};

async fn run(
    opener: &MockSlideOpener,
    config: ndpi_tiler::job::JobConfig,
) -> ndpi_tiler::job::JobSummary {
    Extractor::new(Arc::new(opener.clone()), config, CancellationToken::new())
        .run()
        .await
        .unwrap()
}

// =============================================================================
// Layout
// =============================================================================

#[tokio::test]
async fn test_worked_example_grid() {
    let dir = TempDir::new().unwrap();
    let opener = MockSlideOpener::new(3000, 2200, 1);

    let summary = run(&opener, job_config(dir.path(), "S1.ndpi", 1024)).await;

    let job_dir = dir.path().join("S1");
    assert_eq!(
        tile_dirs(&job_dir),
        vec!["0x_0y", "0x_1024y", "1024x_0y", "1024x_1024y"]
    );
    for tile in tile_dirs(&job_dir) {
        assert_eq!(files_in(&job_dir.join(tile)), vec!["0z.png"]);
    }

    assert_eq!(summary.total_tile_count, 4);
    assert_eq!(summary.written, 4);
    assert_eq!(summary.state, JobState::Finalized);
    assert!(!summary.cancelled);

    let meta = load_metadata(&job_dir).await;
    assert_eq!(meta.tile_size, 1024);
    assert_eq!(meta.tile_overlap, 0);
    assert_eq!(meta.total_tile_count, 4);
    assert_eq!(meta.processed_tile_count, 4);
    assert_eq!(meta.percent_complete, 100.0);
    assert_eq!(meta.ome_metadata.width, 3000);
    assert_eq!(meta.ome_metadata.height, 2200);
    assert_eq!(meta.ome_metadata.z_planes, 1);
}

#[tokio::test]
async fn test_every_focal_plane_written() {
    let dir = TempDir::new().unwrap();
    let opener = MockSlideOpener::new(300, 220, 3);

    let summary = run(&opener, job_config(dir.path(), "S1.ndpi", 100)).await;
    assert_eq!(summary.total_tile_count, 4);

    let job_dir = dir.path().join("S1");
    for tile in tile_dirs(&job_dir) {
        assert_eq!(
            files_in(&job_dir.join(tile)),
            vec!["0z.png", "1z.png", "2z.png"]
        );
    }
    assert_eq!(opener.planes_read(100, 100), vec![0, 1, 2]);
}

#[tokio::test]
async fn test_tile_pixels_match_region() {
    let dir = TempDir::new().unwrap();
    let opener = MockSlideOpener::new(300, 220, 2);

    run(&opener, job_config(dir.path(), "S1.ndpi", 100)).await;

    let tile = image::open(dir.path().join("S1/100x_0y/1z.png"))
        .unwrap()
        .to_rgb8();
    assert_eq!(tile.dimensions(), (100, 100));
    assert_eq!(tile.get_pixel(0, 0).0, mock_pixel(100, 0, 1));
    assert_eq!(tile.get_pixel(99, 99).0, mock_pixel(100, 0, 1));
}

#[tokio::test]
async fn test_overlap_shifts_origins() {
    let dir = TempDir::new().unwrap();
    let opener = MockSlideOpener::new(250, 150, 1);
    let mut config = job_config(dir.path(), "S1.ndpi", 100);
    config.spec = super::test_utils::png_spec(100, 25);

    let summary = run(&opener, config).await;

    assert_eq!(summary.total_tile_count, 2);
    assert_eq!(tile_dirs(&dir.path().join("S1")), vec!["0x_0y", "75x_0y"]);
}

#[tokio::test]
async fn test_slide_smaller_than_tile() {
    let dir = TempDir::new().unwrap();
    let opener = MockSlideOpener::new(50, 50, 1);

    let summary = run(&opener, job_config(dir.path(), "S1.ndpi", 100)).await;

    assert_eq!(summary.total_tile_count, 0);
    assert_eq!(summary.state, JobState::Finalized);
    assert!(tile_dirs(&dir.path().join("S1")).is_empty());

    let meta = load_metadata(&dir.path().join("S1")).await;
    assert_eq!(meta.total_tile_count, 0);
    assert_eq!(meta.percent_complete, 0.0);
}

// =============================================================================
// Idempotence
// =============================================================================

#[tokio::test]
async fn test_rerun_is_noop() {
    let dir = TempDir::new().unwrap();
    let first = MockSlideOpener::new(300, 220, 2);
    run(&first, job_config(dir.path(), "S1.ndpi", 100)).await;
    let before = snapshot(&dir.path().join("S1"));

    let second = MockSlideOpener::new(300, 220, 2);
    let summary = run(&second, job_config(dir.path(), "S1.ndpi", 100)).await;

    assert_eq!(summary.written, 0);
    assert_eq!(summary.skipped, 4);
    assert_eq!(summary.percent_complete, 100.0);
    assert_eq!(second.read_count(), 0);
    assert_eq!(snapshot(&dir.path().join("S1")), before);
}

#[tokio::test]
async fn test_overwrite_rewrites_complete_tiles() {
    let dir = TempDir::new().unwrap();
    let first = MockSlideOpener::new(300, 220, 1);
    run(&first, job_config(dir.path(), "S1.ndpi", 100)).await;

    let second = MockSlideOpener::new(300, 220, 1);
    let mut config = job_config(dir.path(), "S1.ndpi", 100);
    config.overwrite = true;
    let summary = run(&second, config).await;

    assert_eq!(summary.written, 4);
    assert_eq!(summary.skipped, 0);
    assert_eq!(second.read_count(), 4);
}

// =============================================================================
// Failure Handling
// =============================================================================

#[tokio::test]
async fn test_failed_tile_is_contained() {
    let dir = TempDir::new().unwrap();
    let opener = MockSlideOpener::new(300, 220, 2).failing_at(100, 0);

    let summary = run(&opener, job_config(dir.path(), "S1.ndpi", 100)).await;

    assert_eq!(summary.state, JobState::Finalized);
    assert_eq!(summary.written, 3);
    assert_eq!(summary.failed, vec![ndpi_tiler::TileOrigin::new(100, 0)]);
    assert_eq!(summary.processed, 4);

    let job_dir = dir.path().join("S1");
    for tile in ["0x_0y", "0x_100y", "100x_100y"] {
        assert_eq!(files_in(&job_dir.join(tile)), vec!["0z.png", "1z.png"]);
    }
    assert!(!job_dir.join("100x_0y/0z.png").exists());

    let meta = load_metadata(&job_dir).await;
    assert_eq!(meta.processed_tile_count, 4);
}

#[tokio::test]
async fn test_failed_tile_retried_next_run() {
    let dir = TempDir::new().unwrap();
    let failing = MockSlideOpener::new(300, 220, 1).failing_at(0, 100);
    run(&failing, job_config(dir.path(), "S1.ndpi", 100)).await;

    let healthy = MockSlideOpener::new(300, 220, 1);
    let summary = run(&healthy, job_config(dir.path(), "S1.ndpi", 100)).await;

    assert_eq!(summary.written, 1);
    assert_eq!(summary.skipped, 3);
    assert!(summary.failed.is_empty());
    assert_eq!(
        healthy.read_origins(),
        [ndpi_tiler::TileOrigin::new(0, 100)].into_iter().collect()
    );
}

#[tokio::test]
async fn test_unreadable_slide_is_fatal() {
    let dir = TempDir::new().unwrap();
    let opener = MockSlideOpener::unreadable();

    let result = Extractor::new(
        Arc::new(opener),
        job_config(dir.path(), "S1.ndpi", 100),
        CancellationToken::new(),
    )
    .run()
    .await;

    assert!(matches!(result, Err(JobError::Decode(DecodeError::Io(_)))));
    assert!(!dir.path().join("S1").exists());
}

#[tokio::test]
async fn test_zero_dimension_is_fatal() {
    let dir = TempDir::new().unwrap();
    let opener = MockSlideOpener::new(0, 220, 1);

    let result = Extractor::new(
        Arc::new(opener),
        job_config(dir.path(), "S1.ndpi", 100),
        CancellationToken::new(),
    )
    .run()
    .await;

    assert!(matches!(
        result,
        Err(JobError::Decode(DecodeError::MissingField { field: "width" }))
    ));
}

// =============================================================================
// Worker Pool
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pooled_matches_sequential() {
    let sequential_dir = TempDir::new().unwrap();
    let pooled_dir = TempDir::new().unwrap();

    let opener = MockSlideOpener::new(450, 330, 2).failing_at(200, 200);
    let sequential = run(&opener, job_config(sequential_dir.path(), "S1.ndpi", 100)).await;

    let pooled_opener = MockSlideOpener::new(450, 330, 2).failing_at(200, 200);
    let mut config = job_config(pooled_dir.path(), "S1.ndpi", 100);
    config.workers = Some(3);
    let pooled = run(&pooled_opener, config).await;

    assert_eq!(pooled.total_tile_count, sequential.total_tile_count);
    assert_eq!(pooled.written, sequential.written);
    assert_eq!(pooled.failed, sequential.failed);
    assert_eq!(
        snapshot(&pooled_dir.path().join("S1")),
        snapshot(&sequential_dir.path().join("S1"))
    );
}

#[tokio::test]
async fn test_pooled_opens_handle_per_tile() {
    let dir = TempDir::new().unwrap();
    let opener = MockSlideOpener::new(300, 220, 1);
    let mut config = job_config(dir.path(), "S1.ndpi", 100);
    config.workers = Some(2);

    run(&opener, config).await;

    // one handle for metadata plus one per tile
    assert_eq!(opener.open_count(), 5);
}

#[tokio::test]
async fn test_sequential_reuses_one_handle() {
    let dir = TempDir::new().unwrap();
    let opener = MockSlideOpener::new(300, 220, 1);

    run(&opener, job_config(dir.path(), "S1.ndpi", 100)).await;

    assert_eq!(opener.open_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_handle_open_failure_fails_tiles_in_both_modes() {
    let mut summaries = Vec::new();
    for workers in [None, Some(2)] {
        let dir = TempDir::new().unwrap();
        // the first open serves the metadata query
        let opener = MockSlideOpener::new(300, 220, 1).failing_opens_after(1);
        let mut config = job_config(dir.path(), "S1.ndpi", 100);
        config.workers = workers;

        let summary = run(&opener, config).await;

        assert_eq!(summary.state, JobState::Finalized);
        assert_eq!(summary.processed, 4);
        assert_eq!(summary.written, 0);
        // every tile retries the open
        assert_eq!(opener.open_count(), 5);
        assert_eq!(opener.read_count(), 0);
        assert_eq!(load_metadata(&dir.path().join("S1")).await.processed_tile_count, 4);

        let mut failed = summary.failed;
        failed.sort();
        summaries.push(failed);
    }

    assert_eq!(summaries[0], summaries[1]);
    assert_eq!(summaries[0].len(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_panicking_worker_fails_only_its_tile() {
    let dir = TempDir::new().unwrap();
    let opener = MockSlideOpener::new(300, 220, 1).panicking_at(100, 0);
    let mut config = job_config(dir.path(), "S1.ndpi", 100);
    config.workers = Some(2);

    let summary = run(&opener, config).await;

    assert_eq!(summary.state, JobState::Finalized);
    assert_eq!(summary.failed, vec![ndpi_tiler::TileOrigin::new(100, 0)]);
    assert_eq!(summary.written, 3);
    assert_eq!(summary.processed, 4);

    let job_dir = dir.path().join("S1");
    for tile in ["0x_0y", "0x_100y", "100x_100y"] {
        assert_eq!(files_in(&job_dir.join(tile)), vec!["0z.png"]);
    }
    assert!(!job_dir.join("100x_0y/0z.png").exists());
}
