//! Packing finished jobs and resuming from archives.

use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use ndpi_tiler::job::{archive, Extractor, JobConfig, JobSummary};
use ndpi_tiler::TileOrigin;

use super::test_utils::{files_in, job_config, load_metadata, tile_dirs, MockSlideOpener};

fn zip_config(dir: &Path) -> JobConfig {
    let mut config = job_config(dir, "S1.ndpi", 100);
    config.archive = true;
    config
}

async fn run_with(
    opener: &MockSlideOpener,
    config: JobConfig,
    cancel: CancellationToken,
) -> JobSummary {
    Extractor::new(Arc::new(opener.clone()), config, cancel)
        .run()
        .await
        .unwrap()
}

/// Unpack `<root>/S1.zip` into a scratch directory and return it.
fn unpack_copy(root: &Path) -> TempDir {
    let scratch = TempDir::new().unwrap();
    assert!(archive::unpack(&root.join("S1.zip"), scratch.path()).unwrap());
    scratch
}

#[tokio::test]
async fn test_completed_job_is_packed() {
    let dir = TempDir::new().unwrap();
    let opener = MockSlideOpener::new(300, 220, 2);

    let summary = run_with(&opener, zip_config(dir.path()), CancellationToken::new()).await;

    assert_eq!(summary.archive, Some(dir.path().join("S1.zip")));
    assert!(!dir.path().join("S1").exists());
    assert!(!dir.path().join("S1.zip.part").exists());

    let scratch = unpack_copy(dir.path());
    let job_dir = scratch.path().join("S1");
    assert_eq!(tile_dirs(&job_dir).len(), 4);
    assert_eq!(
        files_in(&job_dir.join("100x_100y")),
        vec!["0z.png", "1z.png"]
    );
    assert_eq!(load_metadata(&job_dir).await.percent_complete, 100.0);
}

#[tokio::test]
async fn test_cancelled_job_is_not_packed() {
    let dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let opener = MockSlideOpener::new(300, 220, 1).cancelling_after(1, cancel.clone());

    let summary = run_with(&opener, zip_config(dir.path()), cancel).await;

    assert!(summary.cancelled);
    assert_eq!(summary.archive, None);
    assert!(dir.path().join("S1").is_dir());
    assert!(!dir.path().join("S1.zip").exists());
}

#[tokio::test]
async fn test_resume_from_archive() {
    let dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let first = MockSlideOpener::new(300, 220, 1).cancelling_after(2, cancel.clone());
    run_with(&first, zip_config(dir.path()), cancel).await;
    archive::pack(&dir.path().join("S1")).unwrap();
    assert!(!dir.path().join("S1").exists());

    let second = MockSlideOpener::new(300, 220, 1);
    let summary = run_with(&second, zip_config(dir.path()), CancellationToken::new()).await;

    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.written, 2);
    assert_eq!(
        second.read_origins(),
        [TileOrigin::new(100, 0), TileOrigin::new(100, 100)]
            .into_iter()
            .collect()
    );

    let scratch = unpack_copy(dir.path());
    let job_dir = scratch.path().join("S1");
    assert_eq!(tile_dirs(&job_dir).len(), 4);
    assert_eq!(load_metadata(&job_dir).await.processed_tile_count, 4);
}

#[tokio::test]
async fn test_rerun_of_packed_job_reads_nothing() {
    let dir = TempDir::new().unwrap();
    let first = MockSlideOpener::new(300, 220, 1);
    run_with(&first, zip_config(dir.path()), CancellationToken::new()).await;

    let second = MockSlideOpener::new(300, 220, 1);
    let summary = run_with(&second, zip_config(dir.path()), CancellationToken::new()).await;

    assert_eq!(summary.skipped, 4);
    assert_eq!(second.read_count(), 0);
    assert!(dir.path().join("S1.zip").is_file());
    assert!(!dir.path().join("S1").exists());
}

#[tokio::test]
async fn test_corrupt_archive_starts_fresh() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("S1.zip"), b"not a zip file").unwrap();
    let opener = MockSlideOpener::new(300, 220, 1);

    let summary = run_with(&opener, zip_config(dir.path()), CancellationToken::new()).await;

    assert_eq!(summary.written, 4);
    let scratch = unpack_copy(dir.path());
    assert_eq!(tile_dirs(&scratch.path().join("S1")).len(), 4);
}

#[tokio::test]
async fn test_existing_directory_wins_over_archive() {
    let dir = TempDir::new().unwrap();
    let first = MockSlideOpener::new(300, 220, 1);
    run_with(&first, zip_config(dir.path()), CancellationToken::new()).await;

    // a fresh directory alongside the archive is used as-is
    std::fs::create_dir(dir.path().join("S1")).unwrap();
    let second = MockSlideOpener::new(300, 220, 1);
    let summary = run_with(&second, zip_config(dir.path()), CancellationToken::new()).await;

    assert_eq!(summary.written, 4);
    assert_eq!(summary.skipped, 0);
}
