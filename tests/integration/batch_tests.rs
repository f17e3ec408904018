//! Batch runs over a directory of slides, and the status report.

use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use ndpi_tiler::job::{
    list_slides, run_batch, scan_job_statuses, BatchConfig, JobStatus, STATUS_CSV_HEADER,
};

use super::test_utils::{png_spec, tile_dirs, MockSlideOpener};

fn touch(dir: &Path, name: &str) {
    std::fs::write(dir.join(name), b"").unwrap();
}

fn batch_config(input: &Path, output: &Path) -> BatchConfig {
    BatchConfig {
        input_dir: input.to_path_buf(),
        output_root: Some(output.to_path_buf()),
        spec: png_spec(100, 0),
        overwrite: false,
        archive: false,
        workers: None,
        jobs: 2,
    }
}

#[tokio::test]
async fn test_list_slides_filters_extension() {
    let dir = TempDir::new().unwrap();
    touch(dir.path(), "b.ndpi");
    touch(dir.path(), "a.ndpi");
    touch(dir.path(), "notes.txt");
    std::fs::create_dir(dir.path().join("c.ndpi")).unwrap();

    let slides = list_slides(dir.path()).await.unwrap();

    assert_eq!(
        slides,
        vec![dir.path().join("a.ndpi"), dir.path().join("b.ndpi")]
    );
}

#[tokio::test]
async fn test_batch_extracts_every_slide() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    for name in ["S1.ndpi", "S2.ndpi", "S3.ndpi"] {
        touch(input.path(), name);
    }
    let opener = Arc::new(MockSlideOpener::new(300, 220, 1));

    let report = run_batch(
        opener,
        &batch_config(input.path(), output.path()),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert!(report.is_success());
    let slides: Vec<_> = report.completed.iter().map(|s| s.slide.as_str()).collect();
    assert_eq!(slides, vec!["S1", "S2", "S3"]);
    for name in ["S1", "S2", "S3"] {
        assert_eq!(tile_dirs(&output.path().join(name)).len(), 4);
    }
}

#[tokio::test]
async fn test_batch_isolates_failed_slide() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    touch(input.path(), "S1.ndpi");
    touch(input.path(), "S2.ndpi");
    let opener = Arc::new(MockSlideOpener::new(300, 220, 1).unreadable_slide("S1.ndpi"));

    let report = run_batch(
        opener,
        &batch_config(input.path(), output.path()),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert!(!report.is_success());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].input, input.path().join("S1.ndpi"));
    assert_eq!(report.completed.len(), 1);
    assert_eq!(report.completed[0].slide, "S2");
}

#[tokio::test]
async fn test_cancelled_batch_starts_nothing() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    touch(input.path(), "S1.ndpi");
    touch(input.path(), "S2.ndpi");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = run_batch(
        Arc::new(MockSlideOpener::new(300, 220, 1)),
        &batch_config(input.path(), output.path()),
        cancel,
    )
    .await
    .unwrap();

    assert!(report.completed.is_empty());
    assert_eq!(report.not_started.len(), 2);
}

#[tokio::test]
async fn test_default_output_next_to_slide() {
    let input = TempDir::new().unwrap();
    touch(input.path(), "S1.ndpi");
    let mut config = batch_config(input.path(), input.path());
    config.output_root = None;

    let report = run_batch(
        Arc::new(MockSlideOpener::new(300, 220, 1)),
        &config,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert!(report.is_success());
    assert!(input.path().join("S1_tiles/S1/metadata.json").is_file());
}

#[tokio::test]
async fn test_status_report_after_batch() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    touch(input.path(), "S1.ndpi");
    touch(input.path(), "S2.ndpi");
    run_batch(
        Arc::new(MockSlideOpener::new(300, 220, 1)),
        &batch_config(input.path(), output.path()),
        CancellationToken::new(),
    )
    .await
    .unwrap();
    std::fs::create_dir(output.path().join("stray")).unwrap();

    let statuses = scan_job_statuses(output.path()).await.unwrap();

    assert_eq!(
        statuses,
        vec![
            JobStatus {
                name: "S1".to_string(),
                total_tile_count: Some(4),
                percent_complete: Some(100.0),
            },
            JobStatus {
                name: "S2".to_string(),
                total_tile_count: Some(4),
                percent_complete: Some(100.0),
            },
            JobStatus {
                name: "stray".to_string(),
                total_tile_count: None,
                percent_complete: None,
            },
        ]
    );
    assert_eq!(STATUS_CSV_HEADER, "tile dir,tile count,percent complete");
    assert_eq!(statuses[0].csv_row(), "S1,4,100");
}
