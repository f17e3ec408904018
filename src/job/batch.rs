//! Batch Runner: every `.ndpi` slide in a directory, a few at a time.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::orchestrator::{Extractor, JobConfig, JobSummary};
use crate::error::JobError;
use crate::slide::SlideOpener;
use crate::tile::TileSpec;

/// Slide file extension picked up by a batch run
pub const SLIDE_EXTENSION: &str = "ndpi";

/// Default number of slides extracted at once
pub const DEFAULT_CONCURRENT_SLIDES: usize = 8;

/// Settings for a batch run.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub input_dir: PathBuf,

    /// Shared output root; `None` writes each slide to
    /// `<slide path without extension>_tiles`
    pub output_root: Option<PathBuf>,

    pub spec: TileSpec,
    pub overwrite: bool,
    pub archive: bool,

    /// Worker pool size inside each slide; `None` is sequential
    pub workers: Option<usize>,

    /// Slides extracted at once
    pub jobs: usize,
}

impl BatchConfig {
    /// Job settings for one slide of the batch.
    pub fn job_for(&self, slide: &Path) -> JobConfig {
        let output_root = self
            .output_root
            .clone()
            .unwrap_or_else(|| default_batch_output(slide));
        JobConfig {
            input: slide.to_path_buf(),
            output_root,
            spec: self.spec,
            overwrite: self.overwrite,
            archive: self.archive,
            workers: self.workers,
        }
    }
}

/// `<slide path without extension>_tiles`
pub fn default_batch_output(slide: &Path) -> PathBuf {
    let mut stem = slide.with_extension("").into_os_string();
    stem.push("_tiles");
    PathBuf::from(stem)
}

/// A slide that failed as a whole.
#[derive(Debug, Clone, Serialize)]
pub struct SlideFailure {
    pub input: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub completed: Vec<JobSummary>,
    pub failed: Vec<SlideFailure>,

    /// Slides never started because the batch was cancelled
    pub not_started: Vec<PathBuf>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Slide files directly inside `dir`, sorted by path.
pub async fn list_slides(dir: &Path) -> Result<Vec<PathBuf>, JobError> {
    let io_err = |source| JobError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_err)?;
    let mut slides = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        let path = entry.path();
        let is_slide = path.extension().is_some_and(|ext| ext == SLIDE_EXTENSION);
        if is_slide && entry.file_type().await.map_err(io_err)?.is_file() {
            slides.push(path);
        }
    }
    slides.sort();
    Ok(slides)
}

/// Extract every slide in `config.input_dir`.
///
/// A slide that fails is recorded in the report and the others continue.
/// Cancellation stops new slides from starting; running slides drain.
pub async fn run_batch<O: SlideOpener>(
    opener: Arc<O>,
    config: &BatchConfig,
    cancel: CancellationToken,
) -> Result<BatchReport, JobError> {
    if config.jobs == 0 {
        return Err(JobError::Config(
            "concurrent slide count must be greater than 0".to_string(),
        ));
    }

    let slides = list_slides(&config.input_dir).await?;
    info!(
        input = %config.input_dir.display(),
        slides = slides.len(),
        jobs = config.jobs,
        "Starting batch"
    );

    let semaphore = Arc::new(Semaphore::new(config.jobs));
    let mut tasks = JoinSet::new();
    let mut report = BatchReport::default();
    let mut pending = slides.into_iter();

    for slide in pending.by_ref() {
        let permit = tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                report.not_started.push(slide);
                break;
            }

            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let extractor = Extractor::new(Arc::clone(&opener), config.job_for(&slide), cancel.clone());
        tasks.spawn(async move {
            let _permit = permit;
            let result = extractor.run().await;
            (slide, result)
        });
    }
    report.not_started.extend(pending);

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(summary))) => report.completed.push(summary),
            Ok((input, Err(e))) => {
                error!(input = %input.display(), error = %e, "Slide failed");
                report.failed.push(SlideFailure {
                    input,
                    error: e.to_string(),
                });
            }
            Err(e) => {
                error!(error = %e, "Slide task failed");
                report.failed.push(SlideFailure {
                    input: PathBuf::new(),
                    error: e.to_string(),
                });
            }
        }
    }

    report.completed.sort_by(|a, b| a.slide.cmp(&b.slide));
    info!(
        completed = report.completed.len(),
        failed = report.failed.len(),
        not_started = report.not_started.len(),
        "Batch finished"
    );
    Ok(report)
}
