//! Extraction Orchestrator.
//!
//! Drives one slide through its lifecycle: read metadata, plan the grid,
//! create the metadata record, then extract every tile that is not already
//! complete on disk. Tiles run sequentially on one decoder handle, or on a
//! bounded pool of tasks that each open their own handle.
//!
//! Cancellation stops new tile work; tiles already in flight finish and are
//! recorded. Progress is flushed after every tile and once more on every
//! exit path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::archive;
use super::metadata::MetadataStore;
use super::progress::{Progress, TileOutcome};
use super::state::{JobState, Lifecycle};
use crate::error::{ArchiveError, DecodeError, JobError, TileReadError};
use crate::slide::{read_slide_metadata, SlideDecoder, SlideOpener};
use crate::tile::{
    count_artifacts, plane_file_name, save_raster, JobPaths, TileFetcher, TileGrid, TileOrigin,
    TileSpec,
};

/// Settings for one extraction job.
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Slide file to extract
    pub input: PathBuf,

    /// Directory that receives `<slide_name>/` (and `<slide_name>.zip`)
    pub output_root: PathBuf,

    pub spec: TileSpec,

    /// Re-extract tiles that already have every plane on disk
    pub overwrite: bool,

    /// Unpack an existing archive before extracting and pack the job after
    pub archive: bool,

    /// Worker pool size; `None` extracts sequentially
    pub workers: Option<usize>,
}

impl JobConfig {
    /// Sequential job writing next to the input file.
    pub fn new(input: impl Into<PathBuf>, spec: TileSpec) -> Self {
        let input = input.into();
        let output_root = default_output_root(&input);
        Self {
            input,
            output_root,
            spec,
            overwrite: false,
            archive: false,
            workers: None,
        }
    }
}

/// Directory containing `input`, or `.` for a bare file name.
pub fn default_output_root(input: &Path) -> PathBuf {
    match input.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// What a finished run did.
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub slide: String,
    pub state: JobState,
    pub total_tile_count: u64,

    /// Tiles visited this run: written, skipped and failed
    pub processed: u64,
    pub written: u64,
    pub skipped: u64,
    pub failed: Vec<TileOrigin>,

    /// The run stopped early on a shutdown signal
    pub cancelled: bool,

    pub percent_complete: f64,

    /// Archive written after a completed run
    pub archive: Option<PathBuf>,
}

/// Runs extraction jobs with decoders from `O`.
pub struct Extractor<O: SlideOpener> {
    opener: Arc<O>,
    config: JobConfig,
    cancel: CancellationToken,
}

impl<O: SlideOpener> Extractor<O> {
    pub fn new(opener: Arc<O>, config: JobConfig, cancel: CancellationToken) -> Self {
        Self {
            opener,
            config,
            cancel,
        }
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    pub async fn run(&self) -> Result<JobSummary, JobError> {
        let paths = JobPaths::for_slide(&self.config.output_root, &self.config.input);
        let mut lifecycle = Lifecycle::new(paths.name());

        let result = self.run_job(&paths, &mut lifecycle).await;
        if let Err(e) = &result {
            lifecycle.fail();
            error!(slide = %paths.name(), error = %e, "Extraction failed");
        }
        result
    }

    async fn run_job(
        &self,
        paths: &JobPaths,
        lifecycle: &mut Lifecycle,
    ) -> Result<JobSummary, JobError> {
        let slide = paths.name().to_string();
        info!(
            slide = %slide,
            input = %self.config.input.display(),
            output = %paths.root().display(),
            "Starting extraction"
        );

        let metadata = read_slide_metadata(self.opener.as_ref(), &self.config.input).await?;
        lifecycle.advance(JobState::MetadataLoaded);

        if self.config.archive {
            self.restore_archive(paths).await;
        }

        let grid = TileGrid::plan(metadata.width, metadata.height, &self.config.spec);
        let total = grid.total_tile_count();
        lifecycle.advance(JobState::GridPlanned);
        info!(
            slide = %slide,
            width = metadata.width,
            height = metadata.height,
            z_planes = metadata.z_planes,
            tiles = total,
            "Planned tile grid"
        );

        tokio::fs::create_dir_all(paths.root())
            .await
            .map_err(|source| JobError::Io {
                path: paths.root().to_path_buf(),
                source,
            })?;
        let store = MetadataStore::for_job(paths);
        store
            .create_if_absent(&self.config.spec, total, &metadata)
            .await?;
        lifecycle.advance(JobState::Running);

        let mut progress = Progress::new(slide.clone(), store, total);
        let work = TileWork {
            paths: paths.clone(),
            spec: self.config.spec,
            z_planes: metadata.z_planes,
            overwrite: self.config.overwrite,
        };

        let extracted = match self.config.workers {
            Some(workers) => self.run_pooled(&work, &grid, workers, &mut progress).await,
            None => self.run_sequential(&work, &grid, &mut progress).await,
        };

        lifecycle.advance(JobState::Draining);
        let percent_complete = progress.finish().await;
        let cancelled = extracted?;
        lifecycle.advance(JobState::Finalized);

        let mut summary = JobSummary {
            slide,
            state: lifecycle.state(),
            total_tile_count: total,
            processed: progress.processed(),
            written: progress.written(),
            skipped: progress.skipped(),
            failed: progress.take_failed(),
            cancelled,
            percent_complete,
            archive: None,
        };

        if cancelled {
            info!(
                slide = %summary.slide,
                processed = summary.processed,
                total,
                "Extraction interrupted; progress saved"
            );
            return Ok(summary);
        }

        info!(
            slide = %summary.slide,
            written = summary.written,
            skipped = summary.skipped,
            failed = summary.failed.len(),
            "Extraction complete"
        );

        if self.config.archive {
            summary.archive = Some(pack_job(paths.root().to_path_buf()).await?);
        }
        Ok(summary)
    }

    /// Unpack `<slide_name>.zip` when present. A failure is logged and the job
    /// starts from an empty directory.
    async fn restore_archive(&self, paths: &JobPaths) {
        let archive_path = paths.archive();
        let output_root = self.config.output_root.clone();
        let unpacked = tokio::task::spawn_blocking(move || {
            archive::unpack(&archive_path, &output_root)
        })
        .await
        .map_err(join_to_archive_error)
        .and_then(|result| result);

        match unpacked {
            Ok(true) => info!(slide = %paths.name(), "Resuming from archive"),
            Ok(false) => debug!(slide = %paths.name(), "No archive to resume from"),
            Err(e) => warn!(
                slide = %paths.name(),
                error = %e,
                "Failed to unpack archive; starting fresh"
            ),
        }
    }

    /// Returns whether the run was cancelled.
    async fn run_sequential(
        &self,
        work: &TileWork,
        grid: &TileGrid,
        progress: &mut Progress,
    ) -> Result<bool, JobError> {
        let mut fetcher: Option<TileFetcher<O::Decoder>> = None;

        for origin in grid.origins() {
            if self.cancel.is_cancelled() {
                return Ok(true);
            }

            if work.is_complete(origin).await {
                progress.record(TileOutcome::Skipped { origin }).await;
                continue;
            }

            // a handle that fails to open fails this tile; the next tile retries
            if fetcher.is_none() {
                match self.opener.open(&self.config.input).await {
                    Ok(decoder) => fetcher = Some(TileFetcher::new(decoder)),
                    Err(source) => {
                        progress.record(open_failure(origin, source)).await;
                        continue;
                    }
                }
            }
            if let Some(fetcher) = fetcher.as_mut() {
                let outcome = work.extract(fetcher, origin).await;
                progress.record(outcome).await;
            }
        }

        Ok(self.cancel.is_cancelled())
    }

    /// Returns whether the run was cancelled.
    async fn run_pooled(
        &self,
        work: &TileWork,
        grid: &TileGrid,
        workers: usize,
        progress: &mut Progress,
    ) -> Result<bool, JobError> {
        let semaphore = Arc::new(Semaphore::new(workers.max(1)));
        let mut tasks = JoinSet::new();
        let mut in_flight: HashMap<tokio::task::Id, TileOrigin> = HashMap::new();
        let mut cancelled = false;

        for origin in grid.origins() {
            while let Some(joined) = tasks.try_join_next_with_id() {
                progress.record(reap(joined, &mut in_flight)).await;
            }

            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            if work.is_complete(origin).await {
                progress.record(TileOutcome::Skipped { origin }).await;
                continue;
            }

            let permit = tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    cancelled = true;
                    break;
                }

                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let opener = Arc::clone(&self.opener);
            let input = self.config.input.clone();
            let task = work.clone();
            let handle = tasks.spawn(async move {
                let _permit = permit;
                match opener.open(&input).await {
                    Ok(decoder) => {
                        let mut fetcher = TileFetcher::new(decoder);
                        task.extract(&mut fetcher, origin).await
                    }
                    Err(source) => open_failure(origin, source),
                }
            });
            in_flight.insert(handle.id(), origin);
        }

        if !tasks.is_empty() {
            debug!(in_flight = tasks.len(), "Waiting for tile workers");
        }
        while let Some(joined) = tasks.join_next_with_id().await {
            progress.record(reap(joined, &mut in_flight)).await;
        }

        Ok(cancelled || self.cancel.is_cancelled())
    }
}

/// Outcome for a tile whose decoder handle could not be opened.
fn open_failure(origin: TileOrigin, source: DecodeError) -> TileOutcome {
    TileOutcome::Failed {
        origin,
        error: TileReadError::Decode {
            x: origin.x,
            y: origin.y,
            z: 0,
            source,
        },
    }
}

fn reap(
    joined: Result<(tokio::task::Id, TileOutcome), JoinError>,
    in_flight: &mut HashMap<tokio::task::Id, TileOrigin>,
) -> TileOutcome {
    match joined {
        Ok((id, outcome)) => {
            in_flight.remove(&id);
            outcome
        }
        Err(e) => {
            let origin = match in_flight.remove(&e.id()) {
                Some(origin) => origin,
                None => {
                    warn!(task = %e.id(), "Tile worker failed for an untracked task");
                    TileOrigin::default()
                }
            };
            TileOutcome::Failed {
                origin,
                error: TileReadError::Worker {
                    x: origin.x,
                    y: origin.y,
                    message: e.to_string(),
                },
            }
        }
    }
}

fn join_to_archive_error(e: JoinError) -> ArchiveError {
    ArchiveError::Io(std::io::Error::other(e.to_string()))
}

async fn pack_job(dir: PathBuf) -> Result<PathBuf, JobError> {
    let archive = tokio::task::spawn_blocking(move || archive::pack(&dir))
        .await
        .map_err(join_to_archive_error)??;
    Ok(archive)
}

/// Per-tile work shared by the sequential and pooled paths.
#[derive(Debug, Clone)]
struct TileWork {
    paths: JobPaths,
    spec: TileSpec,
    z_planes: u32,
    overwrite: bool,
}

impl TileWork {
    /// A tile is complete when its directory holds an artifact for every
    /// plane. Overwrite treats every tile as incomplete.
    async fn is_complete(&self, origin: TileOrigin) -> bool {
        if self.overwrite {
            return false;
        }
        let dir = self.paths.tile_dir(origin);
        match count_artifacts(&dir, self.spec.format()).await {
            Ok(count) => count >= self.z_planes as usize,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Cannot inspect tile directory");
                false
            }
        }
    }

    async fn extract<D: SlideDecoder>(
        &self,
        fetcher: &mut TileFetcher<D>,
        origin: TileOrigin,
    ) -> TileOutcome {
        let dir = self.paths.tile_dir(origin);
        match write_planes(fetcher, &dir, origin, self.spec, self.z_planes).await {
            Ok(()) => TileOutcome::Written {
                origin,
                planes: self.z_planes,
            },
            Err(error) => TileOutcome::Failed { origin, error },
        }
    }
}

/// Fetch and save every plane of the tile at `origin`, stopping at the first
/// failure.
async fn write_planes<D: SlideDecoder>(
    fetcher: &mut TileFetcher<D>,
    dir: &Path,
    origin: TileOrigin,
    spec: TileSpec,
    z_planes: u32,
) -> Result<(), TileReadError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| TileReadError::Save {
            path: dir.to_path_buf(),
            message: e.to_string(),
        })?;

    let format = spec.format();
    for z in 0..z_planes {
        let raster = fetcher.fetch(origin, z, spec.tile_size()).await?;
        save_raster(raster, dir.join(plane_file_name(z, format)), format).await?;
        debug!(tile = %origin, z, "Wrote plane");
    }
    Ok(())
}
