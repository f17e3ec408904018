//! Job Metadata Store.
//!
//! `metadata.json` records the tile spec, the slide description and how far
//! the job has progressed. It is created once per job directory and updated
//! by read-modify-write on every flush. Writes go to `metadata.json.tmp` and
//! are renamed into place.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::MetadataError;
use crate::slide::SlideMetadata;
use crate::tile::{JobPaths, TileSpec};

/// Persisted progress record of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMetadata {
    pub tile_size: u32,
    pub tile_overlap: u32,
    pub ome_metadata: SlideMetadata,
    pub total_tile_count: u64,
    pub processed_tile_count: u64,
    pub percent_complete: f64,
}

impl JobMetadata {
    pub fn new(spec: &TileSpec, total_tile_count: u64, slide: SlideMetadata) -> Self {
        Self {
            tile_size: spec.tile_size(),
            tile_overlap: spec.overlap(),
            ome_metadata: slide,
            total_tile_count,
            processed_tile_count: 0,
            percent_complete: 0.0,
        }
    }

    /// Set the processed count, clamped to the total, and recompute the
    /// percentage.
    pub fn set_processed(&mut self, processed: u64) {
        self.processed_tile_count = processed.min(self.total_tile_count);
        self.percent_complete = percent_complete(self.processed_tile_count, self.total_tile_count);
    }

    pub fn is_complete(&self) -> bool {
        self.processed_tile_count >= self.total_tile_count
    }
}

/// `processed / total * 100` rounded to two decimals; 0.0 for an empty job.
pub fn percent_complete(processed: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (processed as f64 / total as f64 * 100.0 * 100.0).round() / 100.0
}

/// Reads and writes one job's `metadata.json`.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    path: PathBuf,
}

impl MetadataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn for_job(paths: &JobPaths) -> Self {
        Self::new(paths.metadata_file())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the record unless one already exists.
    ///
    /// An existing record is returned untouched so a resumed job keeps its
    /// progress.
    pub async fn create_if_absent(
        &self,
        spec: &TileSpec,
        total_tile_count: u64,
        slide: &SlideMetadata,
    ) -> Result<JobMetadata, MetadataError> {
        match self.load().await {
            Ok(existing) => {
                debug!(
                    path = %self.path.display(),
                    processed = existing.processed_tile_count,
                    "Keeping existing job metadata"
                );
                return Ok(existing);
            }
            Err(MetadataError::Missing(_)) => {}
            Err(e) => return Err(e),
        }

        let metadata = JobMetadata::new(spec, total_tile_count, slide.clone());
        self.write(&metadata).await?;
        info!(
            path = %self.path.display(),
            total_tile_count,
            "Created job metadata"
        );
        Ok(metadata)
    }

    /// Record `processed` tiles.
    ///
    /// The on-disk count is never lowered: the larger of the stored and the
    /// given count is kept, clamped to the total.
    pub async fn flush(&self, processed: u64) -> Result<JobMetadata, MetadataError> {
        let mut metadata = self.load().await?;
        metadata.set_processed(processed.max(metadata.processed_tile_count));
        self.write(&metadata).await?;
        self.log_flush(&metadata);
        Ok(metadata)
    }

    /// [`flush`](Self::flush) for contexts that cannot await, such as `Drop`.
    pub fn flush_blocking(&self, processed: u64) -> Result<JobMetadata, MetadataError> {
        let contents = std::fs::read(&self.path).map_err(|e| self.read_error(e))?;
        let mut metadata = self.parse(&contents)?;
        metadata.set_processed(processed.max(metadata.processed_tile_count));

        let contents = self.serialize(&metadata)?;
        let temp = self.temp_path();
        std::fs::write(&temp, contents).map_err(|e| self.io_error(e))?;
        std::fs::rename(&temp, &self.path).map_err(|e| self.io_error(e))?;
        self.log_flush(&metadata);
        Ok(metadata)
    }

    fn log_flush(&self, metadata: &JobMetadata) {
        debug!(
            path = %self.path.display(),
            processed = metadata.processed_tile_count,
            percent = metadata.percent_complete,
            "Flushed job metadata"
        );
    }

    pub async fn load(&self) -> Result<JobMetadata, MetadataError> {
        let contents = tokio::fs::read(&self.path)
            .await
            .map_err(|e| self.read_error(e))?;
        self.parse(&contents)
    }

    async fn write(&self, metadata: &JobMetadata) -> Result<(), MetadataError> {
        let contents = self.serialize(metadata)?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, contents)
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| self.io_error(e))
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = OsString::from(self.path.as_os_str());
        temp.push(".tmp");
        PathBuf::from(temp)
    }

    fn parse(&self, contents: &[u8]) -> Result<JobMetadata, MetadataError> {
        serde_json::from_slice(contents).map_err(|e| MetadataError::Corrupt {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }

    fn serialize(&self, metadata: &JobMetadata) -> Result<Vec<u8>, MetadataError> {
        to_pretty_json(metadata).map_err(|e| MetadataError::Corrupt {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }

    fn read_error(&self, source: std::io::Error) -> MetadataError {
        if source.kind() == ErrorKind::NotFound {
            MetadataError::Missing(self.path.clone())
        } else {
            self.io_error(source)
        }
    }

    fn io_error(&self, source: std::io::Error) -> MetadataError {
        MetadataError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

fn to_pretty_json(metadata: &JobMetadata) -> serde_json::Result<Vec<u8>> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    metadata.serialize(&mut serializer)?;
    Ok(out)
}
