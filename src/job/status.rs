//! Job Status Reporter.

use std::io;
use std::path::Path;

use serde::Serialize;

use super::metadata::MetadataStore;
use crate::tile::METADATA_FILE_NAME;

/// Header line of the CSV status report
pub const STATUS_CSV_HEADER: &str = "tile dir,tile count,percent complete";

/// Progress of one job directory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatus {
    pub name: String,

    /// `None` when the directory has no readable metadata
    pub total_tile_count: Option<u64>,
    pub percent_complete: Option<f64>,
}

impl JobStatus {
    /// `name,total,percent`, with empty fields for unknown values.
    pub fn csv_row(&self) -> String {
        let total = self
            .total_tile_count
            .map(|t| t.to_string())
            .unwrap_or_default();
        let percent = self
            .percent_complete
            .map(|p| p.to_string())
            .unwrap_or_default();
        format!("{},{},{}", self.name, total, percent)
    }
}

/// Status of every job directory directly under `root`, sorted by name.
pub async fn scan_job_statuses(root: &Path) -> io::Result<Vec<JobStatus>> {
    let mut entries = tokio::fs::read_dir(root).await?;
    let mut statuses = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        let store = MetadataStore::new(entry.path().join(METADATA_FILE_NAME));
        let metadata = store.load().await.ok();
        statuses.push(JobStatus {
            name: entry.file_name().to_string_lossy().into_owned(),
            total_tile_count: metadata.as_ref().map(|m| m.total_tile_count),
            percent_complete: metadata.as_ref().map(|m| m.percent_complete),
        });
    }

    statuses.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(statuses)
}
