//! In-memory job progress, flushed to the metadata store after every tile.

use tracing::{info, warn};

use super::metadata::{percent_complete, JobMetadata, MetadataStore};
use crate::error::TileReadError;
use crate::tile::TileOrigin;

/// Result of one tile, reported back to the orchestrator.
#[derive(Debug)]
pub(crate) enum TileOutcome {
    /// Every focal plane was written
    Written { origin: TileOrigin, planes: u32 },
    /// The tile already had all its planes on disk
    Skipped { origin: TileOrigin },
    /// A plane could not be read or saved
    Failed {
        origin: TileOrigin,
        error: TileReadError,
    },
}

/// Counters for one run plus the store they are flushed to.
///
/// Flush failures are logged and never propagated. If the value is dropped
/// before [`finish`](Self::finish), the drop performs a final blocking flush.
pub(crate) struct Progress {
    slide: String,
    store: MetadataStore,
    total: u64,
    processed: u64,
    written: u64,
    skipped: u64,
    failed: Vec<TileOrigin>,
    finished: bool,
}

impl Progress {
    pub fn new(slide: impl Into<String>, store: MetadataStore, total: u64) -> Self {
        Self {
            slide: slide.into(),
            store,
            total,
            processed: 0,
            written: 0,
            skipped: 0,
            failed: Vec::new(),
            finished: false,
        }
    }

    /// Count `outcome` as processed and flush.
    pub async fn record(&mut self, outcome: TileOutcome) {
        self.processed += 1;
        match outcome {
            TileOutcome::Written { origin, planes } => {
                self.written += 1;
                info!(
                    slide = %self.slide,
                    tile = %origin,
                    planes,
                    processed = self.processed,
                    total = self.total,
                    "Tile complete"
                );
            }
            TileOutcome::Skipped { origin } => {
                self.skipped += 1;
                info!(slide = %self.slide, tile = %origin, "Tile already complete; skipping");
            }
            TileOutcome::Failed { origin, error } => {
                warn!(slide = %self.slide, tile = %origin, error = %error, "Tile failed");
                self.failed.push(origin);
            }
        }
        self.flush().await;
    }

    async fn flush(&self) -> Option<JobMetadata> {
        match self.store.flush(self.processed).await {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                warn!(slide = %self.slide, error = %e, "Failed to flush job metadata");
                None
            }
        }
    }

    /// Final flush. Returns the percentage recorded on disk when the flush
    /// succeeds, otherwise the in-memory percentage.
    pub async fn finish(&mut self) -> f64 {
        self.finished = true;
        match self.flush().await {
            Some(metadata) => metadata.percent_complete,
            None => percent_complete(self.processed.min(self.total), self.total),
        }
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn take_failed(&mut self) -> Vec<TileOrigin> {
        std::mem::take(&mut self.failed)
    }
}

impl Drop for Progress {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.store.flush_blocking(self.processed) {
            warn!(slide = %self.slide, error = %e, "Failed to flush job metadata on exit");
        }
    }
}
