//! Extraction jobs.
//!
//! - [`Extractor`]: runs one slide from metadata to finished tiles
//! - [`MetadataStore`]: the job's `metadata.json`
//! - [`archive`]: packs a finished job into a zip and restores it
//! - [`run_batch`]: every slide in a directory
//! - [`scan_job_statuses`]: progress of existing job directories
//! - [`inspect_slide`]: metadata and planned grid of a slide

pub mod archive;
mod batch;
mod inspect;
mod metadata;
mod orchestrator;
mod progress;
mod shutdown;
mod state;
mod status;

pub use batch::{
    default_batch_output, list_slides, run_batch, BatchConfig, BatchReport, SlideFailure,
    DEFAULT_CONCURRENT_SLIDES, SLIDE_EXTENSION,
};
pub use inspect::{inspect_slide, SlideInspection};
pub use metadata::{percent_complete, JobMetadata, MetadataStore};
pub use orchestrator::{default_output_root, Extractor, JobConfig, JobSummary};
pub use shutdown::{cancel_on_shutdown, shutdown_signal};
pub use state::JobState;
pub use status::{scan_job_statuses, JobStatus, STATUS_CSV_HEADER};
