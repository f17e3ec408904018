//! Slide access.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │     Tile Fetcher / Orchestrator         │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │      SlideOpener / SlideDecoder         │
//! │  (metadata + RGB regions per plane)     │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │           TiffSlideDecoder              │
//! │  (tiled TIFF/NDPI, stitched regions)    │
//! └─────────────────────────────────────────┘
//! ```

mod decoder;
mod tiff_slide;

pub use decoder::{read_slide_metadata, SlideDecoder, SlideMetadata, SlideOpener};
pub use tiff_slide::{TiffSlideDecoder, TiffSlideOpener, DEFAULT_SOURCE_TILE_CACHE};
