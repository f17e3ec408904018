//! Container parsing for slide files.
//!
//! - [`tiff`]: TIFF/BigTIFF header, IFD and tag value parsing
//! - [`layout`]: full-resolution focal planes and calibration of a tiled slide
//! - [`jpeg`]: JPEGTables merging for abbreviated tile streams

pub mod jpeg;
pub mod layout;
pub mod tiff;

pub use jpeg::{has_own_tables, merge_jpeg_tables, prepare_tile_jpeg};
pub use layout::{FocalPlane, SlideLayout};
