//! Decoder capability and the Slide Metadata Reader.
//!
//! Extraction code never touches a container format directly. It opens a
//! [`SlideDecoder`] through a [`SlideOpener`], asks it for [`SlideMetadata`],
//! and reads RGB regions one focal plane at a time. The bundled
//! [`TiffSlideOpener`](super::TiffSlideOpener) covers tiled TIFF-family files;
//! tests substitute in-memory decoders.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DecodeError;

/// Physical description of a slide, as recorded in job metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlideMetadata {
    /// Physical size of one pixel, when the slide records it
    pub calibration: Option<f64>,

    /// Unit of `calibration` (µm for the bundled decoder)
    pub calibration_unit: Option<String>,

    /// Full-resolution width in pixels
    pub width: u32,

    /// Full-resolution height in pixels
    pub height: u32,

    /// Number of focal planes
    #[serde(rename = "z_plane")]
    pub z_planes: u32,
}

/// An open slide.
///
/// A handle is owned by exactly one fetcher or task and released on drop.
/// Implementations may cache internally; callers never share a handle.
#[async_trait]
pub trait SlideDecoder: Send {
    /// Dimensions, calibration and focal plane count.
    fn metadata(&self) -> Result<SlideMetadata, DecodeError>;

    /// Read a `width` x `height` region at `(x, y)` of focal plane `z`.
    ///
    /// Returns interleaved 8-bit RGB, row-major, `width * height * 3` bytes.
    async fn read_region(
        &mut self,
        z: u32,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, DecodeError>;
}

/// Opens decoder handles for slide files.
///
/// Shared across worker tasks; every call returns an independent handle.
#[async_trait]
pub trait SlideOpener: Send + Sync + 'static {
    type Decoder: SlideDecoder + 'static;

    async fn open(&self, path: &Path) -> Result<Self::Decoder, DecodeError>;
}

/// Read the metadata of the slide at `path`.
///
/// The handle opened for the query is dropped before returning. A slide
/// reporting zero width, height or focal planes is treated as missing that
/// field.
pub async fn read_slide_metadata<O: SlideOpener + ?Sized>(
    opener: &O,
    path: &Path,
) -> Result<SlideMetadata, DecodeError> {
    let metadata = {
        let decoder = opener.open(path).await?;
        decoder.metadata()?
    };

    if metadata.width == 0 {
        return Err(DecodeError::MissingField { field: "width" });
    }
    if metadata.height == 0 {
        return Err(DecodeError::MissingField { field: "height" });
    }
    if metadata.z_planes == 0 {
        return Err(DecodeError::MissingField {
            field: "focal plane count",
        });
    }

    debug!(
        path = %path.display(),
        width = metadata.width,
        height = metadata.height,
        z_planes = metadata.z_planes,
        "Read slide metadata"
    );

    Ok(metadata)
}
