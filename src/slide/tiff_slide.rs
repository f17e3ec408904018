//! Slide decoder for tiled TIFF-family files (NDPI, BigTIFF, pyramidal TIFF).

use std::io::Cursor;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use image::{ImageFormat, ImageReader, RgbImage};
use lru::LruCache;
use tracing::trace;

use super::decoder::{SlideDecoder, SlideMetadata, SlideOpener};
use crate::error::DecodeError;
use crate::format::tiff::Compression;
use crate::format::{prepare_tile_jpeg, FocalPlane, SlideLayout};
use crate::io::{LocalFileReader, RangeReader};

/// Default number of decoded source tiles kept per handle
pub const DEFAULT_SOURCE_TILE_CACHE: usize = 64;

const CALIBRATION_UNIT: &str = "µm";

/// Opens [`TiffSlideDecoder`] handles over local files.
#[derive(Debug, Clone)]
pub struct TiffSlideOpener {
    source_tile_cache: NonZeroUsize,
}

impl TiffSlideOpener {
    pub fn new() -> Self {
        Self::with_cache_capacity(DEFAULT_SOURCE_TILE_CACHE)
    }

    /// Keep up to `capacity` decoded source tiles per handle (minimum 1).
    pub fn with_cache_capacity(capacity: usize) -> Self {
        Self {
            source_tile_cache: NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

impl Default for TiffSlideOpener {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SlideOpener for TiffSlideOpener {
    type Decoder = TiffSlideDecoder<LocalFileReader>;

    async fn open(&self, path: &Path) -> Result<Self::Decoder, DecodeError> {
        let reader = LocalFileReader::open(path).await?;
        TiffSlideDecoder::new(reader, self.source_tile_cache).await
    }
}

/// Key of a decoded source tile: (plane, column, row)
type SourceTileKey = (usize, u32, u32);

/// An open tiled TIFF slide.
///
/// Regions are stitched from the source tiles that cover them. Neighbouring
/// output tiles usually share source tiles, so decoded tiles are kept in a
/// small LRU cache owned by the handle.
pub struct TiffSlideDecoder<R: RangeReader> {
    reader: R,
    layout: SlideLayout,
    tiles: LruCache<SourceTileKey, Arc<RgbImage>>,
}

impl<R: RangeReader> TiffSlideDecoder<R> {
    /// Parse the slide structure behind `reader`.
    pub async fn new(reader: R, cache_capacity: NonZeroUsize) -> Result<Self, DecodeError> {
        let layout = SlideLayout::parse(&reader).await?;
        if layout.planes.is_empty() {
            return Err(DecodeError::Unsupported {
                reason: format!("{} has no tiled full-resolution image", reader.identifier()),
            });
        }

        Ok(Self {
            reader,
            layout,
            tiles: LruCache::new(cache_capacity),
        })
    }

    pub fn layout(&self) -> &SlideLayout {
        &self.layout
    }

    async fn source_tile(
        &mut self,
        plane_index: usize,
        col: u32,
        row: u32,
    ) -> Result<Arc<RgbImage>, DecodeError> {
        let key = (plane_index, col, row);
        if let Some(tile) = self.tiles.get(&key) {
            return Ok(Arc::clone(tile));
        }

        let plane = &self.layout.planes[plane_index];
        let (offset, length) =
            plane
                .tile_location(col, row)
                .ok_or_else(|| DecodeError::Unsupported {
                    reason: format!("missing source tile ({}, {})", col, row),
                })?;
        let length = usize::try_from(length).map_err(|_| DecodeError::Codec {
            message: format!("source tile ({}, {}) is too large", col, row),
        })?;

        trace!(plane = plane_index, col, row, offset, length, "Decoding source tile");
        let data = self.reader.read_exact_at(offset, length).await?;
        let tile = Arc::new(decode_source_tile(plane, &data)?);

        self.tiles.put(key, Arc::clone(&tile));
        Ok(tile)
    }
}

fn decode_source_tile(plane: &FocalPlane, data: &[u8]) -> Result<RgbImage, DecodeError> {
    let (width, height) = (plane.tile_width, plane.tile_height);

    let image = match plane.compression {
        Compression::None => RgbImage::from_raw(width, height, data.to_vec()).ok_or_else(|| {
            DecodeError::Codec {
                message: format!(
                    "raw tile holds {} bytes, expected {}",
                    data.len(),
                    width as usize * height as usize * 3
                ),
            }
        })?,
        Compression::Jpeg => {
            let stream = prepare_tile_jpeg(plane.jpeg_tables.as_deref(), data);
            ImageReader::with_format(Cursor::new(stream.as_ref()), ImageFormat::Jpeg)
                .decode()
                .map_err(|e| DecodeError::Codec {
                    message: e.to_string(),
                })?
                .to_rgb8()
        }
    };

    if image.width() < width || image.height() < height {
        return Err(DecodeError::Codec {
            message: format!(
                "decoded tile is {}x{}, expected {}x{}",
                image.width(),
                image.height(),
                width,
                height
            ),
        });
    }

    Ok(image)
}

#[async_trait]
impl<R: RangeReader + 'static> SlideDecoder for TiffSlideDecoder<R> {
    fn metadata(&self) -> Result<SlideMetadata, DecodeError> {
        let calibration = self.layout.microns_per_pixel;
        Ok(SlideMetadata {
            calibration,
            calibration_unit: calibration.map(|_| CALIBRATION_UNIT.to_string()),
            width: self.layout.width,
            height: self.layout.height,
            z_planes: self.layout.planes.len() as u32,
        })
    }

    async fn read_region(
        &mut self,
        z: u32,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, DecodeError> {
        let z_planes = self.layout.planes.len() as u32;
        if z >= z_planes {
            return Err(DecodeError::PlaneOutOfRange { z, z_planes });
        }

        let (slide_width, slide_height) = (self.layout.width, self.layout.height);
        if x as u64 + width as u64 > slide_width as u64
            || y as u64 + height as u64 > slide_height as u64
        {
            return Err(DecodeError::RegionOutOfBounds {
                x,
                y,
                width,
                height,
                slide_width,
                slide_height,
            });
        }

        let mut out = vec![0u8; width as usize * height as usize * 3];
        if width == 0 || height == 0 {
            return Ok(out);
        }

        let plane_index = z as usize;
        let (tile_width, tile_height) = {
            let plane = &self.layout.planes[plane_index];
            (plane.tile_width, plane.tile_height)
        };

        let region_right = x + width;
        let region_bottom = y + height;
        let row_stride = width as usize * 3;

        for row in y / tile_height..=(region_bottom - 1) / tile_height {
            for col in x / tile_width..=(region_right - 1) / tile_width {
                let tile = self.source_tile(plane_index, col, row).await?;

                let tile_left = col * tile_width;
                let tile_top = row * tile_height;
                let left = x.max(tile_left);
                let right = region_right.min(tile_left + tile_width);
                let top = y.max(tile_top);
                let bottom = region_bottom.min(tile_top + tile_height);
                let span = (right - left) as usize * 3;

                let source = tile.as_raw();
                let source_stride = tile.width() as usize * 3;
                for py in top..bottom {
                    let src = (py - tile_top) as usize * source_stride
                        + (left - tile_left) as usize * 3;
                    let dst = (py - y) as usize * row_stride + (left - x) as usize * 3;
                    out[dst..dst + span].copy_from_slice(&source[src..src + span]);
                }
            }
        }

        Ok(out)
    }
}
