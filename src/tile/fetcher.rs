//! Tile Fetcher: one origin, one focal plane, one raster.

use std::path::{Path, PathBuf};

use image::RgbImage;
use tracing::debug;

use super::grid::{TileFormat, TileOrigin};
use crate::error::TileReadError;
use crate::slide::SlideDecoder;

/// Reads tile rasters through an owned decoder handle.
///
/// The handle is released when the fetcher is dropped. No pixels are cached
/// here; any caching belongs to the decoder.
pub struct TileFetcher<D: SlideDecoder> {
    decoder: D,
}

impl<D: SlideDecoder> TileFetcher<D> {
    pub fn new(decoder: D) -> Self {
        Self { decoder }
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    /// Read the `tile_size` square at `origin` on plane `z` as an RGB raster.
    pub async fn fetch(
        &mut self,
        origin: TileOrigin,
        z: u32,
        tile_size: u32,
    ) -> Result<RgbImage, TileReadError> {
        let TileOrigin { x, y } = origin;
        let buffer = self
            .decoder
            .read_region(z, x, y, tile_size, tile_size)
            .await
            .map_err(|source| TileReadError::Decode { x, y, z, source })?;

        let expected = tile_size as usize * tile_size as usize * 3;
        let actual = buffer.len();
        if actual != expected {
            return Err(TileReadError::BufferSize {
                x,
                y,
                z,
                expected,
                actual,
            });
        }

        RgbImage::from_raw(tile_size, tile_size, buffer).ok_or(TileReadError::BufferSize {
            x,
            y,
            z,
            expected,
            actual,
        })
    }
}

/// Encode `raster` and write it to `path`.
///
/// The file is written as `<path>.part` and renamed into place, so a
/// finished artifact is never observed half-written. Encoding runs on the
/// blocking pool.
pub async fn save_raster(
    raster: RgbImage,
    path: PathBuf,
    format: TileFormat,
) -> Result<(), TileReadError> {
    let target = path.clone();
    tokio::task::spawn_blocking(move || write_atomically(&raster, &target, format))
        .await
        .map_err(|e| TileReadError::Save {
            path: path.clone(),
            message: e.to_string(),
        })?
        .map_err(|message| TileReadError::Save {
            path: path.clone(),
            message,
        })?;

    debug!(path = %path.display(), "Saved tile plane");
    Ok(())
}

fn write_atomically(raster: &RgbImage, path: &Path, format: TileFormat) -> Result<(), String> {
    let mut partial = path.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);

    let written = raster
        .save_with_format(&partial, format.image_format())
        .map_err(|e| e.to_string())
        .and_then(|()| std::fs::rename(&partial, path).map_err(|e| e.to_string()));

    if written.is_err() {
        let _ = std::fs::remove_file(&partial);
    }
    written
}
