//! Full-resolution layout of a tiled slide.
//!
//! A whole slide file stores many images: focal planes at full resolution,
//! reduced-resolution copies, a macro overview and a label. Tile extraction
//! only needs the full-resolution focal planes, so this module walks the IFD
//! chain and keeps every tiled IFD whose dimensions match the largest image.
//!
//! Hamamatsu NDPI files tag each focal plane with its distance from the
//! slide center (tag 65121); when every plane carries that tag, planes are
//! ordered by it. Otherwise planes keep their IFD order.

use bytes::Bytes;
use tracing::debug;

use crate::error::{DecodeError, TiffError};
use crate::io::RangeReader;

use super::tiff::{
    micrometers_per_resolution_unit, Compression, Ifd, TiffHeader, TiffTag, ValueReader,
    BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE,
};

/// Upper bound on IFDs walked per file
const MAX_IFDS: usize = 256;

/// TIFF default ResolutionUnit (inch) when the tag is absent
const DEFAULT_RESOLUTION_UNIT: u32 = 2;

/// One full-resolution focal plane and the location of its tiles.
#[derive(Debug, Clone)]
pub struct FocalPlane {
    /// Position of this image in the file's IFD chain
    pub ifd_index: usize,

    /// Distance from the slide's central focal plane, when recorded
    pub z_offset: Option<i32>,

    pub tile_width: u32,
    pub tile_height: u32,

    /// Number of tiles in X direction
    pub tiles_across: u32,

    /// Number of tiles in Y direction
    pub tiles_down: u32,

    pub compression: Compression,

    /// File offset of each tile, row-major
    pub tile_offsets: Vec<u64>,

    /// Compressed size of each tile, row-major
    pub tile_byte_counts: Vec<u64>,

    /// Shared JPEG tables for abbreviated tile streams
    pub jpeg_tables: Option<Bytes>,
}

impl FocalPlane {
    /// File location `(offset, length)` of the tile at grid position `(col, row)`.
    pub fn tile_location(&self, col: u32, row: u32) -> Option<(u64, u64)> {
        if col >= self.tiles_across || row >= self.tiles_down {
            return None;
        }
        let index = (row as usize) * (self.tiles_across as usize) + col as usize;
        Some((*self.tile_offsets.get(index)?, *self.tile_byte_counts.get(index)?))
    }
}

/// Full-resolution structure of a slide.
#[derive(Debug, Clone)]
pub struct SlideLayout {
    pub header: TiffHeader,
    pub width: u32,
    pub height: u32,

    /// Micrometers per pixel along X, when the file records a physical resolution
    pub microns_per_pixel: Option<f64>,

    /// Focal planes in z order
    pub planes: Vec<FocalPlane>,
}

impl SlideLayout {
    /// Parse the header and IFD chain and locate the full-resolution planes.
    pub async fn parse<R: RangeReader + ?Sized>(reader: &R) -> Result<Self, DecodeError> {
        let header_len = BIGTIFF_HEADER_SIZE.min(reader.size() as usize);
        if header_len < TIFF_HEADER_SIZE {
            return Err(TiffError::FileTooSmall {
                required: TIFF_HEADER_SIZE as u64,
                actual: reader.size(),
            }
            .into());
        }
        let header_bytes = reader.read_exact_at(0, header_len).await?;
        let header = TiffHeader::parse(&header_bytes, reader.size())?;

        let ifds = read_ifd_chain(reader, &header).await?;
        let order = header.byte_order;

        let dimensions: Vec<Option<(u32, u32)>> = ifds
            .iter()
            .map(|ifd| {
                Some((
                    ifd.inline_u32(TiffTag::ImageWidth, order)?,
                    ifd.inline_u32(TiffTag::ImageLength, order)?,
                ))
            })
            .collect();

        let (width, height) = dimensions
            .iter()
            .flatten()
            .copied()
            .filter(|(w, h)| *w > 0 && *h > 0)
            .max_by_key(|(w, h)| (*w as u64) * (*h as u64))
            .ok_or(DecodeError::MissingField {
                field: "image dimensions",
            })?;

        let values = ValueReader::new(reader, &header);
        let mut planes = Vec::new();
        let mut calibration_ifd = None;

        for (ifd_index, ifd) in ifds.iter().enumerate() {
            if dimensions[ifd_index] != Some((width, height)) {
                continue;
            }
            calibration_ifd.get_or_insert(ifd_index);
            planes.push(read_plane(&values, ifd, ifd_index, width, height).await?);
        }

        if !planes.is_empty() && planes.iter().all(|p| p.z_offset.is_some()) {
            planes.sort_by_key(|p| p.z_offset);
        }

        let microns_per_pixel = match calibration_ifd {
            Some(index) => read_calibration(&values, &ifds[index]).await,
            None => None,
        };

        debug!(
            source = reader.identifier(),
            width,
            height,
            planes = planes.len(),
            "Parsed slide layout"
        );

        Ok(SlideLayout {
            header,
            width,
            height,
            microns_per_pixel,
            planes,
        })
    }
}

async fn read_ifd_chain<R: RangeReader + ?Sized>(
    reader: &R,
    header: &TiffHeader,
) -> Result<Vec<Ifd>, TiffError> {
    let mut ifds = Vec::new();
    let mut offset = header.first_ifd_offset;

    while offset != 0 && ifds.len() < MAX_IFDS {
        if offset >= reader.size() {
            return Err(TiffError::InvalidIfdOffset(offset));
        }

        let count_bytes = reader
            .read_exact_at(offset, header.ifd_count_size())
            .await?;
        let entry_count = if header.is_bigtiff {
            header.byte_order.read_u64(&count_bytes)
        } else {
            header.byte_order.read_u16(&count_bytes) as u64
        };

        let ifd_size = Ifd::calculate_size(entry_count, header);
        let ifd_bytes = reader.read_exact_at(offset, ifd_size).await?;
        let ifd = Ifd::parse(&ifd_bytes, header)?;

        // a chain pointing backwards would loop forever
        let next = ifd.next_ifd_offset;
        ifds.push(ifd);
        if next != 0 && next <= offset {
            break;
        }
        offset = next;
    }

    Ok(ifds)
}

async fn read_plane<R: RangeReader + ?Sized>(
    values: &ValueReader<'_, R>,
    ifd: &Ifd,
    ifd_index: usize,
    width: u32,
    height: u32,
) -> Result<FocalPlane, DecodeError> {
    let (Some(tile_width_entry), Some(tile_height_entry)) =
        (ifd.get(TiffTag::TileWidth), ifd.get(TiffTag::TileLength))
    else {
        let reason = if ifd.get(TiffTag::StripOffsets).is_some() {
            format!("IFD {} is strip-organized; only tiled images are supported", ifd_index)
        } else {
            format!("IFD {} has no tile structure", ifd_index)
        };
        return Err(DecodeError::Unsupported { reason });
    };

    let tile_width = values.read_u32(tile_width_entry, "TileWidth")?;
    let tile_height = values.read_u32(tile_height_entry, "TileLength")?;
    if tile_width == 0 || tile_height == 0 {
        return Err(TiffError::InvalidTagValue {
            tag: "TileWidth",
            message: "zero tile dimension".to_string(),
        }
        .into());
    }

    let compression_raw = match ifd.get(TiffTag::Compression) {
        Some(entry) => values.read_u32(entry, "Compression")?,
        None => 1,
    };
    let compression = u16::try_from(compression_raw)
        .ok()
        .and_then(Compression::from_u16)
        .ok_or_else(|| DecodeError::Unsupported {
            reason: format!("compression {} in IFD {}", compression_raw, ifd_index),
        })?;

    if let Some(entry) = ifd.get(TiffTag::SamplesPerPixel) {
        let samples = values.read_u32(entry, "SamplesPerPixel")?;
        if samples != 3 {
            return Err(DecodeError::Unsupported {
                reason: format!("{} samples per pixel in IFD {}", samples, ifd_index),
            });
        }
    }

    if let Some(entry) = ifd.get(TiffTag::BitsPerSample) {
        let bits = values.read_u64_array(entry, "BitsPerSample").await?;
        if bits.iter().any(|&b| b != 8) {
            return Err(DecodeError::Unsupported {
                reason: format!("{:?} bits per sample in IFD {}", bits, ifd_index),
            });
        }
    }

    let tile_offsets = values
        .read_u64_array(
            ifd.get(TiffTag::TileOffsets)
                .ok_or(TiffError::MissingTag("TileOffsets"))?,
            "TileOffsets",
        )
        .await?;
    let tile_byte_counts = values
        .read_u64_array(
            ifd.get(TiffTag::TileByteCounts)
                .ok_or(TiffError::MissingTag("TileByteCounts"))?,
            "TileByteCounts",
        )
        .await?;

    let tiles_across = width.div_ceil(tile_width);
    let tiles_down = height.div_ceil(tile_height);
    let expected = tiles_across as usize * tiles_down as usize;
    if tile_offsets.len() != expected || tile_byte_counts.len() != expected {
        return Err(TiffError::InvalidTagValue {
            tag: "TileOffsets",
            message: format!(
                "expected {} tiles, found {} offsets and {} byte counts",
                expected,
                tile_offsets.len(),
                tile_byte_counts.len()
            ),
        }
        .into());
    }

    let jpeg_tables = match ifd.get(TiffTag::JpegTables) {
        Some(entry) => Some(values.read_bytes(entry).await?),
        None => None,
    };

    let z_offset = match ifd.get(TiffTag::NdpiZOffset) {
        Some(entry) => Some(values.read_i32(entry, "NdpiZOffset")?),
        None => None,
    };

    Ok(FocalPlane {
        ifd_index,
        z_offset,
        tile_width,
        tile_height,
        tiles_across,
        tiles_down,
        compression,
        tile_offsets,
        tile_byte_counts,
        jpeg_tables,
    })
}

/// Physical pixel size along X in micrometers. Calibration is optional
/// metadata, so unreadable tags yield `None` rather than an error.
async fn read_calibration<R: RangeReader + ?Sized>(
    values: &ValueReader<'_, R>,
    ifd: &Ifd,
) -> Option<f64> {
    let resolution = values
        .read_rational(ifd.get(TiffTag::XResolution)?, "XResolution")
        .await
        .ok()?;
    let unit = match ifd.get(TiffTag::ResolutionUnit) {
        Some(entry) => values.read_u32(entry, "ResolutionUnit").ok()?,
        None => DEFAULT_RESOLUTION_UNIT,
    };

    if resolution <= 0.0 {
        return None;
    }
    micrometers_per_resolution_unit(unit).map(|um| um / resolution)
}
