//! TIFF container parsing.
//!
//! NDPI, SVS and generic pyramidal TIFF slides all share this structure:
//!
//! - **Byte order**: declared in the header (II = little-endian, MM = big-endian).
//! - **Classic TIFF vs BigTIFF**: 32-bit vs 64-bit offsets, handled transparently.
//! - **IFD (Image File Directory)**: one per stored image. Slides hold many:
//!   focal planes, reduced-resolution levels, macro and label images.
//! - **Inline vs offset values**: small values sit in the IFD entry, larger
//!   ones are stored elsewhere in the file.

mod parser;
mod tags;
mod values;

pub use parser::{ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};
pub use tags::{micrometers_per_resolution_unit, Compression, FieldType, TiffTag};
pub use values::{parse_u64_array, ValueReader};
