//! TIFF tag and field type definitions.
//!
//! Only the vocabulary needed to locate full-resolution focal planes and
//! their tiles is defined here. Unknown tags are kept in the IFD but never
//! interpreted.

// =============================================================================
// TIFF Field Types
// =============================================================================

/// TIFF field types that determine how values are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum FieldType {
    /// Unsigned 8-bit integer
    Byte = 1,

    /// 8-bit ASCII character
    Ascii = 2,

    /// Unsigned 16-bit integer
    Short = 3,

    /// Unsigned 32-bit integer
    Long = 4,

    /// Two Longs: numerator then denominator
    Rational = 5,

    /// Undefined byte data
    Undefined = 7,

    /// Signed 32-bit integer (NDPI z-offsets use this)
    SLong = 9,

    /// Unsigned 64-bit integer, BigTIFF only
    Long8 = 16,
}

impl FieldType {
    /// Size of a single value of this type in bytes.
    #[inline]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            FieldType::Byte | FieldType::Ascii | FieldType::Undefined => 1,
            FieldType::Short => 2,
            FieldType::Long | FieldType::SLong => 4,
            FieldType::Rational | FieldType::Long8 => 8,
        }
    }

    /// Create a FieldType from its numeric value.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(FieldType::Byte),
            2 => Some(FieldType::Ascii),
            3 => Some(FieldType::Short),
            4 => Some(FieldType::Long),
            5 => Some(FieldType::Rational),
            7 => Some(FieldType::Undefined),
            9 => Some(FieldType::SLong),
            16 => Some(FieldType::Long8),
            _ => None,
        }
    }

    /// Check if `count` values of this type fit in the entry's value field
    /// (4 bytes classic, 8 bytes BigTIFF).
    #[inline]
    pub fn fits_inline(self, count: u64, is_bigtiff: bool) -> bool {
        let threshold = if is_bigtiff { 8 } else { 4 };
        (self.size_in_bytes() as u64).saturating_mul(count) <= threshold
    }
}

// =============================================================================
// TIFF Tags
// =============================================================================

/// TIFF tag IDs used when reading slides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum TiffTag {
    ImageWidth = 256,
    ImageLength = 257,
    BitsPerSample = 258,
    Compression = 259,
    SamplesPerPixel = 277,

    /// Presence without tile tags means the image is strip-organized
    StripOffsets = 273,

    /// Pixels per unit in X direction
    XResolution = 282,

    /// Unit of resolution (1=none, 2=inch, 3=centimeter)
    ResolutionUnit = 296,

    TileWidth = 322,
    TileLength = 323,
    TileOffsets = 324,
    TileByteCounts = 325,

    /// Shared quantization and Huffman tables for abbreviated JPEG tiles
    JpegTables = 347,

    /// Hamamatsu private tag: focal plane offset from the slide center, in nm
    NdpiZOffset = 65121,
}

impl TiffTag {
    /// Get the numeric tag ID.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }
}

// =============================================================================
// Compression and resolution values
// =============================================================================

/// Compression schemes the bundled decoder can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Compression {
    /// Raw interleaved 8-bit samples
    None = 1,

    /// JPEG ("new-style", TIFF 6.0 technote 2)
    Jpeg = 7,
}

impl Compression {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Compression::None),
            7 => Some(Compression::Jpeg),
            _ => None,
        }
    }
}

/// Micrometers per ResolutionUnit, or `None` when the unit carries no
/// physical meaning.
pub fn micrometers_per_resolution_unit(unit: u32) -> Option<f64> {
    match unit {
        2 => Some(25_400.0),
        3 => Some(10_000.0),
        _ => None,
    }
}
