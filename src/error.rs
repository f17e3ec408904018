use std::path::PathBuf;

use thiserror::Error;

/// I/O errors that can occur when reading byte ranges from a slide file
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Error from the underlying file system
    #[error("File error: {0}")]
    File(String),

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// Slide file not found
    #[error("Slide not found: {0}")]
    NotFound(String),
}

/// Errors that can occur when parsing TIFF-family containers
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),

    /// Invalid BigTIFF offset byte size (must be 8)
    #[error("Invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidBigTiffOffsetSize(u16),

    /// File is too small to contain a valid TIFF header
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Invalid IFD offset (points outside file or to invalid location)
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// Required tag is missing from IFD
    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// Tag has unexpected type or count
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// Unknown field type in IFD entry
    #[error("Unknown field type: {0}")]
    UnknownFieldType(u16),
}

/// Errors raised by a slide decoder.
///
/// Opening or describing a slide with this error is fatal for the job; the
/// same error surfacing from a region read is wrapped in [`TileReadError`].
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// I/O error while reading the slide
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Container structure could not be parsed
    #[error("Container error: {0}")]
    Tiff(#[from] TiffError),

    /// The slide does not expose a required dimension field
    #[error("Slide metadata is missing {field}")]
    MissingField { field: &'static str },

    /// The container parsed but its layout is not supported
    #[error("Unsupported slide layout: {reason}")]
    Unsupported { reason: String },

    /// Requested focal plane does not exist
    #[error("Focal plane {z} out of range (slide has {z_planes})")]
    PlaneOutOfRange { z: u32, z_planes: u32 },

    /// Requested region extends beyond the slide
    #[error("Region {width}x{height} at ({x}, {y}) exceeds slide bounds {slide_width}x{slide_height}")]
    RegionOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        slide_width: u32,
        slide_height: u32,
    },

    /// Compressed tile data could not be decoded
    #[error("Failed to decode source tile: {message}")]
    Codec { message: String },
}

/// Errors for a single tile/plane. Recovered locally by the orchestrator.
#[derive(Debug, Error)]
pub enum TileReadError {
    /// The decoder failed to produce pixels for the region
    #[error("Failed to read tile ({x}, {y}) plane {z}: {source}")]
    Decode {
        x: u32,
        y: u32,
        z: u32,
        #[source]
        source: DecodeError,
    },

    /// The decoder returned a buffer that is not tile_size * tile_size * 3
    #[error("Unexpected buffer size for tile ({x}, {y}) plane {z}: expected {expected} bytes, got {actual}")]
    BufferSize {
        x: u32,
        y: u32,
        z: u32,
        expected: usize,
        actual: usize,
    },

    /// The raster could not be encoded or written to disk
    #[error("Failed to save {path}: {message}")]
    Save { path: PathBuf, message: String },

    /// The worker task running the tile panicked
    #[error("Tile worker for ({x}, {y}) failed: {message}")]
    Worker { x: u32, y: u32, message: String },
}

/// Errors from the job metadata store
#[derive(Debug, Error)]
pub enum MetadataError {
    /// Flush or load attempted before the metadata file was created
    #[error("Metadata file not found: {0}")]
    Missing(PathBuf),

    /// The metadata file exists but does not contain a valid record
    #[error("Corrupt metadata file {path}: {message}")]
    Corrupt { path: PathBuf, message: String },

    /// Reading or writing the metadata file failed
    #[error("Metadata I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from packing or unpacking a job archive
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// File system error while reading or writing
    #[error("Archive I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The zip container is corrupt or could not be written
    #[error("Zip error: {0}")]
    Zip(String),

    /// An archive entry would land outside the extraction root
    #[error("Invalid archive entry: {0}")]
    InvalidEntry(String),

    /// The directory to pack does not exist
    #[error("Nothing to archive: {0} does not exist")]
    MissingDirectory(PathBuf),
}

/// Fatal errors for a whole extraction job
#[derive(Debug, Error)]
pub enum JobError {
    /// Invalid tile specification or job settings
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The slide could not be opened or described
    #[error("Slide decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The job metadata file could not be created or read
    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    /// Packing or unpacking the job archive failed
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Creating the job directory failed
    #[error("Job I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
