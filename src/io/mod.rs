//! Byte-range access to slide files.
//!
//! Container parsers never read a slide file directly; they go through
//! [`RangeReader`], which keeps parsing code independent of where the bytes
//! live and lets tests substitute in-memory readers.

mod file_reader;
mod range_reader;

pub use file_reader::LocalFileReader;
pub use range_reader::{
    read_u16_be, read_u16_le, read_u32_be, read_u32_le, read_u64_be, read_u64_le, RangeReader,
};
