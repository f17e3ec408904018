//! TIFF tag value reading.
//!
//! Small values live inline in the IFD entry; larger ones (tile offset
//! tables, JPEGTables, rationals in classic TIFF) are fetched from the file
//! in a single range read.

use bytes::Bytes;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{ByteOrder, IfdEntry, TiffHeader};
use super::tags::FieldType;

/// Reads tag values from a TIFF file, respecting its byte order and format.
pub struct ValueReader<'a, R: RangeReader + ?Sized> {
    reader: &'a R,
    header: &'a TiffHeader,
}

impl<'a, R: RangeReader + ?Sized> ValueReader<'a, R> {
    pub fn new(reader: &'a R, header: &'a TiffHeader) -> Self {
        Self { reader, header }
    }

    /// Read raw bytes for an entry's value, inline or at its offset.
    pub async fn read_bytes(&self, entry: &IfdEntry) -> Result<Bytes, TiffError> {
        let size = entry
            .value_byte_size()
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if entry.is_inline {
            Ok(Bytes::copy_from_slice(
                &entry.value_offset_bytes[..size as usize],
            ))
        } else {
            let offset = entry.value_offset(self.header.byte_order);
            Ok(self.reader.read_exact_at(offset, size as usize).await?)
        }
    }

    /// Read a single unsigned value (Short or Long).
    pub fn read_u32(&self, entry: &IfdEntry, tag: &'static str) -> Result<u32, TiffError> {
        if let Some(value) = entry.inline_u32(self.header.byte_order) {
            return Ok(value);
        }
        Err(TiffError::InvalidTagValue {
            tag,
            message: format!(
                "expected a single Short or Long, got {:?} x{}",
                entry.field_type, entry.count
            ),
        })
    }

    /// Read a single signed value (SLong, or Short for lenient writers).
    pub fn read_i32(&self, entry: &IfdEntry, tag: &'static str) -> Result<i32, TiffError> {
        if let Some(value) = entry.inline_i32(self.header.byte_order) {
            return Ok(value);
        }
        Err(TiffError::InvalidTagValue {
            tag,
            message: format!("expected a single SLong, got {:?}", entry.field_type),
        })
    }

    /// Read a single Rational as a float.
    pub async fn read_rational(
        &self,
        entry: &IfdEntry,
        tag: &'static str,
    ) -> Result<f64, TiffError> {
        if entry.field_type != Some(FieldType::Rational) || entry.count != 1 {
            return Err(TiffError::InvalidTagValue {
                tag,
                message: format!("expected a single Rational, got {:?}", entry.field_type),
            });
        }

        let bytes = self.read_bytes(entry).await?;
        let order = self.header.byte_order;
        let numerator = order.read_u32(&bytes[0..4]);
        let denominator = order.read_u32(&bytes[4..8]);
        if denominator == 0 {
            return Err(TiffError::InvalidTagValue {
                tag,
                message: "zero denominator".to_string(),
            });
        }

        Ok(numerator as f64 / denominator as f64)
    }

    /// Read an array of offsets or byte counts, widening every value to u64.
    ///
    /// The whole array comes from one range read.
    pub async fn read_u64_array(
        &self,
        entry: &IfdEntry,
        tag: &'static str,
    ) -> Result<Vec<u64>, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if !matches!(
            field_type,
            FieldType::Short | FieldType::Long | FieldType::Long8
        ) {
            return Err(TiffError::InvalidTagValue {
                tag,
                message: format!("expected Short, Long, or Long8 array, got {:?}", field_type),
            });
        }
        if entry.count == 0 {
            return Ok(Vec::new());
        }

        let bytes = self.read_bytes(entry).await?;
        Ok(parse_u64_array(
            &bytes,
            entry.count as usize,
            field_type,
            self.header.byte_order,
        ))
    }
}

/// Parse an array of unsigned values from raw bytes, widening to u64.
///
/// Values that would run past the end of `bytes` are dropped.
pub fn parse_u64_array(
    bytes: &[u8],
    count: usize,
    field_type: FieldType,
    byte_order: ByteOrder,
) -> Vec<u64> {
    let width = field_type.size_in_bytes();
    bytes
        .chunks_exact(width)
        .take(count)
        .filter_map(|chunk| match field_type {
            FieldType::Short => Some(byte_order.read_u16(chunk) as u64),
            FieldType::Long => Some(byte_order.read_u32(chunk) as u64),
            FieldType::Long8 => Some(byte_order.read_u64(chunk)),
            _ => None,
        })
        .collect()
}
