//! CRC32 integrity codes for chunk payloads
//!
//! A checksum is stored with a chunk when it moves to a durable backend and is
//! used to verify the copy made during migration.

/// CRC32 (IEEE) of `data`
///
/// ```
/// use tracestore_core::checksum::crc32;
///
/// assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
/// ```
#[inline]
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}
