//! Payload splicing shared by every backend
//!
//! All media implement `append_at` the same way: keep `payload[..offset]`,
//! append the new bytes, drop the old tail. Truncation therefore reclaims
//! the discarded bytes immediately.

use tracestore_core::{Error, Result, CHUNK_SIZE};

/// Reject full overwrites larger than a chunk
#[inline]
pub fn check_capacity(len: usize) -> Result<()> {
    if len > CHUNK_SIZE {
        return Err(Error::PayloadTooLarge {
            len,
            capacity: CHUNK_SIZE,
        });
    }
    Ok(())
}

/// Splice `data` into `payload` at `offset`, returning the new length
///
/// `payload` is left untouched on error.
pub fn splice(payload: &mut Vec<u8>, data: &[u8], offset: usize) -> Result<usize> {
    if offset > payload.len() {
        return Err(Error::InvalidOffset {
            offset,
            size: payload.len(),
        });
    }
    check_capacity(offset + data.len())?;

    payload.truncate(offset);
    payload.extend_from_slice(data);
    Ok(payload.len())
}
