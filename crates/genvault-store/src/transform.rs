//! Byte transforms applied to encoded objects on their way to and from the
//! filesystem (compression, and in future encryption).

use std::io::Read;

use crate::error::{StoreError, StoreResult};

/// Largest object a transform will inflate, guarding against
/// decompression bombs. Compression refuses larger inputs so anything written
/// can be read back.
pub const MAX_DECODED_SIZE: u64 = 64 * 1024 * 1024;

/// A reversible byte transform.
///
/// The store applies transforms in order when writing and in reverse order
/// when reading, so `from_store(to_store(x)) == x` must hold for each one.
pub trait Transform: Send + Sync {
    fn name(&self) -> &'static str;

    fn to_store(&self, data: &[u8]) -> StoreResult<Vec<u8>>;

    fn from_store(&self, data: &[u8]) -> StoreResult<Vec<u8>>;
}

/// zstd compression.
#[derive(Debug, Clone, Copy)]
pub struct ZstdTransform {
    level: i32,
}

impl ZstdTransform {
    pub fn new(level: i32) -> Self {
        Self { level }
    }

    fn fail(&self, reason: impl ToString) -> StoreError {
        StoreError::Transform {
            name: self.name(),
            reason: reason.to_string(),
        }
    }
}

impl Default for ZstdTransform {
    fn default() -> Self {
        Self::new(3)
    }
}

impl Transform for ZstdTransform {
    fn name(&self) -> &'static str {
        "zstd"
    }

    fn to_store(&self, data: &[u8]) -> StoreResult<Vec<u8>> {
        if data.len() as u64 > MAX_DECODED_SIZE {
            return Err(self.fail(format!(
                "input of {} bytes exceeds limit of {MAX_DECODED_SIZE} bytes",
                data.len()
            )));
        }
        zstd::bulk::compress(data, self.level).map_err(|e| self.fail(e))
    }

    fn from_store(&self, data: &[u8]) -> StoreResult<Vec<u8>> {
        let decoder = zstd::stream::read::Decoder::new(data).map_err(|e| self.fail(e))?;
        let mut out = Vec::new();
        decoder
            .take(MAX_DECODED_SIZE + 1)
            .read_to_end(&mut out)
            .map_err(|e| self.fail(e))?;
        if out.len() as u64 > MAX_DECODED_SIZE {
            return Err(self.fail(format!(
                "decoded size exceeds limit of {MAX_DECODED_SIZE} bytes"
            )));
        }
        Ok(out)
    }
}
