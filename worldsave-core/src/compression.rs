/*!
Compression stage for encoded snapshots.

Every encoded save passes through a compression adapter. The default is
[`NoCompression`]; [`GzipCompressor`] trades CPU for smaller save files.
*/

use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use std::io::{Read, Write};

use crate::{Result, SaveError};

/// Compression abstraction for encoded snapshot bytes
pub trait CompressionAdapter {
    /// Compress the input data
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Decompress the input data
    fn decompress(&self, compressed_data: &[u8]) -> Result<Vec<u8>>;

    /// Name recorded in the save header
    fn algorithm_name(&self) -> &str;
}

/// Gzip compression adapter
///
/// # Example
/// ```rust
/// use worldsave_core::compression::{CompressionAdapter, GzipCompressor};
///
/// let compressor = GzipCompressor::new();
/// let data = b"wood stone gold food wood stone gold food";
/// let compressed = compressor.compress(data)?;
/// let decompressed = compressor.decompress(&compressed)?;
/// assert_eq!(data, &decompressed[..]);
/// # Ok::<(), worldsave_core::SaveError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GzipCompressor {
    level: u32,
}

/// First two bytes of every gzip member.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Upper bound on an inflated save, so a hostile file cannot exhaust memory.
pub const MAX_INFLATED_BYTES: u64 = 512 * 1024 * 1024;

impl GzipCompressor {
    /// Gzip at flate2's default level.
    pub fn new() -> Self {
        Self::with_level(Compression::default().level())
    }

    /// Gzip at `level`, clamped to `0..=9`.
    pub fn with_level(level: u32) -> Self {
        Self {
            level: level.min(9),
        }
    }

    pub fn fast() -> Self {
        Self::with_level(Compression::fast().level())
    }

    pub fn max() -> Self {
        Self::with_level(Compression::best().level())
    }

    pub fn level(&self) -> u32 {
        self.level
    }
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl CompressionAdapter for GzipCompressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(
            Vec::with_capacity(data.len() / 4),
            Compression::new(self.level),
        );
        encoder
            .write_all(data)
            .map_err(|e| SaveError::compression(format!("gzip encode failed: {e}")))?;
        encoder
            .finish()
            .map_err(|e| SaveError::compression(format!("gzip encode failed: {e}")))
    }

    fn decompress(&self, compressed_data: &[u8]) -> Result<Vec<u8>> {
        if !compressed_data.starts_with(&GZIP_MAGIC) {
            return Err(SaveError::compression("save body is not gzip data"));
        }

        let mut inflated = Vec::new();
        GzDecoder::new(compressed_data)
            .take(MAX_INFLATED_BYTES + 1)
            .read_to_end(&mut inflated)
            .map_err(|e| SaveError::compression(format!("gzip decode failed: {e}")))?;
        if inflated.len() as u64 > MAX_INFLATED_BYTES {
            return Err(SaveError::compression(format!(
                "inflated save exceeds {MAX_INFLATED_BYTES} bytes"
            )));
        }
        Ok(inflated)
    }

    fn algorithm_name(&self) -> &str {
        "gzip"
    }
}

/// Identity compression stage, the default.
#[derive(Debug, Clone, Default)]
pub struct NoCompression;

impl NoCompression {
    pub fn new() -> Self {
        Self
    }
}

impl CompressionAdapter for NoCompression {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, compressed_data: &[u8]) -> Result<Vec<u8>> {
        Ok(compressed_data.to_vec())
    }

    fn algorithm_name(&self) -> &str {
        "none"
    }
}
