/*!
Snapshot codec.

Converts a [`Snapshot`] to bytes and back. The snapshot is wrapped in an
envelope together with a [`SaveHeader`], rendered as pretty JSON, compressed
and then encrypted. Decoding runs the stages in reverse, checks the format
version and verifies the content hash. Any failure is reported as corruption;
the codec never attempts partial recovery.
*/

use serde::{Deserialize, Serialize};

use crate::{
    compression::{CompressionAdapter, NoCompression},
    encryption::{EncryptionAdapter, NoEncryption},
    metadata::{SaveHeader, SaveMetadata, SAVE_FORMAT_VERSION},
    model::Snapshot,
    Result, SaveError,
};

#[derive(Serialize)]
struct SaveFileRef<'a> {
    header: SaveHeader,
    snapshot: &'a Snapshot,
}

#[derive(Deserialize)]
struct SaveFile {
    header: SaveHeader,
    snapshot: Snapshot,
}

// Only the metadata block of the body is materialized; serde skips the rest.
#[derive(Deserialize)]
struct SummaryFile {
    header: SaveHeader,
    snapshot: MetadataOnly,
}

#[derive(Deserialize)]
struct MetadataOnly {
    metadata: SaveMetadata,
}

/// Header and metadata of a save, decoded without the entity lists.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotSummary {
    pub header: SaveHeader,
    pub metadata: SaveMetadata,
}

/// Encoder/decoder for snapshot files
///
/// # Example
/// ```rust
/// use worldsave_core::{codec::SnapshotCodec, compression::GzipCompressor};
///
/// let plain = SnapshotCodec::new();
/// let packed = SnapshotCodec::with_compressor(GzipCompressor::new());
/// assert_eq!(plain.compression_name(), "none");
/// assert_eq!(packed.compression_name(), "gzip");
/// ```
pub struct SnapshotCodec {
    compressor: Box<dyn CompressionAdapter>,
    encryptor: Box<dyn EncryptionAdapter>,
}

impl SnapshotCodec {
    /// Codec with identity compression and encryption stages
    pub fn new() -> Self {
        Self::with_stages(NoCompression::new(), NoEncryption::new())
    }

    pub fn with_compressor<C>(compressor: C) -> Self
    where
        C: CompressionAdapter + 'static,
    {
        Self::with_stages(compressor, NoEncryption::new())
    }

    pub fn with_stages<C, E>(compressor: C, encryptor: E) -> Self
    where
        C: CompressionAdapter + 'static,
        E: EncryptionAdapter + 'static,
    {
        Self {
            compressor: Box::new(compressor),
            encryptor: Box::new(encryptor),
        }
    }

    pub fn compression_name(&self) -> &str {
        self.compressor.algorithm_name()
    }

    pub fn encryption_name(&self) -> &str {
        self.encryptor.scheme_name()
    }

    /// Encode a snapshot into the bytes written to the store
    pub fn encode(&self, snapshot: &Snapshot) -> Result<Vec<u8>> {
        let body = serde_json::to_vec(snapshot)?;
        let header = SaveHeader::for_body(
            &body,
            self.compressor.algorithm_name(),
            self.encryptor.scheme_name(),
        );

        let file = serde_json::to_vec_pretty(&SaveFileRef { header, snapshot })?;
        let compressed = self.compressor.compress(&file)?;
        self.encryptor.encrypt(&compressed)
    }

    /// Decode and verify a full snapshot
    ///
    /// # Errors
    /// * `SaveError::CorruptSnapshot` - stage failure or malformed JSON
    /// * `SaveError::IncompatibleVersion` - written by a newer format
    /// * `SaveError::IntegrityCheckFailed` - body does not match its hash
    pub fn decode(&self, bytes: &[u8]) -> Result<Snapshot> {
        let json = self.unwrap_stages(bytes)?;
        let file: SaveFile = serde_json::from_slice(&json)
            .map_err(|e| SaveError::corrupt(format!("Malformed snapshot: {e}")))?;

        check_format(&file.header)?;

        let body = serde_json::to_vec(&file.snapshot)?;
        file.header.verify_integrity(&body)?;

        Ok(file.snapshot)
    }

    /// Decode only the header and metadata, skipping the integrity check
    pub fn decode_header(&self, bytes: &[u8]) -> Result<SnapshotSummary> {
        let json = self.unwrap_stages(bytes)?;
        let file: SummaryFile = serde_json::from_slice(&json)
            .map_err(|e| SaveError::corrupt(format!("Malformed snapshot header: {e}")))?;

        check_format(&file.header)?;

        Ok(SnapshotSummary {
            header: file.header,
            metadata: file.snapshot.metadata,
        })
    }

    fn unwrap_stages(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        if bytes.is_empty() {
            return Err(SaveError::corrupt("Save file is empty"));
        }
        let decrypted = self
            .encryptor
            .decrypt(bytes)
            .map_err(|e| SaveError::corrupt(format!("Decryption failed: {e}")))?;
        self.compressor
            .decompress(&decrypted)
            .map_err(|e| SaveError::corrupt(format!("Decompression failed: {e}")))
    }
}

impl Default for SnapshotCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn check_format(header: &SaveHeader) -> Result<()> {
    if !header.is_compatible() {
        return Err(SaveError::IncompatibleVersion {
            found: header.format_version,
            supported: SAVE_FORMAT_VERSION,
        });
    }
    Ok(())
}
