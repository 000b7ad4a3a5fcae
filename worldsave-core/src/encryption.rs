/*!
Encryption stage for encoded snapshots.

The stage is always invoked after compression on save and before decompression
on load. Only the identity stage ships today.
*/

use crate::Result;

/// Encryption abstraction for encoded snapshot bytes
pub trait EncryptionAdapter {
    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>>;

    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Name recorded in the save header
    fn scheme_name(&self) -> &str;
}

/// Identity encryption stage, the default.
#[derive(Debug, Clone, Default)]
pub struct NoEncryption;

impl NoEncryption {
    pub fn new() -> Self {
        Self
    }
}

impl EncryptionAdapter for NoEncryption {
    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn scheme_name(&self) -> &str {
        "none"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_encryption_is_identity() {
        let stage = NoEncryption::new();
        let data = b"{\"economy\":{}}";
        assert_eq!(stage.encrypt(data).unwrap(), data);
        assert_eq!(stage.decrypt(data).unwrap(), data);
        assert_eq!(stage.scheme_name(), "none");
    }
}
