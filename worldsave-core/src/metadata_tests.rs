/*!
Edge-case tests for save metadata and headers.
*/

#[cfg(test)]
mod tests {
    use crate::metadata::{SaveHeader, SaveKind, SaveMetadata, SAVE_FORMAT_VERSION};

    #[test]
    fn test_metadata_serialization_roundtrip() {
        let metadata = SaveMetadata::new("campaign_7", SaveKind::Auto, 3600.25, "2.0.1");

        let json = serde_json::to_string(&metadata).unwrap();
        let deserialized: SaveMetadata = serde_json::from_str(&json).unwrap();

        assert_eq!(metadata, deserialized);
    }

    #[test]
    fn test_metadata_special_characters() {
        let name = "Siege of Kh\u{e2}zad \u{1f3f0} (final)";
        let metadata = SaveMetadata::new(name, SaveKind::Manual, 0.0, "1.0.0-beta+exp.sha.5114f85");

        let json = serde_json::to_string(&metadata).unwrap();
        let deserialized: SaveMetadata = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.save_name, name);
        assert_eq!(deserialized.version, "1.0.0-beta+exp.sha.5114f85");
    }

    #[test]
    fn test_metadata_json_structure() {
        let metadata = SaveMetadata::new("slot", SaveKind::Quick, 1.0, "1.0");
        let json = serde_json::to_value(&metadata).unwrap();

        assert_eq!(json["kind"], "quick");
        assert_eq!(json["save_name"], "slot");
        assert!(json["created_at"].is_string());
        assert!(json["snapshot_id"].is_string());
    }

    #[test]
    fn test_snapshot_ids_are_unique() {
        let first = SaveMetadata::new("slot", SaveKind::Manual, 0.0, "1.0");
        let second = SaveMetadata::new("slot", SaveKind::Manual, 0.0, "1.0");
        assert_ne!(first.snapshot_id, second.snapshot_id);
    }

    #[test]
    fn test_empty_version_is_invalid() {
        let metadata = SaveMetadata::new("slot", SaveKind::Manual, 0.0, "");
        assert!(metadata.validate().is_err());

        let metadata = SaveMetadata::new("slot", SaveKind::Manual, -1.0, "1.0");
        assert!(metadata.validate().is_err());
    }

    #[test]
    fn test_kind_strings_match_serde() {
        for kind in [SaveKind::Manual, SaveKind::Auto, SaveKind::Quick] {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, kind.as_str());
        }
    }

    #[test]
    fn test_header_hash_is_sensitive_to_every_byte() {
        let header = SaveHeader::for_body(br#"{"wood":120}"#, "gzip", "none");
        assert_eq!(header.content_hash.len(), 64);
        assert_eq!(header.format_version, SAVE_FORMAT_VERSION);
        assert_eq!(header.compression, "gzip");
        assert!(header.verify_integrity(br#"{"wood":121}"#).is_err());
        assert!(header.verify_integrity(br#"{"wood": 120}"#).is_err());
    }

    #[test]
    fn test_header_from_older_format_is_compatible() {
        let mut header = SaveHeader::for_body(b"{}", "none", "none");
        header.format_version = 0;
        assert!(header.is_compatible());
    }
}
