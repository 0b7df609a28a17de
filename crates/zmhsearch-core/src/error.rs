use std::path::PathBuf;

/// Unified error type covering all failure modes across the zmh-search
/// pipeline, from offline build to runtime query.
///
/// Every variant carries an actionable message. The engine treats most
/// variants as per-query failures that leave it usable; only
/// `ManifestUnavailable` and artifact-decode errors during init leave the
/// engine uninitialized.
#[derive(Debug, thiserror::Error)]
pub enum ZmhError {
    // === Manifest / artifact errors ===
    /// The build manifest could not be fetched or parsed. Fatal to init.
    #[error("Manifest unavailable: {reason}. Check the artifact base URL and redeploy the index.")]
    ManifestUnavailable {
        /// Why the manifest could not be obtained.
        reason: String,
    },

    /// An artifact body failed structural validation (bad magic, truncated
    /// section, impossible offsets).
    #[error("Artifact {name} corrupted: {detail}. Rebuild the index with zmh-build.")]
    ArtifactCorrupted {
        /// Manifest-relative artifact name.
        name: String,
        /// Nature of the corruption.
        detail: String,
    },

    /// An artifact declares a schema version this build does not speak.
    #[error("Artifact {name} version mismatch: expected v{expected}, found v{found}. Rebuild the index.")]
    VersionMismatch {
        /// Manifest-relative artifact name.
        name: String,
        /// The version this library expects.
        expected: u16,
        /// The version found in the file.
        found: u16,
    },

    /// Fetched bytes do not hash to the manifest's digest.
    #[error("Hash mismatch for {name}: expected {expected}, got {actual}. The deployment is stale or truncated.")]
    HashMismatch {
        /// Manifest-relative artifact name.
        name: String,
        /// Expected SHA-256 (hex).
        expected: String,
        /// Computed SHA-256 (hex).
        actual: String,
    },

    /// Transport-level failure fetching an artifact.
    #[error("Fetch failed for {path}: {reason}")]
    FetchFailed {
        /// Path requested from the transport.
        path: String,
        /// Underlying transport error, stringified.
        reason: String,
    },

    // === Builder errors ===
    /// A posting list exceeded the u16 byte-length field of the dictionary.
    #[error("Posting list for token key {token_key:#010x} is {bytes} bytes, exceeding the u16 dictionary limit. Increase --index-shard-count or shrink the corpus.")]
    PostingOverflow {
        /// The offending token key.
        token_key: u32,
        /// Encoded byte length.
        bytes: usize,
    },

    /// A token's document frequency exceeded the u16 dictionary field.
    #[error("Document frequency {df} for token key {token_key:#010x} exceeds the u16 dictionary limit")]
    DfOverflow {
        /// The offending token key.
        token_key: u32,
        /// Observed document frequency.
        df: usize,
    },

    /// Posting doc-ids were not strictly increasing at encode time.
    #[error("Postings for token key {token_key:#010x} are not strictly increasing at position {position}")]
    PostingsNotSorted {
        /// The offending token key.
        token_key: u32,
        /// Index of the first out-of-order entry.
        position: usize,
    },

    /// A source row could not be decoded.
    #[error("Source row {line} rejected: {detail}")]
    SourceSchema {
        /// 1-based line number in the dump.
        line: usize,
        /// What was wrong with the row.
        detail: String,
    },

    /// The source dump file does not exist.
    #[error("Source dump not found at {path}. Pass the path to the exported catalog dump.")]
    SourceNotFound {
        /// Path that was attempted.
        path: PathBuf,
    },

    // === Runtime errors ===
    /// The current search was abandoned in favor of a newer one.
    #[error("Search cancelled during {phase}")]
    Cancelled {
        /// Which phase was active when the newer search arrived.
        phase: &'static str,
    },

    /// A configuration value is invalid.
    #[error("Invalid config: {field} = \"{value}\" — {reason}")]
    InvalidConfig {
        /// Which config field.
        field: String,
        /// The invalid value.
        value: String,
        /// Why it is invalid.
        reason: String,
    },

    // === I/O / serialization ===
    /// Wraps `std::io::Error` for file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Wraps JSON (de)serialization failures for manifest/tags/rows.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the zmh-search crate hierarchy.
pub type ZmhResult<T> = Result<T, ZmhError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ZmhError>();
    }

    #[test]
    fn io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: ZmhError = io_err.into();
        assert!(matches!(err, ZmhError::Io(_)));
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn display_messages_are_actionable() {
        let err = ZmhError::VersionMismatch {
            name: "ngram.dict".into(),
            expected: 2,
            found: 7,
        };
        let msg = err.to_string();
        assert!(msg.contains("v2"));
        assert!(msg.contains("v7"));
        assert!(msg.contains("Rebuild"), "should suggest recovery");
    }

    #[test]
    fn posting_overflow_names_the_token() {
        let err = ZmhError::PostingOverflow {
            token_key: 0x4e09_5bae,
            bytes: 70_000,
        };
        let msg = err.to_string();
        assert!(msg.contains("0x4e095bae"));
        assert!(msg.contains("70000"));
    }

    #[test]
    fn cancelled_carries_phase() {
        let err = ZmhError::Cancelled { phase: "shard_load" };
        assert!(err.to_string().contains("shard_load"));
    }
}
