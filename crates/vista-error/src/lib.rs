use thiserror::Error;

/// Primary error type for view operations.
///
/// Structured variants for the cases callers dispatch on, with
/// convenience constructors for the common string-detail forms.
#[derive(Error, Debug)]
pub enum ViewError {
    // === Storage ===
    /// A read or write against a backing table failed.
    #[error("storage error: {detail}")]
    Storage { detail: String },

    /// File I/O error from a storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Corruption ===
    /// Persisted view state is malformed (broken page chain, bad blob,
    /// checksum mismatch). The view must be dropped and rebuilt.
    #[error("view is corrupt: {detail}")]
    Corrupt { detail: String },

    // === Runtime invariant violations ===
    /// An internal invariant did not hold mid-transaction. The host
    /// should roll the transaction back.
    #[error("invariant violation: {detail}")]
    Invariant { detail: String },

    /// A page id resolved from the map table or group index has no
    /// persisted page.
    #[error("page not found: {page_id}")]
    PageMissing { page_id: String },

    /// A known page id has no metadata entry in the group index.
    #[error("page metadata not found: {page_id}")]
    MetadataMissing { page_id: String },

    /// The primary store has no key for a rowid the view references.
    #[error("no key for rowid {rowid} in primary store")]
    RowMissing { rowid: i64 },

    // === Enumeration ===
    /// A user callback mutated the group being enumerated without
    /// requesting stop.
    #[error("group '{group}' was mutated during enumeration")]
    MutatedDuringEnumeration { group: String },

    // === Caller misuse ===
    /// Invalid caller input (empty key or group), rejected before any
    /// state was mutated.
    #[error("misuse: {detail}")]
    Misuse { detail: String },
}

impl ViewError {
    /// Create a storage error.
    pub fn storage(detail: impl Into<String>) -> Self {
        Self::Storage {
            detail: detail.into(),
        }
    }

    /// Create a corruption error.
    pub fn corrupt(detail: impl Into<String>) -> Self {
        Self::Corrupt {
            detail: detail.into(),
        }
    }

    /// Create an invariant-violation error.
    pub fn invariant(detail: impl Into<String>) -> Self {
        Self::Invariant {
            detail: detail.into(),
        }
    }

    /// Create a misuse error.
    pub fn misuse(detail: impl Into<String>) -> Self {
        Self::Misuse {
            detail: detail.into(),
        }
    }

    /// Whether this error means the persisted view cannot be trusted and
    /// the caller must drop and rebuild it.
    #[must_use]
    pub const fn requires_rebuild(&self) -> bool {
        matches!(self, Self::Corrupt { .. })
    }

    /// Whether this error aborts the current writer transaction.
    ///
    /// Misuse is rejected before any state is mutated, and a detected
    /// mutation-during-enumeration leaves the already-applied mutations
    /// valid, so neither forces a rollback.
    #[must_use]
    pub const fn aborts_transaction(&self) -> bool {
        matches!(
            self,
            Self::Storage { .. }
                | Self::Io(_)
                | Self::Corrupt { .. }
                | Self::Invariant { .. }
                | Self::PageMissing { .. }
                | Self::MetadataMissing { .. }
                | Self::RowMissing { .. }
        )
    }
}

/// Result type alias using [`ViewError`].
pub type Result<T> = std::result::Result<T, ViewError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_storage() {
        let err = ViewError::storage("write to page table failed");
        assert_eq!(err.to_string(), "storage error: write to page table failed");
    }

    #[test]
    fn display_corrupt() {
        let err = ViewError::corrupt("circular page ordering in group 'g'");
        assert_eq!(
            err.to_string(),
            "view is corrupt: circular page ordering in group 'g'"
        );
    }

    #[test]
    fn display_mutated_during_enumeration() {
        let err = ViewError::MutatedDuringEnumeration {
            group: "inbox".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "group 'inbox' was mutated during enumeration"
        );
    }

    #[test]
    fn requires_rebuild() {
        assert!(ViewError::corrupt("bad chain").requires_rebuild());
        assert!(!ViewError::storage("io").requires_rebuild());
        assert!(!ViewError::misuse("empty key").requires_rebuild());
    }

    #[test]
    fn aborts_transaction() {
        assert!(ViewError::invariant("page missing rowid").aborts_transaction());
        assert!(ViewError::storage("io").aborts_transaction());
        assert!(
            ViewError::PageMissing {
                page_id: "p".to_owned()
            }
            .aborts_transaction()
        );
        assert!(!ViewError::misuse("empty group").aborts_transaction());
        assert!(
            !ViewError::MutatedDuringEnumeration {
                group: "g".to_owned()
            }
            .aborts_transaction()
        );
    }

    #[test]
    fn io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: ViewError = io_err.into();
        assert!(matches!(err, ViewError::Io(_)));
        assert!(err.aborts_transaction());
    }
}
