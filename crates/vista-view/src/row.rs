//! Owned row materialization honoring predicate arity.

use vista_error::{Result, ViewError};
use vista_store::RowStore;
use vista_types::RowId;

use crate::predicate::RowData;

/// A row's parts, fetched from the primary store only as far as the
/// consuming predicates need them.
#[derive(Debug, Clone)]
pub(crate) struct OwnedRow {
    pub key: String,
    pub object: Option<Vec<u8>>,
    pub metadata: Option<Vec<u8>>,
}

impl OwnedRow {
    /// Borrowed view for predicate calls.
    pub fn data(&self) -> RowData<'_> {
        RowData {
            key: &self.key,
            object: self.object.as_deref(),
            metadata: self.metadata.as_deref(),
        }
    }

    /// Materialize the row for `rowid`.
    ///
    /// `key` is used when the caller already has it, saving a lookup.
    /// Object and metadata blobs are fetched only when asked for.
    pub fn fetch<R: RowStore>(
        rows: &R,
        rowid: RowId,
        key: Option<&str>,
        need_object: bool,
        need_metadata: bool,
    ) -> Result<Self> {
        let key = match key {
            Some(key) => key.to_owned(),
            None => rows
                .key_for_rowid(rowid)?
                .ok_or(ViewError::RowMissing { rowid: rowid.get() })?,
        };
        let object = if need_object { rows.object(rowid)? } else { None };
        let metadata = if need_metadata { rows.metadata(rowid)? } else { None };
        Ok(Self {
            key,
            object,
            metadata,
        })
    }
}
