//! The primary row store the view is layered on.
//!
//! The host owns the actual rows; the view only needs rowid ↔ key
//! resolution, the object/metadata blobs a predicate's arity demands,
//! and full iteration for repopulation. Serialization of user objects is
//! the host's business — blobs are opaque here.

use std::collections::{BTreeMap, HashMap};

use vista_error::Result;
use vista_types::RowId;

/// Read access to the host's primary store.
pub trait RowStore {
    /// Resolve a key to its rowid.
    fn rowid_for_key(&self, key: &str) -> Result<Option<RowId>>;

    /// Resolve a rowid to its key.
    fn key_for_rowid(&self, rowid: RowId) -> Result<Option<String>>;

    /// The serialized object for a rowid.
    fn object(&self, rowid: RowId) -> Result<Option<Vec<u8>>>;

    /// The serialized metadata for a rowid.
    fn metadata(&self, rowid: RowId) -> Result<Option<Vec<u8>>>;

    /// Visit every `(rowid, key)` pair in the store.
    fn for_each_row(&self, f: &mut dyn FnMut(RowId, &str) -> Result<()>) -> Result<()>;
}

// ---------------------------------------------------------------------------
// MemoryRowStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct StoredRow {
    key: String,
    object: Vec<u8>,
    metadata: Vec<u8>,
}

/// In-memory [`RowStore`] for tests and embedding.
///
/// Rowids are allocated sequentially on first insert of a key and stay
/// stable across replacements, matching how a host store behaves.
#[derive(Debug, Default, Clone)]
pub struct MemoryRowStore {
    rows: BTreeMap<RowId, StoredRow>,
    by_key: HashMap<String, RowId>,
    next_rowid: i64,
}

impl MemoryRowStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
            by_key: HashMap::new(),
            next_rowid: 1,
        }
    }

    /// Insert or replace the row for `key`, returning its rowid.
    pub fn put(&mut self, key: impl Into<String>, object: Vec<u8>, metadata: Vec<u8>) -> RowId {
        let key = key.into();
        if let Some(&rowid) = self.by_key.get(&key) {
            self.rows.insert(
                rowid,
                StoredRow {
                    key,
                    object,
                    metadata,
                },
            );
            return rowid;
        }
        let rowid = RowId::new(self.next_rowid);
        self.next_rowid += 1;
        self.by_key.insert(key.clone(), rowid);
        self.rows.insert(
            rowid,
            StoredRow {
                key,
                object,
                metadata,
            },
        );
        rowid
    }

    /// Remove the row for `key`, returning its rowid if present.
    pub fn remove(&mut self, key: &str) -> Option<RowId> {
        let rowid = self.by_key.remove(key)?;
        self.rows.remove(&rowid);
        Some(rowid)
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the store holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl RowStore for MemoryRowStore {
    fn rowid_for_key(&self, key: &str) -> Result<Option<RowId>> {
        Ok(self.by_key.get(key).copied())
    }

    fn key_for_rowid(&self, rowid: RowId) -> Result<Option<String>> {
        Ok(self.rows.get(&rowid).map(|row| row.key.clone()))
    }

    fn object(&self, rowid: RowId) -> Result<Option<Vec<u8>>> {
        Ok(self.rows.get(&rowid).map(|row| row.object.clone()))
    }

    fn metadata(&self, rowid: RowId) -> Result<Option<Vec<u8>>> {
        Ok(self.rows.get(&rowid).map(|row| row.metadata.clone()))
    }

    fn for_each_row(&self, f: &mut dyn FnMut(RowId, &str) -> Result<()>) -> Result<()> {
        for (rowid, row) in &self.rows {
            f(*rowid, &row.key)?;
        }
        Ok(())
    }
}
