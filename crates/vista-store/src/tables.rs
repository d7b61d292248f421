//! The two backing tables behind a storage trait.
//!
//! A registered view persists into two tables named after it:
//!
//! ```text
//! map_<name>:  rowid INTEGER PRIMARY KEY, pageKey TEXT NOT NULL
//! page_<name>: pageKey TEXT PRIMARY KEY, grp TEXT NOT NULL,
//!              prevPageKey TEXT NULL, count INTEGER, data BLOB
//! ```
//!
//! plus a shared registry side-table for version integers. The engine
//! talks to them through [`ViewTables`]; [`MemoryTables`] is the
//! reference backend used by tests and in-memory embedding. The trait's
//! mutating calls are assumed to run inside the host's outer transaction,
//! so the host's rollback undoes them.

use std::collections::BTreeMap;

use vista_error::{Result, ViewError};
use vista_types::{GroupId, PageId, RowId};

/// A full page-table row.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PageRecord {
    pub page_id: PageId,
    pub group: GroupId,
    pub prev_page_id: Option<PageId>,
    pub count: u64,
    pub data: Vec<u8>,
}

/// A page-table row without its blob, as read when rebuilding the group
/// index on open.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PageHeader {
    pub page_id: PageId,
    pub group: GroupId,
    pub prev_page_id: Option<PageId>,
    pub count: u64,
}

/// Storage operations over the view's two tables and the registry.
pub trait ViewTables {
    /// Read all page headers (blob column skipped).
    fn load_page_headers(&self) -> Result<Vec<PageHeader>>;

    /// Read one page's blob, or `None` if the page row does not exist.
    fn read_page_data(&self, page_id: &PageId) -> Result<Option<Vec<u8>>>;

    /// `INSERT` a complete page row. Fails if the page already exists.
    fn insert_page(&mut self, record: &PageRecord) -> Result<()>;

    /// `UPDATE` a page's link, count, and blob.
    fn update_page(
        &mut self,
        page_id: &PageId,
        prev_page_id: Option<&PageId>,
        count: u64,
        data: &[u8],
    ) -> Result<()>;

    /// `UPDATE` a page's count and blob, leaving its link untouched.
    fn update_page_contents(&mut self, page_id: &PageId, count: u64, data: &[u8]) -> Result<()>;

    /// `UPDATE` only a page's link.
    fn update_page_link(&mut self, page_id: &PageId, prev_page_id: Option<&PageId>) -> Result<()>;

    /// `DELETE` a page row. Deleting a missing page is not an error.
    fn delete_page(&mut self, page_id: &PageId) -> Result<()>;

    /// Read the mapping for one rowid.
    fn read_mapping(&self, rowid: RowId) -> Result<Option<PageId>>;

    /// `INSERT OR REPLACE` a rowid → page mapping.
    fn put_mapping(&mut self, rowid: RowId, page_id: &PageId) -> Result<()>;

    /// `DELETE` a rowid mapping. Deleting a missing mapping is not an error.
    fn delete_mapping(&mut self, rowid: RowId) -> Result<()>;

    /// Read the whole map table (audits and tests).
    fn load_mappings(&self) -> Result<Vec<(RowId, PageId)>>;

    /// `DELETE` every row from both tables, leaving the registry alone.
    fn clear(&mut self) -> Result<()>;

    /// Read a registry integer.
    fn read_registry(&self, key: &str) -> Result<Option<i64>>;

    /// Write a registry integer.
    fn write_registry(&mut self, key: &str, value: i64) -> Result<()>;
}

// ---------------------------------------------------------------------------
// MemoryTables
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
struct StoredPage {
    group: GroupId,
    prev_page_id: Option<PageId>,
    count: u64,
    data: Vec<u8>,
}

/// In-memory [`ViewTables`] implementation.
///
/// `BTreeMap`-backed so iteration order is deterministic across runs.
#[derive(Debug, Default, Clone)]
pub struct MemoryTables {
    pages: BTreeMap<PageId, StoredPage>,
    mappings: BTreeMap<RowId, PageId>,
    registry: BTreeMap<String, i64>,
}

impl MemoryTables {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of page rows (tests).
    #[must_use]
    pub fn page_rows(&self) -> usize {
        self.pages.len()
    }

    /// Number of map rows (tests).
    #[must_use]
    pub fn map_rows(&self) -> usize {
        self.mappings.len()
    }
}

impl ViewTables for MemoryTables {
    fn load_page_headers(&self) -> Result<Vec<PageHeader>> {
        Ok(self
            .pages
            .iter()
            .map(|(page_id, stored)| PageHeader {
                page_id: page_id.clone(),
                group: stored.group.clone(),
                prev_page_id: stored.prev_page_id.clone(),
                count: stored.count,
            })
            .collect())
    }

    fn read_page_data(&self, page_id: &PageId) -> Result<Option<Vec<u8>>> {
        Ok(self.pages.get(page_id).map(|stored| stored.data.clone()))
    }

    fn insert_page(&mut self, record: &PageRecord) -> Result<()> {
        if self.pages.contains_key(&record.page_id) {
            return Err(ViewError::storage(format!(
                "page '{}' already exists",
                record.page_id
            )));
        }
        self.pages.insert(
            record.page_id.clone(),
            StoredPage {
                group: record.group.clone(),
                prev_page_id: record.prev_page_id.clone(),
                count: record.count,
                data: record.data.clone(),
            },
        );
        Ok(())
    }

    fn update_page(
        &mut self,
        page_id: &PageId,
        prev_page_id: Option<&PageId>,
        count: u64,
        data: &[u8],
    ) -> Result<()> {
        let stored = self
            .pages
            .get_mut(page_id)
            .ok_or_else(|| ViewError::storage(format!("no such page '{page_id}'")))?;
        stored.prev_page_id = prev_page_id.cloned();
        stored.count = count;
        stored.data = data.to_vec();
        Ok(())
    }

    fn update_page_contents(&mut self, page_id: &PageId, count: u64, data: &[u8]) -> Result<()> {
        let stored = self
            .pages
            .get_mut(page_id)
            .ok_or_else(|| ViewError::storage(format!("no such page '{page_id}'")))?;
        stored.count = count;
        stored.data = data.to_vec();
        Ok(())
    }

    fn update_page_link(&mut self, page_id: &PageId, prev_page_id: Option<&PageId>) -> Result<()> {
        let stored = self
            .pages
            .get_mut(page_id)
            .ok_or_else(|| ViewError::storage(format!("no such page '{page_id}'")))?;
        stored.prev_page_id = prev_page_id.cloned();
        Ok(())
    }

    fn delete_page(&mut self, page_id: &PageId) -> Result<()> {
        self.pages.remove(page_id);
        Ok(())
    }

    fn read_mapping(&self, rowid: RowId) -> Result<Option<PageId>> {
        Ok(self.mappings.get(&rowid).cloned())
    }

    fn put_mapping(&mut self, rowid: RowId, page_id: &PageId) -> Result<()> {
        self.mappings.insert(rowid, page_id.clone());
        Ok(())
    }

    fn delete_mapping(&mut self, rowid: RowId) -> Result<()> {
        self.mappings.remove(&rowid);
        Ok(())
    }

    fn load_mappings(&self) -> Result<Vec<(RowId, PageId)>> {
        Ok(self
            .mappings
            .iter()
            .map(|(rowid, page_id)| (*rowid, page_id.clone()))
            .collect())
    }

    fn clear(&mut self) -> Result<()> {
        self.pages.clear();
        self.mappings.clear();
        Ok(())
    }

    fn read_registry(&self, key: &str) -> Result<Option<i64>> {
        Ok(self.registry.get(key).copied())
    }

    fn write_registry(&mut self, key: &str, value: i64) -> Result<()> {
        self.registry.insert(key.to_owned(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, group: &str, prev: Option<&str>, count: u64) -> PageRecord {
        PageRecord {
            page_id: PageId::from(id),
            group: GroupId::new(group),
            prev_page_id: prev.map(PageId::from),
            count,
            data: vec![1, 2, 3],
        }
    }

    #[test]
    fn insert_then_headers() {
        let mut tables = MemoryTables::new();
        tables.insert_page(&record("a", "g", None, 2)).unwrap();
        tables.insert_page(&record("b", "g", Some("a"), 3)).unwrap();

        let headers = tables.load_page_headers().unwrap();
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0].page_id.as_str(), "a");
        assert_eq!(headers[1].prev_page_id, Some(PageId::from("a")));
    }

    #[test]
    fn duplicate_insert_rejected() {
        let mut tables = MemoryTables::new();
        tables.insert_page(&record("a", "g", None, 1)).unwrap();
        assert!(tables.insert_page(&record("a", "g", None, 1)).is_err());
    }

    #[test]
    fn update_variants() {
        let mut tables = MemoryTables::new();
        tables.insert_page(&record("a", "g", None, 1)).unwrap();

        tables.update_page_contents(&PageId::from("a"), 5, &[9]).unwrap();
        tables
            .update_page_link(&PageId::from("a"), Some(&PageId::from("z")))
            .unwrap();
        let headers = tables.load_page_headers().unwrap();
        assert_eq!(headers[0].count, 5);
        assert_eq!(headers[0].prev_page_id, Some(PageId::from("z")));
        assert_eq!(tables.read_page_data(&PageId::from("a")).unwrap(), Some(vec![9]));

        assert!(tables.update_page_contents(&PageId::from("nope"), 0, &[]).is_err());
    }

    #[test]
    fn mappings_upsert_and_delete() {
        let mut tables = MemoryTables::new();
        let r = RowId::new(7);
        tables.put_mapping(r, &PageId::from("a")).unwrap();
        tables.put_mapping(r, &PageId::from("b")).unwrap();
        assert_eq!(tables.read_mapping(r).unwrap(), Some(PageId::from("b")));
        tables.delete_mapping(r).unwrap();
        assert_eq!(tables.read_mapping(r).unwrap(), None);
        tables.delete_mapping(r).unwrap(); // idempotent
    }

    #[test]
    fn clear_keeps_registry() {
        let mut tables = MemoryTables::new();
        tables.insert_page(&record("a", "g", None, 1)).unwrap();
        tables.put_mapping(RowId::new(1), &PageId::from("a")).unwrap();
        tables.write_registry("classVersion", 3).unwrap();

        tables.clear().unwrap();
        assert_eq!(tables.page_rows(), 0);
        assert_eq!(tables.map_rows(), 0);
        assert_eq!(tables.read_registry("classVersion").unwrap(), Some(3));
    }
}
