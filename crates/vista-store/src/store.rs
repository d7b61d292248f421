//! Transactional page store: dirty sets over clean caches over tables.
//!
//! One writer transaction at a time buffers every mutation in three
//! dirty maps (pages, link-only metadata updates, rowid mappings) and
//! drains them in a single ordered flush at commit. Clean caches are
//! updated eagerly on write so re-reads inside the same transaction
//! observe the new values; the read path is always dirty set → clean
//! cache → table.

use std::collections::HashMap;
use std::num::NonZeroUsize;

use lru::LruCache;
use tracing::{debug, warn};
use vista_error::{Result, ViewError};
use vista_types::limits::{
    MAP_CACHE_CAPACITY, PAGE_CACHE_CAPACITY, REGISTRY_CLASS_VERSION, REGISTRY_VERSION,
};
use vista_types::{PageId, RowId};

use crate::group_index::GroupIndex;
use crate::meta::PageMetadata;
use crate::page::Page;
use crate::tables::{PageHeader, PageRecord, ViewTables};

/// The per-connection store. `None` values in `dirty_pages` and
/// `dirty_maps` are tombstones: delete at commit.
#[derive(Debug)]
pub struct PageStore<T: ViewTables> {
    tables: T,
    page_cache: LruCache<PageId, Page>,
    map_cache: LruCache<RowId, Option<PageId>>,
    dirty_pages: HashMap<PageId, Option<Page>>,
    dirty_links: HashMap<PageId, PageMetadata>,
    dirty_maps: HashMap<RowId, Option<PageId>>,
}

impl<T: ViewTables> PageStore<T> {
    /// Wrap a tables backend with empty caches and dirty sets.
    pub fn new(tables: T) -> Self {
        Self {
            tables,
            page_cache: LruCache::new(
                NonZeroUsize::new(PAGE_CACHE_CAPACITY).expect("nonzero capacity"),
            ),
            map_cache: LruCache::new(
                NonZeroUsize::new(MAP_CACHE_CAPACITY).expect("nonzero capacity"),
            ),
            dirty_pages: HashMap::new(),
            dirty_links: HashMap::new(),
            dirty_maps: HashMap::new(),
        }
    }

    /// Read access to the backend (audits and tests).
    pub fn tables(&self) -> &T {
        &self.tables
    }

    /// Give the backend back, discarding caches and dirty sets.
    pub fn into_tables(self) -> T {
        self.tables
    }

    /// All page headers, for group-index reconstruction on open.
    pub fn load_page_headers(&self) -> Result<Vec<PageHeader>> {
        self.tables.load_page_headers()
    }

    // -- pages ---------------------------------------------------------

    /// Load a page: dirty set, then cache, then table.
    ///
    /// A tombstoned or absent page is an error — callers only ask for
    /// pages the group index says exist.
    pub fn page(&mut self, page_id: &PageId) -> Result<Page> {
        match self.dirty_pages.get(page_id) {
            Some(Some(page)) => return Ok(page.clone()),
            Some(None) => {
                return Err(ViewError::PageMissing {
                    page_id: page_id.to_string(),
                });
            }
            None => {}
        }
        if let Some(page) = self.page_cache.get(page_id) {
            return Ok(page.clone());
        }
        let Some(blob) = self.tables.read_page_data(page_id)? else {
            return Err(ViewError::PageMissing {
                page_id: page_id.to_string(),
            });
        };
        let page = Page::decode(&blob)?;
        self.page_cache.put(page_id.clone(), page.clone());
        Ok(page)
    }

    /// Record a mutated page in the dirty set and refresh the cache.
    pub fn put_page(&mut self, page_id: &PageId, page: Page) {
        self.page_cache.put(page_id.clone(), page.clone());
        self.dirty_pages.insert(page_id.clone(), Some(page));
    }

    /// Mark a page for deletion at commit and purge it everywhere else.
    pub fn tombstone_page(&mut self, page_id: &PageId) {
        self.page_cache.pop(page_id);
        self.dirty_links.remove(page_id);
        self.dirty_pages.insert(page_id.clone(), None);
    }

    /// Whether the page is tombstoned in this transaction.
    #[must_use]
    pub fn is_tombstoned(&self, page_id: &PageId) -> bool {
        matches!(self.dirty_pages.get(page_id), Some(None))
    }

    /// Whether the page has a dirty (non-tombstone) buffer.
    #[must_use]
    pub fn is_dirty(&self, page_id: &PageId) -> bool {
        matches!(self.dirty_pages.get(page_id), Some(Some(_)))
    }

    /// Ids of all dirty pages (tombstones included), sorted for
    /// deterministic iteration.
    #[must_use]
    pub fn dirty_page_ids(&self) -> Vec<PageId> {
        let mut ids: Vec<PageId> = self.dirty_pages.keys().cloned().collect();
        ids.sort();
        ids
    }

    // -- links ---------------------------------------------------------

    /// Record a metadata snapshot whose `prev_page_id` changed.
    ///
    /// Harmless for pages that are also content-dirty: the commit writer
    /// folds the link into the page's own update statement.
    pub fn record_link(&mut self, meta: &PageMetadata) {
        self.dirty_links.insert(meta.page_id.clone(), meta.clone());
    }

    // -- mappings ------------------------------------------------------

    /// Which page holds `rowid`: dirty set, then cache, then table.
    pub fn page_of(&mut self, rowid: RowId) -> Result<Option<PageId>> {
        if let Some(mapping) = self.dirty_maps.get(&rowid) {
            return Ok(mapping.clone());
        }
        if let Some(mapping) = self.map_cache.get(&rowid) {
            return Ok(mapping.clone());
        }
        let mapping = self.tables.read_mapping(rowid)?;
        self.map_cache.put(rowid, mapping.clone());
        Ok(mapping)
    }

    /// Record a rowid mapping (`None` = delete at commit).
    pub fn set_mapping(&mut self, rowid: RowId, mapping: Option<PageId>) {
        self.map_cache.put(rowid, mapping.clone());
        self.dirty_maps.insert(rowid, mapping);
    }

    // -- transaction boundary -------------------------------------------

    /// Drain the dirty sets into the tables in referential-integrity
    /// order, then tear down transaction state.
    ///
    /// Statement order: page deletes/inserts/updates first, then
    /// link-only updates for pages not already flushed, then mapping
    /// upserts/deletes. A failed statement is logged and remembered but
    /// does not stop the flush; teardown always runs and the first error
    /// is returned so the host can roll back its outer transaction.
    pub fn commit(&mut self, index: &mut GroupIndex) -> Result<()> {
        let dirty_pages = std::mem::take(&mut self.dirty_pages);
        let dirty_links = std::mem::take(&mut self.dirty_links);
        let dirty_maps = std::mem::take(&mut self.dirty_maps);

        let mut first_error: Option<ViewError> = None;
        let mut record = |err: ViewError| {
            warn!(error = %err, "commit statement failed");
            if first_error.is_none() {
                first_error = Some(err);
            }
        };

        let mut page_ids: Vec<&PageId> = dirty_pages.keys().collect();
        page_ids.sort();
        for page_id in page_ids {
            match &dirty_pages[page_id] {
                None => {
                    if let Err(err) = self.tables.delete_page(page_id) {
                        record(err);
                    }
                }
                Some(page) => {
                    let Some(meta) = index.meta_mut(page_id) else {
                        record(ViewError::MetadataMissing {
                            page_id: page_id.to_string(),
                        });
                        continue;
                    };
                    let count = meta.count as u64;
                    let data = page.encode();
                    let result = if meta.is_new {
                        meta.is_new = false;
                        self.tables.insert_page(&PageRecord {
                            page_id: page_id.clone(),
                            group: meta.group.clone(),
                            prev_page_id: meta.prev_page_id.clone(),
                            count,
                            data,
                        })
                    } else if dirty_links.contains_key(page_id) {
                        self.tables
                            .update_page(page_id, meta.prev_page_id.as_ref(), count, &data)
                    } else {
                        self.tables.update_page_contents(page_id, count, &data)
                    };
                    if let Err(err) = result {
                        record(err);
                    }
                }
            }
        }

        let mut link_ids: Vec<&PageId> = dirty_links.keys().collect();
        link_ids.sort();
        for page_id in link_ids {
            if dirty_pages.contains_key(page_id) {
                continue;
            }
            let meta = &dirty_links[page_id];
            if let Err(err) = self
                .tables
                .update_page_link(page_id, meta.prev_page_id.as_ref())
            {
                record(err);
            }
        }

        let mut rowids: Vec<&RowId> = dirty_maps.keys().collect();
        rowids.sort();
        for rowid in rowids {
            let result = match &dirty_maps[rowid] {
                Some(page_id) => self.tables.put_mapping(*rowid, page_id),
                None => self.tables.delete_mapping(*rowid),
            };
            if let Err(err) = result {
                record(err);
            }
        }

        debug!(
            pages = dirty_pages.len(),
            links = dirty_links.len(),
            mappings = dirty_maps.len(),
            "commit flushed"
        );
        first_error.map_or(Ok(()), Err)
    }

    /// Discard all transaction state.
    ///
    /// The clean caches were updated eagerly with uncommitted values, so
    /// they are wiped along with the dirty sets.
    pub fn rollback(&mut self) {
        self.dirty_pages.clear();
        self.dirty_links.clear();
        self.dirty_maps.clear();
        self.page_cache.clear();
        self.map_cache.clear();
    }

    /// Delete every row from both tables immediately and drop all
    /// connection state (remove-all).
    pub fn clear_all(&mut self) -> Result<()> {
        self.tables.clear()?;
        self.dirty_pages.clear();
        self.dirty_links.clear();
        self.dirty_maps.clear();
        self.page_cache.clear();
        self.map_cache.clear();
        Ok(())
    }

    // -- registry --------------------------------------------------------

    /// Stored table-layout version, if any.
    pub fn class_version(&self) -> Result<Option<i64>> {
        self.tables.read_registry(REGISTRY_CLASS_VERSION)
    }

    /// Persist the table-layout version.
    pub fn set_class_version(&mut self, value: i64) -> Result<()> {
        self.tables.write_registry(REGISTRY_CLASS_VERSION, value)
    }

    /// Stored user config version, if any.
    pub fn user_version(&self) -> Result<Option<i64>> {
        self.tables.read_registry(REGISTRY_VERSION)
    }

    /// Persist the user config version.
    pub fn set_user_version(&mut self, value: i64) -> Result<()> {
        self.tables.write_registry(REGISTRY_VERSION, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::MemoryTables;
    use vista_types::GroupId;

    fn page_of(raw: &[i64]) -> Page {
        Page::from_rowids(raw.iter().copied().map(RowId::new).collect())
    }

    fn store() -> PageStore<MemoryTables> {
        PageStore::new(MemoryTables::new())
    }

    #[test]
    fn dirty_read_your_own_writes() {
        let mut store = store();
        let id = PageId::from("a");
        store.put_page(&id, page_of(&[1, 2]));
        assert_eq!(store.page(&id).unwrap(), page_of(&[1, 2]));
        assert!(store.is_dirty(&id));
    }

    #[test]
    fn tombstoned_page_unreadable() {
        let mut store = store();
        let id = PageId::from("a");
        store.put_page(&id, page_of(&[1]));
        store.tombstone_page(&id);
        assert!(store.is_tombstoned(&id));
        assert!(matches!(
            store.page(&id),
            Err(ViewError::PageMissing { .. })
        ));
    }

    #[test]
    fn missing_page_is_error() {
        let mut store = store();
        assert!(matches!(
            store.page(&PageId::from("ghost")),
            Err(ViewError::PageMissing { .. })
        ));
    }

    #[test]
    fn mapping_read_order() {
        let mut store = store();
        let rowid = RowId::new(7);
        assert_eq!(store.page_of(rowid).unwrap(), None);

        store.set_mapping(rowid, Some(PageId::from("a")));
        assert_eq!(store.page_of(rowid).unwrap(), Some(PageId::from("a")));

        store.set_mapping(rowid, None);
        assert_eq!(store.page_of(rowid).unwrap(), None);
    }

    #[test]
    fn commit_inserts_new_page_and_clears_flag() {
        let mut store = store();
        let g = GroupId::new("g");
        let id = PageId::from("a");
        let mut index = GroupIndex::new();
        index.insert_group(
            g.clone(),
            vec![PageMetadata::fresh(id.clone(), g.clone(), None, 2)],
        );
        store.put_page(&id, page_of(&[1, 2]));
        store.set_mapping(RowId::new(1), Some(id.clone()));
        store.set_mapping(RowId::new(2), Some(id.clone()));

        store.commit(&mut index).unwrap();
        assert!(!index.meta(&id).unwrap().is_new);
        assert_eq!(store.tables().page_rows(), 1);
        assert_eq!(store.tables().map_rows(), 2);

        // A fresh store over the same tables reads the committed page.
        let headers = store.load_page_headers().unwrap();
        assert_eq!(headers[0].count, 2);
        assert_eq!(store.page(&id).unwrap(), page_of(&[1, 2]));
    }

    #[test]
    fn commit_deletes_tombstones_and_mappings() {
        let mut store = store();
        let g = GroupId::new("g");
        let id = PageId::from("a");
        let mut index = GroupIndex::new();
        index.insert_group(
            g.clone(),
            vec![PageMetadata::fresh(id.clone(), g.clone(), None, 1)],
        );
        store.put_page(&id, page_of(&[1]));
        store.set_mapping(RowId::new(1), Some(id.clone()));
        store.commit(&mut index).unwrap();

        store.tombstone_page(&id);
        store.set_mapping(RowId::new(1), None);
        index.remove_group(&g);
        store.commit(&mut index).unwrap();
        assert_eq!(store.tables().page_rows(), 0);
        assert_eq!(store.tables().map_rows(), 0);
    }

    #[test]
    fn commit_link_only_update() {
        let mut store = store();
        let g = GroupId::new("g");
        let (a, b) = (PageId::from("a"), PageId::from("b"));
        let mut index = GroupIndex::new();
        index.insert_group(
            g.clone(),
            vec![
                PageMetadata::fresh(a.clone(), g.clone(), None, 1),
                PageMetadata::fresh(b.clone(), g.clone(), Some(a.clone()), 1),
            ],
        );
        store.put_page(&a, page_of(&[1]));
        store.put_page(&b, page_of(&[2]));
        store.commit(&mut index).unwrap();

        // Re-link b to the front without touching its contents.
        {
            let pages = index.pages_mut(&g).unwrap();
            pages[1].prev_page_id = None;
            let snapshot = pages[1].clone();
            store.record_link(&snapshot);
        }
        store.commit(&mut index).unwrap();

        let headers = store.load_page_headers().unwrap();
        let b_header = headers.iter().find(|h| h.page_id == b).unwrap();
        assert_eq!(b_header.prev_page_id, None);
    }

    #[test]
    fn rollback_discards_everything() {
        let mut store = store();
        let id = PageId::from("a");
        store.put_page(&id, page_of(&[1]));
        store.set_mapping(RowId::new(1), Some(id.clone()));
        store.rollback();
        assert!(!store.is_dirty(&id));
        assert!(store.page(&id).is_err());
        assert_eq!(store.page_of(RowId::new(1)).unwrap(), None);
    }

    #[test]
    fn commit_teardown_runs_on_statement_error() {
        let mut store = store();
        let id = PageId::from("a");
        // Dirty page with no metadata: the statement fails, but the
        // dirty sets must still be drained.
        store.put_page(&id, page_of(&[1]));
        let mut index = GroupIndex::new();
        let err = store.commit(&mut index).unwrap_err();
        assert!(matches!(err, ViewError::MetadataMissing { .. }));
        assert!(store.dirty_page_ids().is_empty());
    }

    #[test]
    fn registry_versions() {
        let mut store = store();
        assert_eq!(store.class_version().unwrap(), None);
        store.set_class_version(3).unwrap();
        store.set_user_version(42).unwrap();
        assert_eq!(store.class_version().unwrap(), Some(3));
        assert_eq!(store.user_version().unwrap(), Some(42));
    }
}
