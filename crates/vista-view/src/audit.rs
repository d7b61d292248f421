//! Post-commit structural verification.
//!
//! Walks the whole view and checks that the in-memory index, the pages,
//! the map table, and the sort order agree. Meant to be called at rest
//! (right after a commit); transient in-transaction states legitimately
//! violate the at-rest size bounds.

use std::collections::HashMap;

use vista_error::{Result, ViewError};
use vista_store::{RowStore, ViewTables};
use vista_types::limits::PAGE_CAPACITY;
use vista_types::{PageId, RowId};

use crate::connection::ViewConnection;

impl<T: ViewTables, R: RowStore> ViewConnection<T, R> {
    /// Verify the view's structural invariants. Returns the first
    /// violation found.
    pub fn verify_invariants(&mut self) -> Result<()> {
        let mut expected_mappings: HashMap<RowId, PageId> = HashMap::new();

        for group in self.index.sorted_groups() {
            let metas: Vec<_> = self
                .index
                .pages(&group)
                .ok_or_else(|| ViewError::invariant(format!("group '{group}' has no page list")))?
                .to_vec();
            if metas.is_empty() {
                return Err(ViewError::invariant(format!(
                    "group '{group}' is registered but has no pages"
                )));
            }

            let mut previous_id: Option<PageId> = None;
            let mut previous_rowid: Option<RowId> = None;
            for meta in &metas {
                if meta.prev_page_id != previous_id {
                    return Err(ViewError::invariant(format!(
                        "page '{}' links to {:?}, expected {:?}",
                        meta.page_id, meta.prev_page_id, previous_id
                    )));
                }
                previous_id = Some(meta.page_id.clone());

                let page = self.store.page(&meta.page_id)?;
                if page.len() != meta.count {
                    return Err(ViewError::invariant(format!(
                        "page '{}' holds {} rowids but records count {}",
                        meta.page_id,
                        page.len(),
                        meta.count
                    )));
                }
                if page.is_empty() {
                    return Err(ViewError::invariant(format!(
                        "page '{}' is empty at rest",
                        meta.page_id
                    )));
                }
                if page.len() > PAGE_CAPACITY {
                    return Err(ViewError::invariant(format!(
                        "page '{}' holds {} rowids at rest (capacity {PAGE_CAPACITY})",
                        meta.page_id,
                        page.len()
                    )));
                }

                for rowid in page.rowids() {
                    if let Some(duplicate) = expected_mappings.insert(*rowid, meta.page_id.clone())
                    {
                        return Err(ViewError::invariant(format!(
                            "rowid {rowid} appears in pages '{duplicate}' and '{}'",
                            meta.page_id
                        )));
                    }
                }

                // Sort order across the concatenated sequence.
                for rowid in page.rowids() {
                    if let Some(previous) = previous_rowid {
                        let a = self.fetch_for_sorting(previous)?;
                        let b = self.fetch_for_sorting(*rowid)?;
                        if self.sorting.evaluate(&group, &a.data(), &b.data())
                            == std::cmp::Ordering::Greater
                        {
                            return Err(ViewError::invariant(format!(
                                "group '{group}': rowids {previous} and {rowid} are out of order"
                            )));
                        }
                    }
                    previous_rowid = Some(*rowid);
                }
            }
        }

        // Map table agrees with page contents, both ways.
        let persisted = self.store.tables().load_mappings()?;
        if persisted.len() != expected_mappings.len() {
            return Err(ViewError::invariant(format!(
                "map table has {} rows, pages reference {}",
                persisted.len(),
                expected_mappings.len()
            )));
        }
        for (rowid, page_id) in persisted {
            match expected_mappings.get(&rowid) {
                Some(expected) if *expected == page_id => {}
                Some(expected) => {
                    return Err(ViewError::invariant(format!(
                        "rowid {rowid} maps to page '{page_id}' but lives in '{expected}'"
                    )));
                }
                None => {
                    return Err(ViewError::invariant(format!(
                        "rowid {rowid} maps to page '{page_id}' but no page holds it"
                    )));
                }
            }
        }
        Ok(())
    }
}
