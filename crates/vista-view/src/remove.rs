//! Removing rows from the view.

use std::collections::HashMap;

use tracing::info;
use vista_error::{Result, ViewError};
use vista_store::{RowStore, ViewTables};
use vista_types::{GroupId, PageId, RowId, ViewChange};

use crate::connection::ViewConnection;

impl<T: ViewTables, R: RowStore> ViewConnection<T, R> {
    /// Remove one rowid wherever it currently is. No-op when the rowid
    /// is not in the view.
    pub fn remove_rowid(&mut self, rowid: RowId, key: &str) -> Result<()> {
        let Some(page_id) = self.store.page_of(rowid)? else {
            return Ok(());
        };
        let group = self
            .index
            .group_for_page(&page_id)
            .cloned()
            .ok_or(ViewError::MetadataMissing {
                page_id: page_id.to_string(),
            })?;
        self.remove_rowid_located(rowid, key, &page_id, &group)
    }

    /// Remove one rowid from a known page, emitting a `DeleteRow` with
    /// the row's position at the moment of removal.
    pub(crate) fn remove_rowid_located(
        &mut self,
        rowid: RowId,
        key: &str,
        page_id: &PageId,
        group: &GroupId,
    ) -> Result<()> {
        let mut page = self.store.page(page_id)?;
        let local = page.index_of(rowid).ok_or_else(|| {
            ViewError::invariant(format!("page '{page_id}' missing expected rowid {rowid}"))
        })?;
        let offset = self.page_offset(group, page_id)?;
        self.changes.push(ViewChange::DeleteRow {
            key: key.to_owned(),
            group: group.clone(),
            index: offset + local as u64,
        });
        page.remove_at(local);
        self.store.put_page(page_id, page);
        let meta = self
            .index
            .meta_mut(page_id)
            .ok_or(ViewError::MetadataMissing {
                page_id: page_id.to_string(),
            })?;
        meta.count -= 1;
        self.store.set_mapping(rowid, None);
        self.mutated_groups.insert(group.clone());
        Ok(())
    }

    /// Remove a batch of rows. Rows absent from the view are skipped.
    pub fn remove_rowids(&mut self, rows: &[(RowId, String)]) -> Result<()> {
        let mut by_page: HashMap<PageId, HashMap<RowId, String>> = HashMap::new();
        for (rowid, key) in rows {
            if let Some(page_id) = self.store.page_of(*rowid)? {
                by_page
                    .entry(page_id)
                    .or_default()
                    .insert(*rowid, key.clone());
            }
        }
        let mut page_ids: Vec<PageId> = by_page.keys().cloned().collect();
        page_ids.sort();
        for page_id in page_ids {
            let group = self
                .index
                .group_for_page(&page_id)
                .cloned()
                .ok_or(ViewError::MetadataMissing {
                    page_id: page_id.to_string(),
                })?;
            self.remove_rowids_in_page(&by_page[&page_id], &page_id, &group)?;
        }
        Ok(())
    }

    /// Remove every matching rowid from one page, walking high-to-low so
    /// each emitted `DeleteRow` index matches the array state at the
    /// moment of that removal.
    pub(crate) fn remove_rowids_in_page(
        &mut self,
        keyed: &HashMap<RowId, String>,
        page_id: &PageId,
        group: &GroupId,
    ) -> Result<()> {
        let mut page = self.store.page(page_id)?;
        let offset = self.page_offset(group, page_id)?;
        let mut removed = 0usize;
        for local in (0..page.len()).rev() {
            let rowid = page.rowid_at(local).ok_or_else(|| {
                ViewError::invariant(format!(
                    "page '{page_id}' shorter than its recorded count"
                ))
            })?;
            let Some(key) = keyed.get(&rowid) else {
                continue;
            };
            self.changes.push(ViewChange::DeleteRow {
                key: key.clone(),
                group: group.clone(),
                index: offset + local as u64,
            });
            page.remove_at(local);
            self.store.set_mapping(rowid, None);
            removed += 1;
        }
        if removed > 0 {
            self.store.put_page(page_id, page);
            let meta = self
                .index
                .meta_mut(page_id)
                .ok_or(ViewError::MetadataMissing {
                    page_id: page_id.to_string(),
                })?;
            meta.count -= removed;
            self.mutated_groups.insert(group.clone());
        }
        Ok(())
    }

    /// Delete every row from both tables immediately, emit a
    /// `ResetGroup` per group, and drop all in-memory state.
    pub fn remove_all(&mut self) -> Result<()> {
        info!(view = %self.name, "removing all rows from view");
        self.store.clear_all()?;
        for group in self.index.sorted_groups() {
            self.changes.push(ViewChange::ResetGroup {
                group: group.clone(),
            });
            self.mutated_groups.insert(group);
        }
        self.index.clear();
        self.reset = true;
        Ok(())
    }
}
