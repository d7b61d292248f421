//! Pre-commit page consolidation.
//!
//! Two passes over the transaction's dirty pages: oversized pages spill
//! into neighbors or split into fresh pages; emptied pages are unlinked
//! and dropped. After consolidation every page at rest holds between 1
//! and [`PAGE_CAPACITY`] rowids.

use tracing::debug;
use vista_error::{Result, ViewError};
use vista_store::{Page, PageMetadata, RowStore, ViewTables};
use vista_types::limits::PAGE_CAPACITY;
use vista_types::{PageId, RowId, ViewChange};

use crate::connection::ViewConnection;

impl<T: ViewTables, R: RowStore> ViewConnection<T, R> {
    /// Normalize page sizes before the dirty sets are flushed.
    pub(crate) fn consolidate(&mut self) -> Result<()> {
        // Pass 1: shrink oversized pages. Neighbors filled by a spill
        // never exceed capacity and fresh split pages start at most
        // full, so one snapshot of the dirty set suffices.
        for page_id in self.store.dirty_page_ids() {
            if self.store.is_tombstoned(&page_id) {
                continue;
            }
            if self.store.page(&page_id)?.len() > PAGE_CAPACITY {
                self.split_page(&page_id, PAGE_CAPACITY)?;
            }
        }

        // Pass 2: drop emptied pages and any groups they empty out.
        for page_id in self.store.dirty_page_ids() {
            if self.store.is_tombstoned(&page_id) {
                continue;
            }
            if self.store.page(&page_id)?.is_empty() {
                self.drop_empty_page(&page_id)?;
            }
        }
        Ok(())
    }

    /// Shrink `page_id` until it holds at most `target` rowids.
    ///
    /// Repeatedly applies the first rule that fits: spill forward into
    /// the previous page's spare capacity, spill backward into the next
    /// page's, or split the tail into a freshly-allocated page linked
    /// right after this one. Every moved rowid gets a dirty map entry.
    pub(crate) fn split_page(&mut self, page_id: &PageId, target: usize) -> Result<()> {
        loop {
            let mut page = self.store.page(page_id)?;
            if page.len() <= target {
                return Ok(());
            }
            let excess = page.len() - target;
            let group = self
                .index
                .group_for_page(page_id)
                .cloned()
                .ok_or(ViewError::MetadataMissing {
                    page_id: page_id.to_string(),
                })?;
            let position = self
                .index
                .position_of_page(&group, page_id)
                .ok_or(ViewError::MetadataMissing {
                    page_id: page_id.to_string(),
                })?;

            let pages = self
                .index
                .pages(&group)
                .ok_or_else(|| ViewError::invariant(format!("no pages for group '{group}'")))?;
            let prev = position
                .checked_sub(1)
                .and_then(|p| pages.get(p))
                .map(|meta| (meta.page_id.clone(), meta.count));
            let next = pages
                .get(position + 1)
                .map(|meta| (meta.page_id.clone(), meta.count));

            if let Some((prev_id, prev_count)) = prev.filter(|(_, count)| *count < PAGE_CAPACITY) {
                let moved_count = excess.min(PAGE_CAPACITY - prev_count);
                let moved: Vec<RowId> = page.rowids()[..moved_count].to_vec();
                let mut prev_page = self.store.page(&prev_id)?;
                prev_page.append_range(&mut page, 0..moved_count);
                self.relocate(&moved, &prev_id);
                self.adjust_count(&prev_id, moved_count as isize)?;
                self.adjust_count(page_id, -(moved_count as isize))?;
                self.store.put_page(&prev_id, prev_page);
                self.store.put_page(page_id, page);
                debug!(page = %page_id, into = %prev_id, moved = moved_count, "spilled rows into previous page");
            } else if let Some((next_id, next_count)) =
                next.filter(|(_, count)| *count < PAGE_CAPACITY)
            {
                let moved_count = excess.min(PAGE_CAPACITY - next_count);
                let start = page.len() - moved_count;
                let moved: Vec<RowId> = page.rowids()[start..].to_vec();
                let mut next_page = self.store.page(&next_id)?;
                next_page.prepend_range(&mut page, start..start + moved_count);
                self.relocate(&moved, &next_id);
                self.adjust_count(&next_id, moved_count as isize)?;
                self.adjust_count(page_id, -(moved_count as isize))?;
                self.store.put_page(&next_id, next_page);
                self.store.put_page(page_id, page);
                debug!(page = %page_id, into = %next_id, moved = moved_count, "spilled rows into next page");
            } else {
                let moved_count = excess.min(PAGE_CAPACITY);
                let start = page.len() - moved_count;
                let moved = page.remove_range(start..start + moved_count);
                let new_id = PageId::fresh();
                let new_page = Page::from_rowids(moved.clone());
                self.relocate(&moved, &new_id);

                let new_meta = PageMetadata::fresh(
                    new_id.clone(),
                    group.clone(),
                    Some(page_id.clone()),
                    moved_count,
                );
                let link_patch = {
                    let list = self
                        .index
                        .pages_mut(&group)
                        .ok_or_else(|| ViewError::invariant(format!("no pages for group '{group}'")))?;
                    list[position].count -= moved_count;
                    list.insert(position + 1, new_meta);
                    list.get_mut(position + 2).map(|following| {
                        following.prev_page_id = Some(new_id.clone());
                        following.clone()
                    })
                };
                if let Some(following) = link_patch {
                    self.store.record_link(&following);
                }
                self.index.register_page(new_id.clone(), group.clone());
                self.store.put_page(page_id, page);
                self.store.put_page(&new_id, new_page);
                debug!(page = %page_id, new_page = %new_id, moved = moved_count, "split page");
            }
        }
    }

    /// Unlink and drop an empty page; drop its group when it was the
    /// last page.
    pub(crate) fn drop_empty_page(&mut self, page_id: &PageId) -> Result<()> {
        let group = self
            .index
            .group_for_page(page_id)
            .cloned()
            .ok_or(ViewError::MetadataMissing {
                page_id: page_id.to_string(),
            })?;
        let position = self
            .index
            .position_of_page(&group, page_id)
            .ok_or(ViewError::MetadataMissing {
                page_id: page_id.to_string(),
            })?;

        let link_patch = {
            let list = self
                .index
                .pages_mut(&group)
                .ok_or_else(|| ViewError::invariant(format!("no pages for group '{group}'")))?;
            let removed = list.remove(position);
            list.get_mut(position).map(|following| {
                following.prev_page_id = removed.prev_page_id.clone();
                following.clone()
            })
        };
        if let Some(following) = link_patch {
            self.store.record_link(&following);
        }

        self.index.unregister_page(page_id);
        self.store.tombstone_page(page_id);
        debug!(page = %page_id, group = %group, "dropped empty page");

        let group_empty = self.index.pages(&group).map_or(true, <[_]>::is_empty);
        if group_empty {
            self.index.remove_group(&group);
            self.changes.push(ViewChange::DeleteGroup {
                group: group.clone(),
            });
            self.mutated_groups.insert(group);
        }
        Ok(())
    }

    fn relocate(&mut self, moved: &[RowId], to: &PageId) {
        for rowid in moved {
            self.store.set_mapping(*rowid, Some(to.clone()));
        }
    }

    fn adjust_count(&mut self, page_id: &PageId, delta: isize) -> Result<()> {
        let meta = self
            .index
            .meta_mut(page_id)
            .ok_or(ViewError::MetadataMissing {
                page_id: page_id.to_string(),
            })?;
        meta.count = meta
            .count
            .checked_add_signed(delta)
            .ok_or_else(|| ViewError::invariant(format!("page '{page_id}' count underflow")))?;
        Ok(())
    }
}
