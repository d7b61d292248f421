//! Inserting and re-positioning rows.
//!
//! The insertion index is located without a full scan: an
//! existing-position fast path for rows already in the group, endpoint
//! hints carried across consecutive inserts (append-heavy and
//! prepend-heavy workloads resolve in one comparison), and otherwise a
//! binary search whose upper-bound-on-equal convention is the stable
//! tie-break.

use std::cmp::Ordering;

use tracing::debug;
use vista_error::{Result, ViewError};
use vista_store::{Page, PageMetadata, RowStore, ViewTables};
use vista_types::limits::{IMMEDIATE_SPLIT_TARGET, IMMEDIATE_SPLIT_TRIGGER, PAGE_CAPACITY};
use vista_types::{ChangeFlags, GroupId, PageId, RowId, ViewChange};

use crate::connection::ViewConnection;
use crate::row::OwnedRow;

impl<T: ViewTables, R: RowStore> ViewConnection<T, R> {
    pub(crate) fn insert_impl(
        &mut self,
        rowid: RowId,
        key: &str,
        object: Option<&[u8]>,
        metadata: Option<&[u8]>,
        known_new: bool,
        flags: ChangeFlags,
    ) -> Result<()> {
        if key.is_empty() {
            return Err(ViewError::misuse("row key must not be empty"));
        }

        // Materialize what the grouping predicate reads.
        let mut target = OwnedRow {
            key: key.to_owned(),
            object: object.map(<[u8]>::to_vec),
            metadata: metadata.map(<[u8]>::to_vec),
        };
        if target.object.is_none() && self.grouping.arity().needs_object() {
            target.object = self.rows.object(rowid)?;
        }
        if target.metadata.is_none() && self.grouping.arity().needs_metadata() {
            target.metadata = self.rows.metadata(rowid)?;
        }

        let Some(group) = self.grouping.evaluate(&target.data()) else {
            // Excluded from the view; drop any previous placement.
            if !known_new {
                self.remove_rowid(rowid, key)?;
            }
            return Ok(());
        };
        if group.is_empty() {
            return Err(ViewError::misuse(
                "grouping predicate returned an empty group",
            ));
        }

        // The sorting predicate may read parts the grouping one did not.
        if target.object.is_none() && self.sorting.arity().needs_object() {
            target.object = self.rows.object(rowid)?;
        }
        if target.metadata.is_none() && self.sorting.arity().needs_metadata() {
            target.metadata = self.rows.metadata(rowid)?;
        }

        let mut existing_index = 0u64;
        let mut existing_page_id: Option<PageId> = None;
        if !known_new {
            if let Some(page_id) = self.store.page_of(rowid)? {
                let existing_group = self.index.group_for_page(&page_id).cloned().ok_or(
                    ViewError::MetadataMissing {
                        page_id: page_id.to_string(),
                    },
                )?;
                if existing_group == group {
                    let position = self.index_of_rowid(&group, &page_id, rowid)?;
                    if self.sorting.arity().depends_only_on_key() {
                        // The key did not change, so the position cannot.
                        self.changes.push(ViewChange::UpdateRow {
                            key: key.to_owned(),
                            group,
                            index: position,
                            flags,
                        });
                        return Ok(());
                    }
                    existing_index = position;
                    existing_page_id = Some(page_id);
                } else {
                    // Group migration: vacate the old slot first.
                    self.remove_rowid_located(rowid, key, &page_id, &existing_group)?;
                }
            }
        }

        // Brand-new group: one page, one row.
        if !self.index.contains_group(&group) {
            let page_id = PageId::fresh();
            let mut page = Page::new();
            page.insert_at(0, rowid);
            let meta = PageMetadata::fresh(page_id.clone(), group.clone(), None, 1);
            self.index.insert_group(group.clone(), vec![meta]);
            self.store.put_page(&page_id, page);
            self.store.set_mapping(rowid, Some(page_id));
            debug!(group = %group, "created group");
            self.changes.push(ViewChange::InsertGroup {
                group: group.clone(),
            });
            self.changes.push(ViewChange::InsertRow {
                key: key.to_owned(),
                group: group.clone(),
                index: 0,
            });
            self.mutated_groups.insert(group);
            self.last_insert_was_first = true;
            self.last_insert_was_last = true;
            return Ok(());
        }

        let mut n = self.index.count_in_group(&group);

        // Existing-position fast path: if the row still fits between its
        // neighbors it keeps its index.
        if let Some(page_id) = existing_page_id.clone() {
            let prev_ok = existing_index == 0
                || self.cmp_at(&group, &target, existing_index - 1)? != Ordering::Less;
            let next_ok = existing_index + 1 >= n
                || self.cmp_at(&group, &target, existing_index + 1)? != Ordering::Greater;
            if prev_ok && next_ok {
                self.changes.push(ViewChange::UpdateRow {
                    key: key.to_owned(),
                    group,
                    index: existing_index,
                    flags,
                });
                return Ok(());
            }
            self.remove_rowid_located(rowid, key, &page_id, &group)?;
            n -= 1;
        }

        let index = self.locate_insertion_index(&group, &target, n)?;
        self.insert_at_index(rowid, key, &group, index, n, existing_page_id.as_ref())
    }

    /// Find where `target` belongs in `group` of current size `n`.
    fn locate_insertion_index(
        &mut self,
        group: &GroupId,
        target: &OwnedRow,
        n: u64,
    ) -> Result<u64> {
        if n == 0 {
            return Ok(0);
        }

        // Endpoint hints carried over from the previous insert into any
        // group: consecutive prepends or appends resolve in a single
        // comparison.
        if self.last_insert_was_first
            && n > 1
            && self.cmp_at(group, target, 0)? == Ordering::Less
        {
            return Ok(0);
        }
        if self.last_insert_was_last
            && n > 1
            && self.cmp_at(group, target, n - 1)? != Ordering::Less
        {
            return Ok(n);
        }

        // Upper bound on equal: ties land after the existing equal run.
        let mut lo = 0u64;
        let mut hi = n;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.cmp_at(group, target, mid)? == Ordering::Less {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        Ok(lo)
    }

    /// Compare `target` against the row at `position` in `group`.
    pub(crate) fn cmp_at(
        &mut self,
        group: &GroupId,
        target: &OwnedRow,
        position: u64,
    ) -> Result<Ordering> {
        let (page_id, local) = self.locate(group, position)?;
        let page = self.store.page(&page_id)?;
        let rowid = page.rowid_at(local).ok_or_else(|| {
            ViewError::invariant(format!(
                "page '{page_id}' shorter than its recorded count"
            ))
        })?;
        let candidate = self.fetch_for_sorting(rowid)?;
        Ok(self.sorting.evaluate(group, &target.data(), &candidate.data()))
    }

    /// Place `rowid` at global `index` in `group` (of size `n_before`
    /// just before this insertion).
    fn insert_at_index(
        &mut self,
        rowid: RowId,
        key: &str,
        group: &GroupId,
        index: u64,
        n_before: u64,
        existing_page_id: Option<&PageId>,
    ) -> Result<()> {
        let (page_id, local) = self.choose_page(group, index)?;
        let mut page = self.store.page(&page_id)?;
        page.insert_at(local, rowid);
        let page_len = page.len();
        self.store.put_page(&page_id, page);
        self.index
            .meta_mut(&page_id)
            .ok_or(ViewError::MetadataMissing {
                page_id: page_id.to_string(),
            })?
            .count += 1;

        // Skip the map write only when the row verifiably still maps to
        // this page; a vacate-and-reinsert into the same page left a
        // tombstone that must be overwritten.
        if existing_page_id != Some(&page_id) || self.store.page_of(rowid)? != Some(page_id.clone())
        {
            self.store.set_mapping(rowid, Some(page_id.clone()));
        }

        self.changes.push(ViewChange::InsertRow {
            key: key.to_owned(),
            group: group.clone(),
            index,
        });
        self.mutated_groups.insert(group.clone());
        self.last_insert_was_first = index == 0;
        self.last_insert_was_last = index == n_before;

        if page_len >= IMMEDIATE_SPLIT_TRIGGER {
            debug!(page = %page_id, len = page_len, "page hit in-transaction split trigger");
            self.split_page(&page_id, IMMEDIATE_SPLIT_TARGET)?;
        }
        Ok(())
    }

    /// Pick the page (and local slot) for a global insertion index.
    ///
    /// An index strictly inside a page goes there. An index on the
    /// boundary between two pages goes to the later page, unless the
    /// earlier one has spare capacity and the later is already full —
    /// keeping later pages fuller so consolidation does less work.
    fn choose_page(&self, group: &GroupId, index: u64) -> Result<(PageId, usize)> {
        let pages = self
            .index
            .pages(group)
            .ok_or_else(|| ViewError::invariant(format!("no pages for group '{group}'")))?;
        let mut offset = 0u64;
        for (i, meta) in pages.iter().enumerate() {
            let end = offset + meta.count as u64;
            if index < end {
                #[allow(clippy::cast_possible_truncation)] // bounded by page count
                return Ok((meta.page_id.clone(), (index - offset) as usize));
            }
            if index == end {
                match pages.get(i + 1) {
                    None => return Ok((meta.page_id.clone(), meta.count)),
                    Some(next) => {
                        if meta.count < PAGE_CAPACITY && next.count >= PAGE_CAPACITY {
                            return Ok((meta.page_id.clone(), meta.count));
                        }
                    }
                }
            }
            offset = end;
        }
        Err(ViewError::invariant(format!(
            "insertion index {index} out of bounds in group '{group}'"
        )))
    }
}
