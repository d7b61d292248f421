//! Read-side operations: group/key/index lookups and range finding.
//!
//! All lookups take `&mut self` because loading a page may populate the
//! clean cache.

use std::cmp::Ordering;
use std::ops::Range;

use vista_error::{Result, ViewError};
use vista_store::{RowStore, ViewTables};
use vista_types::{Direction, GroupId, PageId, RowId};

use crate::connection::ViewConnection;
use crate::predicate::Finding;
use crate::row::OwnedRow;

impl<T: ViewTables, R: RowStore> ViewConnection<T, R> {
    // -- counts ----------------------------------------------------------

    /// Number of non-empty groups.
    #[must_use]
    pub fn number_of_groups(&self) -> usize {
        self.index.number_of_groups()
    }

    /// All groups, sorted by label.
    #[must_use]
    pub fn all_groups(&self) -> Vec<GroupId> {
        self.index.sorted_groups()
    }

    /// Number of rows in `group`.
    #[must_use]
    pub fn number_of_keys_in_group(&self, group: &GroupId) -> u64 {
        self.index.count_in_group(group)
    }

    /// Number of rows across every group.
    #[must_use]
    pub fn number_of_keys_in_all_groups(&self) -> u64 {
        self.index.total_count()
    }

    // -- point lookups ---------------------------------------------------

    /// The rowid at `(group, index)`, or `None` when out of bounds.
    pub fn rowid_at_index(&mut self, group: &GroupId, index: u64) -> Result<Option<RowId>> {
        let Some((page_id, local)) = self.locate_opt(group, index)? else {
            return Ok(None);
        };
        let page = self.store.page(&page_id)?;
        let rowid = page.rowid_at(local).ok_or_else(|| {
            ViewError::invariant(format!(
                "page '{page_id}' shorter than its recorded count"
            ))
        })?;
        Ok(Some(rowid))
    }

    /// The key at `(group, index)`, or `None` when out of bounds.
    pub fn key_at_index(&mut self, group: &GroupId, index: u64) -> Result<Option<String>> {
        let Some(rowid) = self.rowid_at_index(group, index)? else {
            return Ok(None);
        };
        let key = self
            .rows
            .key_for_rowid(rowid)?
            .ok_or(ViewError::RowMissing { rowid: rowid.get() })?;
        Ok(Some(key))
    }

    /// The group containing `key`, or `None` when the key is absent from
    /// the view.
    pub fn group_for_key(&mut self, key: &str) -> Result<Option<GroupId>> {
        let Some(rowid) = self.rows.rowid_for_key(key)? else {
            return Ok(None);
        };
        let Some(page_id) = self.store.page_of(rowid)? else {
            return Ok(None);
        };
        let group = self
            .index
            .group_for_page(&page_id)
            .cloned()
            .ok_or(ViewError::MetadataMissing {
                page_id: page_id.to_string(),
            })?;
        Ok(Some(group))
    }

    /// The `(group, index)` position of `key`, or `None` when absent.
    pub fn group_and_index_for_key(&mut self, key: &str) -> Result<Option<(GroupId, u64)>> {
        let Some(rowid) = self.rows.rowid_for_key(key)? else {
            return Ok(None);
        };
        let Some(page_id) = self.store.page_of(rowid)? else {
            return Ok(None);
        };
        let group = self
            .index
            .group_for_page(&page_id)
            .cloned()
            .ok_or(ViewError::MetadataMissing {
                page_id: page_id.to_string(),
            })?;
        let index = self.index_of_rowid(&group, &page_id, rowid)?;
        Ok(Some((group, index)))
    }

    /// The keys at `range` within `group`, in order.
    pub fn keys_in_range(&mut self, group: &GroupId, range: Range<u64>) -> Result<Vec<String>> {
        let mut rowids = Vec::new();
        self.enumerate_rowids_in_range(group, Some(range), Direction::Forward, |_, rowid, _| {
            rowids.push(rowid);
            std::ops::ControlFlow::Continue(())
        })?;
        let mut keys = Vec::with_capacity(rowids.len());
        for rowid in rowids {
            keys.push(
                self.rows
                    .key_for_rowid(rowid)?
                    .ok_or(ViewError::RowMissing { rowid: rowid.get() })?,
            );
        }
        Ok(keys)
    }

    // -- range finding ---------------------------------------------------

    /// Find the contiguous run of rows inside the finding predicate's
    /// target range, as `[start, end)` positions in `group`.
    ///
    /// Three binary searches: first any hit, then the leftmost hit, then
    /// one past the rightmost hit. Returns `None` when no row matches.
    pub fn find_range_in_group(
        &mut self,
        group: &GroupId,
        finding: &Finding,
    ) -> Result<Option<Range<u64>>> {
        let n = self.index.count_in_group(group);
        if n == 0 {
            return Ok(None);
        }

        // Any hit.
        let mut lo = 0u64;
        let mut hi = n;
        let mut hit = None;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.find_cmp(group, finding, mid)? {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => {
                    hit = Some(mid);
                    break;
                }
            }
        }
        let Some(any) = hit else {
            return Ok(None);
        };

        // Leftmost hit in [0, any].
        let mut lo = 0u64;
        let mut hi = any;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.find_cmp(group, finding, mid)? == Ordering::Less {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        let start = lo;

        // One past the rightmost hit in [any, n].
        let mut lo = any;
        let mut hi = n;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.find_cmp(group, finding, mid)? == Ordering::Greater {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        Ok(Some(start..lo))
    }

    /// Compare the row at `position` against the finding predicate's
    /// target range.
    fn find_cmp(&mut self, group: &GroupId, finding: &Finding, position: u64) -> Result<Ordering> {
        let (page_id, local) = self.locate(group, position)?;
        let page = self.store.page(&page_id)?;
        let rowid = page.rowid_at(local).ok_or_else(|| {
            ViewError::invariant(format!(
                "page '{page_id}' shorter than its recorded count"
            ))
        })?;
        let row = OwnedRow::fetch(
            &self.rows,
            rowid,
            None,
            finding.arity().needs_object(),
            finding.arity().needs_metadata(),
        )?;
        Ok(finding.evaluate(group, &row.data()))
    }

    // -- position helpers ------------------------------------------------

    /// The `(page, local index)` holding global `position` in `group`.
    ///
    /// `position` must be within bounds.
    pub(crate) fn locate(&self, group: &GroupId, position: u64) -> Result<(PageId, usize)> {
        self.locate_opt(group, position)?.ok_or_else(|| {
            ViewError::invariant(format!(
                "position {position} out of bounds in group '{group}'"
            ))
        })
    }

    pub(crate) fn locate_opt(
        &self,
        group: &GroupId,
        position: u64,
    ) -> Result<Option<(PageId, usize)>> {
        let Some(pages) = self.index.pages(group) else {
            return Ok(None);
        };
        let mut offset = 0u64;
        for meta in pages {
            let end = offset + meta.count as u64;
            if position < end {
                #[allow(clippy::cast_possible_truncation)] // bounded by page count
                return Ok(Some((meta.page_id.clone(), (position - offset) as usize)));
            }
            offset = end;
        }
        Ok(None)
    }

    /// Sum of the counts of the pages before `page_id` in `group`.
    pub(crate) fn page_offset(&self, group: &GroupId, page_id: &PageId) -> Result<u64> {
        let pages = self
            .index
            .pages(group)
            .ok_or_else(|| ViewError::invariant(format!("no pages for group '{group}'")))?;
        let mut offset = 0u64;
        for meta in pages {
            if &meta.page_id == page_id {
                return Ok(offset);
            }
            offset += meta.count as u64;
        }
        Err(ViewError::MetadataMissing {
            page_id: page_id.to_string(),
        })
    }

    /// Global position of `rowid`, known to live in `page_id` of `group`.
    pub(crate) fn index_of_rowid(
        &mut self,
        group: &GroupId,
        page_id: &PageId,
        rowid: RowId,
    ) -> Result<u64> {
        let offset = self.page_offset(group, page_id)?;
        let page = self.store.page(page_id)?;
        let local = page.index_of(rowid).ok_or_else(|| {
            ViewError::invariant(format!("page '{page_id}' missing expected rowid {rowid}"))
        })?;
        Ok(offset + local as u64)
    }
}
