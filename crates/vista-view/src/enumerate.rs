//! Ranged rowid enumeration with mutation detection.
//!
//! Enumeration yields `(rowid, global index)` pairs, forward or reverse,
//! optionally clipped to a sub-range. The callback receives the
//! connection itself and may mutate the view — but mutating the group
//! being enumerated without requesting stop invalidates the positions
//! already handed out, and is reported as a distinct failure.

use std::ops::{ControlFlow, Range};

use vista_error::{Result, ViewError};
use vista_store::{RowStore, ViewTables};
use vista_types::{Direction, GroupId, PageId, RowId};

use crate::connection::ViewConnection;

impl<T: ViewTables, R: RowStore> ViewConnection<T, R> {
    /// Enumerate every rowid in `group`, in order.
    pub fn enumerate_rowids_in_group<F>(&mut self, group: &GroupId, f: F) -> Result<()>
    where
        F: FnMut(&mut Self, RowId, u64) -> ControlFlow<()>,
    {
        self.enumerate_rowids_in_range(group, None, Direction::Forward, f)
    }

    /// Enumerate the rowids of `group` within an optional range, in the
    /// given direction.
    pub fn enumerate_rowids_in_range<F>(
        &mut self,
        group: &GroupId,
        range: Option<Range<u64>>,
        direction: Direction,
        mut f: F,
    ) -> Result<()>
    where
        F: FnMut(&mut Self, RowId, u64) -> ControlFlow<()>,
    {
        let Some(pages) = self.index.pages(group) else {
            return Ok(());
        };
        // Snapshot the page layout; pages themselves load lazily.
        let layout: Vec<(PageId, u64, usize)> = {
            let mut offset = 0u64;
            pages
                .iter()
                .map(|meta| {
                    let entry = (meta.page_id.clone(), offset, meta.count);
                    offset += meta.count as u64;
                    entry
                })
                .collect()
        };
        let total: u64 = layout.iter().map(|(_, _, count)| *count as u64).sum();
        let clip = match range {
            Some(range) => range.start.min(total)..range.end.min(total),
            None => 0..total,
        };
        if clip.start >= clip.end {
            return Ok(());
        }

        // Arm the mutation detector for this group.
        self.mutated_groups.remove(group);

        let page_order: Vec<&(PageId, u64, usize)> = match direction {
            Direction::Forward => layout.iter().collect(),
            Direction::Reverse => layout.iter().rev().collect(),
        };

        for (page_id, page_offset, count) in page_order {
            let page_start = *page_offset;
            let page_end = page_start + *count as u64;
            let begin = clip.start.max(page_start);
            let end = clip.end.min(page_end);
            if begin >= end {
                continue;
            }
            #[allow(clippy::cast_possible_truncation)] // bounded by page count
            let local = (begin - page_start) as usize..(end - page_start) as usize;

            let page = self.store.page(page_id)?;
            let mut failure: Option<ViewError> = None;
            let mut stopped = false;
            page.enumerate(local, direction, |rowid, local_index| {
                let flow = f(self, rowid, page_start + local_index as u64);
                let requested_stop = matches!(flow, ControlFlow::Break(()));
                if self.mutated_groups.contains(group) && !requested_stop {
                    failure = Some(ViewError::MutatedDuringEnumeration {
                        group: group.to_string(),
                    });
                    return ControlFlow::Break(());
                }
                if requested_stop {
                    stopped = true;
                    return ControlFlow::Break(());
                }
                ControlFlow::Continue(())
            });
            if let Some(err) = failure {
                return Err(err);
            }
            if stopped {
                return Ok(());
            }
        }
        Ok(())
    }

    /// Collect every rowid of `group` in order (convenience for tests
    /// and mirrors).
    pub fn rowids_in_group(&mut self, group: &GroupId) -> Result<Vec<RowId>> {
        let mut rowids = Vec::new();
        self.enumerate_rowids_in_group(group, |_, rowid, _| {
            rowids.push(rowid);
            ControlFlow::Continue(())
        })?;
        Ok(rowids)
    }
}
