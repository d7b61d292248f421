//! Ordered rowid pages and their persisted blob format.
//!
//! The on-disk layout of a page blob is:
//!
//! ```text
//! [magic: 1 byte] [format version: 1 byte] [count: u32 LE]
//! [rowid 0: i64 LE] ... [rowid count-1: i64 LE]
//! [checksum: u64 LE]   -- XXH3 of everything before it
//! ```
//!
//! The format is opaque to the rest of the engine but must stay stable
//! for a given class version of the view tables.

use std::ops::{ControlFlow, Range};

use vista_error::{Result, ViewError};
use vista_types::{Direction, RowId};
use xxhash_rust::xxh3::xxh3_64;

/// Magic byte identifying a page blob.
const PAGE_BLOB_MAGIC: u8 = 0x56; // 'V'

/// Blob layout version.
const PAGE_BLOB_VERSION: u8 = 1;

/// Fixed header size: magic + version + count.
const PAGE_BLOB_HEADER: usize = 6;

/// Trailing checksum size.
const PAGE_BLOB_CHECKSUM: usize = 8;

/// An ordered sequence of rowids.
///
/// Soft capacity is [`vista_types::limits::PAGE_CAPACITY`]; a page may
/// transiently exceed it inside a transaction. The page itself enforces
/// nothing — sizing is the consolidation pass's job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    rowids: Vec<RowId>,
}

impl Page {
    /// Create an empty page.
    #[must_use]
    pub const fn new() -> Self {
        Self { rowids: Vec::new() }
    }

    /// Create a page holding the given rowids in order.
    #[must_use]
    pub fn from_rowids(rowids: Vec<RowId>) -> Self {
        Self { rowids }
    }

    /// Number of rowids in the page.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.rowids.len()
    }

    /// Whether the page is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rowids.is_empty()
    }

    /// The rowids in order.
    #[inline]
    #[must_use]
    pub fn rowids(&self) -> &[RowId] {
        &self.rowids
    }

    /// Insert `rowid` at `index`, shifting later entries right.
    ///
    /// `index` must be in `0..=len`.
    pub fn insert_at(&mut self, index: usize, rowid: RowId) {
        debug_assert!(index <= self.rowids.len());
        self.rowids.insert(index, rowid);
    }

    /// Remove and return the rowid at `index`, shifting later entries left.
    ///
    /// `index` must be in `0..len`.
    pub fn remove_at(&mut self, index: usize) -> RowId {
        debug_assert!(index < self.rowids.len());
        self.rowids.remove(index)
    }

    /// The rowid at `index`, if in bounds.
    #[inline]
    #[must_use]
    pub fn rowid_at(&self, index: usize) -> Option<RowId> {
        self.rowids.get(index).copied()
    }

    /// Position of `rowid` within the page.
    ///
    /// Rowids are unique within a page (and across the whole view), so a
    /// linear scan over at most a few dozen entries is fine.
    #[must_use]
    pub fn index_of(&self, rowid: RowId) -> Option<usize> {
        self.rowids.iter().position(|&r| r == rowid)
    }

    /// Remove and return the contiguous `range` of rowids.
    pub fn remove_range(&mut self, range: Range<usize>) -> Vec<RowId> {
        debug_assert!(range.end <= self.rowids.len());
        self.rowids.drain(range).collect()
    }

    /// Move the contiguous `range` out of `other` onto the end of `self`,
    /// preserving order.
    pub fn append_range(&mut self, other: &mut Self, range: Range<usize>) {
        let moved = other.remove_range(range);
        self.rowids.extend(moved);
    }

    /// Move the contiguous `range` out of `other` onto the front of
    /// `self`, preserving order.
    pub fn prepend_range(&mut self, other: &mut Self, range: Range<usize>) {
        let moved = other.remove_range(range);
        self.rowids.splice(0..0, moved);
    }

    /// Visit `(rowid, local index)` pairs within `range` in the given
    /// direction. Stops early when the callback breaks.
    pub fn enumerate<F>(&self, range: Range<usize>, direction: Direction, mut f: F) -> ControlFlow<()>
    where
        F: FnMut(RowId, usize) -> ControlFlow<()>,
    {
        debug_assert!(range.end <= self.rowids.len());
        match direction {
            Direction::Forward => {
                for index in range {
                    f(self.rowids[index], index)?;
                }
            }
            Direction::Reverse => {
                for index in range.rev() {
                    f(self.rowids[index], index)?;
                }
            }
        }
        ControlFlow::Continue(())
    }

    /// Serialize the page to its blob form.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut blob = Vec::with_capacity(PAGE_BLOB_HEADER + self.rowids.len() * 8 + PAGE_BLOB_CHECKSUM);
        blob.push(PAGE_BLOB_MAGIC);
        blob.push(PAGE_BLOB_VERSION);
        #[allow(clippy::cast_possible_truncation)] // page counts are far below u32::MAX
        let count = self.rowids.len() as u32;
        blob.extend_from_slice(&count.to_le_bytes());
        for rowid in &self.rowids {
            blob.extend_from_slice(&rowid.get().to_le_bytes());
        }
        let checksum = xxh3_64(&blob);
        blob.extend_from_slice(&checksum.to_le_bytes());
        blob
    }

    /// Deserialize a page blob.
    ///
    /// Malformed input (wrong magic, unknown version, truncated payload,
    /// checksum mismatch) is corruption.
    pub fn decode(blob: &[u8]) -> Result<Self> {
        if blob.len() < PAGE_BLOB_HEADER + PAGE_BLOB_CHECKSUM {
            return Err(ViewError::corrupt(format!(
                "page blob too small: {} bytes",
                blob.len()
            )));
        }
        if blob[0] != PAGE_BLOB_MAGIC {
            return Err(ViewError::corrupt(format!(
                "bad page blob magic: 0x{:02x}",
                blob[0]
            )));
        }
        if blob[1] != PAGE_BLOB_VERSION {
            return Err(ViewError::corrupt(format!(
                "unsupported page blob version: {}",
                blob[1]
            )));
        }
        let count_bytes: [u8; 4] = blob[2..6].try_into().expect("sliced 4 bytes");
        let count = u32::from_le_bytes(count_bytes) as usize;
        let expected = PAGE_BLOB_HEADER + count * 8 + PAGE_BLOB_CHECKSUM;
        if blob.len() != expected {
            return Err(ViewError::corrupt(format!(
                "page blob length {} does not match count {count}",
                blob.len()
            )));
        }
        let payload_end = blob.len() - PAGE_BLOB_CHECKSUM;
        let stored_bytes: [u8; 8] = blob[payload_end..].try_into().expect("sliced 8 bytes");
        let stored = u64::from_le_bytes(stored_bytes);
        let computed = xxh3_64(&blob[..payload_end]);
        if stored != computed {
            return Err(ViewError::corrupt(format!(
                "page blob checksum mismatch: stored {stored:#018x}, computed {computed:#018x}"
            )));
        }
        let mut rowids = Vec::with_capacity(count);
        let mut pos = PAGE_BLOB_HEADER;
        for _ in 0..count {
            let raw: [u8; 8] = blob[pos..pos + 8].try_into().expect("sliced 8 bytes");
            rowids.push(RowId::new(i64::from_le_bytes(raw)));
            pos += 8;
        }
        Ok(Self { rowids })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_of(raw: &[i64]) -> Page {
        Page::from_rowids(raw.iter().copied().map(RowId::new).collect())
    }

    fn raw(page: &Page) -> Vec<i64> {
        page.rowids().iter().map(|r| r.get()).collect()
    }

    #[test]
    fn insert_and_remove_shift() {
        let mut page = page_of(&[10, 30]);
        page.insert_at(1, RowId::new(20));
        assert_eq!(raw(&page), vec![10, 20, 30]);
        assert_eq!(page.remove_at(0).get(), 10);
        assert_eq!(raw(&page), vec![20, 30]);
    }

    #[test]
    fn index_of_finds_position() {
        let page = page_of(&[5, 6, 7]);
        assert_eq!(page.index_of(RowId::new(6)), Some(1));
        assert_eq!(page.index_of(RowId::new(99)), None);
        assert_eq!(page.rowid_at(2), Some(RowId::new(7)));
        assert_eq!(page.rowid_at(3), None);
    }

    #[test]
    fn append_range_moves_slice() {
        let mut dst = page_of(&[1, 2]);
        let mut src = page_of(&[3, 4, 5, 6]);
        dst.append_range(&mut src, 0..2);
        assert_eq!(raw(&dst), vec![1, 2, 3, 4]);
        assert_eq!(raw(&src), vec![5, 6]);
    }

    #[test]
    fn prepend_range_moves_slice() {
        let mut dst = page_of(&[5, 6]);
        let mut src = page_of(&[1, 2, 3, 4]);
        dst.prepend_range(&mut src, 2..4);
        assert_eq!(raw(&dst), vec![3, 4, 5, 6]);
        assert_eq!(raw(&src), vec![1, 2]);
    }

    #[test]
    fn remove_range_returns_removed() {
        let mut page = page_of(&[1, 2, 3, 4, 5]);
        let removed = page.remove_range(1..4);
        assert_eq!(removed.iter().map(|r| r.get()).collect::<Vec<_>>(), vec![2, 3, 4]);
        assert_eq!(raw(&page), vec![1, 5]);
    }

    #[test]
    fn enumerate_forward_and_reverse() {
        let page = page_of(&[10, 20, 30, 40]);
        let mut seen = Vec::new();
        let flow = page.enumerate(1..3, Direction::Forward, |rowid, index| {
            seen.push((rowid.get(), index));
            ControlFlow::Continue(())
        });
        assert!(matches!(flow, ControlFlow::Continue(())));
        assert_eq!(seen, vec![(20, 1), (30, 2)]);

        seen.clear();
        page.enumerate(0..4, Direction::Reverse, |rowid, index| {
            seen.push((rowid.get(), index));
            ControlFlow::Continue(())
        });
        assert_eq!(seen, vec![(40, 3), (30, 2), (20, 1), (10, 0)]);
    }

    #[test]
    fn enumerate_stops_on_break() {
        let page = page_of(&[1, 2, 3]);
        let mut seen = 0;
        let flow = page.enumerate(0..3, Direction::Forward, |_, _| {
            seen += 1;
            ControlFlow::Break(())
        });
        assert!(matches!(flow, ControlFlow::Break(())));
        assert_eq!(seen, 1);
    }

    #[test]
    fn blob_roundtrip() {
        let page = page_of(&[i64::MIN, -1, 0, 1, i64::MAX]);
        let decoded = Page::decode(&page.encode()).unwrap();
        assert_eq!(decoded, page);

        let empty = Page::new();
        assert_eq!(Page::decode(&empty.encode()).unwrap(), empty);
    }

    #[test]
    fn decode_rejects_bad_magic() {
        let mut blob = page_of(&[1]).encode();
        blob[0] = 0x00;
        let err = Page::decode(&blob).unwrap_err();
        assert!(err.requires_rebuild());
    }

    #[test]
    fn decode_rejects_flipped_payload() {
        let mut blob = page_of(&[1, 2, 3]).encode();
        blob[7] ^= 0xff; // corrupt a rowid byte, leaving length intact
        let err = Page::decode(&blob).unwrap_err();
        assert!(err.to_string().contains("checksum"));
    }

    #[test]
    fn decode_rejects_truncation() {
        let blob = page_of(&[1, 2, 3]).encode();
        assert!(Page::decode(&blob[..blob.len() - 1]).is_err());
        assert!(Page::decode(&blob[..4]).is_err());
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn blob_roundtrip_any_rowids(raw in proptest::collection::vec(any::<i64>(), 0..200)) {
                let page = page_of(&raw);
                let decoded = Page::decode(&page.encode()).unwrap();
                prop_assert_eq!(decoded, page);
            }

            #[test]
            fn single_bit_flip_is_detected(
                raw in proptest::collection::vec(any::<i64>(), 1..50),
                byte_index: prop::sample::Index,
                bit in 0u8..8,
            ) {
                let page = page_of(&raw);
                let mut blob = page.encode();
                let flip_at = byte_index.index(blob.len());
                blob[flip_at] ^= 1 << bit;
                // A flip in the payload or header trips the checksum or
                // the header checks; a flip in the stored checksum
                // mismatches the recomputed one.
                prop_assert!(Page::decode(&blob).is_err());
            }
        }
    }
}
