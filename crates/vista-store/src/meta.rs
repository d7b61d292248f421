//! Per-page descriptors.

use vista_types::{GroupId, PageId};

/// Descriptor of one page: identity, owning group, link to the previous
/// page in the group, and the at-rest rowid count.
///
/// `count` mirrors the referenced page's length; the engine keeps the two
/// in lock-step whenever a page is mutated. `is_new` is true from
/// construction until the first successful commit persists the row.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PageMetadata {
    pub page_id: PageId,
    pub group: GroupId,
    pub prev_page_id: Option<PageId>,
    pub count: usize,
    pub is_new: bool,
}

impl PageMetadata {
    /// Descriptor for a page created this transaction.
    #[must_use]
    pub const fn fresh(
        page_id: PageId,
        group: GroupId,
        prev_page_id: Option<PageId>,
        count: usize,
    ) -> Self {
        Self {
            page_id,
            group,
            prev_page_id,
            count,
            is_new: true,
        }
    }

    /// Descriptor rebuilt from a persisted page-table row.
    #[must_use]
    pub const fn persisted(
        page_id: PageId,
        group: GroupId,
        prev_page_id: Option<PageId>,
        count: usize,
    ) -> Self {
        Self {
            page_id,
            group,
            prev_page_id,
            count,
            is_new: false,
        }
    }
}
