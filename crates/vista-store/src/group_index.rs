//! In-memory index of every group's ordered page list.
//!
//! Persistently, the per-group page order exists only as `prevPageKey`
//! links in the page table. On open the links are walked once into an
//! ordered `Vec<PageMetadata>` per group; afterwards the engine works
//! purely against these lists and mirrors changes back at commit.

use std::collections::HashMap;

use tracing::debug;
use vista_error::{Result, ViewError};
use vista_types::{GroupId, PageId};

use crate::meta::PageMetadata;
use crate::tables::PageHeader;

/// Group → ordered page list, plus the reverse page → group map.
///
/// The first page of each list has `prev_page_id = None`; element `i + 1`
/// links back to element `i`.
#[derive(Debug, Clone, Default)]
pub struct GroupIndex {
    group_pages: HashMap<GroupId, Vec<PageMetadata>>,
    page_groups: HashMap<PageId, GroupId>,
}

impl GroupIndex {
    /// An empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the index from persisted page headers.
    ///
    /// For each group a `prev → page` link map is built and walked from
    /// the `None` sentinel. A broken chain is corruption: two pages
    /// sharing a predecessor, a chain longer than the group's page count
    /// (a cycle), or pages unreachable from the chain start. Any error
    /// leaves the caller with no partial index.
    pub fn build(headers: &[PageHeader]) -> Result<Self> {
        let mut by_group: HashMap<&GroupId, Vec<&PageHeader>> = HashMap::new();
        for header in headers {
            by_group.entry(&header.group).or_default().push(header);
        }

        let mut index = Self::new();
        for (group, group_headers) in by_group {
            let mut links: HashMap<Option<&PageId>, &PageHeader> =
                HashMap::with_capacity(group_headers.len());
            for &header in &group_headers {
                if let Some(previous) = links.insert(header.prev_page_id.as_ref(), header) {
                    return Err(ViewError::corrupt(format!(
                        "invalid page ordering in group '{group}': pages '{}' and '{}' share a predecessor",
                        previous.page_id, header.page_id
                    )));
                }
            }

            let mut chain: Vec<PageMetadata> = Vec::with_capacity(group_headers.len());
            let mut cursor = links.get(&None).copied();
            while let Some(header) = cursor {
                if chain.len() >= group_headers.len() {
                    return Err(ViewError::corrupt(format!(
                        "circular page ordering in group '{group}'"
                    )));
                }
                chain.push(PageMetadata::persisted(
                    header.page_id.clone(),
                    header.group.clone(),
                    header.prev_page_id.clone(),
                    usize::try_from(header.count).map_err(|_| {
                        ViewError::corrupt(format!(
                            "page '{}' has impossible count {}",
                            header.page_id, header.count
                        ))
                    })?,
                ));
                cursor = links.get(&Some(&header.page_id)).copied();
            }

            if chain.len() < group_headers.len() {
                return Err(ViewError::corrupt(format!(
                    "group '{group}': {} page(s) unreachable from the chain start",
                    group_headers.len() - chain.len()
                )));
            }

            for meta in &chain {
                index.page_groups.insert(meta.page_id.clone(), group.clone());
            }
            index.group_pages.insert(group.clone(), chain);
        }

        debug!(
            groups = index.group_pages.len(),
            pages = index.page_groups.len(),
            "group index rebuilt from page table"
        );
        Ok(index)
    }

    // -- group access --------------------------------------------------

    /// Number of non-empty groups.
    #[must_use]
    pub fn number_of_groups(&self) -> usize {
        self.group_pages.len()
    }

    /// All groups, sorted by label for deterministic output.
    #[must_use]
    pub fn sorted_groups(&self) -> Vec<GroupId> {
        let mut groups: Vec<GroupId> = self.group_pages.keys().cloned().collect();
        groups.sort();
        groups
    }

    /// Whether `group` currently has pages.
    #[must_use]
    pub fn contains_group(&self, group: &GroupId) -> bool {
        self.group_pages.contains_key(group)
    }

    /// The ordered page list of `group`.
    #[must_use]
    pub fn pages(&self, group: &GroupId) -> Option<&[PageMetadata]> {
        self.group_pages.get(group).map(Vec::as_slice)
    }

    /// Mutable ordered page list of `group`.
    pub fn pages_mut(&mut self, group: &GroupId) -> Option<&mut Vec<PageMetadata>> {
        self.group_pages.get_mut(group)
    }

    /// Install a brand-new group with its page list, registering every
    /// page in the reverse map.
    pub fn insert_group(&mut self, group: GroupId, pages: Vec<PageMetadata>) {
        for meta in &pages {
            self.page_groups.insert(meta.page_id.clone(), group.clone());
        }
        self.group_pages.insert(group, pages);
    }

    /// Drop a group and every reverse-map entry of its pages.
    pub fn remove_group(&mut self, group: &GroupId) {
        if let Some(pages) = self.group_pages.remove(group) {
            for meta in &pages {
                self.page_groups.remove(&meta.page_id);
            }
        }
    }

    /// Total rowids in `group` (0 when absent).
    #[must_use]
    pub fn count_in_group(&self, group: &GroupId) -> u64 {
        self.group_pages
            .get(group)
            .map(|pages| pages.iter().map(|meta| meta.count as u64).sum())
            .unwrap_or(0)
    }

    /// Total rowids across all groups.
    #[must_use]
    pub fn total_count(&self) -> u64 {
        self.group_pages
            .values()
            .flat_map(|pages| pages.iter())
            .map(|meta| meta.count as u64)
            .sum()
    }

    // -- page access ---------------------------------------------------

    /// Which group a page belongs to.
    #[must_use]
    pub fn group_for_page(&self, page_id: &PageId) -> Option<&GroupId> {
        self.page_groups.get(page_id)
    }

    /// Register a page in the reverse map (new pages from splits).
    pub fn register_page(&mut self, page_id: PageId, group: GroupId) {
        self.page_groups.insert(page_id, group);
    }

    /// Remove a page from the reverse map.
    pub fn unregister_page(&mut self, page_id: &PageId) {
        self.page_groups.remove(page_id);
    }

    /// Position of a page within its group's list.
    #[must_use]
    pub fn position_of_page(&self, group: &GroupId, page_id: &PageId) -> Option<usize> {
        self.group_pages
            .get(group)?
            .iter()
            .position(|meta| &meta.page_id == page_id)
    }

    /// Metadata of a page.
    #[must_use]
    pub fn meta(&self, page_id: &PageId) -> Option<&PageMetadata> {
        let group = self.page_groups.get(page_id)?;
        self.group_pages
            .get(group)?
            .iter()
            .find(|meta| &meta.page_id == page_id)
    }

    /// Mutable metadata of a page.
    pub fn meta_mut(&mut self, page_id: &PageId) -> Option<&mut PageMetadata> {
        let group = self.page_groups.get(page_id)?.clone();
        self.group_pages
            .get_mut(&group)?
            .iter_mut()
            .find(|meta| &meta.page_id == page_id)
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.group_pages.clear();
        self.page_groups.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(id: &str, group: &str, prev: Option<&str>, count: u64) -> PageHeader {
        PageHeader {
            page_id: PageId::from(id),
            group: GroupId::new(group),
            prev_page_id: prev.map(PageId::from),
            count,
        }
    }

    #[test]
    fn build_orders_by_links_not_input_order() {
        // Input deliberately shuffled: c -> b -> a is the link order.
        let headers = vec![
            header("b", "g", Some("a"), 2),
            header("a", "g", None, 1),
            header("c", "g", Some("b"), 3),
        ];
        let index = GroupIndex::build(&headers).unwrap();
        let pages = index.pages(&GroupId::new("g")).unwrap();
        let ids: Vec<&str> = pages.iter().map(|m| m.page_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(index.count_in_group(&GroupId::new("g")), 6);
        assert!(!pages[0].is_new);
        assert_eq!(
            index.group_for_page(&PageId::from("c")),
            Some(&GroupId::new("g"))
        );
    }

    #[test]
    fn build_multiple_groups() {
        let headers = vec![
            header("a", "g1", None, 1),
            header("x", "g2", None, 4),
            header("y", "g2", Some("x"), 5),
        ];
        let index = GroupIndex::build(&headers).unwrap();
        assert_eq!(index.number_of_groups(), 2);
        assert_eq!(index.total_count(), 10);
        assert_eq!(
            index.sorted_groups(),
            vec![GroupId::new("g1"), GroupId::new("g2")]
        );
    }

    #[test]
    fn build_rejects_shared_predecessor() {
        let headers = vec![
            header("a", "g", None, 1),
            header("b", "g", Some("a"), 1),
            header("c", "g", Some("a"), 1),
        ];
        let err = GroupIndex::build(&headers).unwrap_err();
        assert!(err.to_string().contains("share a predecessor"), "{err}");
        assert!(err.requires_rebuild());
    }

    #[test]
    fn build_rejects_missing_start() {
        // a -> b -> a: no page has prev = None.
        let headers = vec![header("a", "g", Some("b"), 1), header("b", "g", Some("a"), 1)];
        let err = GroupIndex::build(&headers).unwrap_err();
        assert!(err.to_string().contains("unreachable"), "{err}");
    }

    #[test]
    fn build_rejects_detached_tail() {
        // Chain a, plus b and c linked to each other but not to a.
        let headers = vec![
            header("a", "g", None, 1),
            header("b", "g", Some("z"), 1),
            header("c", "g", Some("b"), 1),
        ];
        let err = GroupIndex::build(&headers).unwrap_err();
        assert!(err.to_string().contains("unreachable"), "{err}");
    }

    #[test]
    fn group_mutation_roundtrip() {
        let mut index = GroupIndex::new();
        let g = GroupId::new("g");
        let meta = PageMetadata::fresh(PageId::from("a"), g.clone(), None, 1);
        index.insert_group(g.clone(), vec![meta]);
        assert!(index.contains_group(&g));
        assert_eq!(index.position_of_page(&g, &PageId::from("a")), Some(0));

        index.meta_mut(&PageId::from("a")).unwrap().count = 7;
        assert_eq!(index.meta(&PageId::from("a")).unwrap().count, 7);

        index.remove_group(&g);
        assert!(!index.contains_group(&g));
        assert_eq!(index.group_for_page(&PageId::from("a")), None);
    }

    #[test]
    fn empty_build() {
        let index = GroupIndex::build(&[]).unwrap();
        assert_eq!(index.number_of_groups(), 0);
        assert_eq!(index.total_count(), 0);
    }
}
