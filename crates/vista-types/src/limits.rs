//! Compile-time tunables for the paged view engine.

/// Target maximum number of rowids per page at rest.
///
/// Pages may transiently exceed this during a transaction; the pre-commit
/// consolidation pass restores it.
pub const PAGE_CAPACITY: usize = 50;

/// In-transaction page size that forces an immediate split.
///
/// A page that reaches this size is split right away rather than waiting
/// for pre-commit, bounding worst-case insert cost during bulk loads.
pub const IMMEDIATE_SPLIT_TRIGGER: usize = PAGE_CAPACITY * 32;

/// Split target used by the immediate in-transaction split.
///
/// Deliberately looser than [`PAGE_CAPACITY`] so runaway growth is tamed
/// without rebalancing on every insert.
pub const IMMEDIATE_SPLIT_TARGET: usize = PAGE_CAPACITY * 16;

/// Bounded clean-cache capacity for decoded pages.
pub const PAGE_CACHE_CAPACITY: usize = 512;

/// Bounded clean-cache capacity for rowid → page-id mappings.
pub const MAP_CACHE_CAPACITY: usize = 4096;

/// On-disk layout version of the view tables.
///
/// Version 2 replaced the key-based map table with a rowid-based one;
/// version 3 expanded the page table from a single metadata blob into
/// columnar (group, prev, count, data) form. A mismatch drops and
/// rebuilds the tables.
pub const CLASS_VERSION: i64 = 3;

/// Registry key under which [`CLASS_VERSION`] is stored.
pub const REGISTRY_CLASS_VERSION: &str = "classVersion";

/// Registry key under which the user-supplied config version is stored.
///
/// Bumping it triggers a full repopulation while keeping the tables.
pub const REGISTRY_VERSION: &str = "version";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_trigger_is_above_capacity() {
        assert!(IMMEDIATE_SPLIT_TRIGGER > IMMEDIATE_SPLIT_TARGET);
        assert!(IMMEDIATE_SPLIT_TARGET > PAGE_CAPACITY);
        assert_eq!(IMMEDIATE_SPLIT_TRIGGER, 1600);
        assert_eq!(IMMEDIATE_SPLIT_TARGET, 800);
    }
}
