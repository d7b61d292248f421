//! Registry-driven lifecycle: table-layout changes, config version
//! bumps, and corruption on open.

use vista_error::ViewError;
use vista_store::{MemoryRowStore, MemoryTables, PageRecord, ViewTables};
use vista_types::limits::{CLASS_VERSION, REGISTRY_CLASS_VERSION, REGISTRY_VERSION};
use vista_types::{GroupId, PageId};
use vista_view::{Grouping, Sorting, ViewConfig, ViewConnection};

fn group_from_object() -> Grouping {
    Grouping::by_object(|_key, object| {
        std::str::from_utf8(object).ok().map(GroupId::new)
    })
}

fn by_key() -> Sorting {
    Sorting::by_key(|_group, a, b| a.cmp(b))
}

fn seeded_rows() -> MemoryRowStore {
    let mut rows = MemoryRowStore::new();
    rows.put("a", b"left".to_vec(), Vec::new());
    rows.put("b", b"left".to_vec(), Vec::new());
    rows.put("c", b"right".to_vec(), Vec::new());
    rows
}

#[test]
fn fresh_open_populates_from_primary_store() {
    let view = ViewConnection::open(
        ViewConfig::new("v", 1).grouping(group_from_object()).sorting(by_key()),
        MemoryTables::new(),
        seeded_rows(),
    )
    .unwrap();

    assert_eq!(view.number_of_keys_in_all_groups(), 3);
    assert_eq!(
        view.all_groups(),
        vec![GroupId::new("left"), GroupId::new("right")]
    );
    assert_eq!(
        view.tables().read_registry(REGISTRY_CLASS_VERSION).unwrap(),
        Some(CLASS_VERSION)
    );
    assert_eq!(view.tables().read_registry(REGISTRY_VERSION).unwrap(), Some(1));
}

#[test]
fn old_table_layout_is_dropped_and_rebuilt() {
    let mut tables = MemoryTables::new();
    tables.write_registry(REGISTRY_CLASS_VERSION, 2).unwrap();
    tables.write_registry(REGISTRY_VERSION, 1).unwrap();
    // A leftover row in the old layout; its blob is not even a valid
    // page encoding.
    tables
        .insert_page(&PageRecord {
            page_id: PageId::from("stale"),
            group: GroupId::new("left"),
            prev_page_id: None,
            count: 9,
            data: vec![0xde, 0xad],
        })
        .unwrap();

    let mut view = ViewConnection::open(
        ViewConfig::new("v", 1).grouping(group_from_object()).sorting(by_key()),
        tables,
        seeded_rows(),
    )
    .unwrap();

    assert_eq!(
        view.tables().read_registry(REGISTRY_CLASS_VERSION).unwrap(),
        Some(CLASS_VERSION)
    );
    assert_eq!(view.number_of_keys_in_all_groups(), 3);
    assert!(view
        .tables()
        .read_page_data(&PageId::from("stale"))
        .unwrap()
        .is_none());
    view.verify_invariants().unwrap();
}

#[test]
fn config_version_bump_repopulates() {
    let view = ViewConnection::open(
        ViewConfig::new("v", 1).grouping(group_from_object()).sorting(by_key()),
        MemoryTables::new(),
        seeded_rows(),
    )
    .unwrap();
    let (tables, mut rows) = view.close();

    // A row appears while the view is closed; no hook ever fires for it.
    rows.put("d", b"right".to_vec(), Vec::new());

    // Same version: the stale view is trusted as-is.
    let view = ViewConnection::open(
        ViewConfig::new("v", 1).grouping(group_from_object()).sorting(by_key()),
        tables,
        rows,
    )
    .unwrap();
    assert_eq!(view.number_of_keys_in_all_groups(), 3);
    let (tables, rows) = view.close();

    // Bumped version: full repopulation picks the new row up.
    let mut view = ViewConnection::open(
        ViewConfig::new("v", 2).grouping(group_from_object()).sorting(by_key()),
        tables,
        rows,
    )
    .unwrap();
    assert_eq!(view.number_of_keys_in_all_groups(), 4);
    assert_eq!(
        view.keys_in_range(&GroupId::new("right"), 0..10).unwrap(),
        vec!["c", "d"]
    );
    view.verify_invariants().unwrap();
}

#[test]
fn broken_page_chain_fails_open() {
    let mut tables = MemoryTables::new();
    tables
        .write_registry(REGISTRY_CLASS_VERSION, CLASS_VERSION)
        .unwrap();
    tables.write_registry(REGISTRY_VERSION, 1).unwrap();
    // Two pages both claiming to be the chain start.
    for id in ["p1", "p2"] {
        tables
            .insert_page(&PageRecord {
                page_id: PageId::from(id),
                group: GroupId::new("left"),
                prev_page_id: None,
                count: 1,
                data: Vec::new(),
            })
            .unwrap();
    }

    let err = ViewConnection::open(
        ViewConfig::new("v", 1).grouping(group_from_object()).sorting(by_key()),
        tables,
        seeded_rows(),
    )
    .unwrap_err();
    assert!(matches!(err, ViewError::Corrupt { .. }));
    assert!(err.requires_rebuild());
}
