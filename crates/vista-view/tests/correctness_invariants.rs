//! Property tests: random mutation sequences preserve the structural
//! invariants, agree with a naive model, and survive reopen.

use std::collections::HashMap;

use proptest::prelude::*;
use vista_store::{MemoryRowStore, MemoryTables, RowStore};
use vista_types::GroupId;
use vista_view::{Grouping, Sorting, ViewConfig, ViewConnection};

type View = ViewConnection<MemoryTables, MemoryRowStore>;

#[derive(Debug, Clone)]
enum Op {
    Put(usize, u8),
    Remove(usize),
    Commit,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..80usize, any::<u8>()).prop_map(|(k, v)| Op::Put(k, v)),
        2 => (0..80usize).prop_map(Op::Remove),
        1 => Just(Op::Commit),
    ]
}

fn grouping() -> Grouping {
    Grouping::by_object(|_key, object| {
        let value = object.first().copied().unwrap_or(0);
        Some(GroupId::new(if value % 2 == 0 { "even" } else { "odd" }))
    })
}

fn sorting() -> Sorting {
    Sorting::by_object(|_group, ka, oa, kb, ob| {
        let va = oa.first().copied().unwrap_or(0);
        let vb = ob.first().copied().unwrap_or(0);
        va.cmp(&vb).then_with(|| ka.cmp(kb))
    })
}

fn open_view(tables: MemoryTables, rows: MemoryRowStore) -> View {
    ViewConnection::open(
        ViewConfig::new("props", 1)
            .grouping(grouping())
            .sorting(sorting()),
        tables,
        rows,
    )
    .unwrap()
}

fn expected_sequences(model: &HashMap<String, u8>) -> HashMap<GroupId, Vec<String>> {
    let mut grouped: HashMap<GroupId, Vec<(u8, String)>> = HashMap::new();
    for (key, value) in model {
        let group = GroupId::new(if value % 2 == 0 { "even" } else { "odd" });
        grouped.entry(group).or_default().push((*value, key.clone()));
    }
    grouped
        .into_iter()
        .map(|(group, mut items)| {
            items.sort();
            (group, items.into_iter().map(|(_, key)| key).collect())
        })
        .collect()
}

fn assert_matches_model(view: &mut View, model: &HashMap<String, u8>) {
    let expected = expected_sequences(model);
    assert_eq!(view.number_of_groups(), expected.len());
    for (group, keys) in &expected {
        let count = view.number_of_keys_in_group(group);
        assert_eq!(count as usize, keys.len(), "count in {group}");
        assert_eq!(&view.keys_in_range(group, 0..count).unwrap(), keys);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_ops_hold_invariants(ops in proptest::collection::vec(op_strategy(), 1..150)) {
        let mut view = open_view(MemoryTables::new(), MemoryRowStore::new());
        let mut model: HashMap<String, u8> = HashMap::new();

        for op in ops {
            match op {
                Op::Put(k, value) => {
                    let key = format!("key{k:02}");
                    let known = model.contains_key(&key);
                    let rowid = view.rows_mut().put(&key, vec![value], Vec::new());
                    if known {
                        view.handle_update_object(rowid, &key, &[value]).unwrap();
                    } else {
                        view.handle_insert(rowid, &key, &[value], &[]).unwrap();
                    }
                    model.insert(key, value);
                }
                Op::Remove(k) => {
                    let key = format!("key{k:02}");
                    if model.remove(&key).is_some() {
                        let rowid = view.rows().rowid_for_key(&key).unwrap().unwrap();
                        view.rows_mut().remove(&key);
                        view.handle_remove(rowid, &key).unwrap();
                    }
                }
                Op::Commit => {
                    view.commit().unwrap();
                    view.verify_invariants().unwrap();
                }
            }
        }

        view.commit().unwrap();
        view.verify_invariants().unwrap();
        assert_matches_model(&mut view, &model);

        // Reopening from the persisted tables reproduces the same view.
        let (tables, rows) = view.close();
        let mut reopened = open_view(tables, rows);
        reopened.verify_invariants().unwrap();
        assert_matches_model(&mut reopened, &model);
    }
}
