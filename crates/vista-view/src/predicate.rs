//! User-supplied grouping, sorting, and finding callbacks.
//!
//! Each predicate declares which row parts it reads. The engine uses the
//! declared arity to skip fetching (and thus deserializing) object or
//! metadata blobs the callback will never look at, which matters most
//! during full repopulation.
//!
//! All predicates must be pure and deterministic for a given
//! `(key, object, metadata)` input; a predicate that answers differently
//! across calls produces undefined ordering.

use std::cmp::Ordering;

use vista_types::GroupId;

/// Which row parts a predicate reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredicateArity {
    /// Key only.
    Key,
    /// Key and object.
    Object,
    /// Key and metadata.
    Metadata,
    /// Key, object, and metadata.
    Row,
}

impl PredicateArity {
    /// Whether the engine must supply the object blob.
    #[must_use]
    pub const fn needs_object(self) -> bool {
        matches!(self, Self::Object | Self::Row)
    }

    /// Whether the engine must supply the metadata blob.
    #[must_use]
    pub const fn needs_metadata(self) -> bool {
        matches!(self, Self::Metadata | Self::Row)
    }

    /// Whether the predicate's answer is a function of the key alone.
    #[must_use]
    pub const fn depends_only_on_key(self) -> bool {
        matches!(self, Self::Key)
    }
}

/// Borrowed view of one row's parts, populated per the consuming
/// predicate's arity. Absent blobs are presented to callbacks as empty
/// slices.
#[derive(Debug, Clone, Copy)]
pub struct RowData<'a> {
    pub key: &'a str,
    pub object: Option<&'a [u8]>,
    pub metadata: Option<&'a [u8]>,
}

impl<'a> RowData<'a> {
    fn object_or_empty(&self) -> &'a [u8] {
        self.object.unwrap_or(&[])
    }

    fn metadata_or_empty(&self) -> &'a [u8] {
        self.metadata.unwrap_or(&[])
    }
}

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

type GroupingFn = dyn Fn(&RowData<'_>) -> Option<GroupId> + Send + Sync;

/// Assigns each row to a group, or excludes it from the view.
pub struct Grouping {
    arity: PredicateArity,
    func: Box<GroupingFn>,
}

impl std::fmt::Debug for Grouping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Grouping").field("arity", &self.arity).finish()
    }
}

impl Grouping {
    /// Group by key alone.
    pub fn by_key<F>(f: F) -> Self
    where
        F: Fn(&str) -> Option<GroupId> + Send + Sync + 'static,
    {
        Self {
            arity: PredicateArity::Key,
            func: Box::new(move |row| f(row.key)),
        }
    }

    /// Group by key and object.
    pub fn by_object<F>(f: F) -> Self
    where
        F: Fn(&str, &[u8]) -> Option<GroupId> + Send + Sync + 'static,
    {
        Self {
            arity: PredicateArity::Object,
            func: Box::new(move |row| f(row.key, row.object_or_empty())),
        }
    }

    /// Group by key and metadata.
    pub fn by_metadata<F>(f: F) -> Self
    where
        F: Fn(&str, &[u8]) -> Option<GroupId> + Send + Sync + 'static,
    {
        Self {
            arity: PredicateArity::Metadata,
            func: Box::new(move |row| f(row.key, row.metadata_or_empty())),
        }
    }

    /// Group by the whole row.
    pub fn by_row<F>(f: F) -> Self
    where
        F: Fn(&RowData<'_>) -> Option<GroupId> + Send + Sync + 'static,
    {
        Self {
            arity: PredicateArity::Row,
            func: Box::new(f),
        }
    }

    /// The declared arity.
    #[must_use]
    pub const fn arity(&self) -> PredicateArity {
        self.arity
    }

    /// Evaluate the predicate.
    #[must_use]
    pub fn evaluate(&self, row: &RowData<'_>) -> Option<GroupId> {
        (self.func)(row)
    }
}

// ---------------------------------------------------------------------------
// Sorting
// ---------------------------------------------------------------------------

type SortingFn = dyn Fn(&GroupId, &RowData<'_>, &RowData<'_>) -> Ordering + Send + Sync;

/// Total order over the rows of one group.
///
/// `Ordering::Less` means the first row sorts before the second. Ties
/// are stable: an equal row inserts after the existing equal run.
pub struct Sorting {
    arity: PredicateArity,
    func: Box<SortingFn>,
}

impl std::fmt::Debug for Sorting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sorting").field("arity", &self.arity).finish()
    }
}

impl Sorting {
    /// Order by keys alone.
    pub fn by_key<F>(f: F) -> Self
    where
        F: Fn(&GroupId, &str, &str) -> Ordering + Send + Sync + 'static,
    {
        Self {
            arity: PredicateArity::Key,
            func: Box::new(move |group, a, b| f(group, a.key, b.key)),
        }
    }

    /// Order by keys and objects.
    pub fn by_object<F>(f: F) -> Self
    where
        F: Fn(&GroupId, &str, &[u8], &str, &[u8]) -> Ordering + Send + Sync + 'static,
    {
        Self {
            arity: PredicateArity::Object,
            func: Box::new(move |group, a, b| {
                f(group, a.key, a.object_or_empty(), b.key, b.object_or_empty())
            }),
        }
    }

    /// Order by keys and metadata.
    pub fn by_metadata<F>(f: F) -> Self
    where
        F: Fn(&GroupId, &str, &[u8], &str, &[u8]) -> Ordering + Send + Sync + 'static,
    {
        Self {
            arity: PredicateArity::Metadata,
            func: Box::new(move |group, a, b| {
                f(group, a.key, a.metadata_or_empty(), b.key, b.metadata_or_empty())
            }),
        }
    }

    /// Order by whole rows.
    pub fn by_row<F>(f: F) -> Self
    where
        F: Fn(&GroupId, &RowData<'_>, &RowData<'_>) -> Ordering + Send + Sync + 'static,
    {
        Self {
            arity: PredicateArity::Row,
            func: Box::new(f),
        }
    }

    /// The declared arity.
    #[must_use]
    pub const fn arity(&self) -> PredicateArity {
        self.arity
    }

    /// Compare two rows within `group`.
    #[must_use]
    pub fn evaluate(&self, group: &GroupId, a: &RowData<'_>, b: &RowData<'_>) -> Ordering {
        (self.func)(group, a, b)
    }
}

// ---------------------------------------------------------------------------
// Finding
// ---------------------------------------------------------------------------

type FindingFn = dyn Fn(&GroupId, &RowData<'_>) -> Ordering + Send + Sync;

/// Three-valued comparison of a row against an implicit target range.
///
/// Returns `Ordering::Less` when the row sorts below the range,
/// `Ordering::Greater` when above, `Ordering::Equal` when inside. The
/// range must be contiguous under the view's sort order, otherwise the
/// binary searches are meaningless.
pub struct Finding {
    arity: PredicateArity,
    func: Box<FindingFn>,
}

impl std::fmt::Debug for Finding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Finding").field("arity", &self.arity).finish()
    }
}

impl Finding {
    /// Compare by key alone.
    pub fn by_key<F>(f: F) -> Self
    where
        F: Fn(&GroupId, &str) -> Ordering + Send + Sync + 'static,
    {
        Self {
            arity: PredicateArity::Key,
            func: Box::new(move |group, row| f(group, row.key)),
        }
    }

    /// Compare by key and object.
    pub fn by_object<F>(f: F) -> Self
    where
        F: Fn(&GroupId, &str, &[u8]) -> Ordering + Send + Sync + 'static,
    {
        Self {
            arity: PredicateArity::Object,
            func: Box::new(move |group, row| f(group, row.key, row.object_or_empty())),
        }
    }

    /// Compare by key and metadata.
    pub fn by_metadata<F>(f: F) -> Self
    where
        F: Fn(&GroupId, &str, &[u8]) -> Ordering + Send + Sync + 'static,
    {
        Self {
            arity: PredicateArity::Metadata,
            func: Box::new(move |group, row| f(group, row.key, row.metadata_or_empty())),
        }
    }

    /// Compare by the whole row.
    pub fn by_row<F>(f: F) -> Self
    where
        F: Fn(&GroupId, &RowData<'_>) -> Ordering + Send + Sync + 'static,
    {
        Self {
            arity: PredicateArity::Row,
            func: Box::new(f),
        }
    }

    /// The declared arity.
    #[must_use]
    pub const fn arity(&self) -> PredicateArity {
        self.arity
    }

    /// Compare the row at hand against the target range.
    #[must_use]
    pub fn evaluate(&self, group: &GroupId, row: &RowData<'_>) -> Ordering {
        (self.func)(group, row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_needs() {
        assert!(!PredicateArity::Key.needs_object());
        assert!(PredicateArity::Key.depends_only_on_key());
        assert!(PredicateArity::Object.needs_object());
        assert!(!PredicateArity::Object.needs_metadata());
        assert!(PredicateArity::Metadata.needs_metadata());
        assert!(PredicateArity::Row.needs_object());
        assert!(PredicateArity::Row.needs_metadata());
    }

    #[test]
    fn grouping_adapters() {
        let by_key = Grouping::by_key(|key| key.starts_with('a').then(|| GroupId::new("a")));
        let row = RowData {
            key: "abc",
            object: None,
            metadata: None,
        };
        assert_eq!(by_key.evaluate(&row), Some(GroupId::new("a")));
        assert_eq!(by_key.arity(), PredicateArity::Key);

        let by_object = Grouping::by_object(|_key, object| {
            (!object.is_empty()).then(|| GroupId::new("nonempty"))
        });
        // Absent object is presented as an empty slice.
        assert_eq!(by_object.evaluate(&row), None);
    }

    #[test]
    fn sorting_adapters() {
        let sorting = Sorting::by_key(|_group, a, b| a.cmp(b));
        let g = GroupId::new("g");
        let a = RowData {
            key: "a",
            object: None,
            metadata: None,
        };
        let b = RowData {
            key: "b",
            object: None,
            metadata: None,
        };
        assert_eq!(sorting.evaluate(&g, &a, &b), Ordering::Less);
        assert_eq!(sorting.evaluate(&g, &b, &a), Ordering::Greater);
        assert_eq!(sorting.evaluate(&g, &a, &a), Ordering::Equal);
    }

    #[test]
    fn finding_adapters() {
        let finding = Finding::by_key(|_group, key| key.cmp("m"));
        let g = GroupId::new("g");
        let below = RowData {
            key: "a",
            object: None,
            metadata: None,
        };
        assert_eq!(finding.evaluate(&g, &below), Ordering::Less);
    }
}
