//! The view connection: configuration, open, transaction surface.
//!
//! A connection owns the group index, the transactional page store, the
//! pending change log, and the reader-side published snapshot. The host
//! drives it from inside its own readwrite transaction: mutation hooks
//! buffer work, [`ViewConnection::commit`] consolidates pages, flushes
//! the dirty sets, and hands the ordered change records to observers.
//! [`ViewConnection::abort`] discards everything buffered.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;
use vista_error::{Result, ViewError};
use vista_store::{GroupIndex, PageStore, RowStore, ViewTables};
use vista_types::limits::CLASS_VERSION;
use vista_types::{ChangeFlags, GroupId, RowId, ViewChange};

use crate::predicate::{Grouping, Sorting};
use crate::row::OwnedRow;

/// Receives the ordered change records after each successful commit.
pub trait ViewObserver {
    fn on_commit(&self, changes: &[ViewChange]);
}

/// Configuration of one registered view.
pub struct ViewConfig {
    name: String,
    version: i64,
    grouping: Option<Grouping>,
    sorting: Option<Sorting>,
}

impl ViewConfig {
    /// Start a configuration. `version` is the user-supplied config
    /// version; bumping it on a later open triggers a full repopulation.
    pub fn new(name: impl Into<String>, version: i64) -> Self {
        Self {
            name: name.into(),
            version,
            grouping: None,
            sorting: None,
        }
    }

    /// Set the grouping predicate (required).
    #[must_use]
    pub fn grouping(mut self, grouping: Grouping) -> Self {
        self.grouping = Some(grouping);
        self
    }

    /// Set the sorting predicate (required).
    #[must_use]
    pub fn sorting(mut self, sorting: Sorting) -> Self {
        self.sorting = Some(sorting);
        self
    }
}

/// A writer connection to one view.
///
/// Writers are serialized by the host transaction model: at most one
/// writer mutates a view at a time, and every method here runs
/// synchronously on that writer's thread. Readers work from the
/// immutable snapshot published at the last commit.
pub struct ViewConnection<T: ViewTables, R: RowStore> {
    pub(crate) name: String,
    pub(crate) version: i64,
    pub(crate) grouping: Grouping,
    pub(crate) sorting: Sorting,
    pub(crate) rows: R,
    pub(crate) store: PageStore<T>,
    pub(crate) index: GroupIndex,
    pub(crate) changes: Vec<ViewChange>,
    pub(crate) mutated_groups: HashSet<GroupId>,
    pub(crate) last_insert_was_first: bool,
    pub(crate) last_insert_was_last: bool,
    pub(crate) reset: bool,
    observers: Vec<Box<dyn ViewObserver>>,
    published: Arc<Mutex<Arc<GroupIndex>>>,
}

impl<T: ViewTables + fmt::Debug, R: RowStore + fmt::Debug> fmt::Debug for ViewConnection<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewConnection")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("grouping", &self.grouping)
            .field("sorting", &self.sorting)
            .field("rows", &self.rows)
            .field("store", &self.store)
            .field("index", &self.index)
            .field("changes", &self.changes)
            .field("mutated_groups", &self.mutated_groups)
            .field("last_insert_was_first", &self.last_insert_was_first)
            .field("last_insert_was_last", &self.last_insert_was_last)
            .field("reset", &self.reset)
            .field("observers", &self.observers.len())
            .field("published", &self.published)
            .finish()
    }
}

impl<T: ViewTables, R: RowStore> ViewConnection<T, R> {
    /// Open (or create) the view.
    ///
    /// Version handling:
    /// - no stored class version → fresh tables, populate from scratch;
    /// - stored class version ≠ current → drop both tables, rebuild;
    /// - stored user version ≠ configured → clear content, repopulate.
    ///
    /// Otherwise the group index is rebuilt from the persisted page
    /// chains; a broken chain fails the open with a corruption error and
    /// the caller must drop and rebuild.
    pub fn open(config: ViewConfig, tables: T, rows: R) -> Result<Self> {
        let ViewConfig {
            name,
            version,
            grouping,
            sorting,
        } = config;
        let grouping =
            grouping.ok_or_else(|| ViewError::misuse("view config has no grouping predicate"))?;
        let sorting =
            sorting.ok_or_else(|| ViewError::misuse("view config has no sorting predicate"))?;

        let mut store = PageStore::new(tables);
        let mut needs_repopulate = false;
        match store.class_version()? {
            None => {
                info!(view = %name, "creating view tables");
                store.set_class_version(CLASS_VERSION)?;
                store.set_user_version(version)?;
                needs_repopulate = true;
            }
            Some(stored) if stored != CLASS_VERSION => {
                info!(
                    view = %name,
                    from = stored,
                    to = CLASS_VERSION,
                    "table layout changed; dropping and rebuilding view"
                );
                store.clear_all()?;
                store.set_class_version(CLASS_VERSION)?;
                store.set_user_version(version)?;
                needs_repopulate = true;
            }
            Some(_) => {
                if store.user_version()? != Some(version) {
                    info!(view = %name, version, "config version changed; repopulating view");
                    store.clear_all()?;
                    store.set_user_version(version)?;
                    needs_repopulate = true;
                }
            }
        }

        let index = if needs_repopulate {
            GroupIndex::new()
        } else {
            GroupIndex::build(&store.load_page_headers()?)?
        };

        let mut connection = Self {
            name,
            version,
            grouping,
            sorting,
            rows,
            store,
            index,
            changes: Vec::new(),
            mutated_groups: HashSet::new(),
            last_insert_was_first: false,
            last_insert_was_last: false,
            reset: false,
            observers: Vec::new(),
            published: Arc::new(Mutex::new(Arc::new(GroupIndex::new()))),
        };

        if needs_repopulate {
            connection.populate_from_rows()?;
            connection.commit()?;
        } else {
            connection.publish_snapshot();
        }
        Ok(connection)
    }

    // -- accessors -------------------------------------------------------

    /// The view's registered name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configured user version.
    #[must_use]
    pub const fn version(&self) -> i64 {
        self.version
    }

    /// The primary row store.
    pub fn rows(&self) -> &R {
        &self.rows
    }

    /// Read access to the backing tables.
    pub fn tables(&self) -> &T {
        self.store.tables()
    }

    /// Close the connection, handing back the tables and row store.
    /// Uncommitted work is discarded.
    pub fn close(self) -> (T, R) {
        (self.store.into_tables(), self.rows)
    }

    /// Mutable access to the primary row store (the host mutates rows,
    /// then calls the matching hook).
    pub fn rows_mut(&mut self) -> &mut R {
        &mut self.rows
    }

    /// Change records buffered so far this transaction.
    #[must_use]
    pub fn pending_changes(&self) -> &[ViewChange] {
        &self.changes
    }

    /// Register an observer for future commits.
    pub fn register_observer(&mut self, observer: Box<dyn ViewObserver>) {
        self.observers.push(observer);
    }

    /// Immutable group-index snapshot from the last successful commit.
    #[must_use]
    pub fn snapshot(&self) -> Arc<GroupIndex> {
        Arc::clone(&self.published.lock())
    }

    // -- host mutation hooks --------------------------------------------

    /// The host inserted a brand-new row.
    pub fn handle_insert(
        &mut self,
        rowid: RowId,
        key: &str,
        object: &[u8],
        metadata: &[u8],
    ) -> Result<()> {
        self.insert_impl(
            rowid,
            key,
            Some(object),
            Some(metadata),
            true,
            ChangeFlags::OBJECT | ChangeFlags::METADATA,
        )
    }

    /// The host replaced a row's object.
    pub fn handle_update_object(&mut self, rowid: RowId, key: &str, object: &[u8]) -> Result<()> {
        self.insert_impl(rowid, key, Some(object), None, false, ChangeFlags::OBJECT)
    }

    /// The host replaced a row's metadata.
    pub fn handle_update_metadata(
        &mut self,
        rowid: RowId,
        key: &str,
        metadata: &[u8],
    ) -> Result<()> {
        self.insert_impl(rowid, key, None, Some(metadata), false, ChangeFlags::METADATA)
    }

    /// The host touched a row's object without changing its bytes;
    /// re-evaluate and notify observers.
    pub fn handle_touch_object(&mut self, rowid: RowId, key: &str) -> Result<()> {
        self.insert_impl(rowid, key, None, None, false, ChangeFlags::OBJECT)
    }

    /// The host touched a row's metadata without changing its bytes.
    pub fn handle_touch_metadata(&mut self, rowid: RowId, key: &str) -> Result<()> {
        self.insert_impl(rowid, key, None, None, false, ChangeFlags::METADATA)
    }

    /// The host removed a row.
    pub fn handle_remove(&mut self, rowid: RowId, key: &str) -> Result<()> {
        self.remove_rowid(rowid, key)
    }

    /// The host removed a batch of rows.
    pub fn handle_remove_many(&mut self, rows: &[(RowId, String)]) -> Result<()> {
        self.remove_rowids(rows)
    }

    /// The host cleared the primary store.
    pub fn handle_remove_all(&mut self) -> Result<()> {
        self.remove_all()
    }

    /// Insert or re-position one row (the rowid-level primitive behind
    /// the hooks). `known_new` skips the existing-position lookup for
    /// rows that cannot already be in the view.
    pub fn insert(
        &mut self,
        rowid: RowId,
        key: &str,
        object: Option<&[u8]>,
        metadata: Option<&[u8]>,
        known_new: bool,
    ) -> Result<()> {
        self.insert_impl(
            rowid,
            key,
            object,
            metadata,
            known_new,
            ChangeFlags::OBJECT | ChangeFlags::METADATA,
        )
    }

    // -- transaction boundary -------------------------------------------

    /// Consolidate page sizes, flush the dirty sets, publish the reader
    /// snapshot, and hand the ordered change records to observers.
    ///
    /// On a flush error the transaction state is still torn down (the
    /// host rolls back its outer transaction) and the error is returned.
    pub fn commit(&mut self) -> Result<Vec<ViewChange>> {
        self.consolidate()?;
        let flush = self.store.commit(&mut self.index);
        let changes = std::mem::take(&mut self.changes);
        self.mutated_groups.clear();
        self.reset = false;
        flush?;
        self.publish_snapshot();
        for observer in &self.observers {
            observer.on_commit(&changes);
        }
        Ok(changes)
    }

    /// Discard everything buffered this transaction and restore the
    /// in-memory index to the last published snapshot.
    pub fn abort(&mut self) {
        self.store.rollback();
        self.index = GroupIndex::clone(&self.published.lock());
        self.changes.clear();
        self.mutated_groups.clear();
        self.reset = false;
    }

    fn publish_snapshot(&mut self) {
        *self.published.lock() = Arc::new(self.index.clone());
    }

    // -- repopulation ----------------------------------------------------

    /// Clear the view's content and rebuild it from every row in the
    /// primary store, emitting `ResetGroup` records for the old groups.
    pub fn repopulate(&mut self) -> Result<()> {
        info!(view = %self.name, "repopulating view from primary store");
        self.remove_all()?;
        self.populate_from_rows()
    }

    pub(crate) fn populate_from_rows(&mut self) -> Result<()> {
        let mut all: Vec<(RowId, String)> = Vec::new();
        self.rows.for_each_row(&mut |rowid, key| {
            all.push((rowid, key.to_owned()));
            Ok(())
        })?;
        for (rowid, key) in all {
            self.insert_impl(
                rowid,
                &key,
                None,
                None,
                true,
                ChangeFlags::OBJECT | ChangeFlags::METADATA,
            )?;
        }
        Ok(())
    }

    // -- shared row materialization --------------------------------------

    /// Fetch a candidate row with exactly the parts the sorting
    /// predicate reads.
    pub(crate) fn fetch_for_sorting(&self, rowid: RowId) -> Result<OwnedRow> {
        OwnedRow::fetch(
            &self.rows,
            rowid,
            None,
            self.sorting.arity().needs_object(),
            self.sorting.arity().needs_metadata(),
        )
    }
}
