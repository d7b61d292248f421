//! Umbrella crate re-exporting the vistadb public API.
//!
//! ```
//! use vista::{Grouping, MemoryRowStore, MemoryTables, Sorting, ViewConfig, ViewConnection};
//!
//! let mut rows = MemoryRowStore::new();
//! let _rowid = rows.put("alice", br#"{"team":"red"}"#.to_vec(), Vec::new());
//!
//! let config = ViewConfig::new("by_team", 1)
//!     .grouping(Grouping::by_object(|_key, object| {
//!         serde_json::from_slice::<serde_json::Value>(object)
//!             .ok()?
//!             .get("team")?
//!             .as_str()
//!             .map(Into::into)
//!     }))
//!     .sorting(Sorting::by_key(|_group, a, b| a.cmp(b)));
//!
//! let mut view = ViewConnection::open(config, MemoryTables::new(), rows)?;
//! assert_eq!(view.number_of_groups(), 1);
//! assert_eq!(view.key_at_index(&"red".into(), 0)?, Some("alice".to_owned()));
//! # Ok::<(), vista::ViewError>(())
//! ```

pub use vista_error::{Result, ViewError};
pub use vista_store::{
    GroupIndex, MemoryRowStore, MemoryTables, Page, PageHeader, PageMetadata, PageRecord,
    PageStore, RowStore, ViewTables,
};
pub use vista_types::{
    change::{ChangeFlags, ViewChange},
    limits, Direction, GroupId, PageId, RowId,
};
pub use vista_view::{
    Finding, Grouping, PredicateArity, RowData, Sorting, ViewConfig, ViewConnection, ViewObserver,
};
