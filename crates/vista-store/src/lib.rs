//! Storage layer of the paged view engine.
//!
//! A view's ordered sequences are packed into fixed-capacity [`Page`]s
//! chained into per-group linked lists. This crate owns:
//!
//! - the [`Page`] container and its persisted blob codec,
//! - [`PageMetadata`] and the in-memory [`GroupIndex`] rebuilt on open,
//! - the [`ViewTables`] trait over the two backing tables (plus the
//!   registry side-table) with [`MemoryTables`] as reference backend,
//! - the [`RowStore`] trait over the host's primary store,
//! - the transactional [`PageStore`]: per-transaction dirty sets overlaid
//!   on bounded clean caches, and the ordered commit writer.

pub mod group_index;
pub mod meta;
pub mod page;
pub mod rowstore;
pub mod store;
pub mod tables;

pub use group_index::GroupIndex;
pub use meta::PageMetadata;
pub use page::Page;
pub use rowstore::{MemoryRowStore, RowStore};
pub use store::PageStore;
pub use tables::{MemoryTables, PageHeader, PageRecord, ViewTables};
