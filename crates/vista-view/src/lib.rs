//! The ordered-view engine.
//!
//! [`ViewConnection`] maintains, for every group produced by the
//! grouping predicate, a stable totally-ordered sequence of rowids,
//! paged into fixed-capacity pages and persisted through the storage
//! traits in `vista-store`. Mutations buffer in per-connection dirty
//! sets and flush in a single commit that emits positional
//! [`vista_types::ViewChange`] records for observers.

mod audit;
mod compact;
mod enumerate;
mod insert;
mod query;
mod remove;
mod row;

pub mod connection;
pub mod predicate;

pub use connection::{ViewConfig, ViewConnection, ViewObserver};
pub use predicate::{Finding, Grouping, PredicateArity, RowData, Sorting};
