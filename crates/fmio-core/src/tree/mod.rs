//! The in-memory filesystem tree backing the views.
//!
//! [`node::NodeTree`] is the arena of [`node::FsNode`]s, [`gatherer::Gatherer`]
//! fills it from a background thread, [`model::FsModel`] bundles the two for
//! a single window, and [`sort`] orders siblings.

pub mod gatherer;
pub mod model;
pub mod node;
pub mod sort;

pub use gatherer::Gatherer;
pub use model::FsModel;
pub use node::{FsNode, NodeId, NodeTree};
pub use sort::{SortDirection, SortField, SortSpec};
