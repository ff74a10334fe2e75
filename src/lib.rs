//! Hierarchical roll-up summaries over flat collections of records.
//!
//! Start from a flat list, group it by a field or a small navigation
//! expression, group again to add a level beneath every leaf, then navigate
//! the result:
//!
//! ```
//! use rollup::{impl_record, GroupNode, Value};
//!
//! #[derive(Debug, Clone)]
//! struct Tx {
//!     year: i32,
//!     month: u32,
//! }
//! impl_record!(Tx { year, month });
//!
//! let mut root = GroupNode::from_items(vec![
//!     Tx { year: 2020, month: 3 },
//!     Tx { year: 2021, month: 1 },
//!     Tx { year: 2020, month: 7 },
//! ]);
//! root.group_by("year", None)?;
//! root.group_by("month", None)?;
//!
//! assert_eq!(root.child_names()?, vec![Some("2020"), Some("2021")]);
//! assert_eq!(root.find_by_name("2020")?.len(), 2);
//! assert_eq!(root.leaves().len(), 3);
//!
//! root.reset();
//! assert!(root.is_leaf());
//! # Ok::<(), rollup::RollupError>(())
//! ```

pub mod comparator;
pub mod config;
pub mod errors;
pub mod expression;
pub mod immutable;
pub mod node;
pub mod record;
pub mod tree_traits;
pub mod util;
pub mod value;

pub use comparator::GenericComparator;
pub use config::Settings;
pub use errors::{ErrorKind, RollupError, RollupResult};
pub use expression::{Expression, Operator, Segment};
pub use immutable::ImmutableGroupNode;
pub use node::{FindQuery, GroupNode, Items};
pub use record::Record;
pub use tree_traits::TreeNodeConvert;
pub use value::Value;
