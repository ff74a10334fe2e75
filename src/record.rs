//! Field access capability for anything stored in a roll-up tree.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::value::Value;

/// Named field access over a record.
///
/// Grouping expressions, the comparator and the value accessors on
/// [`GroupNode`](crate::GroupNode) all go through this trait. `None` means the
/// record does not expose the name at all, which is an error for the caller;
/// a present-but-empty field is `Some(Value::Null)`.
pub trait Record: fmt::Debug {
    fn field(&self, name: &str) -> Option<Value>;

    /// Zero-argument method invocation, reached by `name()` in expressions.
    fn method(&self, name: &str) -> Option<Value> {
        let _ = name;
        None
    }

    /// Text used when the record itself becomes a key or a node name.
    fn label(&self) -> String {
        format!("{self:?}")
    }
}

impl<R: Record + ?Sized> Record for Arc<R> {
    fn field(&self, name: &str) -> Option<Value> {
        (**self).field(name)
    }

    fn method(&self, name: &str) -> Option<Value> {
        (**self).method(name)
    }

    fn label(&self) -> String {
        (**self).label()
    }
}

impl<R: Record + ?Sized> Record for Box<R> {
    fn field(&self, name: &str) -> Option<Value> {
        (**self).field(name)
    }

    fn method(&self, name: &str) -> Option<Value> {
        (**self).method(name)
    }

    fn label(&self) -> String {
        (**self).label()
    }
}

impl<R: Record + ?Sized> Record for &R {
    fn field(&self, name: &str) -> Option<Value> {
        (**self).field(name)
    }

    fn method(&self, name: &str) -> Option<Value> {
        (**self).method(name)
    }

    fn label(&self) -> String {
        (**self).label()
    }
}

impl Record for BTreeMap<String, Value> {
    fn field(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

impl Record for HashMap<String, Value> {
    fn field(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

/// Implement [`Record`] for a struct by listing the fields it exposes.
///
/// Every listed field type must convert into [`Value`].
///
/// ```
/// use rollup::{impl_record, Record, Value};
///
/// #[derive(Debug, Clone)]
/// struct Tx {
///     year: i32,
///     category: Option<String>,
/// }
///
/// impl_record!(Tx { year, category });
///
/// let tx = Tx { year: 2020, category: None };
/// assert_eq!(tx.field("year"), Some(Value::Int(2020)));
/// assert_eq!(tx.field("category"), Some(Value::Null));
/// assert_eq!(tx.field("amount"), None);
/// ```
#[macro_export]
macro_rules! impl_record {
    ($ty:ty { $($field:ident),* $(,)? }) => {
        impl $crate::Record for $ty {
            fn field(&self, name: &str) -> ::std::option::Option<$crate::Value> {
                match name {
                    $(stringify!($field) => ::std::option::Option::Some(
                        $crate::Value::from(::std::clone::Clone::clone(&self.$field)),
                    ),)*
                    _ => ::std::option::Option::None,
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Account {
        owner: String,
    }

    impl Record for Account {
        fn field(&self, name: &str) -> Option<Value> {
            match name {
                "owner" => Some(Value::from(self.owner.as_str())),
                _ => None,
            }
        }

        fn method(&self, name: &str) -> Option<Value> {
            match name {
                "initial" => Some(Value::from(self.owner.chars().take(1).collect::<String>())),
                _ => None,
            }
        }

        fn label(&self) -> String {
            self.owner.clone()
        }
    }

    #[test]
    fn given_arc_record_when_accessed_then_delegates() {
        let acc = Arc::new(Account {
            owner: "ada".into(),
        });
        assert_eq!(acc.field("owner"), Some(Value::from("ada")));
        assert_eq!(acc.method("initial"), Some(Value::from("a")));
        assert_eq!(acc.label(), "ada");
    }

    #[test]
    fn given_map_record_when_field_missing_then_none() {
        let mut m = HashMap::new();
        m.insert("x".to_string(), Value::Int(1));
        assert_eq!(m.field("x"), Some(Value::Int(1)));
        assert_eq!(m.field("y"), None);
        assert_eq!(m.method("x"), None);
    }
}
