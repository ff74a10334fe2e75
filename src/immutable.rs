//! Read-only roll-up tree that hands out independent mutable copies.
//!
//! Objects that want to present their data for ad-hoc analysis can hold an
//! [`ImmutableGroupNode`] and share it freely: every grouping call builds a
//! fresh [`GroupNode`] and never touches the shared instance.

use std::fmt;

use rayon::prelude::*;
use tracing::{debug, instrument};

use crate::config::Settings;
use crate::errors::RollupResult;
use crate::expression::Expression;
use crate::node::{FindQuery, GroupNode, Items};
use crate::record::Record;
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct ImmutableGroupNode<T> {
    inner: GroupNode<T>,
}

impl<T> ImmutableGroupNode<T> {
    pub fn from_items(name: Option<String>, items: Vec<T>) -> Self {
        Self {
            inner: GroupNode::leaf(name, Value::Null, items),
        }
    }

    pub fn from_children(name: Option<String>, children: Vec<GroupNode<T>>) -> Self {
        Self {
            inner: GroupNode::internal(name, Value::Null, children),
        }
    }

    /// Build from exactly one of `items` or `children`.
    pub fn new(
        name: Option<String>,
        items: Option<Vec<T>>,
        children: Option<Vec<GroupNode<T>>>,
    ) -> RollupResult<Self> {
        GroupNode::new(name, Value::Null, items, children).map(|inner| Self { inner })
    }

    /// Read-only view of the wrapped tree.
    pub fn as_node(&self) -> &GroupNode<T> {
        &self.inner
    }

    /// Nothing to collapse: the shared instance never changes.
    pub fn reset(&self) {}

    pub fn name(&self) -> Option<&str> {
        self.inner.name()
    }

    pub fn key(&self) -> &Value {
        self.inner.key()
    }

    pub fn is_leaf(&self) -> bool {
        self.inner.is_leaf()
    }

    pub fn children(&self) -> Option<&[GroupNode<T>]> {
        self.inner.children()
    }

    pub fn iter(&self) -> Items<'_, T> {
        self.inner.iter()
    }

    pub fn items(&self) -> Vec<&T> {
        self.inner.items()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn child_names(&self) -> RollupResult<Vec<Option<&str>>> {
        self.inner.child_names()
    }

    pub fn leaves(&self) -> Vec<&GroupNode<T>> {
        self.inner.leaves()
    }

    pub fn find_first(&self, name: impl fmt::Display, recursive: bool) -> RollupResult<Option<&GroupNode<T>>> {
        self.inner.find_first(name, recursive)
    }
}

impl<T: Clone> ImmutableGroupNode<T> {
    /// Independent mutable copy of the current state.
    pub fn to_mutable(&self) -> GroupNode<T> {
        self.inner.clone()
    }

    pub fn find(&self, query: &FindQuery) -> RollupResult<GroupNode<T>> {
        self.inner.find(query)
    }
}

impl<T: Record + Clone> ImmutableGroupNode<T> {
    /// Group a fresh mutable copy and return it.
    pub fn group_by(&self, expression: &str, name_field: Option<&str>) -> RollupResult<GroupNode<T>> {
        let expression = Expression::parse(expression)?;
        self.group_by_with(&expression, name_field, &Settings::default())
    }

    pub fn group_by_with(
        &self,
        expression: &Expression,
        name_field: Option<&str>,
        settings: &Settings,
    ) -> RollupResult<GroupNode<T>> {
        let mut result = self.to_mutable();
        result.group_by_with(expression, name_field, settings)?;
        Ok(result)
    }

    pub fn first_value(&self, field: &str) -> RollupResult<Option<Value>> {
        self.inner.first_value(field)
    }

    pub fn all_values(&self, field: &str) -> RollupResult<Vec<Value>> {
        self.inner.all_values(field)
    }
}

impl<T: Record + Clone + Send + Sync> ImmutableGroupNode<T> {
    /// One independent grouping per expression, computed in parallel.
    ///
    /// Results are returned in the order of `expressions`.
    #[instrument(level = "debug", skip(self), fields(node = %self.inner.display_name()))]
    pub fn group_by_many(&self, expressions: &[&str]) -> Vec<RollupResult<GroupNode<T>>> {
        debug!(count = expressions.len(), "fanning out groupings");
        expressions
            .par_iter()
            .map(|expression| self.group_by(expression, None))
            .collect()
    }
}

impl<T> From<GroupNode<T>> for ImmutableGroupNode<T> {
    fn from(inner: GroupNode<T>) -> Self {
        Self { inner }
    }
}

impl<'a, T> IntoIterator for &'a ImmutableGroupNode<T> {
    type Item = &'a T;
    type IntoIter = Items<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use std::collections::BTreeMap;

    fn row(year: i64) -> BTreeMap<String, Value> {
        BTreeMap::from([("year".to_string(), Value::Int(year))])
    }

    #[test]
    fn given_immutable_when_grouped_then_self_unchanged() {
        let frozen = ImmutableGroupNode::from_items(Some("all".into()), vec![row(2020), row(2021)]);
        let grouped = frozen.group_by("year", None).unwrap();

        assert_eq!(grouped.child_names().unwrap(), vec![Some("2020"), Some("2021")]);
        assert!(frozen.is_leaf());
        assert_eq!(frozen.len(), 2);
        assert_eq!(frozen.name(), Some("all"));
    }

    #[test]
    fn given_immutable_when_reset_then_nothing_happens() {
        let frozen: ImmutableGroupNode<_> = {
            let mut node = GroupNode::from_items(vec![row(2020)]);
            node.group_by("year", None).unwrap();
            node.into()
        };
        frozen.reset();
        assert!(!frozen.is_leaf());
        assert_eq!(frozen.child_names().unwrap(), vec![Some("2020")]);
    }

    #[test]
    fn given_neither_items_nor_children_when_constructed_then_configuration_error() {
        let err = ImmutableGroupNode::<BTreeMap<String, Value>>::new(None, None, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn given_many_expressions_when_fanned_out_then_results_in_input_order() {
        let frozen = ImmutableGroupNode::from_items(None, (2018..2024).map(row).collect());
        let results = frozen.group_by_many(&["year", "year % 2", "nope"]);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().child_names().unwrap().len(), 6);
        assert_eq!(
            results[1].as_ref().unwrap().child_names().unwrap(),
            vec![Some("0"), Some("1")]
        );
        assert!(results[2].is_err());
        assert!(frozen.is_leaf());
    }
}
