//! Mutable roll-up tree.
//!
//! A [`GroupNode`] is either a leaf that owns its items, or an internal node
//! whose items are the concatenation of its children's items. Grouping turns
//! every leaf of the current tree into an internal node one level deeper;
//! resetting collapses a node back into a leaf without losing items.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use tracing::{debug, instrument, trace};

use crate::comparator::GenericComparator;
use crate::config::Settings;
use crate::errors::{RollupError, RollupResult};
use crate::expression::{validate_field_name, Expression};
use crate::record::Record;
use crate::value::Value;

/// Siblings are ordered by name.
fn sibling_order() -> &'static GenericComparator {
    static ORDER: OnceLock<GenericComparator> = OnceLock::new();
    ORDER.get_or_init(|| GenericComparator::new(["name"]))
}

#[derive(Debug, Clone)]
enum Body<T> {
    Leaf(Vec<T>),
    Internal {
        children: Vec<GroupNode<T>>,
        /// Child index of each item in its order before grouping; `None` for
        /// nodes built directly from children.
        origin: Option<Vec<usize>>,
    },
}

/// A node of a roll-up tree.
#[derive(Debug, Clone)]
pub struct GroupNode<T> {
    name: Option<String>,
    key: Value,
    body: Body<T>,
}

impl<T> GroupNode<T> {
    /// Leaf node owning `items`.
    pub fn leaf(name: Option<String>, key: Value, items: Vec<T>) -> Self {
        Self {
            name,
            key,
            body: Body::Leaf(items),
        }
    }

    /// Internal node over existing children, kept in the given order.
    pub fn internal(name: Option<String>, key: Value, children: Vec<GroupNode<T>>) -> Self {
        Self {
            name,
            key,
            body: Body::Internal {
                children,
                origin: None,
            },
        }
    }

    /// Unnamed root leaf over a flat collection.
    pub fn from_items(items: Vec<T>) -> Self {
        Self::leaf(None, Value::Null, items)
    }

    /// Unnamed internal node over existing children.
    pub fn from_children(children: Vec<GroupNode<T>>) -> Self {
        Self::internal(None, Value::Null, children)
    }

    /// Build from exactly one of `items` or `children`.
    pub fn new(
        name: Option<String>,
        key: Value,
        items: Option<Vec<T>>,
        children: Option<Vec<GroupNode<T>>>,
    ) -> RollupResult<Self> {
        match (items, children) {
            (Some(items), None) => Ok(Self::leaf(name, key, items)),
            (None, Some(children)) => Ok(Self::internal(name, key, children)),
            (None, None) => Err(RollupError::configuration(
                "either items or children must be specified",
            )),
            (Some(_), Some(_)) => Err(RollupError::configuration(
                "items and children must not both be specified",
            )),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_key(mut self, key: impl Into<Value>) -> Self {
        self.key = key.into();
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn key(&self) -> &Value {
        &self.key
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.body, Body::Leaf(_))
    }

    /// Direct children, or `None` for a leaf.
    pub fn children(&self) -> Option<&[GroupNode<T>]> {
        match &self.body {
            Body::Leaf(_) => None,
            Body::Internal { children, .. } => Some(children),
        }
    }

    fn require_children(&self, operation: &str) -> RollupResult<&[GroupNode<T>]> {
        self.children().ok_or_else(|| {
            RollupError::structural(format!(
                "{operation} requires children but node '{}' is a leaf",
                self.display_name()
            ))
        })
    }

    pub(crate) fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<root>")
    }

    /// Lazy, restartable iteration over every item below this node.
    pub fn iter(&self) -> Items<'_, T> {
        match &self.body {
            Body::Leaf(items) => Items {
                current: items.iter(),
                stack: Vec::new(),
            },
            Body::Internal { children, .. } => Items {
                current: Default::default(),
                stack: vec![children.iter()],
            },
        }
    }

    /// All items, in child order for internal nodes.
    pub fn items(&self) -> Vec<&T> {
        self.iter().collect()
    }

    pub fn len(&self) -> usize {
        match &self.body {
            Body::Leaf(items) => items.len(),
            Body::Internal { children, .. } => children.iter().map(GroupNode::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of levels including this node.
    pub fn depth(&self) -> usize {
        match &self.body {
            Body::Leaf(_) => 1,
            Body::Internal { children, .. } => {
                1 + children.iter().map(GroupNode::depth).max().unwrap_or(0)
            }
        }
    }

    /// Consume the node, returning its items in order.
    pub fn into_items(self) -> Vec<T> {
        match self.body {
            Body::Leaf(items) => items,
            Body::Internal { children, .. } => children.into_iter().flat_map(GroupNode::into_items).collect(),
        }
    }

    /// Collapse this node back into a leaf.
    ///
    /// A node created by grouping gets its items back in the order they had
    /// before grouping; a node built from children keeps child order.
    #[instrument(level = "debug", skip(self), fields(node = %self.display_name()))]
    pub fn reset(&mut self) {
        if let Body::Internal { children, origin } = &mut self.body {
            let children = std::mem::take(children);
            let origin = origin.take();
            self.body = Body::Leaf(collapse(children, origin));
        }
    }

    /// Reset every descendant, deepest first, then this node.
    pub fn reset_all(&mut self) {
        if let Body::Internal { children, .. } = &mut self.body {
            for child in children.iter_mut() {
                child.reset_all();
            }
        }
        self.reset();
    }

    /// Names of the direct children, in order.
    pub fn child_names(&self) -> RollupResult<Vec<Option<&str>>> {
        Ok(self
            .require_children("child_names")?
            .iter()
            .map(GroupNode::name)
            .collect())
    }

    /// Direct child with the given name.
    pub fn child(&self, name: &str) -> RollupResult<Option<&GroupNode<T>>> {
        Ok(self
            .require_children("child")?
            .iter()
            .find(|c| c.name() == Some(name)))
    }

    /// Every leaf below this node, depth-first; a leaf returns itself.
    pub fn leaves(&self) -> Vec<&GroupNode<T>> {
        let mut leaves = Vec::new();
        self.collect_leaves(&mut leaves);
        leaves
    }

    fn collect_leaves<'a>(&'a self, leaves: &mut Vec<&'a GroupNode<T>>) {
        match &self.body {
            Body::Leaf(_) => leaves.push(self),
            Body::Internal { children, .. } => {
                for child in children {
                    child.collect_leaves(leaves);
                }
            }
        }
    }

    /// First matching descendant by name, without copying.
    pub fn find_first(&self, name: impl fmt::Display, recursive: bool) -> RollupResult<Option<&GroupNode<T>>> {
        let query = FindQuery::new().name(name).recursive(recursive);
        let mut found = Vec::new();
        self.require_children("find_first")?;
        self.collect_matches(&query, true, &mut found);
        Ok(found.into_iter().next())
    }

    fn collect_matches<'a>(&'a self, query: &FindQuery, first_only: bool, found: &mut Vec<&'a GroupNode<T>>) {
        let Body::Internal { children, .. } = &self.body else {
            return;
        };
        for child in children {
            if query.matches(child) {
                found.push(child);
            }
            if query.recursive {
                child.collect_matches(query, first_only, found);
            }
            if first_only && !found.is_empty() {
                break;
            }
        }
    }
}

impl<T: Clone> GroupNode<T> {
    /// Matching descendants gathered under a new, detached internal node.
    ///
    /// Matches are copied in pre-order: each match is followed by the matches
    /// found beneath it, before moving on to its next sibling.
    #[instrument(level = "debug", skip(self), fields(node = %self.display_name()))]
    pub fn find(&self, query: &FindQuery) -> RollupResult<GroupNode<T>> {
        query.validate()?;
        self.require_children("find")?;
        let mut found = Vec::new();
        self.collect_matches(query, false, &mut found);
        debug!(matches = found.len(), "find complete");
        Ok(GroupNode::internal(
            query.name.clone(),
            query.key.clone().unwrap_or_default(),
            found.into_iter().cloned().collect(),
        ))
    }

    pub fn find_by_name(&self, name: impl fmt::Display) -> RollupResult<GroupNode<T>> {
        self.find(&FindQuery::new().name(name))
    }

    pub fn find_by_key(&self, key: impl Into<Value>) -> RollupResult<GroupNode<T>> {
        self.find(&FindQuery::new().key(key))
    }
}

impl<T: Record> GroupNode<T> {
    /// Group every leaf of this tree by `expression`.
    ///
    /// With `name_field`, each child's key becomes that field of the grouping
    /// value, and its name the key's string form.
    pub fn group_by(&mut self, expression: &str, name_field: Option<&str>) -> RollupResult<()> {
        let expression = Expression::parse(expression)?;
        self.group_by_with(&expression, name_field, &Settings::default())
    }

    /// Group every leaf of this tree by a parsed expression.
    ///
    /// All leaves are evaluated before any of them is restructured, so on
    /// error the tree is left untouched.
    #[instrument(level = "debug", skip(self, settings), fields(node = %self.display_name()))]
    pub fn group_by_with(
        &mut self,
        expression: &Expression,
        name_field: Option<&str>,
        settings: &Settings,
    ) -> RollupResult<()> {
        if let Some(field) = name_field {
            validate_field_name(field)?;
        }
        let mut plans = Vec::new();
        self.plan(expression, name_field, settings, &mut plans)?;
        debug!(leaves = plans.len(), "grouping planned");

        let mut plans = plans.into_iter();
        self.apply(&mut plans)
    }

    fn plan(
        &self,
        expression: &Expression,
        name_field: Option<&str>,
        settings: &Settings,
        plans: &mut Vec<LeafPlan>,
    ) -> RollupResult<()> {
        match &self.body {
            Body::Leaf(items) => {
                plans.push(LeafPlan::build(items, expression, name_field, settings)?);
            }
            Body::Internal { children, .. } => {
                for child in children {
                    child.plan(expression, name_field, settings, plans)?;
                }
            }
        }
        Ok(())
    }

    fn apply(&mut self, plans: &mut impl Iterator<Item = LeafPlan>) -> RollupResult<()> {
        match &mut self.body {
            Body::Leaf(items) => {
                let plan = plans.next().ok_or_else(|| {
                    RollupError::structural("tree changed shape between planning and grouping")
                })?;
                let items = std::mem::take(items);
                let (children, assignment) = plan.distribute(items);
                let order = sibling_order().sorted_indices(&children)?;

                let mut position = vec![0; order.len()];
                for (sorted, group) in order.iter().enumerate() {
                    position[*group] = sorted;
                }
                let origin = assignment.into_iter().map(|group| position[group]).collect();

                let mut slots: Vec<Option<GroupNode<T>>> = children.into_iter().map(Some).collect();
                let children = order.into_iter().filter_map(|group| slots[group].take()).collect();
                self.body = Body::Internal {
                    children,
                    origin: Some(origin),
                };
            }
            Body::Internal { children, .. } => {
                for child in children.iter_mut() {
                    child.apply(plans)?;
                }
            }
        }
        Ok(())
    }

    /// Value of `field` on the first item, `None` when there are no items.
    pub fn first_value(&self, field: &str) -> RollupResult<Option<Value>> {
        self.iter().next().map(|item| field_of(item, field)).transpose()
    }

    /// Value of `field` on every item, in order.
    pub fn all_values(&self, field: &str) -> RollupResult<Vec<Value>> {
        self.iter().map(|item| field_of(item, field)).collect()
    }
}

/// Reset each child, then interleave their items back into `origin` order.
fn collapse<T>(children: Vec<GroupNode<T>>, origin: Option<Vec<usize>>) -> Vec<T> {
    let mut buckets: Vec<std::vec::IntoIter<T>> = children
        .into_iter()
        .map(|mut child| {
            child.reset();
            child.into_items().into_iter()
        })
        .collect();
    match origin {
        Some(origin) => origin
            .into_iter()
            .filter_map(|child| buckets[child].next())
            .collect(),
        None => buckets.into_iter().flatten().collect(),
    }
}

fn field_of<R: Record + ?Sized>(item: &R, field: &str) -> RollupResult<Value> {
    item.field(field).ok_or_else(|| RollupError::MissingField {
        field: field.to_string(),
        record: std::any::type_name::<R>().to_string(),
    })
}

/// Bucket layout for one leaf, computed without touching the tree.
struct LeafPlan {
    groups: Vec<(String, Value)>,
    /// Group index for each item, in item order.
    assignment: Vec<usize>,
}

impl LeafPlan {
    fn build<T: Record>(
        items: &[T],
        expression: &Expression,
        name_field: Option<&str>,
        settings: &Settings,
    ) -> RollupResult<Self> {
        let mut index: BTreeMap<Value, usize> = BTreeMap::new();
        let mut raw_keys: Vec<Value> = Vec::new();
        let mut assignment = Vec::with_capacity(items.len());
        let mut unknown = Vec::new();

        for (position, item) in items.iter().enumerate() {
            let value = expression.evaluate_with(item, settings)?;
            if value.is_null() {
                unknown.push(position);
                assignment.push(usize::MAX);
                continue;
            }
            let group = *index.entry(value.clone()).or_insert_with(|| {
                raw_keys.push(value);
                raw_keys.len() - 1
            });
            assignment.push(group);
        }

        let mut groups = raw_keys
            .into_iter()
            .map(|raw| {
                let key = match name_field {
                    Some(field) => raw.navigate(field, false).ok_or_else(|| {
                        RollupError::UnknownSegment {
                            expression: field.to_string(),
                            segment: field.to_string(),
                            target: format!("{} {}", raw.type_name(), raw),
                        }
                    })?,
                    None => raw,
                };
                Ok((key.to_string(), key))
            })
            .collect::<RollupResult<Vec<_>>>()?;

        if !unknown.is_empty() {
            let unknown_group = groups.len();
            for position in unknown {
                assignment[position] = unknown_group;
            }
            groups.push((settings.unknown_label.clone(), Value::Null));
        }

        trace!(
            groups = groups.len(),
            items = items.len(),
            expression = %expression,
            "leaf partitioned"
        );
        Ok(Self { groups, assignment })
    }

    /// One leaf per group, plus the group index of each item.
    fn distribute<T>(self, items: Vec<T>) -> (Vec<GroupNode<T>>, Vec<usize>) {
        let mut buckets: Vec<Vec<T>> = self.groups.iter().map(|_| Vec::new()).collect();
        for (item, group) in items.into_iter().zip(&self.assignment) {
            buckets[*group].push(item);
        }
        let children = self
            .groups
            .into_iter()
            .zip(buckets)
            .map(|((name, key), items)| GroupNode::leaf(Some(name), key, items))
            .collect();
        (children, self.assignment)
    }
}

/// Search criteria for [`GroupNode::find`].
///
/// Exactly one of `name` or `key` must be set. Names are compared as
/// strings: `name(2020)` matches a node named `"2020"` whatever its key's
/// type. Keys are compared with [`Value`] equality. An unnamed node never
/// matches a name query, not even `name("None")`.
#[derive(Debug, Clone)]
pub struct FindQuery {
    name: Option<String>,
    key: Option<Value>,
    recursive: bool,
}

impl Default for FindQuery {
    fn default() -> Self {
        Self::new()
    }
}

impl FindQuery {
    pub fn new() -> Self {
        Self {
            name: None,
            key: None,
            recursive: true,
        }
    }

    pub fn name(mut self, name: impl fmt::Display) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn key(mut self, key: impl Into<Value>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    fn validate(&self) -> RollupResult<()> {
        match (&self.name, &self.key) {
            (Some(_), None) | (None, Some(_)) => Ok(()),
            (None, None) => Err(RollupError::configuration("find requires a name or a key")),
            (Some(_), Some(_)) => Err(RollupError::configuration(
                "find accepts a name or a key, not both",
            )),
        }
    }

    fn matches<T>(&self, node: &GroupNode<T>) -> bool {
        match (&self.name, &self.key) {
            (Some(name), _) => node.name() == Some(name.as_str()),
            (None, Some(key)) => node.key() == key,
            (None, None) => false,
        }
    }
}

impl<T: fmt::Debug> Record for GroupNode<T> {
    fn field(&self, name: &str) -> Option<Value> {
        match name {
            "name" => Some(Value::from(self.name.clone())),
            "key" => Some(self.key.clone()),
            "len" => Some(Value::from(self.len())),
            _ => None,
        }
    }

    fn label(&self) -> String {
        self.display_name().to_string()
    }
}

/// Depth-first iterator over the items below a node.
pub struct Items<'a, T> {
    current: std::slice::Iter<'a, T>,
    stack: Vec<std::slice::Iter<'a, GroupNode<T>>>,
}

impl<'a, T> Iterator for Items<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.current.next() {
                return Some(item);
            }
            let frame = self.stack.last_mut()?;
            match frame.next() {
                Some(node) => match &node.body {
                    Body::Leaf(items) => self.current = items.iter(),
                    Body::Internal { children, .. } => self.stack.push(children.iter()),
                },
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}

impl<'a, T> IntoIterator for &'a GroupNode<T> {
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
    use crate::impl_record;

    #[derive(Debug, Clone, PartialEq)]
    struct Tx {
        id: i64,
        year: i64,
        category: Option<String>,
    }

    impl_record!(Tx { id, year, category });

    fn tx(id: i64, year: i64, category: Option<&str>) -> Tx {
        Tx {
            id,
            year,
            category: category.map(str::to_string),
        }
    }

    fn ids<'a>(items: impl IntoIterator<Item = &'a Tx>) -> Vec<i64> {
        items.into_iter().map(|t| t.id).collect()
    }

    #[test]
    fn given_leaf_when_grouped_then_children_partition_items() {
        let mut root = GroupNode::from_items(vec![
            tx(1, 2021, None),
            tx(2, 2020, None),
            tx(3, 2021, None),
        ]);
        root.group_by("year", None).unwrap();

        assert_eq!(root.child_names().unwrap(), vec![Some("2020"), Some("2021")]);
        let children = root.children().unwrap();
        assert_eq!(ids(&children[0]), vec![2]);
        assert_eq!(ids(&children[1]), vec![1, 3]);
        assert_eq!(children[1].key(), &Value::Int(2021));
        // internal items follow child order
        assert_eq!(ids(root.iter()), vec![2, 1, 3]);
    }

    #[test]
    fn given_grouped_leaf_when_reset_then_items_in_original_order() {
        let mut root = GroupNode::from_items(vec![
            tx(1, 2021, None),
            tx(2, 2020, None),
            tx(3, 2021, None),
        ]);
        root.group_by("year", None).unwrap();
        root.group_by("id % 2", None).unwrap();
        assert_eq!(ids(&root), vec![2, 1, 3]);

        root.reset();

        assert!(root.is_leaf());
        assert_eq!(root.all_values("id").unwrap(), vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }

    #[test]
    fn given_node_built_from_children_when_reset_then_child_order_kept() {
        let b = GroupNode::leaf(Some("b".into()), Value::from("b"), vec![tx(3, 1, None)]);
        let a = GroupNode::leaf(Some("a".into()), Value::from("a"), vec![tx(1, 1, None), tx(2, 1, None)]);
        let mut root = GroupNode::from_children(vec![b, a]);
        root.reset();
        assert_eq!(ids(&root), vec![3, 1, 2]);
    }

    #[test]
    fn given_empty_leaf_when_grouped_then_internal_without_children() {
        let mut root: GroupNode<Tx> = GroupNode::from_items(vec![]);
        root.group_by("year", None).unwrap();
        assert!(!root.is_leaf());
        assert!(root.child_names().unwrap().is_empty());
        assert!(root.is_empty());
    }

    #[test]
    fn given_failing_expression_when_grouped_then_tree_untouched() {
        let mut root = GroupNode::from_items(vec![tx(1, 2021, Some("a")), tx(2, 2020, None)]);
        root.group_by("category", None).unwrap();
        let err = root.group_by("category.len % 0", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Expression);
        assert_eq!(root.depth(), 2);
        assert!(root.leaves().iter().all(|l| l.is_leaf()));
    }

    #[test]
    fn given_leaf_when_navigating_children_then_structural_error() {
        let root = GroupNode::from_items(vec![tx(1, 2021, None)]);
        assert_eq!(root.child_names().unwrap_err().kind(), ErrorKind::Structural);
        assert_eq!(
            root.find_by_name("2021").unwrap_err().kind(),
            ErrorKind::Structural
        );
        assert_eq!(root.leaves().len(), 1);
    }

    #[test]
    fn given_both_items_and_children_when_constructed_then_configuration_error() {
        let err = GroupNode::new(None, Value::Null, Some(vec![tx(1, 1, None)]), Some(vec![]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        let err = GroupNode::<Tx>::new(None, Value::Null, None, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn given_children_when_constructed_then_items_derived_in_child_order() {
        let a = GroupNode::leaf(Some("b".into()), Value::from("b"), vec![tx(1, 1, None)]);
        let b = GroupNode::leaf(Some("a".into()), Value::from("a"), vec![tx(2, 1, None), tx(3, 1, None)]);
        let root = GroupNode::from_children(vec![a, b]).with_name("root");
        assert_eq!(ids(root.items()), vec![1, 2, 3]);
        assert_eq!(root.len(), 3);
        assert_eq!(root.name(), Some("root"));
    }

    #[test]
    fn given_nested_tree_when_iterated_twice_then_same_sequence() {
        let mut root = GroupNode::from_items((0..6).map(|i| tx(i, 2020 + i % 2, None)).collect());
        root.group_by("year", None).unwrap();
        root.group_by("id % 3", None).unwrap();
        let first = ids(&root);
        let second = ids(&root);
        assert_eq!(first, second);
        assert_eq!(first.len(), 6);
    }

    #[test]
    fn given_node_when_used_as_record_then_exposes_name_key_len() {
        let node = GroupNode::leaf(Some("2020".into()), Value::Int(2020), vec![tx(1, 2020, None)]);
        assert_eq!(node.field("name"), Some(Value::from("2020")));
        assert_eq!(node.field("key"), Some(Value::Int(2020)));
        assert_eq!(node.field("len"), Some(Value::Int(1)));
        assert_eq!(node.field("items"), None);
    }

    #[test]
    fn given_unnamed_child_when_found_by_name_then_no_match() {
        let unnamed = GroupNode::from_items(vec![tx(1, 2021, None)]);
        let named = GroupNode::leaf(Some("None".into()), Value::Null, vec![tx(2, 2021, None)]);
        let root = GroupNode::from_children(vec![unnamed, named]);
        let found = root.find_by_name("None").unwrap();
        assert_eq!(ids(&found), vec![2]);
    }

    #[test]
    fn given_find_query_without_criteria_when_searching_then_configuration_error() {
        let mut root = GroupNode::from_items(vec![tx(1, 2021, None)]);
        root.group_by("year", None).unwrap();
        let err = root.find(&FindQuery::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        let err = root
            .find(&FindQuery::new().name("2021").key(2021))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
