use std::fmt;

use termtree::Tree;
use tracing::instrument;

use crate::immutable::ImmutableGroupNode;
use crate::node::GroupNode;

pub trait TreeNodeConvert {
    fn to_tree_string(&self) -> Tree<String>;
}

impl<T> TreeNodeConvert for GroupNode<T> {
    #[instrument(level = "trace", skip(self))]
    fn to_tree_string(&self) -> Tree<String> {
        let root = format!("{} ({} items)", self.display_name(), self.len());

        // Recursively construct the children
        let leaves: Vec<_> = self
            .children()
            .unwrap_or_default()
            .iter()
            .map(|c| c.to_tree_string())
            .collect();

        Tree::new(root).with_leaves(leaves)
    }
}

impl<T> TreeNodeConvert for ImmutableGroupNode<T> {
    fn to_tree_string(&self) -> Tree<String> {
        self.as_node().to_tree_string()
    }
}

impl<T> fmt::Display for GroupNode<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_tree_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use std::collections::BTreeMap;

    #[test]
    fn given_grouped_tree_when_rendered_then_one_line_per_node() {
        let rows: Vec<BTreeMap<String, Value>> = [2020, 2021, 2020]
            .into_iter()
            .map(|y| BTreeMap::from([("year".to_string(), Value::Int(y))]))
            .collect();
        let mut root = GroupNode::from_items(rows);
        root.group_by("year", None).unwrap();

        let rendered = root.to_string();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "<root> (3 items)");
        assert!(lines[1].ends_with("2020 (2 items)"));
        assert!(lines[2].ends_with("2021 (1 items)"));
    }
}
