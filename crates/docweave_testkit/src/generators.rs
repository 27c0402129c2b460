//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random values and instance graphs
//! that fit the fixture schema.

use crate::fixtures::{Category, ChildCategory, Composable};
use docweave_codec::{DocumentId, Value};
use proptest::prelude::*;

/// Strategy for generating document identifiers.
pub fn document_id_strategy() -> impl Strategy<Value = DocumentId> {
    prop::array::uniform16(any::<u8>()).prop_map(DocumentId::from_bytes)
}

/// Strategy for generating names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z][A-Za-z0-9 ]{0,15}").expect("Invalid regex")
}

/// Strategy for generating non-null scalar values.
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        name_strategy().prop_map(Value::Text),
        prop::collection::vec(any::<u8>(), 0..32).prop_map(Value::Bytes),
        document_id_strategy().prop_map(Value::Id),
    ]
}

/// Shape of a category tree, independent of any instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryTree {
    /// Node name.
    pub name: String,
    /// Child shapes, in order.
    pub children: Vec<CategoryTree>,
}

impl CategoryTree {
    /// Builds a root category with this shape.
    pub fn build(&self) -> Category {
        let root = Category::new(&self.name);
        self.build_children(&root);
        root
    }

    fn build_children(&self, parent: &impl Composable) {
        for shape in &self.children {
            let child: ChildCategory = parent.add_child(&shape.name);
            shape.build_children(&child);
        }
    }

    /// Number of nodes, root included.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(CategoryTree::size).sum::<usize>()
    }

    /// Reads the shape back from a category.
    pub fn of(node: &impl Composable) -> Self {
        Self {
            name: node.name().unwrap_or_default(),
            children: node.children().iter().map(CategoryTree::of).collect(),
        }
    }
}

/// Strategy for generating category trees up to four levels deep.
pub fn category_tree_strategy() -> impl Strategy<Value = CategoryTree> {
    let leaf = name_strategy().prop_map(|name| CategoryTree {
        name,
        children: Vec::new(),
    });
    leaf.prop_recursive(4, 32, 4, |inner| {
        (name_strategy(), prop::collection::vec(inner, 0..4))
            .prop_map(|(name, children)| CategoryTree { name, children })
    })
}

/// Strategy for generating a permutation of `0..len`.
pub fn permutation_strategy(len: usize) -> impl Strategy<Value = Vec<usize>> {
    Just((0..len).collect::<Vec<_>>()).prop_shuffle()
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn built_trees_read_back_unchanged(tree in category_tree_strategy()) {
            let root = tree.build();
            prop_assert_eq!(CategoryTree::of(&root), tree);
        }

        #[test]
        fn permutations_cover_every_index(perm in permutation_strategy(6)) {
            let mut sorted = perm.clone();
            sorted.sort_unstable();
            prop_assert_eq!(sorted, (0..6).collect::<Vec<_>>());
        }

        #[test]
        fn scalars_are_never_null(value in scalar_value_strategy()) {
            prop_assert!(!value.is_null());
        }
    }
}
