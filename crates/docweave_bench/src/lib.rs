//! Benchmark utilities.

#![warn(missing_docs)]

use docweave_codec::{Document, DocumentId, Value};
use docweave_testkit::{Category, Composable, Hierarchy, TestSession};

/// Build a category tree where every node has `width` children, `depth`
/// levels below the root.
pub fn category_tree(depth: usize, width: usize) -> Category {
    let root = Category::new("root");
    fill(&root, depth, width);
    root
}

fn fill(node: &impl Composable, depth: usize, width: usize) {
    if depth == 0 {
        return;
    }
    for i in 0..width {
        let child = node.add_child(&format!("node_{depth}_{i}"));
        fill(&child, depth - 1, width);
    }
}

/// Build a hierarchy root referencing `count` new children.
pub fn hierarchy_fan(count: usize) -> Hierarchy {
    let root = Hierarchy::new("root");
    for i in 0..count {
        root.add_child(&format!("child_{i}"));
    }
    root
}

/// A session holding `count` flushed category trees.
pub fn flushed_session(count: usize, depth: usize, width: usize) -> (TestSession, Vec<Category>) {
    let mut session = TestSession::new();
    let roots: Vec<_> = (0..count).map(|_| category_tree(depth, width)).collect();
    for root in &roots {
        session.persist(&root.0).expect("Failed to persist");
    }
    session.flush().expect("Failed to flush");
    (session, roots)
}

/// A stored-shaped category document with `width` children per level.
pub fn category_document(depth: usize, width: usize) -> Document {
    fn node(name: String, depth: usize, width: usize) -> Document {
        let doc = Document::new().with("name", name);
        if depth == 0 {
            return doc;
        }
        let children: Vec<Value> = (0..width)
            .map(|i| node(format!("node_{depth}_{i}"), depth - 1, width).into())
            .collect();
        doc.with("children", children)
    }
    node("root".into(), depth, width).with("_id", DocumentId::new())
}
