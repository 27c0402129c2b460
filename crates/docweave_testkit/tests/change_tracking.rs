//! Change detection across flushes and reloads.

use docweave_core::{FieldDelta, OperationKind};
use docweave_store::Filter;
use docweave_testkit::prelude::*;
use proptest::prelude::*;

fn reload_category(session: &mut TestSession) -> Category {
    session.clear();
    Category(
        session
            .find_one("Category", &Filter::all())
            .unwrap()
            .expect("category was stored"),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn reloaded_trees_match_and_plan_nothing(tree in category_tree_strategy()) {
        let mut session = TestSession::new();
        let root = tree.build();
        session.persist(&root.0).unwrap();
        prop_assert_eq!(session.flush().unwrap().count(OperationKind::Insert), 1);
        prop_assert!(session.plan().unwrap().is_empty());

        let mut reopened = session.reopen();
        let id = root.0.id().unwrap();
        let loaded = Category(reopened.get("Category", id).unwrap());
        prop_assert_eq!(CategoryTree::of(&loaded), tree);
        prop_assert!(reopened.plan().unwrap().is_empty());
        prop_assert!(reopened.flush().unwrap().is_noop());
    }

    #[test]
    fn any_reordering_is_a_single_reorder_delta(perm in permutation_strategy(4)) {
        let mut session = TestSession::new();
        let root = Category::new("Root");
        for name in ["a", "b", "c", "d"] {
            root.add_child(name);
        }
        session.persist(&root.0).unwrap();
        session.flush().unwrap();

        let root = reload_category(&mut session);
        root.0.update_embedded_many("children", |children| {
            let original = children.clone();
            for (slot, from) in children.iter_mut().zip(&perm) {
                *slot = original[*from].clone();
            }
        });

        let trees = session.compute_changes().unwrap();
        let identity = perm.iter().enumerate().all(|(i, p)| i == *p);
        if identity {
            prop_assert!(trees.is_empty());
        } else {
            prop_assert_eq!(trees.len(), 1);
            prop_assert_eq!(trees[0].deltas.len(), 1);
            let is_reorder = matches!(trees[0].deltas[0], FieldDelta::EmbedReordered { .. });
            prop_assert!(is_reorder);
        }
    }
}

#[test]
fn empty_embedded_sequences_are_omitted() {
    let mut session = TestSession::new();
    let root = Category::new("Lonely");
    root.0.update_embedded_many("children", |_| ());
    session.persist(&root.0).unwrap();
    session.flush().unwrap();

    let stored = &session.stored("categories")[0];
    assert!(!stored.contains_key("children"));

    let loaded = reload_category(&mut session);
    assert!(loaded.children().is_empty());
    assert!(session.plan().unwrap().is_empty());
}

#[test]
fn removing_every_child_drops_the_key() {
    let mut session = TestSession::new();
    let root = Category::new("Root");
    root.add_child("Only");
    session.persist(&root.0).unwrap();
    session.flush().unwrap();

    let root = reload_category(&mut session);
    root.0.update_embedded_many("children", Vec::clear);
    let trees = session.compute_changes().unwrap();
    assert!(matches!(
        trees[0].deltas.as_slice(),
        [FieldDelta::EmbedRemoved { position: 0, .. }]
    ));
    session.flush().unwrap();
    assert!(!session.stored("categories")[0].contains_key("children"));
}

#[test]
fn swapping_two_children_is_a_reorder_not_add_remove() {
    let mut session = TestSession::new();
    let root = Category::new("Root");
    root.add_child("First");
    root.add_child("Second");
    session.persist(&root.0).unwrap();
    session.flush().unwrap();

    let root = reload_category(&mut session);
    root.0.update_embedded_many("children", |children| children.swap(0, 1));

    let trees = session.compute_changes().unwrap();
    assert_eq!(trees.len(), 1);
    let deltas: Vec<_> = trees[0].deltas_for("children").collect();
    assert_eq!(deltas.len(), 1);
    assert!(matches!(deltas[0], FieldDelta::EmbedReordered { .. }));
    let direct = session.diff_against_baseline(&root.0).unwrap().unwrap();
    assert_eq!(direct, trees[0].deltas);

    let ops = session.plan().unwrap();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].kind, OperationKind::Replace);
    session.flush().unwrap();

    let root = reload_category(&mut session);
    let names: Vec<_> = root.children().iter().filter_map(Composable::name).collect();
    assert_eq!(names, ["Second", "First"]);
}

#[test]
fn deep_mutation_nests_in_the_owner_tree() {
    let mut session = TestSession::new();
    let root = Category::new("Root");
    root.add_child("Child").add_child("Grandchild");
    session.persist(&root.0).unwrap();
    session.flush().unwrap();

    let root = reload_category(&mut session);
    root.child("Child")
        .and_then(|c| c.child("Grandchild"))
        .unwrap()
        .set_name("Renamed");

    let trees = session.compute_changes().unwrap();
    assert_eq!(trees.len(), 1);
    let FieldDelta::EmbedMutated { position, change, .. } = &trees[0].deltas[0] else {
        panic!("expected nested change, got {:?}", trees[0].deltas);
    };
    assert_eq!(*position, Some(0));
    let FieldDelta::EmbedMutated { change: inner, .. } = &change.deltas[0] else {
        panic!("expected second level, got {:?}", change.deltas);
    };
    assert!(inner.touches("name"));
}

#[test]
fn referenced_document_changes_are_planned_separately() {
    let mut session = TestSession::new();
    let root = Hierarchy::new("Root");
    let child = root.add_child("Child");
    session.persist(&root.0).unwrap();
    session.flush().unwrap();

    child.0.set("name", "Renamed");
    let trees = session.compute_changes().unwrap();
    assert_eq!(trees.len(), 1);
    assert_eq!(trees[0].key, child.0.key());

    let ops = session.plan().unwrap();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].kind, OperationKind::Replace);
    assert_eq!(ops[0].id, child.0.id().unwrap());
    assert_eq!(ops[0].collection, "hierarchy");
}

#[test]
fn new_reference_target_is_inserted_before_its_owner() {
    let mut session = TestSession::new();
    let root = Hierarchy::new("Root");
    session.persist(&root.0).unwrap();
    session.flush().unwrap();

    let child = root.add_child("Late");
    assert!(!session.contains(&child.0));

    let ops = session.plan().unwrap();
    assert!(session.contains(&child.0));
    assert_eq!(ops.len(), 2);
    assert_eq!(ops[0].kind, OperationKind::Insert);
    assert_eq!(ops[0].instance, child.0.key());
    assert_eq!(ops[1].kind, OperationKind::Replace);
    assert_eq!(ops[1].depends_on, vec![child.0.key()]);

    session.flush().unwrap();
    let stored = session
        .store
        .documents("hierarchy")
        .unwrap()
        .into_iter()
        .find(|d| d.id() == root.0.id())
        .unwrap();
    assert_eq!(
        stored.path("children.0").and_then(|v| v.as_id()),
        child.0.id()
    );
}

#[test]
fn stored_target_kept_across_clear_is_written_in_full() {
    let mut session = TestSession::new();
    let child = Hierarchy::new("Child");
    session.persist(&child.0).unwrap();
    session.flush().unwrap();
    let child_id = child.0.id().unwrap();
    session.clear();

    let root = Hierarchy::new("Root");
    root.0.push_reference("children", &child.0);
    child.0.set("name", "Child Changed");
    session.persist(&root.0).unwrap();

    let report = session.flush().unwrap();
    assert_eq!(report.count(OperationKind::Insert), 1);
    assert_eq!(report.count(OperationKind::Replace), 1);
    assert!(session.contains(&child.0));
    assert!(session.baseline(&child.0).is_some());

    let stored = session.stored("hierarchy");
    let stored_child = stored.iter().find(|d| d.id() == Some(child_id)).unwrap();
    assert_eq!(to_json(stored_child)["name"], "Child Changed");
    assert!(session.flush().unwrap().is_noop());
}

#[test]
fn chains_of_new_references_insert_leaves_first() {
    let mut session = TestSession::new();
    let root = Hierarchy::new("Root");
    let child = root.add_child("Child");
    let grandchild = child.add_child("Grandchild");
    session.persist(&root.0).unwrap();

    let ops = session.plan().unwrap();
    let order: Vec<_> = ops.iter().map(|op| op.instance).collect();
    assert_eq!(order, [grandchild.0.key(), child.0.key(), root.0.key()]);
}

#[test]
fn detached_roots_are_not_written() {
    let mut session = TestSession::new();
    let root = Category::new("Root");
    session.persist(&root.0).unwrap();
    session.flush().unwrap();

    root.set_name("Changed");
    assert!(session.detach(&root.0));
    assert!(session.flush().unwrap().is_noop());
    let stored = &session.stored("categories")[0];
    assert_eq!(to_json(stored)["name"], "Root");
}
