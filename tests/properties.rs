//! Algebraic properties of the graph and the history machine

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;

use cartograph::actions::AddEntity;
use cartograph::edit::CommitOptions;
use cartograph::graph::{BaseLayer, Difference, Graph};
use cartograph::types::Entity;

use common::{act, system};

fn arb_node() -> impl Strategy<Value = Entity> {
    (0u32..50, -180.0f64..180.0, -90.0f64..90.0)
        .prop_map(|(n, lon, lat)| Entity::node(format!("n{}", n), [lon, lat]).new_version(1, true))
}

proptest! {
    // Difference(g, g) is empty for any graph, however it was built
    #[test]
    fn difference_identity(nodes in prop::collection::vec(arb_node(), 0..20)) {
        let base = Arc::new(BaseLayer::new());
        let mut graph = Graph::new(base);
        for node in nodes {
            graph = graph.replace(node);
        }
        prop_assert!(Difference::between(&graph, &graph).is_empty());
    }

    // undo then redo restores the exact pre-undo state
    #[test]
    fn undo_redo_inverse(count in 1usize..6) {
        let (mut system, _, _) = system();
        for i in 0..count {
            system.perform(vec![act(AddEntity::new(
                Entity::node(format!("n-{}", i + 1), [i as f64, 0.0]),
            ))]);
            system.commit(CommitOptions::annotated("Added a point"));
        }

        let index_before = system.index();
        let stable_before = system.stable_graph();

        system.undo();
        system.redo();

        prop_assert_eq!(system.index(), index_before);
        prop_assert!(Difference::between(&stable_before, &system.stable_graph()).is_empty());
    }

    // merging the same batch twice leaves the base exactly as one merge
    #[test]
    fn merge_idempotence(nodes in prop::collection::vec(arb_node(), 1..20)) {
        let (mut once, _, _) = system();
        let (mut twice, _, _) = system();

        once.merge(nodes.clone(), HashSet::new());
        twice.merge(nodes.clone(), HashSet::new());
        twice.merge(nodes.clone(), HashSet::new());

        for node in &nodes {
            let a = once.base_graph().get(node.id());
            let b = twice.base_graph().get(node.id());
            prop_assert_eq!(a.is_some(), b.is_some());
            if let (Some(a), Some(b)) = (a, b) {
                prop_assert_eq!(&*a, &*b);
            }
        }
    }
}
