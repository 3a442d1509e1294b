//! # Property-Based Tests
//!
//! Invariants of the edge log and its naming convention, checked with
//! proptest.

use proptest::collection::vec;
use proptest::prelude::*;
use relata_core::primitives::COLLECTION_SUFFIX;
use relata_core::{
    EdgeCoordinator, EntityRef, MemoryEdgeStore, OrganizationScope, TypeFilter, Version,
    inflection,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

fn coordinator() -> EdgeCoordinator {
    EdgeCoordinator::new(
        Arc::new(MemoryEdgeStore::new()),
        OrganizationScope::new(Uuid::now_v7()),
        COLLECTION_SUFFIX,
    )
}

/// One step of a membership history: add or remove member `i`.
#[derive(Debug, Clone, Copy)]
enum Step {
    Add(usize),
    Remove(usize),
}

fn step(members: usize) -> impl Strategy<Value = Step> {
    prop_oneof![
        (0..members).prop_map(Step::Add),
        (0..members).prop_map(Step::Remove),
    ]
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Live membership equals the last operation applied to each member.
    #[test]
    fn latest_record_wins(steps in vec(step(4), 1..40)) {
        let edges = coordinator();
        let head = EntityRef::new("application", Uuid::now_v7());
        let members: Vec<EntityRef> =
            (0..4).map(|_| EntityRef::new("device", Uuid::now_v7())).collect();
        let mut expected: BTreeMap<usize, bool> = BTreeMap::new();

        for step in &steps {
            match *step {
                Step::Add(i) => {
                    edges.write_collection_edge(&head, "devices", &members[i]).expect("write");
                    expected.insert(i, true);
                }
                Step::Remove(i) => {
                    edges.remove_collection_edge(&head, "devices", &members[i]).expect("remove");
                    expected.insert(i, false);
                }
            }
        }

        let edge_type = edges.collection_type("devices");
        for (i, member) in members.iter().enumerate() {
            let live = edges.has_live_edge(&head, &edge_type, member).expect("check");
            prop_assert_eq!(live, expected.get(&i).copied().unwrap_or(false));
        }
    }

    /// Any number of repeated adds leaves exactly one live edge.
    #[test]
    fn repeated_adds_are_idempotent(times in 1usize..20) {
        let edges = coordinator();
        let head = EntityRef::new("application", Uuid::now_v7());
        let member = EntityRef::new("device", Uuid::now_v7());

        for _ in 0..times {
            edges.write_collection_edge(&head, "devices", &member).expect("write");
        }

        let live = edges
            .edges_to_target(&member, TypeFilter::Any, Version::next())
            .expect("read")
            .count();
        prop_assert_eq!(live, 1);
    }

    /// A collection edge type is never a valid connection name, and
    /// decodes back to its collection name.
    #[test]
    fn suffix_separates_namespaces(name in "[a-z]{1,16}") {
        let edges = coordinator();
        let edge_type = edges.collection_type(&name);

        prop_assert_eq!(edges.collection_name(&edge_type), Some(name.as_str()));
        prop_assert_ne!(&edge_type, &name);
        prop_assert!(edges.collection_name(&name).is_none());

        let result = edges.write_connection_edge(
            &EntityRef::new("user", Uuid::now_v7()),
            &edge_type,
            &EntityRef::new("device", Uuid::now_v7()),
        );
        prop_assert!(result.is_err());
    }

    /// A snapshot read as of an earlier version never sees later edges.
    #[test]
    fn as_of_is_a_stable_view(before in 0usize..10, after in 0usize..10) {
        let edges = coordinator();
        let target = EntityRef::new("device", Uuid::now_v7());

        for _ in 0..before {
            edges
                .write_collection_edge(&EntityRef::new("user", Uuid::now_v7()), "devices", &target)
                .expect("write");
        }
        let horizon = Version::next();
        for _ in 0..after {
            edges
                .write_collection_edge(&EntityRef::new("user", Uuid::now_v7()), "devices", &target)
                .expect("write");
        }

        let seen = edges
            .edges_to_target(&target, TypeFilter::Any, horizon)
            .expect("read")
            .count();
        prop_assert_eq!(seen, before);
    }

    /// Plural and singular forms of regular nouns round-trip.
    #[test]
    fn regular_inflection_round_trips(stem in "[b-df-hj-np-tv-z][aeiou][dgkpt]") {
        prop_assert_eq!(inflection::singularize(&inflection::pluralize(&stem)), stem);
    }
}
