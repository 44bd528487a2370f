//! Property tests over randomly generated dependency graphs.

use catalyst_workgraph::{
    AtomStatus, TransitionContext, WorkGraph, WorkGraphError,
};
use catalyst_types::AtomId;
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};

/// Build a graph with `n` atoms and attempt every edge in `edges`
/// (cycle-creating ones are expected to be rejected). Returns the atom ids
/// and the accepted edge set as (atom, dependency) index pairs.
fn build_graph(
    graph: &WorkGraph,
    n: usize,
    edges: &[(usize, usize)],
) -> (Vec<AtomId>, Vec<(usize, usize)>) {
    let compound = graph.create_compound("prop").unwrap();
    let molecule = graph
        .create_molecule(&compound.id, "prop", vec![])
        .unwrap();
    let atoms: Vec<AtomId> = (0..n)
        .map(|i| {
            graph
                .create_atom(&molecule.id, format!("atom-{i}"), vec![], None)
                .unwrap()
                .id
        })
        .collect();

    let mut accepted = Vec::new();
    for &(a, b) in edges {
        let (a, b) = (a % n, b % n);
        if graph.add_dependency(&atoms[a], &atoms[b]).is_ok() {
            accepted.push((a, b));
        }
    }
    (atoms, accepted)
}

/// Kahn's algorithm over the accepted edges; returns a topological order or
/// None if the edge set is cyclic.
fn topo_order(n: usize, accepted: &[(usize, usize)]) -> Option<Vec<usize>> {
    // edge (a, b): a requires b, so b precedes a
    let mut out_deg: HashMap<usize, usize> = (0..n).map(|i| (i, 0)).collect();
    let mut dependents: HashMap<usize, Vec<usize>> = HashMap::new();
    for &(a, b) in accepted {
        *out_deg.get_mut(&a).unwrap() += 1;
        dependents.entry(b).or_default().push(a);
    }

    let mut ready: Vec<usize> = (0..n).filter(|i| out_deg[i] == 0).collect();
    let mut order = Vec::new();
    while let Some(node) = ready.pop() {
        order.push(node);
        if let Some(deps) = dependents.get(&node) {
            for &d in deps {
                let deg = out_deg.get_mut(&d).unwrap();
                *deg -= 1;
                if *deg == 0 {
                    ready.push(d);
                }
            }
        }
    }
    (order.len() == n).then_some(order)
}

fn verify(graph: &WorkGraph, atom: &AtomId) {
    let ctx = TransitionContext::new();
    graph.transition(atom, AtomStatus::InProgress, &ctx).unwrap();
    graph.transition(atom, AtomStatus::Complete, &ctx).unwrap();
    graph.transition(atom, AtomStatus::Verified, &ctx).unwrap();
}

proptest! {
    /// Any sequence of accepted edge insertions leaves the graph acyclic.
    #[test]
    fn accepted_edges_stay_acyclic(
        n in 2usize..12,
        edges in prop::collection::vec((0usize..12, 0usize..12), 0..40),
    ) {
        let graph = WorkGraph::new();
        let (atoms, accepted) = build_graph(&graph, n, &edges);
        prop_assert!(topo_order(n, &accepted).is_some());

        // The stored requires sets agree with the accepted edge list
        for (i, atom_id) in atoms.iter().enumerate() {
            let stored = graph.atom(atom_id).unwrap().requires;
            let expected: HashSet<AtomId> = accepted
                .iter()
                .filter(|(a, _)| *a == i)
                .map(|(_, b)| atoms[*b].clone())
                .collect();
            prop_assert_eq!(stored.into_iter().collect::<HashSet<_>>(), expected);
        }
    }

    /// `pending -> in_progress` succeeds iff every required atom is verified.
    #[test]
    fn start_succeeds_iff_requires_verified(
        n in 2usize..10,
        edges in prop::collection::vec((0usize..10, 0usize..10), 0..25),
        prefix in 0usize..10,
    ) {
        let graph = WorkGraph::new();
        let (atoms, accepted) = build_graph(&graph, n, &edges);
        let order = topo_order(n, &accepted).unwrap();

        // Verify a topological prefix: every dependency of a prefix atom is
        // earlier in the order, so the guards are satisfied along the way.
        let prefix_len = prefix.min(n);
        let verified: HashSet<usize> = order[..prefix_len].iter().copied().collect();
        for &i in &order[..prefix_len] {
            verify(&graph, &atoms[i]);
        }

        let ctx = TransitionContext::new();
        for &i in &order[prefix_len..] {
            let requires: Vec<usize> = accepted
                .iter()
                .filter(|(a, _)| *a == i)
                .map(|(_, b)| *b)
                .collect();
            let expect_success = requires.iter().all(|b| verified.contains(b));

            let result = graph.transition(&atoms[i], AtomStatus::InProgress, &ctx);
            if expect_success {
                prop_assert!(result.is_ok());
            } else {
                let is_unsatisfied = matches!(
                    result,
                    Err(WorkGraphError::UnsatisfiedDependency { .. })
                );
                prop_assert!(is_unsatisfied);
            }
        }
    }
}
