//! Topological ordering of the network.
//!
//! The routing engine evaluates nodes in an order where every node appears
//! after all nodes with links into it, so predecessor flows are always
//! finalized before a node's own allocation runs.

use super::registry::Registry;
use super::types::NodeId;
use crate::error::BuildError;

/// Topological sort by depth-first search.
///
/// Returns a list of NodeIds where every upstream node appears before its
/// downstream consumers. Fails with `CycleDetected` if the network is not a
/// DAG (a reservoir release feeding back upstream of itself, for instance).
pub fn sort(registry: &Registry) -> Result<Vec<NodeId>, BuildError> {
    let count = registry.node_count();
    let preds = predecessor_lists(registry);

    let mut order = Vec::with_capacity(count);
    let mut state = vec![VisitState::None; count];

    // Iterate 0..count so disconnected nodes are visited too. Post-order DFS
    // over predecessors emits [upstream, ..., downstream].
    for i in 0..count {
        if state[i] == VisitState::None {
            visit(NodeId::new(i), registry, &preds, &mut state, &mut order)?;
        }
    }

    Ok(order)
}

#[derive(Clone, PartialEq, Eq)]
enum VisitState {
    None,
    Visiting, // Used for cycle detection
    Visited,
}

fn predecessor_lists(registry: &Registry) -> Vec<Vec<NodeId>> {
    let mut preds = vec![Vec::new(); registry.node_count()];
    for i in 0..registry.link_count() {
        preds[registry.link_to[i].index()].push(registry.link_from[i]);
    }
    preds
}

fn visit(
    node: NodeId,
    registry: &Registry,
    preds: &[Vec<NodeId>],
    state: &mut Vec<VisitState>,
    order: &mut Vec<NodeId>,
) -> Result<(), BuildError> {
    let idx = node.index();

    match state[idx] {
        VisitState::Visited => return Ok(()),
        VisitState::Visiting => {
            return Err(BuildError::CycleDetected {
                node: registry.node_name(node).to_string(),
            })
        }
        VisitState::None => state[idx] = VisitState::Visiting,
    }

    for &parent in &preds[idx] {
        visit(parent, registry, preds, state, order)?;
    }

    state[idx] = VisitState::Visited;
    order.push(node);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::types::{LinkKind, NodeKind};

    fn junction(reg: &mut Registry, name: &str) -> NodeId {
        reg.add_node(name, NodeKind::Junction).unwrap()
    }

    fn link(reg: &mut Registry, name: &str, from: &str, to: &str) {
        reg.add_link(name, LinkKind::Transfer, from, to, None).unwrap();
    }

    #[test]
    fn test_sort_diamond_network() {
        // Shape: A -> B, A -> C, B -> D, C -> D
        // Valid orders: A,B,C,D or A,C,B,D
        let mut reg = Registry::new();
        let a = junction(&mut reg, "A");
        let b = junction(&mut reg, "B");
        let c = junction(&mut reg, "C");
        let d = junction(&mut reg, "D");
        link(&mut reg, "ab", "A", "B");
        link(&mut reg, "ac", "A", "C");
        link(&mut reg, "bd", "B", "D");
        link(&mut reg, "cd", "C", "D");

        let res = sort(&reg).expect("sort failed");
        assert_eq!(res.len(), 4);

        let pos = |id: NodeId| res.iter().position(|&x| x == id).unwrap();
        assert!(pos(a) < pos(b));
        assert!(pos(a) < pos(c));
        assert!(pos(b) < pos(d));
        assert!(pos(c) < pos(d));
    }

    #[test]
    fn test_every_node_after_all_predecessors() {
        // Chain with a side branch: S -> J1 -> J2 -> O, S -> J2
        let mut reg = Registry::new();
        junction(&mut reg, "S");
        junction(&mut reg, "J1");
        junction(&mut reg, "J2");
        junction(&mut reg, "O");
        link(&mut reg, "a", "S", "J1");
        link(&mut reg, "b", "J1", "J2");
        link(&mut reg, "c", "S", "J2");
        link(&mut reg, "d", "J2", "O");

        let res = sort(&reg).unwrap();
        let pos = |name: &str| {
            let id = reg.node_id(name).unwrap();
            res.iter().position(|&x| x == id).unwrap()
        };
        for (from, to) in [("S", "J1"), ("J1", "J2"), ("S", "J2"), ("J2", "O")] {
            assert!(pos(from) < pos(to), "{from} must precede {to}");
        }
    }

    #[test]
    fn test_cycle_detection() {
        let mut reg = Registry::new();
        junction(&mut reg, "A");
        junction(&mut reg, "B");
        link(&mut reg, "ab", "A", "B");
        link(&mut reg, "ba", "B", "A");

        let err = sort(&reg).unwrap_err();
        assert!(matches!(err, BuildError::CycleDetected { .. }), "got {err:?}");
    }
}
