//! Network construction and validation.
//!
//! `NetworkBuilder` is the only way to obtain a `Network`. It accumulates
//! nodes, links, schedules and policies, then `build(horizon)` runs every
//! validation rule and freezes the topology. The result is immutable: per-run
//! mutable state lives in `engine::RunState`, so independent simulation runs
//! never share state accidentally.

use super::registry::Registry;
use super::topology;
use super::types::*;
use crate::error::BuildError;
use crate::schedule::Schedule;

/// Immutable, validated network topology.
#[derive(Debug, Clone)]
pub struct Network {
    registry: Registry,
    policies: Vec<Policy>,
    order: Vec<NodeId>,
    // CSR adjacency: flat link lists plus (start, count) ranges per node.
    out_flat: Vec<LinkId>,
    out_ranges: Vec<(u32, u32)>,
    in_flat: Vec<LinkId>,
    in_ranges: Vec<(u32, u32)>,
    horizon: usize,
}

impl Network {
    pub fn node_count(&self) -> usize {
        self.registry.node_count()
    }

    pub fn link_count(&self) -> usize {
        self.registry.link_count()
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    /// Evaluation order: every node appears after all of its predecessors.
    pub fn topological_order(&self) -> &[NodeId] {
        &self.order
    }

    pub fn out_links(&self, node: NodeId) -> &[LinkId] {
        let (start, count) = self.out_ranges[node.index()];
        &self.out_flat[start as usize..(start + count) as usize]
    }

    pub fn in_links(&self, node: NodeId) -> &[LinkId] {
        let (start, count) = self.in_ranges[node.index()];
        &self.in_flat[start as usize..(start + count) as usize]
    }

    pub fn node_kind(&self, node: NodeId) -> &NodeKind {
        &self.registry.node_kinds[node.index()]
    }

    pub fn link_kind(&self, link: LinkId) -> &LinkKind {
        &self.registry.link_kinds[link.index()]
    }

    pub fn policy(&self, node: NodeId) -> &Policy {
        &self.policies[node.index()]
    }

    pub fn inflow(&self, node: NodeId) -> Option<&Schedule> {
        self.registry.inflow[node.index()].as_ref()
    }

    pub fn demand(&self, node: NodeId) -> Option<&Schedule> {
        self.registry.demand[node.index()].as_ref()
    }

    pub fn capacity(&self, link: LinkId) -> Option<f64> {
        self.registry.capacity[link.index()]
    }

    pub fn link_source(&self, link: LinkId) -> NodeId {
        self.registry.link_from[link.index()]
    }

    pub fn link_target(&self, link: LinkId) -> NodeId {
        self.registry.link_to[link.index()]
    }

    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.registry.node_id(name)
    }

    pub fn link_id(&self, name: &str) -> Option<LinkId> {
        self.registry.link_id(name)
    }

    pub fn node_name(&self, node: NodeId) -> &str {
        self.registry.node_name(node)
    }

    pub fn link_name(&self, link: LinkId) -> &str {
        self.registry.link_name(link)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[derive(Debug, Clone, Default)]
pub struct NetworkBuilder {
    registry: Registry,
}

impl NetworkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_reservoir(
        &mut self,
        name: &str,
        min_storage: f64,
        max_storage: f64,
        initial_storage: f64,
    ) -> Result<NodeId, BuildError> {
        if !(0.0 <= min_storage
            && min_storage <= max_storage
            && (min_storage..=max_storage).contains(&initial_storage))
        {
            return Err(BuildError::InvalidStorageBounds {
                node: name.to_string(),
                min: min_storage,
                max: max_storage,
                initial: initial_storage,
            });
        }
        self.registry.add_node(
            name,
            NodeKind::Reservoir {
                min_storage,
                max_storage,
                initial_storage,
            },
        )
    }

    pub fn add_junction(&mut self, name: &str) -> Result<NodeId, BuildError> {
        self.registry.add_node(name, NodeKind::Junction)
    }

    pub fn add_farm(&mut self, name: &str) -> Result<NodeId, BuildError> {
        self.registry.add_node(name, NodeKind::Farm)
    }

    pub fn add_urban(&mut self, name: &str) -> Result<NodeId, BuildError> {
        self.registry.add_node(name, NodeKind::Urban)
    }

    pub fn add_outlet(&mut self, name: &str) -> Result<NodeId, BuildError> {
        self.registry.add_node(name, NodeKind::Outlet)
    }

    pub fn add_link(
        &mut self,
        name: &str,
        kind: LinkKind,
        from: &str,
        to: &str,
        capacity: Option<f64>,
    ) -> Result<LinkId, BuildError> {
        self.registry.add_link(name, kind, from, to, capacity)
    }

    pub fn set_inflow(&mut self, node: &str, schedule: Schedule) -> Result<(), BuildError> {
        let id = self.lookup(node)?;
        self.registry.inflow[id.index()] = Some(schedule);
        Ok(())
    }

    pub fn set_demand(&mut self, node: &str, schedule: Schedule) -> Result<(), BuildError> {
        let id = self.lookup(node)?;
        self.registry.demand[id.index()] = Some(schedule);
        Ok(())
    }

    pub fn set_policy(&mut self, node: &str, policy: Policy) -> Result<(), BuildError> {
        let id = self.lookup(node)?;
        self.registry.policies[id.index()] = Some(policy);
        Ok(())
    }

    pub fn link_id(&self, name: &str) -> Option<LinkId> {
        self.registry.link_id(name)
    }

    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.registry.node_id(name)
    }

    /// Validates the assembled network against `horizon` timesteps and
    /// freezes it. The checks run in dependency order: policies and schedules
    /// per node first, then structural degree rules, then the cycle check.
    pub fn build(self, horizon: usize) -> Result<Network, BuildError> {
        let registry = self.registry;

        let (out_flat, out_ranges) = adjacency(&registry, &registry.link_from);
        let (in_flat, in_ranges) = adjacency(&registry, &registry.link_to);

        let mut policies = Vec::with_capacity(registry.node_count());
        for i in 0..registry.node_count() {
            let id = NodeId::new(i);
            let policy = rule_policy(&registry, id)?;
            rule_policy_links(&registry, id, &policy, horizon)?;
            rule_unrouted_links(&registry, id, &policy, &out_flat, &out_ranges)?;
            rule_schedules(&registry, id, horizon)?;
            policies.push(policy);
        }

        for i in 0..registry.node_count() {
            rule_degrees(&registry, NodeId::new(i), &policies[i], &in_ranges)?;
        }

        let order = topology::sort(&registry)?;

        Ok(Network {
            registry,
            policies,
            order,
            out_flat,
            out_ranges,
            in_flat,
            in_ranges,
            horizon,
        })
    }

    fn lookup(&self, name: &str) -> Result<NodeId, BuildError> {
        self.registry
            .node_id(name)
            .ok_or_else(|| BuildError::UnknownEntity { name: name.to_string() })
    }
}

/// Builds a CSR adjacency (flat link list + per-node ranges) keyed by the
/// given endpoint column.
fn adjacency(registry: &Registry, endpoint: &[NodeId]) -> (Vec<LinkId>, Vec<(u32, u32)>) {
    let node_count = registry.node_count();
    let mut per_node: Vec<Vec<LinkId>> = vec![Vec::new(); node_count];
    for (i, end) in endpoint.iter().enumerate() {
        per_node[end.index()].push(LinkId::new(i));
    }

    let mut flat = Vec::with_capacity(registry.link_count());
    let mut ranges = Vec::with_capacity(node_count);
    for links in per_node {
        let start = flat.len() as u32;
        let count = links.len() as u32;
        flat.extend(links);
        ranges.push((start, count));
    }
    (flat, ranges)
}

// --- Validation rules ---
// Each rule is local to one node, in the style of a linter pass: the build
// orchestrator applies them node by node and stops at the first failure.

/// Every node needs a policy matching its kind. Outlets default to Terminal.
fn rule_policy(registry: &Registry, id: NodeId) -> Result<Policy, BuildError> {
    let name = registry.node_name(id);
    let kind = &registry.node_kinds[id.index()];
    let policy = match &registry.policies[id.index()] {
        Some(p) => p.clone(),
        None if kind.is_terminal() => Policy::Terminal,
        None => return Err(BuildError::MissingPolicy { node: name.to_string() }),
    };

    let expected = match (kind, &policy) {
        (NodeKind::Reservoir { .. }, Policy::Release { .. }) => None,
        (NodeKind::Reservoir { .. }, _) => Some("Release"),
        (NodeKind::Farm | NodeKind::Urban, Policy::Consume { .. }) => None,
        (NodeKind::Farm | NodeKind::Urban, _) => Some("Consume"),
        (NodeKind::Outlet, Policy::Terminal) => None,
        (NodeKind::Outlet, _) => Some("Terminal"),
        (NodeKind::Junction, Policy::Release { .. } | Policy::Consume { .. } | Policy::Terminal) => {
            Some("Proportional, DemandCap or Transfer")
        }
        (NodeKind::Junction, _) => None,
    };

    match expected {
        Some(expected) => Err(BuildError::PolicyKindMismatch {
            node: name.to_string(),
            expected,
        }),
        None => Ok(policy),
    }
}

/// Every link a policy routes onto must actually leave its node, and the
/// policy's own parameters must be well-formed for the full horizon.
fn rule_policy_links(
    registry: &Registry,
    id: NodeId,
    policy: &Policy,
    horizon: usize,
) -> Result<(), BuildError> {
    let name = registry.node_name(id);

    let links = policy.links();
    for (i, &link) in links.iter().enumerate() {
        if registry.link_from[link.index()] != id {
            return Err(BuildError::PolicyLinkMismatch {
                node: name.to_string(),
                link: registry.link_name(link).to_string(),
            });
        }
        // A policy routing onto the same link twice would make the link flow
        // ambiguous against the node's allocation entries.
        if links[..i].contains(&link) {
            return Err(BuildError::DuplicateAllocationLink {
                node: name.to_string(),
                link: registry.link_name(link).to_string(),
            });
        }
    }

    match policy {
        Policy::Proportional { shares, .. } => {
            for (link, schedule) in shares {
                if schedule.len() != horizon {
                    return Err(BuildError::ScheduleLengthMismatch {
                        entity: registry.link_name(*link).to_string(),
                        kind: "share",
                        expected: horizon,
                        actual: schedule.len(),
                    });
                }
            }
            // Shares are percentages in [0, 100] summing to at most 100 at
            // every timestep. Checked here once so the hot loop can trust it.
            for t in 0..horizon {
                let mut total = 0.0;
                for (_, schedule) in shares {
                    // Lengths were checked above, the index is in range.
                    let pct = schedule.get(t).unwrap_or(0.0);
                    if !(0.0..=100.0).contains(&pct) {
                        return Err(BuildError::InvalidShare {
                            node: name.to_string(),
                            value: pct,
                            reason: "share outside [0, 100]",
                        });
                    }
                    total += pct;
                }
                if total > 100.0 + 1e-9 {
                    return Err(BuildError::InvalidShare {
                        node: name.to_string(),
                        value: total,
                        reason: "shares sum to more than 100",
                    });
                }
            }
        }
        Policy::DemandCap { max_share, .. } => {
            if !(0.0..=1.0).contains(max_share) {
                return Err(BuildError::InvalidShare {
                    node: name.to_string(),
                    value: *max_share,
                    reason: "max_share outside [0, 1]",
                });
            }
        }
        Policy::Release { target, .. } => {
            if target.len() != horizon {
                return Err(BuildError::ScheduleLengthMismatch {
                    entity: name.to_string(),
                    kind: "target_release",
                    expected: horizon,
                    actual: target.len(),
                });
            }
        }
        _ => {}
    }
    Ok(())
}

/// A link that no policy ever writes onto would carry zero flow forever,
/// which is a configuration mistake, not a valid topology.
fn rule_unrouted_links(
    registry: &Registry,
    id: NodeId,
    policy: &Policy,
    out_flat: &[LinkId],
    out_ranges: &[(u32, u32)],
) -> Result<(), BuildError> {
    let routed = policy.links();
    let (start, count) = out_ranges[id.index()];
    for &link in &out_flat[start as usize..(start + count) as usize] {
        if !routed.contains(&link) {
            return Err(BuildError::UnroutedLink {
                node: registry.node_name(id).to_string(),
                link: registry.link_name(link).to_string(),
            });
        }
    }
    Ok(())
}

/// Inflow and demand schedules must cover the horizon; demand nodes must
/// have a demand schedule at all.
fn rule_schedules(registry: &Registry, id: NodeId, horizon: usize) -> Result<(), BuildError> {
    let name = registry.node_name(id);
    let idx = id.index();

    if let Some(inflow) = &registry.inflow[idx] {
        if inflow.len() != horizon {
            return Err(BuildError::ScheduleLengthMismatch {
                entity: name.to_string(),
                kind: "inflow",
                expected: horizon,
                actual: inflow.len(),
            });
        }
    }

    if registry.node_kinds[idx].has_demand() {
        match &registry.demand[idx] {
            None => {
                return Err(BuildError::MissingSchedule {
                    node: name.to_string(),
                    kind: "demand",
                })
            }
            Some(demand) if demand.len() != horizon => {
                return Err(BuildError::ScheduleLengthMismatch {
                    entity: name.to_string(),
                    kind: "demand",
                    expected: horizon,
                    actual: demand.len(),
                });
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Structural degree rules: every node is either fed (an incoming link or an
/// exogenous inflow) and either drains somewhere or terminates the system.
fn rule_degrees(
    registry: &Registry,
    id: NodeId,
    policy: &Policy,
    in_ranges: &[(u32, u32)],
) -> Result<(), BuildError> {
    let name = registry.node_name(id);
    let idx = id.index();

    let has_incoming = in_ranges[idx].1 > 0;
    if !has_incoming && registry.inflow[idx].is_none() {
        return Err(BuildError::UnreachableNode { node: name.to_string() });
    }

    let terminates = matches!(policy, Policy::Terminal | Policy::Consume { .. });
    if policy.links().is_empty() && !terminates {
        return Err(BuildError::DeadEndNode { node: name.to_string() });
    }
    Ok(())
}
