//! Identifier and variant types for the water network.

use crate::schedule::Schedule;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline(always)]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
    pub fn new(idx: usize) -> Self {
        Self(idx as u32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct LinkId(pub u32);

impl LinkId {
    #[inline(always)]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
    pub fn new(idx: usize) -> Self {
        Self(idx as u32)
    }
}

/// The variant of a node. Storage bounds live on the variant itself so a
/// junction can never accidentally carry reservoir state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    Reservoir {
        min_storage: f64,
        max_storage: f64,
        initial_storage: f64,
    },
    Junction,
    Farm,
    Urban,
    Outlet,
}

impl NodeKind {
    /// Farms and urban offtakes both consume against a demand schedule.
    pub fn has_demand(&self) -> bool {
        matches!(self, NodeKind::Farm | NodeKind::Urban)
    }

    pub fn has_storage(&self) -> bool {
        matches!(self, NodeKind::Reservoir { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeKind::Outlet)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkKind {
    /// Lossless conveyance between two nodes.
    Transfer,
    /// Capacity-constrained conveyance to a demand node.
    Pipeline,
    /// Natural channel; typically carries a reservoir release.
    River,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMetadata {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkMetadata {
    pub name: String,
}

/// What happens to the share of inflow a proportional split leaves
/// unassigned. There is no implicit default: the caller must choose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RemainderRule {
    /// The remainder leaves the balance as recorded spill at the node.
    Unallocated,
    /// The remainder is routed onto a designated link.
    ToLink(LinkId),
}

/// What happens when a transfer exceeds its link capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverflowRule {
    /// Excess above capacity is recorded as spill at the node.
    Spill,
    /// Excess above capacity aborts the run.
    Error,
}

/// The allocation rule attached to a node. Evaluated exactly once per node
/// per timestep, after the node's inflow is finalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Policy {
    /// Split the inflow across outgoing links by per-timestep percentage
    /// shares. Shares are in [0, 100] and sum to at most 100 per timestep.
    Proportional {
        shares: Vec<(LinkId, Schedule)>,
        remainder: RemainderRule,
    },
    /// `min(max_share * inflow, demand)` onto the offtake, the rest onto the
    /// bypass. Chaining these along a channel gives upstream offtakes
    /// priority; downstream ones see only what upstream left unused.
    DemandCap {
        offtake: LinkId,
        bypass: LinkId,
        /// Fraction of the available inflow the offtake may claim, in [0, 1].
        max_share: f64,
    },
    /// Route the full inflow onto a single link, bounded by its capacity.
    Transfer {
        link: LinkId,
        overflow: OverflowRule,
    },
    /// Reservoir release: `min(target[t], storage + inflow - min_storage)`,
    /// with forced spill above `max_storage` regardless of target.
    Release { link: LinkId, target: Schedule },
    /// Demand node: consume `min(inflow, demand[t])`; inflow above demand
    /// goes to the excess link if one is configured, otherwise it is spill.
    Consume { excess: Option<LinkId> },
    /// Outlet: the full inflow leaves the system.
    Terminal,
}

impl Policy {
    /// The links this policy may write allocations onto.
    pub fn links(&self) -> Vec<LinkId> {
        match self {
            Policy::Proportional { shares, remainder } => {
                let mut out: Vec<LinkId> = shares.iter().map(|(l, _)| *l).collect();
                if let RemainderRule::ToLink(l) = remainder {
                    out.push(*l);
                }
                out
            }
            Policy::DemandCap { offtake, bypass, .. } => vec![*offtake, *bypass],
            Policy::Transfer { link, .. } => vec![*link],
            Policy::Release { link, .. } => vec![*link],
            Policy::Consume { excess } => excess.iter().copied().collect(),
            Policy::Terminal => Vec::new(),
        }
    }
}
