// SPDX-License-Identifier: MIT OR Apache-2.0
//! Link (edge) definitions for the graph.
//!
//! A link is stored twice, once on each endpoint, as a pair of half-edges.
//! Half-edges reference their peer by [`NodeId`] only.

use crate::node::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which end of a link a half-edge describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkDirection {
    /// Stored on the source node; `slot` is an output slot
    Outbound,
    /// Stored on the destination node; `slot` is an input slot
    Inbound,
}

/// One endpoint's local record of a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HalfEdge {
    /// Direction relative to the owning node
    pub direction: LinkDirection,
    /// Slot on the owning node
    pub slot: u8,
    /// Node at the other end
    pub peer: NodeId,
    /// Slot on the peer
    pub peer_slot: u8,
}

impl HalfEdge {
    /// Rebuild the full link from the half-edge stored on `owner`
    pub fn to_link(&self, owner: NodeId) -> Link {
        match self.direction {
            LinkDirection::Outbound => Link::new(owner, self.slot, self.peer, self.peer_slot),
            LinkDirection::Inbound => Link::new(self.peer, self.peer_slot, owner, self.slot),
        }
    }
}

/// A directed link from an output slot to an input slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Link {
    /// Source node
    pub from_node: NodeId,
    /// Output slot on the source node
    pub from_slot: u8,
    /// Destination node
    pub to_node: NodeId,
    /// Input slot on the destination node
    pub to_slot: u8,
}

impl Link {
    /// Create a new link
    pub fn new(from_node: NodeId, from_slot: u8, to_node: NodeId, to_slot: u8) -> Self {
        Self {
            from_node,
            from_slot,
            to_node,
            to_slot,
        }
    }

    /// Check if this link involves a specific node
    pub fn involves_node(&self, node_id: NodeId) -> bool {
        self.from_node == node_id || self.to_node == node_id
    }

    /// Half-edge stored on the source node
    pub fn outbound_half(&self) -> HalfEdge {
        HalfEdge {
            direction: LinkDirection::Outbound,
            slot: self.from_slot,
            peer: self.to_node,
            peer_slot: self.to_slot,
        }
    }

    /// Half-edge stored on the destination node
    pub fn inbound_half(&self) -> HalfEdge {
        HalfEdge {
            direction: LinkDirection::Inbound,
            slot: self.to_slot,
            peer: self.from_node,
            peer_slot: self.from_slot,
        }
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} -> {}.{}",
            self.from_node, self.from_slot, self.to_node, self.to_slot
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_halves_rebuild_link() {
        let link = Link::new(NodeId(0), 0, NodeId(3), 1);
        assert_eq!(link.outbound_half().to_link(NodeId(0)), link);
        assert_eq!(link.inbound_half().to_link(NodeId(3)), link);
        assert!(link.involves_node(NodeId(3)));
        assert!(!link.involves_node(NodeId(1)));
    }
}
