// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph data structure containing nodes and links.
//!
//! Nodes live in a growable array and are addressed by their index. Links
//! are stored as half-edges on both endpoints, which keeps neighbour
//! enumeration proportional to the local degree.

use crate::catalog::{tags_compatible, Catalog, NodeType, PropertyKind, TypeId};
use crate::connection::{HalfEdge, Link, LinkDirection};
use crate::node::{Node, NodeId, PropertyValue};
use crate::sort;
use std::sync::Arc;

/// Maximum number of nodes in one graph
pub const MAX_NODES: usize = 1 << 16;

/// A node graph built against a catalog
#[derive(Debug, Clone, PartialEq)]
pub struct Graph {
    catalog: Arc<Catalog>,
    nodes: Vec<Node>,
    /// Back-to-front drawing order
    presentation_order: Vec<NodeId>,
    /// View offset of the editor canvas
    scroll: [f32; 2],
}

impl Graph {
    /// Create a new empty graph
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            nodes: Vec::new(),
            presentation_order: Vec::new(),
            scroll: [0.0, 0.0],
        }
    }

    /// The catalog this graph is validated against
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Type definition of a node
    pub fn node_type(&self, node_id: NodeId) -> Option<&NodeType> {
        self.node(node_id).and_then(|n| self.catalog.get(n.type_id))
    }

    /// Add a node at the origin
    pub fn add_node(&mut self, type_id: TypeId) -> Result<NodeId, GraphError> {
        self.add_node_at(type_id, [0.0, 0.0])
    }

    /// Add a node at a canvas position
    pub fn add_node_at(&mut self, type_id: TypeId, position: [f32; 2]) -> Result<NodeId, GraphError> {
        check_finite("position", &position)?;
        let node_type = self
            .catalog
            .get(type_id)
            .ok_or(GraphError::UnknownType(type_id))?;
        if self.nodes.len() >= MAX_NODES {
            return Err(GraphError::TooManyNodes);
        }

        let id = NodeId(self.nodes.len() as u32);
        let node = Node::new(type_id, node_type).with_position(position[0], position[1]);
        self.nodes.push(node);
        self.presentation_order.push(id);
        tracing::debug!("Added node {} ({})", id, node_type.name);
        Ok(id)
    }

    /// Remove a node and every link touching it.
    ///
    /// The last node is moved into the freed position and takes over its id;
    /// every half-edge that referenced the old last id is rewritten.
    pub fn remove_node(&mut self, node_id: NodeId) -> Result<Node, GraphError> {
        let index = node_id.index();
        if index >= self.nodes.len() {
            return Err(GraphError::NodeNotFound(node_id));
        }

        // Drop the opposite half of every link from the neighbours
        let edges = std::mem::take(&mut self.nodes[index].links);
        for edge in &edges {
            let peer = &mut self.nodes[edge.peer.index()].links;
            if let Some(pos) = peer.iter().rposition(|h| is_opposite(h, edge, node_id)) {
                peer.remove(pos);
            }
        }

        let last = NodeId((self.nodes.len() - 1) as u32);
        let removed = self.nodes.swap_remove(index);
        self.presentation_order.retain(|&id| id != node_id);

        if last != node_id {
            let peers: Vec<NodeId> = self.nodes[index].links.iter().map(|h| h.peer).collect();
            for peer in peers {
                for half in self.nodes[peer.index()].links.iter_mut() {
                    if half.peer == last {
                        half.peer = node_id;
                    }
                }
            }
            for id in self.presentation_order.iter_mut() {
                if *id == last {
                    *id = node_id;
                }
            }
        }

        tracing::debug!(
            "Removed node {} ({} links), node {} renumbered to {}",
            node_id,
            edges.len(),
            last,
            node_id
        );
        Ok(removed)
    }

    /// Remove every node
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.presentation_order.clear();
    }

    /// View offset of the editor canvas
    pub fn scroll(&self) -> [f32; 2] {
        self.scroll
    }

    /// Move the canvas view
    pub fn set_scroll(&mut self, scroll: [f32; 2]) -> Result<(), GraphError> {
        check_finite("scroll", &scroll)?;
        self.scroll = scroll;
        Ok(())
    }

    /// Get a node by ID
    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(node_id.index())
    }

    /// Move a node on the canvas
    pub fn set_position(&mut self, node_id: NodeId, position: [f32; 2]) -> Result<(), GraphError> {
        check_finite("position", &position)?;
        let node = self
            .nodes
            .get_mut(node_id.index())
            .ok_or(GraphError::NodeNotFound(node_id))?;
        node.position = position;
        Ok(())
    }

    /// Get all nodes
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Get all nodes with their IDs
    pub fn nodes_with_ids(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeId(i as u32), n))
    }

    /// Get all node IDs
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Add a link from an output slot to an input slot.
    ///
    /// Acyclicity is not checked here; see [`Graph::link_checked`].
    pub fn link(
        &mut self,
        from_node: NodeId,
        from_slot: u8,
        to_node: NodeId,
        to_slot: u8,
    ) -> Result<Link, LinkError> {
        let source = self
            .node_type(from_node)
            .ok_or(LinkError::NodeNotFound(from_node))?;
        let target = self
            .node_type(to_node)
            .ok_or(LinkError::NodeNotFound(to_node))?;

        if from_node == to_node {
            return Err(LinkError::SelfLoop);
        }

        let output = source
            .outputs
            .get(from_slot as usize)
            .ok_or(LinkError::OutputNotFound { node: from_node, slot: from_slot })?;
        let input = target
            .inputs
            .get(to_slot as usize)
            .ok_or(LinkError::InputNotFound { node: to_node, slot: to_slot })?;

        if !tags_compatible(output.tag.as_ref(), input.tag.as_ref()) {
            return Err(LinkError::IncompatibleTags {
                output: output.tag.as_ref().map(|t| t.0.clone()).unwrap_or_default(),
                input: input.tag.as_ref().map(|t| t.0.clone()).unwrap_or_default(),
            });
        }

        if self.nodes[to_node.index()].is_driven(to_slot) {
            return Err(LinkError::InputAlreadyDriven { node: to_node, slot: to_slot });
        }

        let link = Link::new(from_node, from_slot, to_node, to_slot);
        self.nodes[from_node.index()].links.push(link.outbound_half());
        self.nodes[to_node.index()].links.push(link.inbound_half());
        tracing::debug!("Linked {}", link);
        Ok(link)
    }

    /// Add a link, rolling it back if it would close a cycle.
    pub fn link_checked(
        &mut self,
        from_node: NodeId,
        from_slot: u8,
        to_node: NodeId,
        to_slot: u8,
    ) -> Result<Link, LinkError> {
        let link = self.link(from_node, from_slot, to_node, to_slot)?;
        if !sort::is_acyclic(self) {
            self.unlink(link);
            tracing::warn!("Rejected link {}: would create a cycle", link);
            return Err(LinkError::Cycle);
        }
        Ok(link)
    }

    /// Remove a link. Returns `false` if it did not exist.
    pub fn unlink(&mut self, link: Link) -> bool {
        let (Some(_), Some(_)) = (self.node(link.from_node), self.node(link.to_node)) else {
            return false;
        };

        let inbound = link.inbound_half();
        let outbound = link.outbound_half();
        let to_links = &self.nodes[link.to_node.index()].links;
        let Some(in_pos) = to_links.iter().rposition(|h| *h == inbound) else {
            return false;
        };
        let from_links = &self.nodes[link.from_node.index()].links;
        let Some(out_pos) = from_links.iter().rposition(|h| *h == outbound) else {
            return false;
        };

        self.nodes[link.to_node.index()].links.remove(in_pos);
        self.nodes[link.from_node.index()].links.remove(out_pos);
        tracing::debug!("Unlinked {}", link);
        true
    }

    /// Remove whatever link drives an input slot
    pub fn unlink_input(&mut self, node_id: NodeId, slot: u8) -> Option<Link> {
        let link = self.node(node_id)?.driver(slot)?.to_link(node_id);
        self.unlink(link).then_some(link)
    }

    /// Get all links, each reported once
    pub fn links(&self) -> impl Iterator<Item = Link> + '_ {
        self.nodes_with_ids()
            .flat_map(|(id, node)| node.outbound().map(move |h| h.to_link(id)))
    }

    /// Get the number of links
    pub fn link_count(&self) -> usize {
        self.nodes.iter().map(|n| n.outbound().count()).sum()
    }

    /// Whether an input slot is driven by a link
    pub fn is_input_driven(&self, node_id: NodeId, slot: u8) -> bool {
        self.node(node_id).is_some_and(|n| n.is_driven(slot))
    }

    /// Set the constant value of an input slot that is not driven by a link
    pub fn set_constant(&mut self, node_id: NodeId, slot: u8, value: f32) -> Result<(), GraphError> {
        let node = self
            .nodes
            .get_mut(node_id.index())
            .ok_or(GraphError::NodeNotFound(node_id))?;
        if slot as usize >= node.constants.len() {
            return Err(GraphError::InputNotFound { node: node_id, slot });
        }
        if node.is_driven(slot) {
            return Err(GraphError::SlotDriven { node: node_id, slot });
        }
        check_finite("constant", &[value])?;
        node.constants[slot as usize] = value;
        Ok(())
    }

    /// Set a property value, checked against the declared kind
    pub fn set_property(
        &mut self,
        node_id: NodeId,
        index: u8,
        value: PropertyValue,
    ) -> Result<(), GraphError> {
        let node_type = self
            .node_type(node_id)
            .ok_or(GraphError::NodeNotFound(node_id))?;
        let info = node_type
            .properties
            .get(index as usize)
            .ok_or(GraphError::PropertyNotFound { node: node_id, index })?;

        if !value.matches_kind(info.kind) {
            return Err(GraphError::PropertyKindMismatch {
                name: info.name.clone(),
                expected: info.kind.name(),
            });
        }
        match (info.kind, &value) {
            (PropertyKind::Enum(e), PropertyValue::Enum(v)) => {
                let count = self.catalog.enum_info(e).map_or(0, |e| e.values.len());
                if *v < 0 || *v as usize >= count {
                    return Err(GraphError::EnumOutOfRange { name: info.name.clone(), value: *v });
                }
            }
            (_, PropertyValue::Float(v)) => check_finite("property", &[*v])?,
            _ => {}
        }

        self.nodes[node_id.index()].properties[index as usize] = value;
        Ok(())
    }

    /// Back-to-front drawing order
    pub fn presentation_order(&self) -> &[NodeId] {
        &self.presentation_order
    }

    /// Replace the drawing order. `order` must list every node exactly once.
    pub fn set_presentation_order(&mut self, order: Vec<NodeId>) -> Result<(), GraphError> {
        let mut seen = vec![false; self.nodes.len()];
        for id in &order {
            match seen.get_mut(id.index()) {
                Some(flag) if !*flag => *flag = true,
                _ => return Err(GraphError::InvalidPresentationOrder),
            }
        }
        if order.len() != self.nodes.len() {
            return Err(GraphError::InvalidPresentationOrder);
        }
        self.presentation_order = order;
        Ok(())
    }

    /// Draw a node on top of the others
    pub fn bring_to_front(&mut self, node_id: NodeId) -> Result<(), GraphError> {
        let pos = self
            .presentation_order
            .iter()
            .position(|&id| id == node_id)
            .ok_or(GraphError::NodeNotFound(node_id))?;
        let id = self.presentation_order.remove(pos);
        self.presentation_order.push(id);
        Ok(())
    }

    /// Get nodes in topological order (for evaluation)
    pub fn topological_order(&self) -> Result<Vec<NodeId>, sort::CycleError> {
        sort::topological_order(self)
    }
}

fn check_finite(what: &'static str, values: &[f32]) -> Result<(), GraphError> {
    match values.iter().find(|v| !v.is_finite()) {
        Some(&value) => Err(GraphError::NonFinite { what, value }),
        None => Ok(()),
    }
}

fn is_opposite(candidate: &HalfEdge, edge: &HalfEdge, owner: NodeId) -> bool {
    let direction = match edge.direction {
        LinkDirection::Outbound => LinkDirection::Inbound,
        LinkDirection::Inbound => LinkDirection::Outbound,
    };
    candidate.direction == direction
        && candidate.peer == owner
        && candidate.slot == edge.peer_slot
        && candidate.peer_slot == edge.slot
}

/// Error editing graph nodes
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    /// Type id not in the catalog
    #[error("Unknown node type: {0}")]
    UnknownType(TypeId),

    /// Node not found
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// Input slot index out of range
    #[error("Node {node} has no input slot {slot}")]
    InputNotFound {
        /// Node
        node: NodeId,
        /// Requested slot
        slot: u8,
    },

    /// Property index out of range
    #[error("Node {node} has no property {index}")]
    PropertyNotFound {
        /// Node
        node: NodeId,
        /// Requested property
        index: u8,
    },

    /// Constant edit on a linked input
    #[error("Input {slot} of node {node} is driven by a link")]
    SlotDriven {
        /// Node
        node: NodeId,
        /// Driven slot
        slot: u8,
    },

    /// Property value of the wrong kind
    #[error("Property '{name}' expects a value of kind {expected}")]
    PropertyKindMismatch {
        /// Property name
        name: String,
        /// Declared kind
        expected: &'static str,
    },

    /// Enum value past the end of the enum table entry
    #[error("Property '{name}' has no enum value {value}")]
    EnumOutOfRange {
        /// Property name
        name: String,
        /// Rejected value
        value: i32,
    },

    /// Node array is full
    #[error("Graph is full ({MAX_NODES} nodes)")]
    TooManyNodes,

    /// Infinite or NaN value for a stored float
    #[error("Non-finite {what} value {value}")]
    NonFinite {
        /// What was being set
        what: &'static str,
        /// Rejected value
        value: f32,
    },

    /// Drawing order is not a permutation of the node ids
    #[error("Presentation order must list every node once")]
    InvalidPresentationOrder,
}

/// Error when creating a link
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LinkError {
    /// Node not found
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// Output slot index out of range
    #[error("Node {node} has no output slot {slot}")]
    OutputNotFound {
        /// Node
        node: NodeId,
        /// Requested slot
        slot: u8,
    },

    /// Input slot index out of range
    #[error("Node {node} has no input slot {slot}")]
    InputNotFound {
        /// Node
        node: NodeId,
        /// Requested slot
        slot: u8,
    },

    /// Both slots are typed and the tags differ
    #[error("Incompatible slot types: {output} -> {input}")]
    IncompatibleTags {
        /// Output slot tag
        output: String,
        /// Input slot tag
        input: String,
    },

    /// Input slot already has an inbound link
    #[error("Input {slot} of node {node} is already linked")]
    InputAlreadyDriven {
        /// Node
        node: NodeId,
        /// Driven slot
        slot: u8,
    },

    /// Self-loop not allowed
    #[error("Self-loop not allowed")]
    SelfLoop,

    /// Link would close a cycle
    #[error("Link would create a cycle")]
    Cycle,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> Graph {
        Graph::new(Arc::new(Catalog::builtin()))
    }

    fn sum(graph: &Graph) -> TypeId {
        graph.catalog().resolve("sum").unwrap()
    }

    #[test]
    fn test_add_node_allocates_slots() {
        let mut g = graph();
        let id = g.add_node_at(sum(&g), [40.0, 10.0]).unwrap();
        assert_eq!(id, NodeId(0));
        let node = g.node(id).unwrap();
        assert_eq!(node.constants(), &[0.0, 0.0]);
        assert_eq!(node.position, [40.0, 10.0]);
        assert_eq!(g.add_node(TypeId(99)), Err(GraphError::UnknownType(TypeId(99))));
    }

    #[test]
    fn test_link_rejects_second_inbound() {
        let mut g = graph();
        let t = sum(&g);
        let a = g.add_node(t).unwrap();
        let b = g.add_node(t).unwrap();
        let c = g.add_node(t).unwrap();

        g.link(a, 0, c, 0).unwrap();
        assert_eq!(
            g.link(b, 0, c, 0),
            Err(LinkError::InputAlreadyDriven { node: c, slot: 0 })
        );
        // Fan-out is allowed
        g.link(a, 0, b, 1).unwrap();
        assert_eq!(g.link_count(), 2);
        assert_eq!(g.node(a).unwrap().outbound().count(), 2);
    }

    #[test]
    fn test_link_rejects_bad_slots_and_self_loops() {
        let mut g = graph();
        let t = sum(&g);
        let a = g.add_node(t).unwrap();
        let b = g.add_node(t).unwrap();
        assert_eq!(g.link(a, 1, b, 0), Err(LinkError::OutputNotFound { node: a, slot: 1 }));
        assert_eq!(g.link(a, 0, b, 2), Err(LinkError::InputNotFound { node: b, slot: 2 }));
        assert_eq!(g.link(a, 0, a, 0), Err(LinkError::SelfLoop));
        assert_eq!(g.link(a, 0, NodeId(7), 0), Err(LinkError::NodeNotFound(NodeId(7))));
        assert_eq!(g.link_count(), 0);
    }

    #[test]
    fn test_link_checks_type_tags() {
        let catalog = Catalog::from_json(
            r#"{
                "nodes": {
                    "flag": { "outputs": { "out": "bool" } },
                    "sum": { "inputs": { "in": "float" }, "outputs": { "out": "float" } },
                    "any": { "inputs": { "in": "" } }
                }
            }"#,
        )
        .unwrap();
        let mut g = Graph::new(Arc::new(catalog));
        let flag = g.add_node(TypeId(0)).unwrap();
        let sum = g.add_node(TypeId(1)).unwrap();
        let any = g.add_node(TypeId(2)).unwrap();

        assert!(matches!(g.link(flag, 0, sum, 0), Err(LinkError::IncompatibleTags { .. })));
        g.link(flag, 0, any, 0).unwrap();
    }

    #[test]
    fn test_cycle_rejected_without_mutation() {
        let mut g = graph();
        let t = sum(&g);
        let a = g.add_node(t).unwrap();
        let b = g.add_node(t).unwrap();
        g.link_checked(a, 0, b, 0).unwrap();

        let before = g.clone();
        assert_eq!(g.link_checked(b, 0, a, 0), Err(LinkError::Cycle));
        assert_eq!(g, before);
        assert_eq!(g.link_count(), 1);
    }

    #[test]
    fn test_unlink_is_idempotent() {
        let mut g = graph();
        let t = sum(&g);
        let a = g.add_node(t).unwrap();
        let b = g.add_node(t).unwrap();
        let link = g.link(a, 0, b, 1).unwrap();

        assert!(g.is_input_driven(b, 1));
        assert!(g.unlink(link));
        assert!(!g.unlink(link));
        assert!(!g.is_input_driven(b, 1));
        assert!(g.node(a).unwrap().links().is_empty());
        assert!(g.node(b).unwrap().links().is_empty());
    }

    #[test]
    fn test_unlink_input() {
        let mut g = graph();
        let t = sum(&g);
        let a = g.add_node(t).unwrap();
        let b = g.add_node(t).unwrap();
        let link = g.link(a, 0, b, 0).unwrap();
        assert_eq!(g.unlink_input(b, 1), None);
        assert_eq!(g.unlink_input(b, 0), Some(link));
        assert_eq!(g.link_count(), 0);
    }

    #[test]
    fn test_constant_edit_blocked_while_driven() {
        let mut g = graph();
        let t = sum(&g);
        let a = g.add_node(t).unwrap();
        let b = g.add_node(t).unwrap();
        g.set_constant(b, 0, 2.5).unwrap();
        let link = g.link(a, 0, b, 0).unwrap();
        assert_eq!(g.set_constant(b, 0, 1.0), Err(GraphError::SlotDriven { node: b, slot: 0 }));
        g.unlink(link);
        g.set_constant(b, 0, 1.0).unwrap();
        assert_eq!(g.node(b).unwrap().constant(0), Some(1.0));
        assert_eq!(g.set_constant(b, 5, 1.0), Err(GraphError::InputNotFound { node: b, slot: 5 }));
    }

    #[test]
    fn test_set_property_checks_kind_and_enum_range() {
        let mut g = graph();
        let play = g.catalog().resolve("play_anim").unwrap();
        let n = g.add_node(play).unwrap();

        g.set_property(n, 0, PropertyValue::Enum(1)).unwrap();
        assert_eq!(g.node(n).unwrap().property(0), Some(&PropertyValue::Enum(1)));
        assert!(matches!(
            g.set_property(n, 0, PropertyValue::Enum(2)),
            Err(GraphError::EnumOutOfRange { .. })
        ));
        assert!(matches!(
            g.set_property(n, 0, PropertyValue::Float(1.0)),
            Err(GraphError::PropertyKindMismatch { .. })
        ));
        assert!(matches!(
            g.set_property(n, 1, PropertyValue::Enum(0)),
            Err(GraphError::PropertyNotFound { .. })
        ));
    }

    #[test]
    fn test_delete_removes_neighbour_half_edges() {
        // sum(A), sum(B), A.out -> B.in0; delete A
        let mut g = graph();
        let t = sum(&g);
        let a = g.add_node(t).unwrap();
        let b = g.add_node(t).unwrap();
        g.link(a, 0, b, 0).unwrap();

        g.remove_node(a).unwrap();
        assert_eq!(g.node_count(), 1);
        // B moved into slot 0
        let b = NodeId(0);
        assert!(!g.is_input_driven(b, 0));
        assert!(g.node(b).unwrap().links().is_empty());
        assert_eq!(g.link_count(), 0);
    }

    #[test]
    fn test_delete_renumbers_moved_node_links() {
        let mut g = graph();
        let t = sum(&g);
        let a = g.add_node(t).unwrap();
        let b = g.add_node(t).unwrap();
        let c = g.add_node(t).unwrap();
        let d = g.add_node(t).unwrap();
        g.link(b, 0, d, 0).unwrap();
        g.link(d, 0, c, 1).unwrap();
        g.set_constant(d, 1, 4.0).unwrap();

        // d (id 3) moves into id 0
        g.remove_node(a).unwrap();
        let d = NodeId(0);
        let mut links: Vec<Link> = g.links().collect();
        links.sort();
        assert_eq!(
            links,
            vec![Link::new(d, 0, c, 1), Link::new(b, 0, d, 0)]
        );
        assert_eq!(g.node(d).unwrap().constant(1), Some(4.0));
        assert_eq!(g.presentation_order(), &[b, c, d]);
    }

    #[test]
    fn test_delete_last_node() {
        let mut g = graph();
        let t = sum(&g);
        let a = g.add_node(t).unwrap();
        let b = g.add_node(t).unwrap();
        g.link(a, 0, b, 1).unwrap();
        g.remove_node(b).unwrap();
        assert!(g.node(a).unwrap().links().is_empty());
        assert_eq!(g.remove_node(b), Err(GraphError::NodeNotFound(b)));
    }

    #[test]
    fn test_non_finite_values_rejected() {
        let mut g = graph();
        let t = sum(&g);
        assert!(matches!(
            g.add_node_at(t, [f32::NAN, 0.0]),
            Err(GraphError::NonFinite { what: "position", .. })
        ));
        assert!(g.is_empty());

        let n = g.add_node(t).unwrap();
        assert!(matches!(
            g.set_constant(n, 0, f32::INFINITY),
            Err(GraphError::NonFinite { what: "constant", .. })
        ));
        assert!(matches!(
            g.set_position(n, [0.0, f32::NEG_INFINITY]),
            Err(GraphError::NonFinite { what: "position", .. })
        ));
        assert!(matches!(
            g.set_scroll([f32::NAN, 1.0]),
            Err(GraphError::NonFinite { what: "scroll", .. })
        ));
        assert_eq!(g.node(n).unwrap().constant(0), Some(0.0));
        assert_eq!(g.node(n).unwrap().position, [0.0, 0.0]);
        assert_eq!(g.scroll(), [0.0, 0.0]);

        let catalog = Catalog::from_json(r#"{ "nodes": { "gain": { "properties": { "level": "float" } } } }"#).unwrap();
        let mut g = Graph::new(Arc::new(catalog));
        let n = g.add_node(TypeId(0)).unwrap();
        assert!(matches!(
            g.set_property(n, 0, PropertyValue::Float(f32::NAN)),
            Err(GraphError::NonFinite { what: "property", .. })
        ));
        g.set_property(n, 0, PropertyValue::Float(-2.5)).unwrap();
    }

    #[test]
    fn test_set_presentation_order() {
        let mut g = graph();
        let t = sum(&g);
        let a = g.add_node(t).unwrap();
        let b = g.add_node(t).unwrap();
        let c = g.add_node(t).unwrap();

        g.set_presentation_order(vec![c, a, b]).unwrap();
        assert_eq!(g.presentation_order(), &[c, a, b]);
        for bad in [vec![a, b], vec![a, a, b], vec![a, b, NodeId(3)]] {
            assert_eq!(g.set_presentation_order(bad), Err(GraphError::InvalidPresentationOrder));
        }
        assert_eq!(g.presentation_order(), &[c, a, b]);
    }

    #[test]
    fn test_bring_to_front() {
        let mut g = graph();
        let t = sum(&g);
        let a = g.add_node(t).unwrap();
        let b = g.add_node(t).unwrap();
        g.bring_to_front(a).unwrap();
        assert_eq!(g.presentation_order(), &[b, a]);
    }
}
