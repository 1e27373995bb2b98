// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node instances stored by the graph.

use crate::catalog::{NodeType, PropertyKind, TypeId};
use crate::connection::{HalfEdge, LinkDirection};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Width of a node in the editor canvas
pub const NODE_WIDTH: f32 = 180.0;
/// Height of the node title bar
pub const NODE_HEADER_HEIGHT: f32 = 45.0;
/// Height of one slot row
pub const NODE_ROW_HEIGHT: f32 = 25.0;

/// Index of a node inside its graph.
///
/// Ids are positions in the node array. Deleting a node moves the last node
/// into the freed position, so the id of that moved node changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Position in the node array
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Value of a node property, tagged by kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    /// Integer
    Int(i32),
    /// Float
    Float(f32),
    /// Index into the property's enum table entry
    Enum(i32),
    /// String
    String(String),
    /// Value of a property whose kind could not be resolved
    None,
}

impl PropertyValue {
    /// Zero value for a property kind
    pub fn default_for(kind: PropertyKind) -> Self {
        match kind {
            PropertyKind::Int => Self::Int(0),
            PropertyKind::Float => Self::Float(0.0),
            PropertyKind::Enum(_) => Self::Enum(0),
            PropertyKind::String => Self::String(String::new()),
            PropertyKind::Invalid => Self::None,
        }
    }

    /// Check that this value has the shape a property kind expects
    pub fn matches_kind(&self, kind: PropertyKind) -> bool {
        matches!(
            (self, kind),
            (Self::Int(_), PropertyKind::Int)
                | (Self::Float(_), PropertyKind::Float)
                | (Self::Enum(_), PropertyKind::Enum(_))
                | (Self::String(_), PropertyKind::String)
                | (Self::None, PropertyKind::Invalid)
        )
    }

    /// Scalar payload as 32 raw bits. Floats keep their bit pattern.
    pub fn to_bits(&self) -> Option<i32> {
        match self {
            Self::Int(v) | Self::Enum(v) => Some(*v),
            Self::Float(v) => Some(v.to_bits() as i32),
            Self::String(_) | Self::None => None,
        }
    }

    /// Rebuild a scalar value of the given kind from its raw bits
    pub fn from_bits(kind: PropertyKind, bits: i32) -> Option<Self> {
        match kind {
            PropertyKind::Int => Some(Self::Int(bits)),
            PropertyKind::Float => Some(Self::Float(f32::from_bits(bits as u32))),
            PropertyKind::Enum(_) => Some(Self::Enum(bits)),
            PropertyKind::String | PropertyKind::Invalid => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) | Self::Enum(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::None => f.write_str("-"),
        }
    }
}

/// A node instance in the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Catalog type
    pub type_id: TypeId,
    /// Position in the graph UI
    pub position: [f32; 2],
    /// Size in the graph UI, derived from the slot count
    pub size: [f32; 2],
    pub(crate) links: Vec<HalfEdge>,
    pub(crate) constants: Vec<f32>,
    pub(crate) properties: Vec<PropertyValue>,
}

impl Node {
    /// Create a node sized from its type definition, with zeroed values
    pub fn new(type_id: TypeId, node_type: &NodeType) -> Self {
        let rows = node_type.inputs.len().max(node_type.outputs.len()) as f32;
        Self {
            type_id,
            position: [0.0, 0.0],
            size: [NODE_WIDTH, NODE_ROW_HEIGHT * rows + NODE_HEADER_HEIGHT],
            links: Vec::new(),
            constants: vec![0.0; node_type.inputs.len()],
            properties: node_type
                .properties
                .iter()
                .map(|p| PropertyValue::default_for(p.kind))
                .collect(),
        }
    }

    /// Set the position
    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.position = [x, y];
        self
    }

    /// All half-edges touching this node
    pub fn links(&self) -> &[HalfEdge] {
        &self.links
    }

    /// Half-edges leaving this node
    pub fn outbound(&self) -> impl Iterator<Item = &HalfEdge> {
        self.links
            .iter()
            .filter(|h| h.direction == LinkDirection::Outbound)
    }

    /// Half-edges arriving at this node
    pub fn inbound(&self) -> impl Iterator<Item = &HalfEdge> {
        self.links
            .iter()
            .filter(|h| h.direction == LinkDirection::Inbound)
    }

    /// The half-edge driving an input slot, if any
    pub fn driver(&self, input_slot: u8) -> Option<&HalfEdge> {
        self.inbound().find(|h| h.slot == input_slot)
    }

    /// Whether an input slot is driven by a link
    pub fn is_driven(&self, input_slot: u8) -> bool {
        self.driver(input_slot).is_some()
    }

    /// Constant input values, one per declared input
    pub fn constants(&self) -> &[f32] {
        &self.constants
    }

    /// Constant value of an input slot
    pub fn constant(&self, slot: usize) -> Option<f32> {
        self.constants.get(slot).copied()
    }

    /// Property values, one per declared property
    pub fn properties(&self) -> &[PropertyValue] {
        &self.properties
    }

    /// Value of one property
    pub fn property(&self, index: usize) -> Option<&PropertyValue> {
        self.properties.get(index)
    }
}
