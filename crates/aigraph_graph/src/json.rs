// SPDX-License-Identifier: MIT OR Apache-2.0
//! JSON graph documents.
//!
//! Same content as the binary save file, but keyed by catalog names (node
//! type, slot, property, enum value) instead of indices. A document saved
//! against one catalog loads against another as long as every name it uses
//! still exists.

use crate::catalog::{Catalog, PropertyKind};
use crate::graph::{Graph, MAX_NODES};
use crate::node::{NodeId, PropertyValue};
use crate::persist::PersistError;
use crate::sort;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Document format version
pub const DOCUMENT_VERSION: u32 = 1;

/// A graph as a JSON document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    /// Format version
    pub version: u32,
    /// View offset of the editor canvas
    #[serde(default)]
    pub scroll: [f32; 2],
    /// Nodes; their position in this list is their id
    #[serde(default)]
    pub nodes: Vec<NodeEntry>,
    /// Links
    #[serde(default)]
    pub links: Vec<LinkEntry>,
    /// Constant values of unlinked inputs
    #[serde(default)]
    pub constants: Vec<ConstantEntry>,
    /// Property values
    #[serde(default)]
    pub properties: Vec<PropertyEntry>,
}

/// A node in a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeEntry {
    /// Catalog type name
    #[serde(rename = "type")]
    pub type_name: String,
    /// Canvas position
    #[serde(default)]
    pub position: [f32; 2],
}

/// A link in a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkEntry {
    /// Source node
    pub out_node: u32,
    /// Output slot name on the source node
    pub out_slot: String,
    /// Destination node
    pub in_node: u32,
    /// Input slot name on the destination node
    pub in_slot: String,
}

/// A constant input value in a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantEntry {
    /// Node
    pub node: u32,
    /// Input slot name
    pub slot: String,
    /// Value
    pub value: f32,
}

/// A property value in a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyEntry {
    /// Node
    pub node: u32,
    /// Property name
    pub name: String,
    /// Number for int/float, value name for enums, text for strings
    pub value: Value,
}

/// Describe `graph` as a document
pub fn to_document(graph: &Graph) -> GraphDocument {
    let catalog = graph.catalog();
    let mut document = GraphDocument {
        version: DOCUMENT_VERSION,
        scroll: graph.scroll(),
        nodes: Vec::with_capacity(graph.node_count()),
        links: Vec::new(),
        constants: Vec::new(),
        properties: Vec::new(),
    };

    for (id, node) in graph.nodes_with_ids() {
        let Some(node_type) = catalog.get(node.type_id) else {
            continue;
        };
        document.nodes.push(NodeEntry {
            type_name: node_type.name.clone(),
            position: node.position,
        });

        for (slot, info) in node_type.inputs.iter().enumerate() {
            if node.is_driven(slot as u8) {
                continue;
            }
            document.constants.push(ConstantEntry {
                node: id.0,
                slot: info.name.clone(),
                value: node.constants()[slot],
            });
        }

        for (info, value) in node_type.properties.iter().zip(node.properties()) {
            let value = match (info.kind, value) {
                (PropertyKind::Enum(e), PropertyValue::Enum(v)) => catalog
                    .enum_info(e)
                    .and_then(|e| e.values.get(*v as usize))
                    .map_or(Value::from(*v), |name| Value::from(name.as_str())),
                (_, PropertyValue::Int(v)) => Value::from(*v),
                (_, PropertyValue::Float(v)) => Value::from(*v),
                (_, PropertyValue::String(s)) => Value::from(s.as_str()),
                (_, PropertyValue::Enum(_) | PropertyValue::None) => continue,
            };
            document.properties.push(PropertyEntry {
                node: id.0,
                name: info.name.clone(),
                value,
            });
        }
    }

    for link in graph.links() {
        let (Some(from), Some(to)) = (graph.node_type(link.from_node), graph.node_type(link.to_node)) else {
            continue;
        };
        let (Some(out_slot), Some(in_slot)) = (
            from.outputs.get(link.from_slot as usize),
            to.inputs.get(link.to_slot as usize),
        ) else {
            continue;
        };
        document.links.push(LinkEntry {
            out_node: link.from_node.0,
            out_slot: out_slot.name.clone(),
            in_node: link.to_node.0,
            in_slot: in_slot.name.clone(),
        });
    }

    document
}

/// Build a new graph from a document, resolving names against `catalog`
pub fn from_document(catalog: Arc<Catalog>, document: &GraphDocument) -> Result<Graph, PersistError> {
    if document.version != DOCUMENT_VERSION {
        return Err(PersistError::UnsupportedVersion(document.version));
    }
    if document.nodes.len() > MAX_NODES {
        return Err(PersistError::CountOutOfRange {
            section: "node",
            count: document.nodes.len().min(u32::MAX as usize) as u32,
            limit: MAX_NODES,
        });
    }

    let mut graph = Graph::new(catalog.clone());
    graph
        .set_scroll(document.scroll)
        .map_err(|e| PersistError::invalid("header", e))?;

    for entry in &document.nodes {
        let (type_id, _) = catalog
            .get_by_name(&entry.type_name)
            .ok_or_else(|| PersistError::UnknownTypeName(entry.type_name.clone()))?;
        graph
            .add_node_at(type_id, entry.position)
            .map_err(|e| PersistError::invalid("node", e))?;
    }
    let node = |section: &'static str, id: u32| -> Result<NodeId, PersistError> {
        if (id as usize) < document.nodes.len() {
            Ok(NodeId(id))
        } else {
            Err(PersistError::invalid(section, format!("node {id} does not exist")))
        }
    };

    for entry in &document.links {
        let from = node("link", entry.out_node)?;
        let to = node("link", entry.in_node)?;
        let out_slot = graph
            .node_type(from)
            .and_then(|t| t.output_index(&entry.out_slot))
            .ok_or_else(|| PersistError::invalid("link", format!("no output '{}' on node {from}", entry.out_slot)))?;
        let in_slot = graph
            .node_type(to)
            .and_then(|t| t.input_index(&entry.in_slot))
            .ok_or_else(|| PersistError::invalid("link", format!("no input '{}' on node {to}", entry.in_slot)))?;
        graph
            .link(from, out_slot as u8, to, in_slot as u8)
            .map_err(|e| PersistError::invalid("link", e))?;
    }
    if !sort::is_acyclic(&graph) {
        return Err(PersistError::Cycle);
    }

    for entry in &document.constants {
        let id = node("constant", entry.node)?;
        let slot = graph
            .node_type(id)
            .and_then(|t| t.input_index(&entry.slot))
            .ok_or_else(|| PersistError::invalid("constant", format!("no input '{}' on node {id}", entry.slot)))?;
        graph
            .set_constant(id, slot as u8, entry.value)
            .map_err(|e| PersistError::invalid("constant", e))?;
    }

    for entry in &document.properties {
        let id = node("property", entry.node)?;
        let (index, kind) = graph
            .node_type(id)
            .and_then(|t| t.property_index(&entry.name).map(|i| (i, t.properties[i].kind)))
            .ok_or_else(|| PersistError::invalid("property", format!("no property '{}' on node {id}", entry.name)))?;
        let value = property_from_json(&catalog, kind, &entry.value).ok_or_else(|| {
            PersistError::invalid("property", format!("'{}' cannot hold {}", entry.name, entry.value))
        })?;
        graph
            .set_property(id, index as u8, value)
            .map_err(|e| PersistError::invalid("property", e))?;
    }

    Ok(graph)
}

fn property_from_json(catalog: &Catalog, kind: PropertyKind, value: &Value) -> Option<PropertyValue> {
    match kind {
        PropertyKind::Int => value
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .map(PropertyValue::Int),
        PropertyKind::Float => value.as_f64().map(|v| PropertyValue::Float(v as f32)),
        PropertyKind::Enum(e) => {
            let info = catalog.enum_info(e)?;
            let index = match value {
                Value::String(name) => info.value_index(name)?,
                other => usize::try_from(other.as_u64()?).ok()?,
            };
            i32::try_from(index).ok().map(PropertyValue::Enum)
        }
        PropertyKind::String => value.as_str().map(|s| PropertyValue::String(s.to_string())),
        PropertyKind::Invalid => None,
    }
}
