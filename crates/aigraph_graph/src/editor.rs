// SPDX-License-Identifier: MIT OR Apache-2.0
//! Editing session facade.
//!
//! [`GraphEditor`] owns the catalog handle, the live graph and a text sink.
//! It is the only mutating entry point used by front ends; every operation
//! reports its outcome to the sink and returns an explicit result.

use crate::catalog::{Catalog, CatalogError, NodeType, PropertyKind, SlotInfo};
use crate::compile::{compile, CompileError, CompiledGraph};
use crate::connection::Link;
use crate::evaluation::{EvaluationError, Interpreter, Trigger};
use crate::graph::{Graph, GraphError, LinkError};
use crate::json;
use crate::node::{NodeId, PropertyValue};
use crate::persist::{self, PersistError};
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

/// Receiver of human-readable outcome lines
pub trait TextSink {
    /// Print one line
    fn print(&mut self, line: &str);
}

impl<F: FnMut(&str)> TextSink for F {
    fn print(&mut self, line: &str) {
        self(line);
    }
}

/// Sink that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl TextSink for NullSink {
    fn print(&mut self, _line: &str) {}
}

/// Error from an editor operation
#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    /// Node type name or id not in the catalog
    #[error("Unknown node type '{0}'")]
    UnknownType(String),

    /// Slot name or index not declared by the node's type
    #[error("Node {node} has no {what} '{name}'")]
    UnknownSlot {
        /// Node
        node: NodeId,
        /// "input", "output" or "property"
        what: &'static str,
        /// Requested name or index
        name: String,
    },

    /// Text could not be parsed as a value of the property's kind
    #[error("Invalid value '{value}' for {kind} property")]
    InvalidValue {
        /// Rejected text
        value: String,
        /// Property kind
        kind: &'static str,
    },

    /// Node edit rejected
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Link rejected
    #[error(transparent)]
    Link(#[from] LinkError),

    /// Compilation failed
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// Blob execution failed
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    /// Save or load failed
    #[error(transparent)]
    Persist(#[from] PersistError),

    /// Catalog load failed
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// An editing session
pub struct GraphEditor {
    graph: Graph,
    sink: Box<dyn TextSink>,
}

impl GraphEditor {
    /// Create a session with an empty graph
    pub fn new(catalog: Arc<Catalog>, sink: impl TextSink + 'static) -> Self {
        Self {
            graph: Graph::new(catalog),
            sink: Box::new(sink),
        }
    }

    /// The live graph
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// The catalog in use
    pub fn catalog(&self) -> &Arc<Catalog> {
        self.graph.catalog()
    }

    /// Send a line to the session's sink
    pub fn print(&mut self, line: impl AsRef<str>) {
        self.sink.print(line.as_ref());
    }

    fn report<T, E: Into<EditorError>>(&mut self, result: Result<T, E>) -> Result<T, EditorError> {
        result.map_err(|e| {
            let e = e.into();
            tracing::warn!("{e}");
            self.print(format!("error: {e}"));
            e
        })
    }

    fn fail<T>(&mut self, error: EditorError) -> Result<T, EditorError> {
        self.report(Err(error))
    }

    /// Add a node by type name or numeric id
    pub fn add_node(&mut self, type_name: &str, position: [f32; 2]) -> Result<NodeId, EditorError> {
        let Some(type_id) = self.catalog().resolve(type_name) else {
            return self.fail(EditorError::UnknownType(type_name.to_string()));
        };
        let result = self.graph.add_node_at(type_id, position);
        let id = self.report(result)?;
        self.print(format!("added node {id} ({type_name})"));
        Ok(id)
    }

    /// Delete a node. The last node takes over its id.
    pub fn delete_node(&mut self, node: NodeId) -> Result<(), EditorError> {
        let moved = self.graph.node_count().checked_sub(1).map(|last| NodeId(last as u32));
        let result = self.graph.remove_node(node);
        self.report(result)?;
        match moved {
            Some(last) if last != node => self.print(format!("deleted node {node}, node {last} is now {node}")),
            _ => self.print(format!("deleted node {node}")),
        }
        Ok(())
    }

    /// Link an output to an input, rejecting cycles.
    ///
    /// Slots are given by name or index.
    pub fn link(&mut self, from: NodeId, from_slot: &str, to: NodeId, to_slot: &str) -> Result<Link, EditorError> {
        let out_slot = self.output_slot(from, from_slot)?;
        let in_slot = self.input_slot(to, to_slot)?;
        let result = self.graph.link_checked(from, out_slot, to, in_slot);
        let link = self.report(result)?;
        self.print(format!("linked {link}"));
        Ok(link)
    }

    /// Remove a link. Returns `false` when it did not exist.
    pub fn unlink(&mut self, from: NodeId, from_slot: &str, to: NodeId, to_slot: &str) -> Result<bool, EditorError> {
        let out_slot = self.output_slot(from, from_slot)?;
        let in_slot = self.input_slot(to, to_slot)?;
        let link = Link::new(from, out_slot, to, in_slot);
        let removed = self.graph.unlink(link);
        if removed {
            self.print(format!("unlinked {link}"));
        } else {
            self.print(format!("no link {link}"));
        }
        Ok(removed)
    }

    /// Set the constant of an unlinked input
    pub fn set_constant(&mut self, node: NodeId, slot: &str, value: f32) -> Result<(), EditorError> {
        let slot = self.input_slot(node, slot)?;
        let result = self.graph.set_constant(node, slot, value);
        self.report(result)?;
        self.print(format!("node {node} input {slot} = {value}"));
        Ok(())
    }

    /// Set a property from text, parsed according to its declared kind.
    ///
    /// Enum values may be given by name or index.
    pub fn set_property(&mut self, node: NodeId, name: &str, text: &str) -> Result<(), EditorError> {
        let lookup = self.graph.node_type(node).map(|t| {
            let names: Vec<&str> = t.properties.iter().map(|p| p.name.as_str()).collect();
            slot_index(&names, name).map(|i| (i, t.properties[i as usize].kind))
        });
        let (index, kind) = match lookup {
            Some(Some(found)) => found,
            Some(None) => {
                return self.fail(EditorError::UnknownSlot {
                    node,
                    what: "property",
                    name: name.to_string(),
                })
            }
            None => return self.fail(GraphError::NodeNotFound(node).into()),
        };
        let Some(value) = parse_property(self.catalog(), kind, text) else {
            return self.fail(EditorError::InvalidValue {
                value: text.to_string(),
                kind: kind.name(),
            });
        };
        let result = self.graph.set_property(node, index, value);
        self.report(result)?;
        self.print(format!("node {node} property {name} = {text}"));
        Ok(())
    }

    /// Move a node on the canvas and draw it on top
    pub fn move_node(&mut self, node: NodeId, position: [f32; 2]) -> Result<(), EditorError> {
        let result = self
            .graph
            .set_position(node, position)
            .and_then(|()| self.graph.bring_to_front(node));
        self.report(result)
    }

    /// Compile the live graph
    pub fn compile(&mut self) -> Result<CompiledGraph, EditorError> {
        let result = compile(&self.graph);
        let blob = self.report(result)?;
        self.print(format!(
            "compiled {} nodes into {} bytes",
            blob.node_count(),
            blob.as_bytes().len()
        ));
        Ok(blob)
    }

    /// Compile and run the graph once with the built-in kernels
    pub fn run(&mut self) -> Result<Vec<Trigger>, EditorError> {
        let mut blob = self.compile()?;
        let result = Interpreter::builtin(self.catalog()).run(&mut blob);
        let triggers = self.report(result)?;
        for trigger in &triggers {
            let line = format!("trigger animation {} (input {})", trigger.animation, trigger.value);
            self.print(line);
        }
        Ok(triggers)
    }

    /// Save the graph; `.json` paths get the JSON document
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<(), EditorError> {
        let path = path.as_ref();
        let result = persist::save(&self.graph, path);
        self.report(result)?;
        self.print(format!("saved {}", path.display()));
        Ok(())
    }

    /// Replace the graph with one loaded from disk.
    ///
    /// The live graph is untouched unless the whole file is valid.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<(), EditorError> {
        let path = path.as_ref();
        let result = persist::load(self.catalog().clone(), path);
        self.graph = self.report(result)?;
        self.print(format!(
            "loaded {} ({} nodes, {} links)",
            path.display(),
            self.graph.node_count(),
            self.graph.link_count()
        ));
        Ok(())
    }

    /// Switch to a catalog loaded from disk, carrying the graph over by name.
    ///
    /// If the graph does not fit the new catalog both are left unchanged.
    pub fn load_catalog(&mut self, path: impl AsRef<Path>) -> Result<(), EditorError> {
        let path = path.as_ref();
        let result = Catalog::load(path);
        let catalog = Arc::new(self.report(result)?);
        for diagnostic in catalog.diagnostics() {
            self.print(format!("warning: {diagnostic}"));
        }
        self.replace_catalog(catalog)?;
        self.print(format!("loaded catalog {}", path.display()));
        Ok(())
    }

    /// Switch to another catalog, carrying the graph over by name.
    ///
    /// Node ids and drawing order are kept.
    pub fn replace_catalog(&mut self, catalog: Arc<Catalog>) -> Result<(), EditorError> {
        let document = json::to_document(&self.graph);
        let order = self.graph.presentation_order().to_vec();
        let result = json::from_document(catalog, &document).and_then(|mut graph| {
            graph
                .set_presentation_order(order)
                .map_err(|e| PersistError::invalid("node", e))?;
            Ok(graph)
        });
        self.graph = self.report(result)?;
        Ok(())
    }

    /// Human-readable listing of the graph
    pub fn describe(&self) -> String {
        let mut out = String::new();
        let catalog = self.catalog();
        for (id, node) in self.graph.nodes_with_ids() {
            let Some(node_type) = catalog.get(node.type_id) else {
                continue;
            };
            let _ = write!(out, "{id}: {} at ({}, {})", node_type.name, node.position[0], node.position[1]);
            for (slot, input) in node_type.inputs.iter().enumerate() {
                match node.driver(slot as u8) {
                    Some(half) => {
                        let _ = write!(out, " {}<-{}.{}", input.name, half.peer, half.peer_slot);
                    }
                    None => {
                        let _ = write!(out, " {}={}", input.name, node.constants()[slot]);
                    }
                }
            }
            for (info, value) in node_type.properties.iter().zip(node.properties()) {
                let _ = write!(out, " {}={}", info.name, display_property(catalog, info.kind, value));
            }
            out.push('\n');
        }
        out
    }

    /// Print the catalog's node types
    pub fn list_types(&mut self) {
        let lines: Vec<String> = self
            .catalog()
            .types()
            .map(|(id, t)| format!("{}: {} [{}] {}", id.0, t.name, t.category, signature(t)))
            .collect();
        for line in lines {
            self.print(line);
        }
    }

    /// Print the graph listing
    pub fn list_nodes(&mut self) {
        let listing = self.describe();
        for line in listing.lines() {
            self.sink.print(line);
        }
    }

    /// Print the evaluation order
    pub fn print_order(&mut self) -> Result<Vec<NodeId>, EditorError> {
        let result = self.graph.topological_order().map_err(CompileError::from);
        let order = self.report(result)?;
        let line = order.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ");
        self.print(format!("order: {line}"));
        Ok(order)
    }

    fn input_slot(&mut self, node: NodeId, slot: &str) -> Result<u8, EditorError> {
        let names: Option<Vec<String>> = self
            .graph
            .node_type(node)
            .map(|t| t.inputs.iter().map(|s| s.name.clone()).collect());
        self.resolve_slot(node, "input", names, slot)
    }

    fn output_slot(&mut self, node: NodeId, slot: &str) -> Result<u8, EditorError> {
        let names: Option<Vec<String>> = self
            .graph
            .node_type(node)
            .map(|t| t.outputs.iter().map(|s| s.name.clone()).collect());
        self.resolve_slot(node, "output", names, slot)
    }

    fn resolve_slot(
        &mut self,
        node: NodeId,
        what: &'static str,
        names: Option<Vec<String>>,
        slot: &str,
    ) -> Result<u8, EditorError> {
        let Some(names) = names else {
            return self.fail(GraphError::NodeNotFound(node).into());
        };
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        match slot_index(&names, slot) {
            Some(index) => Ok(index),
            None => self.fail(EditorError::UnknownSlot {
                node,
                what,
                name: slot.to_string(),
            }),
        }
    }
}

/// Resolve a slot given by name or index
fn slot_index(names: &[&str], slot: &str) -> Option<u8> {
    if let Some(i) = names.iter().position(|n| *n == slot) {
        return u8::try_from(i).ok();
    }
    slot.parse::<u8>().ok().filter(|&i| (i as usize) < names.len())
}

fn parse_property(catalog: &Catalog, kind: PropertyKind, text: &str) -> Option<PropertyValue> {
    match kind {
        PropertyKind::Int => text.parse().ok().map(PropertyValue::Int),
        PropertyKind::Float => text.parse().ok().map(PropertyValue::Float),
        PropertyKind::Enum(e) => {
            let info = catalog.enum_info(e)?;
            let index = info
                .value_index(text)
                .or_else(|| text.parse::<usize>().ok().filter(|&i| i < info.values.len()))?;
            i32::try_from(index).ok().map(PropertyValue::Enum)
        }
        PropertyKind::String => Some(PropertyValue::String(text.to_string())),
        PropertyKind::Invalid => None,
    }
}

fn display_property(catalog: &Catalog, kind: PropertyKind, value: &PropertyValue) -> String {
    if let (PropertyKind::Enum(e), PropertyValue::Enum(v)) = (kind, value) {
        if let Some(name) = catalog.enum_info(e).and_then(|e| e.values.get(*v as usize)) {
            return name.clone();
        }
    }
    value.to_string()
}

fn signature(node_type: &NodeType) -> String {
    let slots = |slots: &[SlotInfo]| {
        slots
            .iter()
            .map(|s| match &s.tag {
                Some(tag) => format!("{}:{}", s.name, tag.0),
                None => s.name.clone(),
            })
            .collect::<Vec<_>>()
            .join(", ")
    };
    let mut out = format!("({}) -> ({})", slots(&node_type.inputs), slots(&node_type.outputs));
    for property in &node_type.properties {
        let _ = write!(out, " {}:{}", property.name, property.kind.name());
    }
    out
}
