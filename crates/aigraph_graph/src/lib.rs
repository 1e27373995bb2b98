// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node graph engine for aigraph.
//!
//! Users assemble a directed graph of typed computation nodes (arithmetic,
//! control, animation triggers) and turn it into a compact binary blob that a
//! runtime can execute without any of the editing structures.
//!
//! ## Architecture
//!
//! - [`catalog`]: node types, slots, properties and enum tables
//! - [`graph`]: node array plus half-edge links, with swap-delete renumbering
//! - [`sort`]: iterative, cycle-detecting topological ordering
//! - [`compile`]: two-pass emission of the pointer-patched blob
//! - [`evaluation`]: walks a blob and runs node kernels
//! - [`persist`] and [`json`]: binary save files and JSON documents
//! - [`editor`]: the editing session used by front ends

pub mod catalog;
pub mod node;
pub mod connection;
pub mod graph;
pub mod sort;
pub mod compile;
pub mod evaluation;
pub mod persist;
pub mod json;
pub mod editor;

pub use catalog::{Catalog, CatalogError, NodeType, PropertyKind, TypeId};
pub use node::{Node, NodeId, PropertyValue};
pub use connection::{HalfEdge, Link, LinkDirection};
pub use graph::{Graph, GraphError, LinkError};
pub use sort::{CycleError, TopologicalSorter};
pub use compile::{compile, CompileError, CompiledGraph};
pub use evaluation::{Interpreter, NodeEvaluator, Trigger};
pub use persist::{Format, PersistError};
pub use editor::{EditorError, GraphEditor, NullSink, TextSink};
