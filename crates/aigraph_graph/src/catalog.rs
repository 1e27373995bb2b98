// SPDX-License-Identifier: MIT OR Apache-2.0
//! Type catalog: the static description of available node kinds.
//!
//! A catalog lists node types (their input slots, output slots and typed
//! properties) plus the enum tables that enum-kind properties refer to.
//! It is loaded once and shared read-only by every graph built against it.
//!
//! ## JSON format
//!
//! ```json
//! {
//!     "enums": { "animation": ["idle", "wave_hand"] },
//!     "nodes": {
//!         "play_anim": {
//!             "category": "control",
//!             "inputs": { "in": "float" },
//!             "properties": { "animation": "animation" }
//!         }
//!     }
//! }
//! ```
//!
//! Key order is significant: slots and properties keep their declaration
//! order.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Maximum number of input or output slots per node type.
pub const MAX_SLOTS: usize = u8::MAX as usize;

/// Maximum number of properties per node type.
pub const MAX_PROPERTIES: usize = u8::MAX as usize;

/// Index of a node type inside a [`Catalog`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeId(pub u16);

impl TypeId {
    /// Position in the catalog's type table
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Data type tag carried by a slot.
///
/// Untyped slots accept any peer; typed slots only connect to slots with the
/// same tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeTag(pub String);

impl TypeTag {
    /// Parse a tag as written in a catalog file. `""` and `"any"` are untyped.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("any") {
            None
        } else {
            Some(Self(raw.to_string()))
        }
    }
}

/// Check whether two optional slot tags may be linked.
///
/// Tags are only compared when both sides declare one.
pub fn tags_compatible(output: Option<&TypeTag>, input: Option<&TypeTag>) -> bool {
    match (output, input) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

/// A named input or output position on a node type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotInfo {
    /// Slot name
    pub name: String,
    /// Optional data type tag
    pub tag: Option<TypeTag>,
}

impl SlotInfo {
    /// Create a slot with an optional tag
    pub fn new(name: impl Into<String>, tag: Option<&str>) -> Self {
        Self {
            name: name.into(),
            tag: tag.and_then(TypeTag::parse),
        }
    }
}

/// Kind of a node property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyKind {
    /// Signed 32-bit integer
    Int,
    /// 32-bit float
    Float,
    /// Index into the enum table entry
    Enum(u16),
    /// UTF-8 string
    String,
    /// Unresolvable kind; the property is kept but carries no value
    Invalid,
}

impl PropertyKind {
    /// Short name used in diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Enum(_) => "enum",
            Self::String => "string",
            Self::Invalid => "invalid",
        }
    }
}

/// A typed property declared by a node type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyInfo {
    /// Property name
    pub name: String,
    /// Declared kind
    pub kind: PropertyKind,
}

/// Node type definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeType {
    /// Unique type name
    pub name: String,
    /// Category label
    pub category: String,
    /// Input slots in declaration order
    pub inputs: Vec<SlotInfo>,
    /// Output slots in declaration order
    pub outputs: Vec<SlotInfo>,
    /// Properties in declaration order
    pub properties: Vec<PropertyInfo>,
}

impl NodeType {
    /// Find an input slot index by name
    pub fn input_index(&self, name: &str) -> Option<usize> {
        self.inputs.iter().position(|s| s.name == name)
    }

    /// Find an output slot index by name
    pub fn output_index(&self, name: &str) -> Option<usize> {
        self.outputs.iter().position(|s| s.name == name)
    }

    /// Find a property index by name
    pub fn property_index(&self, name: &str) -> Option<usize> {
        self.properties.iter().position(|p| p.name == name)
    }
}

/// Enum table entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumInfo {
    /// Enum name, referenced by property kinds in catalog files
    pub name: String,
    /// Ordered values
    pub values: Vec<String>,
}

impl EnumInfo {
    /// Find the index of a value by name
    pub fn value_index(&self, value: &str) -> Option<usize> {
        self.values.iter().position(|v| v == value)
    }
}

/// A problem found while loading a catalog that did not stop the load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogDiagnostic {
    /// Node type the problem belongs to
    pub node_type: String,
    /// Human-readable description
    pub message: String,
}

impl fmt::Display for CatalogDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.node_type, self.message)
    }
}

/// Error loading a catalog
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// File could not be read
    #[error("Failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    /// Document is not valid catalog JSON
    #[error("Malformed catalog: {0}")]
    Json(#[from] serde_json::Error),

    /// More node types than a `TypeId` can address
    #[error("Too many node types: {0}")]
    TooManyTypes(usize),

    /// The catalog declares no node types at all
    #[error("Catalog declares no node types")]
    Empty,
}

/// Registry of available node types and enum tables
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    /// Node types by name, in declaration order
    types: IndexMap<String, NodeType>,
    /// Enum table
    enums: Vec<EnumInfo>,
    /// Problems found while loading
    diagnostics: Vec<CatalogDiagnostic>,
}

impl Catalog {
    /// Create a new empty catalog
    pub fn new() -> Self {
        Self {
            types: IndexMap::new(),
            enums: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// The built-in catalog: math kernels plus the animation trigger
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        let animation = catalog.add_enum("animation", ["idle", "wave_hand"]);

        catalog.register(NodeType {
            name: "sum".to_string(),
            category: "math".to_string(),
            inputs: vec![
                SlotInfo::new("in0", Some("float")),
                SlotInfo::new("in1", Some("float")),
            ],
            outputs: vec![SlotInfo::new("out", Some("float"))],
            properties: vec![],
        });
        catalog.register(NodeType {
            name: "sum3".to_string(),
            category: "math".to_string(),
            inputs: vec![
                SlotInfo::new("in0", Some("float")),
                SlotInfo::new("in1", Some("float")),
                SlotInfo::new("in2", Some("float")),
            ],
            outputs: vec![SlotInfo::new("out", Some("float"))],
            properties: vec![],
        });
        catalog.register(NodeType {
            name: "negate".to_string(),
            category: "math".to_string(),
            inputs: vec![SlotInfo::new("in", Some("float"))],
            outputs: vec![SlotInfo::new("out", Some("float"))],
            properties: vec![],
        });
        catalog.register(NodeType {
            name: "play_anim".to_string(),
            category: "control".to_string(),
            inputs: vec![SlotInfo::new("in", Some("float"))],
            outputs: vec![],
            properties: vec![PropertyInfo {
                name: "animation".to_string(),
                kind: PropertyKind::Enum(animation),
            }],
        });

        catalog
    }

    /// Parse a catalog from its JSON text
    pub fn from_json(text: &str) -> Result<Self, CatalogError> {
        let raw: RawCatalog = serde_json::from_str(text)?;
        Self::from_raw(raw)
    }

    /// Load a catalog from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let catalog = Self::from_json(&text)?;
        tracing::info!(
            "Loaded catalog {} ({} types, {} enums)",
            path.as_ref().display(),
            catalog.type_count(),
            catalog.enums.len()
        );
        Ok(catalog)
    }

    fn from_raw(raw: RawCatalog) -> Result<Self, CatalogError> {
        if raw.nodes.is_empty() {
            return Err(CatalogError::Empty);
        }
        if raw.nodes.len() > u16::MAX as usize {
            return Err(CatalogError::TooManyTypes(raw.nodes.len()));
        }

        let mut catalog = Self::new();
        // Enums first, so property kinds resolve whatever the key order.
        for (name, values) in raw.enums {
            catalog.add_enum(name, values);
        }

        for (name, node) in raw.nodes {
            let mut diagnostics = Vec::new();
            let inputs = slots_from_raw(&name, "input", node.inputs, &mut diagnostics);
            let outputs = slots_from_raw(&name, "output", node.outputs, &mut diagnostics);

            let mut properties = Vec::with_capacity(node.properties.len());
            for (prop_name, kind) in node.properties {
                if properties.len() == MAX_PROPERTIES {
                    diagnostics.push(CatalogDiagnostic {
                        node_type: name.clone(),
                        message: format!("property '{prop_name}' exceeds {MAX_PROPERTIES} properties"),
                    });
                    continue;
                }
                let kind = match catalog.resolve_kind(&kind) {
                    Some(kind) => kind,
                    None => {
                        diagnostics.push(CatalogDiagnostic {
                            node_type: name.clone(),
                            message: format!("property '{prop_name}' has unknown type '{kind}'"),
                        });
                        PropertyKind::Invalid
                    }
                };
                properties.push(PropertyInfo { name: prop_name, kind });
            }

            for diagnostic in &diagnostics {
                tracing::warn!("Catalog: {diagnostic}");
            }
            catalog.diagnostics.extend(diagnostics);
            catalog.register(NodeType {
                name,
                category: node.category.unwrap_or_default(),
                inputs,
                outputs,
                properties,
            });
        }

        Ok(catalog)
    }

    fn resolve_kind(&self, kind: &str) -> Option<PropertyKind> {
        match kind {
            "int" => Some(PropertyKind::Int),
            "float" => Some(PropertyKind::Float),
            "string" => Some(PropertyKind::String),
            other => self
                .enums
                .iter()
                .position(|e| e.name == other)
                .and_then(|i| u16::try_from(i).ok())
                .map(PropertyKind::Enum),
        }
    }

    /// Add an enum table entry, returning its index
    pub fn add_enum<I, S>(&mut self, name: impl Into<String>, values: I) -> u16
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let index = self.enums.len() as u16;
        self.enums.push(EnumInfo {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        index
    }

    /// Register a node type. A type with the same name is replaced in place.
    pub fn register(&mut self, node_type: NodeType) -> TypeId {
        let (index, _) = self.types.insert_full(node_type.name.clone(), node_type);
        TypeId(index as u16)
    }

    /// Get a node type by id
    pub fn get(&self, id: TypeId) -> Option<&NodeType> {
        self.types.get_index(id.index()).map(|(_, t)| t)
    }

    /// Get a node type by name
    pub fn get_by_name(&self, name: &str) -> Option<(TypeId, &NodeType)> {
        self.types
            .get_full(name)
            .map(|(index, _, t)| (TypeId(index as u16), t))
    }

    /// Resolve a type given either its name or its numeric id
    pub fn resolve(&self, name_or_id: &str) -> Option<TypeId> {
        if let Some((id, _)) = self.get_by_name(name_or_id) {
            return Some(id);
        }
        name_or_id
            .parse::<u16>()
            .ok()
            .map(TypeId)
            .filter(|id| id.index() < self.types.len())
    }

    /// Get an enum table entry
    pub fn enum_info(&self, index: u16) -> Option<&EnumInfo> {
        self.enums.get(index as usize)
    }

    /// All enum table entries
    pub fn enums(&self) -> &[EnumInfo] {
        &self.enums
    }

    /// All registered types with their ids
    pub fn types(&self) -> impl Iterator<Item = (TypeId, &NodeType)> {
        self.types
            .values()
            .enumerate()
            .map(|(i, t)| (TypeId(i as u16), t))
    }

    /// Types in a given category
    pub fn types_in_category<'a>(
        &'a self,
        category: &'a str,
    ) -> impl Iterator<Item = (TypeId, &'a NodeType)> + 'a {
        self.types().filter(move |(_, t)| t.category == category)
    }

    /// Number of registered types
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Problems found while loading
    pub fn diagnostics(&self) -> &[CatalogDiagnostic] {
        &self.diagnostics
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

fn slots_from_raw(
    node_type: &str,
    what: &str,
    raw: IndexMap<String, String>,
    diagnostics: &mut Vec<CatalogDiagnostic>,
) -> Vec<SlotInfo> {
    if raw.len() > MAX_SLOTS {
        diagnostics.push(CatalogDiagnostic {
            node_type: node_type.to_string(),
            message: format!("{} {what} slots declared, only {MAX_SLOTS} kept", raw.len()),
        });
    }
    raw.into_iter()
        .take(MAX_SLOTS)
        .map(|(name, tag)| SlotInfo::new(name, Some(tag.as_str())))
        .collect()
}

#[derive(Debug, Deserialize)]
struct RawCatalog {
    #[serde(default)]
    enums: IndexMap<String, Vec<String>>,
    #[serde(default)]
    nodes: IndexMap<String, RawNodeType>,
}

#[derive(Debug, Deserialize)]
struct RawNodeType {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    inputs: IndexMap<String, String>,
    #[serde(default)]
    outputs: IndexMap<String, String>,
    #[serde(default)]
    properties: IndexMap<String, String>,
}
