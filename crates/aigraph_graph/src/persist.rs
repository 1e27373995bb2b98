// SPDX-License-Identifier: MIT OR Apache-2.0
//! Save files.
//!
//! The binary format (little-endian) is:
//!
//! ```text
//! magic      "aigraph\0"
//! scroll     2 x f32
//! nodes      count: u32, count x [type: u16, x: f32, y: f32]
//! links      count: u32, count x [in_id: u32, out_id: u32, in_slot: u8, out_slot: u8]
//! constants  count: u32, count x [node_id: u32, value: f32, slot: u8]
//! properties count: u32, count x [node_id: u32, value: i32, index: u8]
//! strings    count: u32, count x [node_id: u32, index: u8, len: u32, bytes]
//! ```
//!
//! `in_id` is the node owning the linked input, `out_id` the node owning the
//! output. Section counts are written as placeholders and patched once the
//! section is complete. Numeric properties store their raw 32 bits (floats
//! keep their bit pattern); string properties go to the last section, which
//! older files may omit.
//!
//! Loading always builds a fresh [`Graph`]; the caller's graph is only
//! replaced once the whole file has been validated.

use crate::catalog::{Catalog, PropertyKind, TypeId};
use crate::graph::{Graph, MAX_NODES};
use crate::json;
use crate::node::{NodeId, PropertyValue};
use crate::sort;
use bincode::Options;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::ffi::OsString;
use std::io::{Cursor, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File magic
pub const MAGIC: [u8; 8] = *b"aigraph\0";

/// Longest string property accepted from a file
pub const MAX_STRING_LEN: usize = 1 << 16;

/// Default extension of binary save files
pub const BINARY_EXTENSION: &str = "aig";

const NODE_RECORD_SIZE: usize = 10;
const LINK_RECORD_SIZE: usize = 10;
const CONSTANT_RECORD_SIZE: usize = 9;
const PROPERTY_RECORD_SIZE: usize = 9;
const STRING_HEADER_SIZE: usize = 9;

/// Error saving or loading a graph
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// File open/seek/read/write failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Binary record could not be encoded or decoded
    #[error("Malformed save file: {0}")]
    Encoding(#[from] bincode::Error),

    /// JSON document could not be encoded or decoded
    #[error("Malformed JSON graph: {0}")]
    Json(#[from] serde_json::Error),

    /// File does not start with the magic tag
    #[error("Not an aigraph save file")]
    BadMagic,

    /// Section count outside its allowed range
    #[error("{section} count {count} out of range (limit {limit})")]
    CountOutOfRange {
        /// Section name
        section: &'static str,
        /// Count read from the file
        count: u32,
        /// Largest acceptable count
        limit: usize,
    },

    /// Numeric type id not in the catalog
    #[error("Unknown node type id {0}")]
    UnknownType(u16),

    /// Type name not in the catalog
    #[error("Unknown node type '{0}'")]
    UnknownTypeName(String),

    /// Entry referencing a missing node, slot or property, or violating a
    /// graph invariant
    #[error("Invalid {section} entry: {detail}")]
    InvalidEntry {
        /// Section name
        section: &'static str,
        /// What was wrong
        detail: String,
    },

    /// Links form a cycle
    #[error("Saved graph contains a cycle")]
    Cycle,

    /// Data after the last section
    #[error("{0} unexpected trailing bytes")]
    TrailingBytes(usize),

    /// JSON document version not understood
    #[error("Unsupported graph document version {0}")]
    UnsupportedVersion(u32),
}

impl PersistError {
    pub(crate) fn invalid(section: &'static str, detail: impl ToString) -> Self {
        Self::InvalidEntry {
            section,
            detail: detail.to_string(),
        }
    }
}

/// On-disk encoding of a graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Length-prefixed binary sections
    Binary,
    /// Named JSON document
    Json,
}

impl Format {
    /// Pick the format from a file extension; anything but `.json` is binary
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Binary,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FileHeader {
    magic: [u8; 8],
    scroll: [f32; 2],
}

#[derive(Debug, Serialize, Deserialize)]
struct NodeRecord {
    type_id: u16,
    x: f32,
    y: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct LinkRecord {
    in_id: u32,
    out_id: u32,
    in_slot: u8,
    out_slot: u8,
}

#[derive(Debug, Serialize, Deserialize)]
struct ConstantRecord {
    node_id: u32,
    value: f32,
    slot: u8,
}

#[derive(Debug, Serialize, Deserialize)]
struct PropertyRecord {
    node_id: u32,
    value: i32,
    index: u8,
}

#[derive(Debug, Serialize, Deserialize)]
struct StringHeader {
    node_id: u32,
    index: u8,
    len: u32,
}

fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
}

/// Binary writer with placeholder counts
struct SectionWriter<W> {
    inner: W,
}

impl<W: Write + Seek> SectionWriter<W> {
    fn put<T: Serialize>(&mut self, value: &T) -> Result<(), PersistError> {
        codec().serialize_into(&mut self.inner, value)?;
        Ok(())
    }

    /// Write a zero count and return where it lives
    fn reserve_count(&mut self) -> Result<u64, PersistError> {
        let at = self.inner.stream_position()?;
        self.put(&0u32)?;
        Ok(at)
    }

    /// Overwrite a reserved count, then return to the end of the stream
    fn patch_count(&mut self, at: u64, count: u32) -> Result<(), PersistError> {
        let end = self.inner.stream_position()?;
        self.inner.seek(SeekFrom::Start(at))?;
        self.put(&count)?;
        self.inner.seek(SeekFrom::Start(end))?;
        Ok(())
    }

    fn into_inner(self) -> W {
        self.inner
    }
}

/// Write `graph` in the binary format
pub fn write_binary<W: Write + Seek>(graph: &Graph, writer: W) -> Result<W, PersistError> {
    let mut out = SectionWriter { inner: writer };
    out.put(&FileHeader {
        magic: MAGIC,
        scroll: graph.scroll(),
    })?;

    out.put(&(graph.node_count() as u32))?;
    for node in graph.nodes() {
        out.put(&NodeRecord {
            type_id: node.type_id.0,
            x: node.position[0],
            y: node.position[1],
        })?;
    }

    let at = out.reserve_count()?;
    let mut count = 0u32;
    for link in graph.links() {
        out.put(&LinkRecord {
            in_id: link.to_node.0,
            out_id: link.from_node.0,
            in_slot: link.to_slot,
            out_slot: link.from_slot,
        })?;
        count += 1;
    }
    out.patch_count(at, count)?;

    let at = out.reserve_count()?;
    let mut count = 0u32;
    for (id, node) in graph.nodes_with_ids() {
        for (slot, &value) in node.constants().iter().enumerate() {
            if node.is_driven(slot as u8) {
                continue;
            }
            out.put(&ConstantRecord {
                node_id: id.0,
                value,
                slot: slot as u8,
            })?;
            count += 1;
        }
    }
    out.patch_count(at, count)?;

    let at = out.reserve_count()?;
    let mut count = 0u32;
    for (id, node) in graph.nodes_with_ids() {
        for (index, value) in node.properties().iter().enumerate() {
            let Some(bits) = value.to_bits() else { continue };
            out.put(&PropertyRecord {
                node_id: id.0,
                value: bits,
                index: index as u8,
            })?;
            count += 1;
        }
    }
    out.patch_count(at, count)?;

    let at = out.reserve_count()?;
    let mut count = 0u32;
    for (id, node) in graph.nodes_with_ids() {
        for (index, value) in node.properties().iter().enumerate() {
            let PropertyValue::String(s) = value else { continue };
            out.put(&StringHeader {
                node_id: id.0,
                index: index as u8,
                len: s.len() as u32,
            })?;
            out.inner.write_all(s.as_bytes())?;
            count += 1;
        }
    }
    out.patch_count(at, count)?;

    Ok(out.into_inner())
}

/// Encode `graph` in the binary format
pub fn encode_binary(graph: &Graph) -> Result<Vec<u8>, PersistError> {
    Ok(write_binary(graph, Cursor::new(Vec::new()))?.into_inner())
}

/// Bounds-checked reader over a whole file
struct SectionReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> SectionReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(bytes),
        }
    }

    fn get<T: DeserializeOwned>(&mut self) -> Result<T, PersistError> {
        Ok(codec().deserialize_from(&mut self.cursor)?)
    }

    fn remaining(&self) -> usize {
        let len = self.cursor.get_ref().len();
        len.saturating_sub(self.cursor.position() as usize)
    }

    /// Read a section count and check it against its limits
    fn count(&mut self, section: &'static str, limit: usize, record_size: usize) -> Result<usize, PersistError> {
        let count: u32 = self.get()?;
        let fits = self.remaining() / record_size;
        let limit = limit.min(fits);
        if count as usize > limit {
            return Err(PersistError::CountOutOfRange { section, count, limit });
        }
        Ok(count as usize)
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8], PersistError> {
        if len > self.remaining() {
            return Err(PersistError::invalid("strings", "payload past end of file"));
        }
        let start = self.cursor.position() as usize;
        let data = &self.cursor.get_ref()[start..start + len];
        self.cursor.set_position((start + len) as u64);
        Ok(data)
    }
}

fn node_in_range(section: &'static str, id: u32, count: usize) -> Result<NodeId, PersistError> {
    if (id as usize) < count {
        Ok(NodeId(id))
    } else {
        Err(PersistError::invalid(section, format!("node {id} does not exist")))
    }
}

/// Decode a binary save file into a new graph
pub fn decode_binary(catalog: Arc<Catalog>, bytes: &[u8]) -> Result<Graph, PersistError> {
    let mut input = SectionReader::new(bytes);
    let header: FileHeader = input.get().map_err(|_| PersistError::BadMagic)?;
    if header.magic != MAGIC {
        return Err(PersistError::BadMagic);
    }

    let mut graph = Graph::new(catalog.clone());
    graph
        .set_scroll(header.scroll)
        .map_err(|e| PersistError::invalid("header", e))?;

    let node_count = input.count("node", MAX_NODES, NODE_RECORD_SIZE)?;
    let mut total_inputs = 0usize;
    let mut total_properties = 0usize;
    for _ in 0..node_count {
        let record: NodeRecord = input.get()?;
        let type_id = TypeId(record.type_id);
        let node_type = catalog
            .get(type_id)
            .ok_or(PersistError::UnknownType(record.type_id))?;
        total_inputs += node_type.inputs.len();
        total_properties += node_type.properties.len();
        graph
            .add_node_at(type_id, [record.x, record.y])
            .map_err(|e| PersistError::invalid("node", e))?;
    }

    let link_count = input.count("link", total_inputs, LINK_RECORD_SIZE)?;
    for _ in 0..link_count {
        let record: LinkRecord = input.get()?;
        let to = node_in_range("link", record.in_id, node_count)?;
        let from = node_in_range("link", record.out_id, node_count)?;
        graph
            .link(from, record.out_slot, to, record.in_slot)
            .map_err(|e| PersistError::invalid("link", e))?;
    }
    if !sort::is_acyclic(&graph) {
        return Err(PersistError::Cycle);
    }

    let constant_count = input.count("constant", total_inputs, CONSTANT_RECORD_SIZE)?;
    for _ in 0..constant_count {
        let record: ConstantRecord = input.get()?;
        let node = node_in_range("constant", record.node_id, node_count)?;
        graph
            .set_constant(node, record.slot, record.value)
            .map_err(|e| PersistError::invalid("constant", e))?;
    }

    let property_count = input.count("property", total_properties, PROPERTY_RECORD_SIZE)?;
    for _ in 0..property_count {
        let record: PropertyRecord = input.get()?;
        let node = node_in_range("property", record.node_id, node_count)?;
        let kind = graph
            .node_type(node)
            .and_then(|t| t.properties.get(record.index as usize))
            .map(|p| p.kind)
            .ok_or_else(|| {
                PersistError::invalid("property", format!("node {node} has no property {}", record.index))
            })?;
        let value = PropertyValue::from_bits(kind, record.value).ok_or_else(|| {
            PersistError::invalid("property", format!("property {} is not numeric", record.index))
        })?;
        graph
            .set_property(node, record.index, value)
            .map_err(|e| PersistError::invalid("property", e))?;
    }

    // Files from older writers end here
    if input.remaining() > 0 {
        let string_count = input.count("string", total_properties, STRING_HEADER_SIZE)?;
        for _ in 0..string_count {
            let record: StringHeader = input.get()?;
            let node = node_in_range("strings", record.node_id, node_count)?;
            if record.len as usize > MAX_STRING_LEN {
                return Err(PersistError::invalid("strings", format!("string of {} bytes", record.len)));
            }
            let text = std::str::from_utf8(input.bytes(record.len as usize)?)
                .map_err(|e| PersistError::invalid("strings", e))?;
            let kind = graph
                .node_type(node)
                .and_then(|t| t.properties.get(record.index as usize))
                .map(|p| p.kind);
            if kind != Some(PropertyKind::String) {
                return Err(PersistError::invalid(
                    "strings",
                    format!("node {node} property {} is not a string", record.index),
                ));
            }
            graph
                .set_property(node, record.index, PropertyValue::String(text.to_string()))
                .map_err(|e| PersistError::invalid("strings", e))?;
        }
    }

    if input.remaining() > 0 {
        return Err(PersistError::TrailingBytes(input.remaining()));
    }
    Ok(graph)
}

/// Save `graph` to `path`, choosing the format from the extension.
///
/// The file is written next to `path` and renamed over it, so a failed save
/// leaves any previous file intact.
pub fn save(graph: &Graph, path: impl AsRef<Path>) -> Result<(), PersistError> {
    let path = path.as_ref();
    let bytes = match Format::from_path(path) {
        Format::Binary => encode_binary(graph)?,
        Format::Json => serde_json::to_vec_pretty(&json::to_document(graph))?,
    };
    write_replacing(path, &bytes)?;
    tracing::info!(
        "Saved {} nodes, {} links to {}",
        graph.node_count(),
        graph.link_count(),
        path.display()
    );
    Ok(())
}

/// Sibling path used while a save is in progress
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_replacing(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let temp = temp_path(path);
    let result = std::fs::File::create(&temp)
        .and_then(|mut file| {
            file.write_all(bytes)?;
            file.sync_all()
        })
        .and_then(|()| std::fs::rename(&temp, path));
    if result.is_err() {
        let _ = std::fs::remove_file(&temp);
    }
    result
}

/// Load a graph from `path` against `catalog`, choosing the format from the
/// extension
pub fn load(catalog: Arc<Catalog>, path: impl AsRef<Path>) -> Result<Graph, PersistError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let graph = match Format::from_path(path) {
        Format::Binary => decode_binary(catalog, &bytes)?,
        Format::Json => {
            let document: json::GraphDocument = serde_json::from_slice(&bytes)?;
            json::from_document(catalog, &document)?
        }
    };
    tracing::info!(
        "Loaded {} nodes, {} links from {}",
        graph.node_count(),
        graph.link_count(),
        path.display()
    );
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Graph {
        let mut g = Graph::new(Arc::new(Catalog::builtin()));
        let sum = g.catalog().resolve("sum").unwrap();
        let play = g.catalog().resolve("play_anim").unwrap();
        let a = g.add_node_at(sum, [1.0, 2.0]).unwrap();
        let b = g.add_node_at(play, [3.0, 4.0]).unwrap();
        g.link(a, 0, b, 0).unwrap();
        g.set_constant(a, 1, 0.5).unwrap();
        g.set_property(b, 0, PropertyValue::Enum(1)).unwrap();
        g.set_scroll([10.0, -5.0]).unwrap();
        g
    }

    #[test]
    fn test_layout_is_bit_exact() {
        let bytes = encode_binary(&sample()).unwrap();

        let mut expected = Vec::new();
        expected.extend_from_slice(b"aigraph\0");
        expected.extend_from_slice(&10.0f32.to_le_bytes());
        expected.extend_from_slice(&(-5.0f32).to_le_bytes());
        expected.extend_from_slice(&2u32.to_le_bytes());
        for (t, x, y) in [(0u16, 1.0f32, 2.0f32), (3, 3.0, 4.0)] {
            expected.extend_from_slice(&t.to_le_bytes());
            expected.extend_from_slice(&x.to_le_bytes());
            expected.extend_from_slice(&y.to_le_bytes());
        }
        // one link: in_id, out_id, in_slot, out_slot
        expected.extend_from_slice(&1u32.to_le_bytes());
        expected.extend_from_slice(&1u32.to_le_bytes());
        expected.extend_from_slice(&0u32.to_le_bytes());
        expected.extend_from_slice(&[0, 0]);
        // constants: both inputs of node 0
        expected.extend_from_slice(&2u32.to_le_bytes());
        for (slot, value) in [(0u8, 0.0f32), (1, 0.5)] {
            expected.extend_from_slice(&0u32.to_le_bytes());
            expected.extend_from_slice(&value.to_le_bytes());
            expected.push(slot);
        }
        // properties
        expected.extend_from_slice(&1u32.to_le_bytes());
        expected.extend_from_slice(&1u32.to_le_bytes());
        expected.extend_from_slice(&1i32.to_le_bytes());
        expected.push(0);
        // strings
        expected.extend_from_slice(&0u32.to_le_bytes());

        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_binary_round_trip() {
        let graph = sample();
        let bytes = encode_binary(&graph).unwrap();
        let loaded = decode_binary(graph.catalog().clone(), &bytes).unwrap();
        assert_eq!(loaded, graph);
    }

    #[test]
    fn test_missing_string_section_accepted() {
        let graph = sample();
        let mut bytes = encode_binary(&graph).unwrap();
        bytes.truncate(bytes.len() - 4);
        assert_eq!(decode_binary(graph.catalog().clone(), &bytes).unwrap(), graph);
    }

    #[test]
    fn test_bad_magic() {
        let catalog = Arc::new(Catalog::builtin());
        let mut bytes = encode_binary(&sample()).unwrap();
        bytes[0] = b'X';
        assert!(matches!(decode_binary(catalog.clone(), &bytes), Err(PersistError::BadMagic)));
        assert!(matches!(decode_binary(catalog, b"aig"), Err(PersistError::BadMagic)));
    }

    #[test]
    fn test_truncated_file_rejected() {
        let catalog = Arc::new(Catalog::builtin());
        let bytes = encode_binary(&sample()).unwrap();
        for len in 16..bytes.len() - 4 {
            assert!(decode_binary(catalog.clone(), &bytes[..len]).is_err(), "length {len}");
        }
    }

    #[test]
    fn test_count_out_of_range() {
        let catalog = Arc::new(Catalog::builtin());
        let mut bytes = encode_binary(&sample()).unwrap();
        // node count lives right after magic + scroll
        bytes[16..20].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            decode_binary(catalog, &bytes),
            Err(PersistError::CountOutOfRange { section: "node", .. })
        ));
    }

    // Offsets into `sample()`: link count at 40, first link at 44, constant
    // count at 54, property count at 76, string count at 89.
    fn patch_u32(bytes: &mut [u8], at: usize, value: u32) {
        bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    #[test]
    fn test_section_counts_bounded_by_declared_slots() {
        let catalog = Arc::new(Catalog::builtin());
        let bytes = encode_binary(&sample()).unwrap();
        assert_eq!(bytes.len(), 93);

        // Three inputs and one property are declared across both nodes
        for (at, count, section) in [(40, 4, "link"), (54, 4, "constant"), (76, 2, "property"), (89, 2, "string")] {
            let mut patched = bytes.clone();
            patch_u32(&mut patched, at, count);
            match decode_binary(catalog.clone(), &patched) {
                Err(PersistError::CountOutOfRange { section: s, count: c, .. }) => {
                    assert_eq!((s, c), (section, count));
                }
                other => panic!("{section}: unexpected {other:?}"),
            }
        }

        let mut patched = bytes;
        patch_u32(&mut patched, 40, 4);
        assert!(matches!(
            decode_binary(catalog, &patched),
            Err(PersistError::CountOutOfRange { section: "link", limit: 3, .. })
        ));
    }

    #[test]
    fn test_record_node_ids_checked() {
        let catalog = Arc::new(Catalog::builtin());
        let bytes = encode_binary(&sample()).unwrap();

        let mut patched = bytes.clone();
        patch_u32(&mut patched, 44, 7);
        assert!(matches!(
            decode_binary(catalog.clone(), &patched),
            Err(PersistError::InvalidEntry { section: "link", .. })
        ));

        let mut patched = bytes.clone();
        patch_u32(&mut patched, 48, 2);
        assert!(matches!(
            decode_binary(catalog.clone(), &patched),
            Err(PersistError::InvalidEntry { section: "link", .. })
        ));

        let mut patched = bytes;
        patch_u32(&mut patched, 58, 9);
        assert!(matches!(
            decode_binary(catalog, &patched),
            Err(PersistError::InvalidEntry { section: "constant", .. })
        ));
    }

    #[test]
    fn test_non_finite_scroll_rejected() {
        let catalog = Arc::new(Catalog::builtin());
        let mut bytes = encode_binary(&sample()).unwrap();
        bytes[8..12].copy_from_slice(&f32::NAN.to_le_bytes());
        assert!(matches!(
            decode_binary(catalog, &bytes),
            Err(PersistError::InvalidEntry { section: "header", .. })
        ));
    }

    #[test]
    fn test_save_replaces_file_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.aig");
        std::fs::write(&path, b"old contents").unwrap();

        let graph = sample();
        save(&graph, &path).unwrap();
        assert!(!temp_path(&path).exists());
        assert_eq!(load(graph.catalog().clone(), &path).unwrap(), graph);
    }

    #[test]
    fn test_failed_save_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be replaced by a file
        let path = dir.path().join("graph.json");
        std::fs::create_dir(&path).unwrap();

        assert!(matches!(save(&sample(), &path), Err(PersistError::Io(_))));
        assert!(path.is_dir());
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_unknown_type_id() {
        let catalog = Arc::new(Catalog::builtin());
        let mut bytes = encode_binary(&sample()).unwrap();
        bytes[20..22].copy_from_slice(&99u16.to_le_bytes());
        assert!(matches!(decode_binary(catalog, &bytes), Err(PersistError::UnknownType(99))));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let catalog = Arc::new(Catalog::builtin());
        let mut bytes = encode_binary(&sample()).unwrap();
        bytes.push(0);
        assert!(decode_binary(catalog, &bytes).is_err());
    }

    #[test]
    fn test_temp_path_is_sibling() {
        assert_eq!(temp_path(Path::new("dir/g.json")), PathBuf::from("dir/g.json.tmp"));
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(Format::from_path(Path::new("g.json")), Format::Json);
        assert_eq!(Format::from_path(Path::new("g.aig")), Format::Binary);
        assert_eq!(Format::from_path(Path::new("g")), Format::Binary);
    }
}
