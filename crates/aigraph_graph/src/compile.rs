// SPDX-License-Identifier: MIT OR Apache-2.0
//! Blob compiler: flattens a graph into one relocatable buffer.
//!
//! ## Layout
//!
//! All integers are little-endian and every block starts on an 8-byte
//! boundary. Addresses are byte offsets from the start of the blob, so the
//! buffer can be moved or written to disk as is. Address 0 means "none".
//!
//! ```text
//! header      total_size: u64, first_node: u64
//! per node, in topological order:
//!   constant cells   one per unlinked input: f32 + 4 pad
//!   string payloads  UTF-8 bytes, padded to 8
//!   record           next: u64
//!                    type: u16, inputs: u8, outputs: u8, properties: u8, pad: 3
//!                    inputs:     n x u64 address of an f32 cell
//!                    outputs:    n x (f32 + 4 pad)
//!                    properties: n x 8 (i32 | f32 | u32 offset + u32 length)
//! ```
//!
//! Every input is a pointer to a float: unlinked inputs point at their
//! constant cell, linked inputs at the producing node's output field.

use crate::catalog::{NodeType, PropertyKind, TypeId};
use crate::graph::Graph;
use crate::node::{NodeId, PropertyValue};
use crate::sort::{self, CycleError};

/// Block alignment inside a blob
pub const ALIGN: usize = 8;
/// Size of the blob header
pub const HEADER_SIZE: usize = 16;
/// Size of the fixed part of a node record
pub const RECORD_HEADER_SIZE: usize = 16;
/// Size of one input, output, property or constant field
pub const FIELD_SIZE: usize = 8;

const fn align_up(n: usize) -> usize {
    (n + ALIGN - 1) & !(ALIGN - 1)
}

/// Size of the record for a node type
pub fn record_size(node_type: &NodeType) -> usize {
    RECORD_HEADER_SIZE
        + FIELD_SIZE * (node_type.inputs.len() + node_type.outputs.len() + node_type.properties.len())
}

/// Error compiling a graph
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    /// Graph contains a cycle
    #[error("Cannot compile: {0}")]
    Cycle(#[from] CycleError),

    /// Node type missing from the catalog
    #[error("Node {node} has unknown type {type_id}")]
    UnknownType {
        /// Node
        node: NodeId,
        /// Missing type
        type_id: TypeId,
    },

    /// Slot or property count does not fit the record header
    #[error("Node {node} has {count} {what}, a record holds at most 255")]
    TooManySlots {
        /// Node
        node: NodeId,
        /// "inputs", "outputs" or "properties"
        what: &'static str,
        /// Declared count
        count: usize,
    },
}

/// Error reading a blob that was not produced in this process
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlobError {
    /// Buffer too short for a header
    #[error("Blob is truncated")]
    Truncated,

    /// Header size disagrees with the buffer
    #[error("Blob header declares {declared} bytes, buffer has {actual}")]
    SizeMismatch {
        /// Size in the header
        declared: u64,
        /// Buffer length
        actual: usize,
    },

    /// Record chain leaves the buffer, is misaligned or loops
    #[error("Invalid record at offset {0}")]
    InvalidRecord(u64),
}

/// Decoded blob header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobHeader {
    /// Whole buffer size in bytes
    pub total_size: u64,
    /// Offset of the first record, 0 when the graph is empty
    pub first_node: u64,
}

/// Location and shape of one node record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordView {
    /// Offset of the record in the blob
    pub offset: usize,
    /// Offset of the next record, 0 at the end
    pub next: u64,
    /// Catalog type
    pub type_id: TypeId,
    /// Number of input fields
    pub input_count: u8,
    /// Number of output fields
    pub output_count: u8,
    /// Number of property fields
    pub property_count: u8,
}

impl RecordView {
    /// Offset of an input field (holds an address)
    pub fn input_field(&self, slot: usize) -> usize {
        self.offset + RECORD_HEADER_SIZE + FIELD_SIZE * slot
    }

    /// Offset of an output field (holds an f32)
    pub fn output_field(&self, slot: usize) -> usize {
        self.input_field(self.input_count as usize) + FIELD_SIZE * slot
    }

    /// Offset of a property field
    pub fn property_field(&self, index: usize) -> usize {
        self.output_field(self.output_count as usize) + FIELD_SIZE * index
    }

    /// Total record size
    pub fn size(&self) -> usize {
        self.property_field(self.property_count as usize) - self.offset
    }
}

/// A compiled graph: one self-contained, pointer-patched buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledGraph {
    bytes: Vec<u8>,
}

impl CompiledGraph {
    /// Wrap bytes produced elsewhere, validating the header and record chain
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, BlobError> {
        let blob = Self { bytes };
        let header = blob.try_header().ok_or(BlobError::Truncated)?;
        if header.total_size != blob.bytes.len() as u64 {
            return Err(BlobError::SizeMismatch {
                declared: header.total_size,
                actual: blob.bytes.len(),
            });
        }

        let max_records = blob.bytes.len() / RECORD_HEADER_SIZE;
        let mut offset = header.first_node;
        let mut seen = 0;
        while offset != 0 {
            let record = blob
                .record_at(offset)
                .filter(|r| r.offset + r.size() <= blob.bytes.len())
                .ok_or(BlobError::InvalidRecord(offset))?;
            for slot in 0..record.input_count as usize {
                let address = blob.read_u64(record.input_field(slot)).unwrap_or(0);
                if blob.read_f32(address).is_none() {
                    return Err(BlobError::InvalidRecord(offset));
                }
            }
            seen += 1;
            if seen > max_records {
                return Err(BlobError::InvalidRecord(offset));
            }
            offset = record.next;
        }
        Ok(blob)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Take the raw bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Decoded header
    pub fn header(&self) -> BlobHeader {
        self.try_header().unwrap_or(BlobHeader { total_size: 0, first_node: 0 })
    }

    fn try_header(&self) -> Option<BlobHeader> {
        Some(BlobHeader {
            total_size: self.read_u64(0)?,
            first_node: self.read_u64(8)?,
        })
    }

    /// Walk the record chain
    pub fn records(&self) -> Records<'_> {
        Records {
            blob: self,
            next: self.header().first_node,
        }
    }

    /// Number of records reachable from the header
    pub fn node_count(&self) -> usize {
        self.records().count()
    }

    /// Decode the record starting at `offset`
    pub fn record_at(&self, offset: u64) -> Option<RecordView> {
        let start = usize::try_from(offset).ok()?;
        if start < HEADER_SIZE || start % ALIGN != 0 {
            return None;
        }
        let head = self.bytes.get(start..start + RECORD_HEADER_SIZE)?;
        Some(RecordView {
            offset: start,
            next: u64::from_le_bytes(head[0..8].try_into().ok()?),
            type_id: TypeId(u16::from_le_bytes([head[8], head[9]])),
            input_count: head[10],
            output_count: head[11],
            property_count: head[12],
        })
    }

    /// Value an input currently points at
    pub fn input_value(&self, record: &RecordView, slot: usize) -> Option<f32> {
        if slot >= record.input_count as usize {
            return None;
        }
        let address = self.read_u64(record.input_field(slot))?;
        self.read_f32(address)
    }

    /// Address stored in an input field
    pub fn input_address(&self, record: &RecordView, slot: usize) -> Option<u64> {
        if slot >= record.input_count as usize {
            return None;
        }
        self.read_u64(record.input_field(slot))
    }

    /// Value of an output field
    pub fn output_value(&self, record: &RecordView, slot: usize) -> Option<f32> {
        if slot >= record.output_count as usize {
            return None;
        }
        self.read_f32(record.output_field(slot) as u64)
    }

    /// Overwrite an output field
    pub fn set_output(&mut self, record: &RecordView, slot: usize, value: f32) -> bool {
        if slot >= record.output_count as usize {
            return false;
        }
        let at = record.output_field(slot);
        match self.bytes.get_mut(at..at + 4) {
            Some(cell) => {
                cell.copy_from_slice(&value.to_le_bytes());
                true
            }
            None => false,
        }
    }

    /// Raw 32 bits of a scalar property field
    pub fn property_bits(&self, record: &RecordView, index: usize) -> Option<i32> {
        if index >= record.property_count as usize {
            return None;
        }
        let at = record.property_field(index);
        let raw = self.bytes.get(at..at + 4)?;
        Some(i32::from_le_bytes(raw.try_into().ok()?))
    }

    /// String payload referenced by a string property field
    pub fn property_str(&self, record: &RecordView, index: usize) -> Option<&str> {
        if index >= record.property_count as usize {
            return None;
        }
        let at = record.property_field(index);
        let raw = self.bytes.get(at..at + 8)?;
        let offset = u32::from_le_bytes(raw[0..4].try_into().ok()?) as usize;
        let len = u32::from_le_bytes(raw[4..8].try_into().ok()?) as usize;
        std::str::from_utf8(self.bytes.get(offset..offset + len)?).ok()
    }

    /// Read an f32 cell at a blob address
    pub fn read_f32(&self, address: u64) -> Option<f32> {
        let at = usize::try_from(address).ok()?;
        if at < HEADER_SIZE {
            return None;
        }
        let raw = self.bytes.get(at..at + 4)?;
        Some(f32::from_le_bytes(raw.try_into().ok()?))
    }

    fn read_u64(&self, at: usize) -> Option<u64> {
        let raw = self.bytes.get(at..at + 8)?;
        Some(u64::from_le_bytes(raw.try_into().ok()?))
    }
}

/// Iterator over the record chain of a blob
pub struct Records<'a> {
    blob: &'a CompiledGraph,
    next: u64,
}

impl Iterator for Records<'_> {
    type Item = RecordView;

    fn next(&mut self) -> Option<RecordView> {
        if self.next == 0 {
            return None;
        }
        let record = self.blob.record_at(self.next)?;
        self.next = record.next;
        Some(record)
    }
}

/// Placement of one node computed by the sizing pass
#[derive(Debug, Default, Clone)]
struct NodePlacement {
    /// (input slot, cell offset) for every unlinked input
    constants: Vec<(usize, usize)>,
    /// (property index, payload offset) for every string property
    strings: Vec<(usize, usize)>,
    record: usize,
}

/// Compile a graph into a blob.
///
/// Read-only over the graph; the blob keeps no reference to it.
pub fn compile(graph: &Graph) -> Result<CompiledGraph, CompileError> {
    let order = sort::topological_order(graph)?;
    let catalog = graph.catalog();

    let mut types = Vec::with_capacity(graph.node_count());
    for (id, node) in graph.nodes_with_ids() {
        let node_type = catalog
            .get(node.type_id)
            .ok_or(CompileError::UnknownType { node: id, type_id: node.type_id })?;
        for (what, count) in [
            ("inputs", node_type.inputs.len()),
            ("outputs", node_type.outputs.len()),
            ("properties", node_type.properties.len()),
        ] {
            if u8::try_from(count).is_err() {
                return Err(CompileError::TooManySlots { node: id, what, count });
            }
        }
        types.push(node_type);
    }

    // Pass 1: sizes and offsets, indexed by node id
    let mut placements = vec![NodePlacement::default(); graph.node_count()];
    let mut cursor = HEADER_SIZE;
    for &id in &order {
        let (Some(node), Some(node_type)) = (graph.node(id), types.get(id.index())) else {
            continue;
        };
        let placement = &mut placements[id.index()];
        for slot in 0..node_type.inputs.len() {
            if !node.is_driven(slot as u8) {
                placement.constants.push((slot, cursor));
                cursor += FIELD_SIZE;
            }
        }
        for (index, value) in node.properties().iter().enumerate() {
            if let PropertyValue::String(s) = value {
                placement.strings.push((index, cursor));
                cursor += align_up(s.len());
            }
        }
        placement.record = cursor;
        cursor += record_size(node_type);
    }
    let total_size = cursor;

    // Pass 2: writes at the known offsets
    let mut writer = BlobWriter::new(total_size);
    writer.put_u64(0, total_size as u64);
    let first = order.first().map_or(0, |id| placements[id.index()].record);
    writer.put_u64(8, first as u64);

    for (position, &id) in order.iter().enumerate() {
        let (Some(node), Some(node_type)) = (graph.node(id), types.get(id.index())) else {
            continue;
        };
        let placement = &placements[id.index()];

        for &(slot, cell) in &placement.constants {
            writer.put_f32(cell, node.constants()[slot]);
        }
        for &(index, at) in &placement.strings {
            if let Some(PropertyValue::String(s)) = node.property(index) {
                writer.put_bytes(at, s.as_bytes());
            }
        }

        let record = placement.record;
        let next = order
            .get(position + 1)
            .map_or(0, |next| placements[next.index()].record);
        writer.put_u64(record, next as u64);
        writer.put_u16(record + 8, node.type_id.0);
        writer.put_u8(record + 10, node_type.inputs.len() as u8);
        writer.put_u8(record + 11, node_type.outputs.len() as u8);
        writer.put_u8(record + 12, node_type.properties.len() as u8);

        let inputs_at = record + RECORD_HEADER_SIZE;
        for slot in 0..node_type.inputs.len() {
            let address = match node.driver(slot as u8) {
                Some(half) => {
                    let producer = half.peer.index();
                    placements[producer].record
                        + RECORD_HEADER_SIZE
                        + FIELD_SIZE * (types[producer].inputs.len() + half.peer_slot as usize)
                }
                None => placement
                    .constants
                    .iter()
                    .find(|(s, _)| *s == slot)
                    .map_or(0, |&(_, cell)| cell),
            };
            writer.put_u64(inputs_at + FIELD_SIZE * slot, address as u64);
        }

        let props_at = inputs_at + FIELD_SIZE * (node_type.inputs.len() + node_type.outputs.len());
        for (index, info) in node_type.properties.iter().enumerate() {
            let at = props_at + FIELD_SIZE * index;
            match (info.kind, node.property(index)) {
                (PropertyKind::String, Some(PropertyValue::String(s))) => {
                    let payload = placement
                        .strings
                        .iter()
                        .find(|(i, _)| *i == index)
                        .map_or(0, |&(_, offset)| offset);
                    writer.put_u32(at, payload as u32);
                    writer.put_u32(at + 4, s.len() as u32);
                }
                (_, Some(value)) => {
                    if let Some(bits) = value.to_bits() {
                        writer.put_u32(at, bits as u32);
                    }
                }
                (_, None) => {}
            }
        }
    }

    tracing::info!(
        "Compiled {} nodes, {} links into {} bytes",
        order.len(),
        graph.link_count(),
        total_size
    );
    Ok(CompiledGraph { bytes: writer.finish() })
}

/// Fixed-size buffer written at precomputed offsets
struct BlobWriter {
    bytes: Vec<u8>,
}

impl BlobWriter {
    fn new(size: usize) -> Self {
        Self { bytes: vec![0; size] }
    }

    fn put_bytes(&mut self, at: usize, data: &[u8]) {
        self.bytes[at..at + data.len()].copy_from_slice(data);
    }

    fn put_u8(&mut self, at: usize, value: u8) {
        self.bytes[at] = value;
    }

    fn put_u16(&mut self, at: usize, value: u16) {
        self.put_bytes(at, &value.to_le_bytes());
    }

    fn put_u32(&mut self, at: usize, value: u32) {
        self.put_bytes(at, &value.to_le_bytes());
    }

    fn put_u64(&mut self, at: usize, value: u64) {
        self.put_bytes(at, &value.to_le_bytes());
    }

    fn put_f32(&mut self, at: usize, value: f32) {
        self.put_bytes(at, &value.to_le_bytes());
    }

    fn finish(self) -> Vec<u8> {
        self.bytes
    }
}
