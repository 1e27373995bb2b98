// SPDX-License-Identifier: MIT OR Apache-2.0
//! Blob structure checks over randomly built graphs.

use aigraph_graph::compile::HEADER_SIZE;
use aigraph_graph::{compile, Catalog, CompiledGraph, Graph, Interpreter, NodeId, TypeId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Arc;

fn random_graph(seed: u64, nodes: usize, links: usize) -> Graph {
    let catalog = Arc::new(Catalog::builtin());
    let types: Vec<TypeId> = catalog.types().map(|(id, _)| id).collect();
    let mut graph = Graph::new(catalog);
    let mut rng = StdRng::seed_from_u64(seed);

    for _ in 0..nodes {
        let id = graph.add_node(types[rng.gen_range(0..types.len())]).unwrap();
        for slot in 0..3 {
            let _ = graph.set_constant(id, slot, rng.gen_range(-10.0..10.0));
        }
    }
    for _ in 0..links {
        let from = NodeId(rng.gen_range(0..nodes as u32));
        let to = NodeId(rng.gen_range(0..nodes as u32));
        let _ = graph.link_checked(from, 0, to, rng.gen_range(0..3));
    }
    graph
}

#[test]
fn test_chain_visits_every_node_in_topological_order() {
    for seed in 0..16 {
        let graph = random_graph(seed, 40, 80);
        let order = graph.topological_order().unwrap();
        let blob = compile(&graph).unwrap();

        assert_eq!(blob.node_count(), graph.node_count());
        assert_eq!(blob.header().total_size as usize, blob.as_bytes().len());

        let records: Vec<_> = blob.records().collect();
        for (record, id) in records.iter().zip(&order) {
            assert_eq!(record.type_id, graph.node(*id).unwrap().type_id);
        }

        let mut offsets: Vec<usize> = records.iter().map(|r| r.offset).collect();
        offsets.dedup();
        assert_eq!(offsets.len(), records.len());
        assert!(offsets.windows(2).all(|w| w[0] < w[1]));
    }
}

#[test]
fn test_inputs_point_at_driver_outputs_or_constants() {
    let graph = random_graph(99, 30, 60);
    let order = graph.topological_order().unwrap();
    let blob = compile(&graph).unwrap();
    let records: HashMap<NodeId, _> = order.iter().copied().zip(blob.records()).collect();

    for (id, node) in graph.nodes_with_ids() {
        let record = &records[&id];
        for slot in 0..record.input_count as usize {
            let address = blob.input_address(record, slot).unwrap();
            assert_ne!(address, 0);
            assert_eq!(address % 8, 0);
            assert!(address as usize >= HEADER_SIZE);
            match node.driver(slot as u8) {
                Some(half) => {
                    let driver = &records[&half.peer];
                    assert_eq!(address as usize, driver.output_field(half.peer_slot as usize));
                    assert!(driver.offset < record.offset);
                }
                None => {
                    assert_eq!(blob.read_f32(address), node.constant(slot));
                }
            }
        }
    }
}

#[test]
fn test_blob_is_relocatable() {
    let graph = random_graph(3, 20, 30);
    let blob = compile(&graph).unwrap();
    let copy = CompiledGraph::from_bytes(blob.as_bytes().to_vec()).unwrap();

    let mut a = blob;
    let mut b = copy;
    let interpreter = Interpreter::builtin(graph.catalog());
    interpreter.run(&mut a).unwrap();
    interpreter.run(&mut b).unwrap();
    assert_eq!(a.as_bytes(), b.as_bytes());
}

#[test]
fn test_compile_does_not_touch_graph() {
    let graph = random_graph(11, 25, 40);
    let before = graph.clone();
    let first = compile(&graph).unwrap();
    let second = compile(&graph).unwrap();
    assert_eq!(graph, before);
    assert_eq!(first.as_bytes(), second.as_bytes());
}
