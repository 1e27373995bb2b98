// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cycle-detecting topological ordering.
//!
//! Depth-first search over outbound half-edges, driven by an explicit frame
//! stack instead of recursion. Each frame keeps a resume index into its
//! node's link list, so every half-edge is examined once: O(V + E).

use crate::connection::LinkDirection;
use crate::graph::Graph;
use crate::node::NodeId;

/// Error when graph contains a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Graph contains a cycle")]
pub struct CycleError;

/// Visit state of a node during a sort
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    /// Not reached yet
    Unvisited,
    /// On the current DFS path
    InProgress,
    /// All descendants emitted
    Done,
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    node: NodeId,
    resume: usize,
}

/// Reusable sorter state
#[derive(Debug, Default)]
pub struct TopologicalSorter {
    marks: Vec<Mark>,
    stack: Vec<Frame>,
    post_order: Vec<NodeId>,
}

impl TopologicalSorter {
    /// Create a sorter with empty scratch buffers
    pub fn new() -> Self {
        Self::default()
    }

    /// Sort `graph`, writing the order into `out` when given.
    ///
    /// On success `out` holds every node, producers before consumers. On a
    /// cycle nothing is written.
    pub fn sort(&mut self, graph: &Graph, out: Option<&mut Vec<NodeId>>) -> Result<(), CycleError> {
        let count = graph.node_count();
        self.marks.clear();
        self.marks.resize(count, Mark::Unvisited);
        self.stack.clear();
        self.post_order.clear();

        for root in graph.node_ids() {
            if self.marks[root.index()] != Mark::Unvisited {
                continue;
            }
            self.marks[root.index()] = Mark::InProgress;
            self.stack.push(Frame { node: root, resume: 0 });

            while let Some(frame) = self.stack.last_mut() {
                let links = match graph.node(frame.node) {
                    Some(node) => node.links(),
                    None => &[],
                };

                let mut descend = None;
                while frame.resume < links.len() {
                    let half = links[frame.resume];
                    frame.resume += 1;
                    if half.direction != LinkDirection::Outbound {
                        continue;
                    }
                    match self.marks[half.peer.index()] {
                        Mark::Unvisited => {
                            descend = Some(half.peer);
                            break;
                        }
                        Mark::InProgress => return Err(CycleError),
                        Mark::Done => {}
                    }
                }

                match descend {
                    Some(next) => {
                        self.marks[next.index()] = Mark::InProgress;
                        self.stack.push(Frame { node: next, resume: 0 });
                    }
                    None => {
                        let node = frame.node;
                        self.stack.pop();
                        self.marks[node.index()] = Mark::Done;
                        self.post_order.push(node);
                    }
                }
            }
        }

        if let Some(out) = out {
            out.clear();
            out.extend(self.post_order.iter().rev());
        }
        Ok(())
    }
}

/// Nodes of `graph` in topological order
pub fn topological_order(graph: &Graph) -> Result<Vec<NodeId>, CycleError> {
    let mut order = Vec::with_capacity(graph.node_count());
    TopologicalSorter::new().sort(graph, Some(&mut order))?;
    Ok(order)
}

/// Check that `graph` has no cycle without building an order
pub fn is_acyclic(graph: &Graph) -> bool {
    TopologicalSorter::new().sort(graph, None).is_ok()
}
