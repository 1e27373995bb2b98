// SPDX-License-Identifier: MIT OR Apache-2.0
//! Blob execution.
//!
//! The interpreter walks the record chain of a [`CompiledGraph`] once and
//! runs the evaluator registered for each record's type. Outputs are
//! written back into the blob, so downstream inputs read them directly.

use crate::catalog::{Catalog, TypeId};
use crate::compile::{CompiledGraph, RecordView};
use std::collections::HashMap;

/// Animation trigger fired by a `play_anim` record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trigger {
    /// Offset of the firing record
    pub record: usize,
    /// Enum value of the `animation` property
    pub animation: i32,
    /// Input value that fired the trigger
    pub value: f32,
}

/// Context for evaluating one record
pub struct NodeContext<'a> {
    blob: &'a mut CompiledGraph,
    record: RecordView,
    triggers: &'a mut Vec<Trigger>,
}

impl NodeContext<'_> {
    /// The record being evaluated
    pub fn record(&self) -> &RecordView {
        &self.record
    }

    /// Read an input value
    pub fn input(&self, slot: usize) -> Result<f32, EvaluationError> {
        self.blob
            .input_value(&self.record, slot)
            .ok_or(EvaluationError::MissingInput { record: self.record.offset, slot })
    }

    /// Sum of all inputs
    pub fn input_sum(&self) -> Result<f32, EvaluationError> {
        (0..self.record.input_count as usize).try_fold(0.0, |acc, slot| Ok(acc + self.input(slot)?))
    }

    /// Write an output value
    pub fn set_output(&mut self, slot: usize, value: f32) -> Result<(), EvaluationError> {
        if self.blob.set_output(&self.record, slot, value) {
            Ok(())
        } else {
            Err(EvaluationError::MissingOutput { record: self.record.offset, slot })
        }
    }

    /// Raw bits of a scalar property
    pub fn property(&self, index: usize) -> Result<i32, EvaluationError> {
        self.blob
            .property_bits(&self.record, index)
            .ok_or(EvaluationError::MissingProperty { record: self.record.offset, index })
    }

    /// Record an animation trigger
    pub fn trigger(&mut self, animation: i32, value: f32) {
        self.triggers.push(Trigger {
            record: self.record.offset,
            animation,
            value,
        });
    }
}

/// Trait for evaluating nodes
pub trait NodeEvaluator {
    /// Evaluate one record, writing its outputs
    fn evaluate(&self, ctx: &mut NodeContext<'_>) -> Result<(), EvaluationError>;
}

/// Writes the sum of all inputs to output 0 (`sum`, `sum3`)
#[derive(Debug, Clone, Copy, Default)]
pub struct SumEvaluator;

impl NodeEvaluator for SumEvaluator {
    fn evaluate(&self, ctx: &mut NodeContext<'_>) -> Result<(), EvaluationError> {
        let total = ctx.input_sum()?;
        ctx.set_output(0, total)
    }
}

/// Writes the negated input to output 0
#[derive(Debug, Clone, Copy, Default)]
pub struct NegateEvaluator;

impl NodeEvaluator for NegateEvaluator {
    fn evaluate(&self, ctx: &mut NodeContext<'_>) -> Result<(), EvaluationError> {
        let value = ctx.input(0)?;
        ctx.set_output(0, -value)
    }
}

/// Fires its `animation` property whenever its input is non-zero
#[derive(Debug, Clone, Copy, Default)]
pub struct PlayAnimEvaluator;

impl NodeEvaluator for PlayAnimEvaluator {
    fn evaluate(&self, ctx: &mut NodeContext<'_>) -> Result<(), EvaluationError> {
        let value = ctx.input(0)?;
        if value != 0.0 {
            let animation = ctx.property(0)?;
            ctx.trigger(animation, value);
        }
        Ok(())
    }
}

/// Evaluators by node type
#[derive(Default)]
pub struct Interpreter {
    evaluators: HashMap<TypeId, Box<dyn NodeEvaluator>>,
}

impl Interpreter {
    /// Create an interpreter with no evaluators
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an interpreter with the built-in kernels for every matching
    /// type name in `catalog`
    pub fn builtin(catalog: &Catalog) -> Self {
        let mut interpreter = Self::new();
        for (id, node_type) in catalog.types() {
            match node_type.name.as_str() {
                "sum" | "sum3" => interpreter.register(id, SumEvaluator),
                "negate" => interpreter.register(id, NegateEvaluator),
                "play_anim" => interpreter.register(id, PlayAnimEvaluator),
                _ => {}
            }
        }
        interpreter
    }

    /// Register an evaluator for a type, replacing any previous one
    pub fn register(&mut self, type_id: TypeId, evaluator: impl NodeEvaluator + 'static) {
        self.evaluators.insert(type_id, Box::new(evaluator));
    }

    /// Run every record once in chain order.
    ///
    /// Records without an evaluator are skipped and keep their outputs.
    pub fn run(&self, blob: &mut CompiledGraph) -> Result<Vec<Trigger>, EvaluationError> {
        let mut triggers = Vec::new();
        let records: Vec<RecordView> = blob.records().collect();
        for record in records {
            let Some(evaluator) = self.evaluators.get(&record.type_id) else {
                tracing::trace!("No evaluator for type {}", record.type_id);
                continue;
            };
            let mut ctx = NodeContext {
                blob: &mut *blob,
                record,
                triggers: &mut triggers,
            };
            evaluator.evaluate(&mut ctx)?;
        }
        Ok(triggers)
    }
}

/// Error during evaluation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvaluationError {
    /// Input field missing or pointing outside the blob
    #[error("Record at {record} has no readable input {slot}")]
    MissingInput {
        /// Record offset
        record: usize,
        /// Input slot
        slot: usize,
    },

    /// Output field missing
    #[error("Record at {record} has no output {slot}")]
    MissingOutput {
        /// Record offset
        record: usize,
        /// Output slot
        slot: usize,
    },

    /// Property field missing
    #[error("Record at {record} has no property {index}")]
    MissingProperty {
        /// Record offset
        record: usize,
        /// Property index
        index: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compile;
    use crate::graph::Graph;
    use crate::node::PropertyValue;
    use std::sync::Arc;

    #[test]
    fn test_linked_values_flow_through_blob() {
        let catalog = Arc::new(Catalog::builtin());
        let mut g = Graph::new(catalog.clone());
        let sum = catalog.resolve("sum").unwrap();
        let negate = catalog.resolve("negate").unwrap();
        let play = catalog.resolve("play_anim").unwrap();

        let anim = g.add_node(play).unwrap();
        let neg = g.add_node(negate).unwrap();
        let add = g.add_node(sum).unwrap();
        g.set_constant(add, 0, 2.0).unwrap();
        g.set_constant(add, 1, 3.0).unwrap();
        g.link(add, 0, neg, 0).unwrap();
        g.link(neg, 0, anim, 0).unwrap();
        g.set_property(anim, 0, PropertyValue::Enum(1)).unwrap();

        let mut blob = compile(&g).unwrap();
        let triggers = Interpreter::builtin(&catalog).run(&mut blob).unwrap();

        let records: Vec<_> = blob.records().collect();
        assert_eq!(blob.output_value(&records[0], 0), Some(5.0));
        assert_eq!(blob.output_value(&records[1], 0), Some(-5.0));
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].animation, 1);
        assert_eq!(triggers[0].value, -5.0);
    }

    #[test]
    fn test_zero_input_does_not_trigger() {
        let catalog = Arc::new(Catalog::builtin());
        let mut g = Graph::new(catalog.clone());
        g.add_node(catalog.resolve("play_anim").unwrap()).unwrap();
        let mut blob = compile(&g).unwrap();
        assert!(Interpreter::builtin(&catalog).run(&mut blob).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_types_are_skipped() {
        let catalog = Arc::new(Catalog::builtin());
        let mut g = Graph::new(catalog.clone());
        let n = g.add_node(catalog.resolve("sum3").unwrap()).unwrap();
        g.set_constant(n, 2, 1.0).unwrap();
        let mut blob = compile(&g).unwrap();
        Interpreter::new().run(&mut blob).unwrap();
        let record = blob.records().next().unwrap();
        assert_eq!(blob.output_value(&record, 0), Some(0.0));
    }
}
