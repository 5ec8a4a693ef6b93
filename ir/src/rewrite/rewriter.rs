//! Staging area for rule callbacks.
//!
//! A [`Rewriter`] holds a shared borrow of the graph, so a callback can read
//! anything but mutate nothing. Replacement nodes are built against it with
//! full type and shape inference; the runtime splices them in only after the
//! callback returns [`RewriteResult::Rewritten`]. Arithmetic on constants is
//! folded while staging, so thresholds derived from constant thresholds stay
//! constant.

use std::panic::Location;

use qfold_dtype::DType;
use smallvec::SmallVec;
use snafu::OptionExt;

use crate::error::{Result, UnknownStagedSnafu};
use crate::eval;
use crate::graph::{Graph, OutputInfo, StagedNode, Value};
use crate::op::Op;
use crate::ops::{self, Operand};
use crate::tensor::ConstTensor;
use crate::types::BinaryOp;

/// Outcome of a rule callback.
#[derive(Debug, Clone, PartialEq)]
pub enum RewriteResult {
    /// Pattern matched structurally but a value-level precondition failed.
    NoMatch,
    /// Replace the match root with this value.
    Rewritten(Value),
}

impl From<Option<Value>> for RewriteResult {
    fn from(value: Option<Value>) -> Self {
        value.map_or(RewriteResult::NoMatch, RewriteResult::Rewritten)
    }
}

pub struct Rewriter<'g> {
    graph: &'g Graph,
    staged: Vec<StagedNode>,
}

impl<'g> Rewriter<'g> {
    pub fn new(graph: &'g Graph) -> Self {
        Self { graph, staged: Vec::new() }
    }

    pub fn graph(&self) -> &'g Graph {
        self.graph
    }

    /// Number of nodes staged so far.
    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Type and shape of a value.
    pub fn info(&self, value: Value) -> Result<&OutputInfo> {
        match value {
            Value::Existing(tensor) => self.graph.output_info(tensor),
            Value::Staged { index, output } => self
                .staged
                .get(index as usize)
                .and_then(|n| n.outputs.get(output as usize))
                .context(UnknownStagedSnafu { index, output }),
        }
    }

    /// Constant payload behind a value, staged constants included.
    pub fn static_value(&self, value: Value) -> Option<&ConstTensor> {
        match value {
            Value::Existing(tensor) => self.graph.static_value(tensor),
            Value::Staged { index, output: 0 } => self.staged.get(index as usize).and_then(|n| n.op.as_constant()),
            Value::Staged { .. } => None,
        }
    }

    /// Stage a node. Outputs are inferred immediately.
    ///
    /// Elementwise and shape operators whose operands are all constants are
    /// folded: the computed constant is staged instead of the operator.
    #[track_caller]
    pub fn add(&mut self, op: Op, inputs: impl IntoIterator<Item = Value>) -> Result<Value> {
        let location = Location::caller();
        let inputs: SmallVec<[Value; 5]> = inputs.into_iter().collect();
        let (outputs, folded) = {
            let operands = inputs
                .iter()
                .map(|&v| Ok(Operand { info: self.info(v)?, value: self.static_value(v) }))
                .collect::<Result<SmallVec<[_; 5]>>>()?;
            let outputs = ops::infer(&op, &operands)?;

            let folded = match op {
                Op::Binary(_) | Op::Convert { .. } | Op::Reshape { .. } | Op::ReduceSum { .. } => operands
                    .iter()
                    .map(|o| o.value)
                    .collect::<Option<SmallVec<[_; 5]>>>()
                    .map(|args| eval::compute(&op, &args, &outputs[0]))
                    .transpose()?,
                _ => None,
            };
            (outputs, folded)
        };

        let index = self.staged.len() as u32;
        let node = match folded {
            Some(tensor) => {
                tracing::trace!(op = %op, "folded constant operands");
                StagedNode { op: Op::Constant(tensor), inputs: SmallVec::new(), outputs, name: None, location }
            }
            None => StagedNode { op, inputs, outputs, name: None, location },
        };
        self.staged.push(node);
        Ok(Value::Staged { index, output: 0 })
    }

    #[track_caller]
    pub fn constant(&mut self, tensor: ConstTensor) -> Value {
        let index = self.staged.len() as u32;
        let outputs = [OutputInfo::new(tensor.dtype(), tensor.shape().clone())].into();
        let location = Location::caller();
        self.staged.push(StagedNode { op: Op::Constant(tensor), inputs: SmallVec::new(), outputs, name: None, location });
        Value::Staged { index, output: 0 }
    }

    #[track_caller]
    pub fn binary(&mut self, op: BinaryOp, lhs: impl Into<Value>, rhs: impl Into<Value>) -> Result<Value> {
        self.add(Op::Binary(op), [lhs.into(), rhs.into()])
    }

    #[track_caller]
    pub fn convert(&mut self, src: impl Into<Value>, dtype: DType) -> Result<Value> {
        self.add(Op::Convert { dtype }, [src.into()])
    }

    /// Reshape `src` to the literal `target` pattern.
    #[track_caller]
    pub fn reshape(&mut self, src: impl Into<Value>, target: &[i64]) -> Result<Value> {
        let target = self.constant(ConstTensor::i64_vector(target));
        self.add(Op::Reshape { special_zero: false }, [src.into(), target])
    }

    /// Give a staged node an explicit name.
    pub fn set_name(&mut self, value: Value, name: impl Into<String>) {
        if let Value::Staged { index, .. } = value
            && let Some(node) = self.staged.get_mut(index as usize)
        {
            node.name = Some(name.into());
        }
    }

    pub fn into_staged(self) -> Vec<StagedNode> {
        self.staged
    }
}
