//! The operator contract.
//!
//! Every op-type implements [`Operator`]. The compiler drives each node's operator through
//! [`OptKernel`], which enforces the `Uninitialized -> Initialized -> Finalized -> KernelCreated`
//! life cycle and runs type and shape inference with the strategy installed during `init`.
mod io_info;
pub mod onnx;
mod params;
mod quant;
mod type_infer;

pub use io_info::{InputOutputInfo, IoRole};
pub use onnx::{
    BinaryOp, MatMulOp, PowOp, ReduceOp, RoiAlignOp, UnaryOp, WhichBinaryOp, WhichReduceOp, WhichUnaryOp,
};
pub use params::{
    CommonParam, CoordinateTransformMode, DataFormat, MatMulParam, OpParam, ReduceParam, RoiAlignMode, RoiAlignParam,
};
pub use quant::{QuantParam, QuantTable};
pub use type_infer::{TypePolicy, TypeRule};

use crate::dtype::DType;
use crate::engines::EngineOptions;
use crate::ir::{Node, NodeId};
use crate::kernels::Kernel;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

#[derive(Debug, thiserror::Error)]
pub enum OpError {
    #[error("Invalid value for node `{node}` input {input}: {detail}")]
    InvalidValue { node: String, input: usize, detail: String },
    #[error("Invalid arity for node `{node}`: {detail}")]
    InvalidArity { node: String, detail: String },
    #[error("Parameter binding failed for node `{node}`: {detail}")]
    ParameterBindingFailure { node: String, detail: String },
    #[error("Node `{node}` is {state}, expected {expected}")]
    InvalidState {
        node: String,
        state: OpState,
        expected: &'static str,
    },
    #[error("Could not determine output type {output} of node `{node}`")]
    UnresolvedType { node: String, output: usize },
}

/// Shape and type descriptor of one edge. `dtype == None` is the UNKNOWN type.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorShape {
    pub dtype: Option<DType>,
    pub dims: Vec<usize>,
    #[serde(default)]
    pub format: DataFormat,
}

impl TensorShape {
    pub fn new(dtype: DType, dims: &[usize]) -> Self {
        Self {
            dtype: Some(dtype),
            dims: dims.to_vec(),
            format: DataFormat::default(),
        }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn element_count(&self) -> usize {
        self.dims.iter().product()
    }

    /// Storage size in bytes, `None` while the type is unknown.
    pub fn byte_len(&self) -> Option<usize> {
        self.dtype.map(|d| d.size() * self.element_count())
    }
}

/// Computes the output dims of a node from its bound inputs and its parameters.
pub type ShapeFn = fn(&InputOutputInfo<'_, TensorShape>, &OpParam) -> Result<Vec<Vec<usize>>, OpError>;

/// The pluggable part of an operator's inference, installed by [`Operator::init`].
#[derive(Clone, Debug)]
pub struct InferenceStrategy {
    pub type_policy: TypePolicy,
    pub shape_fn: ShapeFn,
}

/// What an operator sees while initializing and binding its parameters.
pub struct OptKernelOptions<'a> {
    pub node: &'a Node,
    pub engine_options: &'a EngineOptions,
    pub params: Option<&'a serde_json::Value>,
    pub common_param: Option<&'a CommonParam>,
}

pub struct KernelCreateContext<'a> {
    pub node: &'a Node,
    pub engine_options: &'a EngineOptions,
    pub input_shapes: &'a [TensorShape],
    pub output_shapes: &'a [TensorShape],
}

pub trait Operator: Debug + Send + Sync {
    /// Installs default parameter values and returns the inference strategy.
    fn init(&mut self, options: &OptKernelOptions) -> Result<InferenceStrategy, OpError>;

    /// Binds the raw parameter block.
    fn finalize(&mut self, options: &OptKernelOptions) -> Result<(), OpError>;

    fn param(&self) -> &OpParam;

    fn create_kernel(&self, ctx: &KernelCreateContext) -> Result<Box<dyn Kernel>, OpError>;

    /// Produces an owned deep copy of the parameters, or refreshes an existing one in place.
    fn copy_param(&self, dst: &mut Option<OpParam>) {
        match dst {
            Some(existing) => existing.clone_from(self.param()),
            None => *dst = Some(self.param().clone()),
        }
    }
}

#[derive(Clone, Debug, strum_macros::VariantNames)]
pub enum AnyOperator {
    Binary(BinaryOp),
    Pow(PowOp),
    MatMul(MatMulOp),
    Unary(UnaryOp),
    Reduce(ReduceOp),
    RoiAlign(RoiAlignOp),
}

macro_rules! delegate {
    (mut $name:ident($($arg:ident: $ty:ty),*) -> $ret:ty) => {
        fn $name(&mut self, $($arg: $ty),*) -> $ret {
            match self {
                AnyOperator::Binary(x) => x.$name($($arg),*),
                AnyOperator::Pow(x) => x.$name($($arg),*),
                AnyOperator::MatMul(x) => x.$name($($arg),*),
                AnyOperator::Unary(x) => x.$name($($arg),*),
                AnyOperator::Reduce(x) => x.$name($($arg),*),
                AnyOperator::RoiAlign(x) => x.$name($($arg),*),
            }
        }
    };
    ($name:ident($($arg:ident: $ty:ty),*) -> $ret:ty) => {
        fn $name(&self, $($arg: $ty),*) -> $ret {
            match self {
                AnyOperator::Binary(x) => x.$name($($arg),*),
                AnyOperator::Pow(x) => x.$name($($arg),*),
                AnyOperator::MatMul(x) => x.$name($($arg),*),
                AnyOperator::Unary(x) => x.$name($($arg),*),
                AnyOperator::Reduce(x) => x.$name($($arg),*),
                AnyOperator::RoiAlign(x) => x.$name($($arg),*),
            }
        }
    };
}

impl Operator for AnyOperator {
    delegate!(mut init(options: &OptKernelOptions) -> Result<InferenceStrategy, OpError>);
    delegate!(mut finalize(options: &OptKernelOptions) -> Result<(), OpError>);
    delegate!(param() -> &OpParam);
    delegate!(create_kernel(ctx: &KernelCreateContext) -> Result<Box<dyn Kernel>, OpError>);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum_macros::Display)]
pub enum OpState {
    Uninitialized,
    Initialized,
    Finalized,
    KernelCreated,
}

/// One node's operator together with its life-cycle state and inference strategy.
#[derive(Debug)]
pub struct OptKernel {
    node: NodeId,
    name: String,
    op: AnyOperator,
    state: OpState,
    strategy: Option<InferenceStrategy>,
    output_formats: Vec<DataFormat>,
}

impl OptKernel {
    pub fn new(node: &Node, op: AnyOperator) -> Self {
        Self {
            node: node.id(),
            name: node.name().to_string(),
            op,
            state: OpState::Uninitialized,
            strategy: None,
            output_formats: Vec::new(),
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node
    }

    pub fn state(&self) -> OpState {
        self.state
    }

    pub fn operator(&self) -> &AnyOperator {
        &self.op
    }

    fn wrong_state(&self, expected: &'static str) -> OpError {
        log::error!("node `{}` is {}, expected {}", self.name, self.state, expected);
        OpError::InvalidState {
            node: self.name.clone(),
            state: self.state,
            expected,
        }
    }

    pub fn init(&mut self, options: &OptKernelOptions) -> Result<(), OpError> {
        if self.state != OpState::Uninitialized {
            return Err(self.wrong_state("Uninitialized"));
        }
        let strategy = self.op.init(options)?;
        self.strategy = Some(strategy);
        self.state = OpState::Initialized;
        Ok(())
    }

    pub fn finalize(&mut self, options: &OptKernelOptions) -> Result<(), OpError> {
        if self.state != OpState::Initialized {
            return Err(self.wrong_state("Initialized"));
        }
        if let Some(common) = options.common_param {
            if !common.output_formats.is_empty() && common.output_formats.len() != options.node.output_count() {
                let detail = format!(
                    "{} output formats given for {} outputs",
                    common.output_formats.len(),
                    options.node.output_count()
                );
                log::error!("node `{}`: {}", self.name, detail);
                return Err(OpError::ParameterBindingFailure {
                    node: self.name.clone(),
                    detail,
                });
            }
            self.output_formats = common.output_formats.clone();
        }
        self.op.finalize(options)?;
        self.state = OpState::Finalized;
        Ok(())
    }

    fn strategy(&self) -> Result<&InferenceStrategy, OpError> {
        match (&self.strategy, self.state) {
            (Some(strategy), OpState::Finalized | OpState::KernelCreated) => Ok(strategy),
            _ => Err(self.wrong_state("Finalized")),
        }
    }

    /// Output types under the installed type policy. `requested == None` is the UNKNOWN request.
    pub fn infer_type(
        &self,
        info: &InputOutputInfo<'_, TensorShape>,
        requested: Option<DType>,
        quant: &QuantTable,
    ) -> Result<Vec<Option<DType>>, OpError> {
        Ok(self.strategy()?.type_policy.infer(info, requested, quant))
    }

    pub fn infer_shape(&self, info: &InputOutputInfo<'_, TensorShape>) -> Result<Vec<Vec<usize>>, OpError> {
        let strategy = self.strategy()?;
        let dims = (strategy.shape_fn)(info, self.op.param())?;
        if dims.len() != info.output_count() {
            return Err(OpError::InvalidArity {
                node: self.name.clone(),
                detail: format!("shape rule produced {} outputs, node has {}", dims.len(), info.output_count()),
            });
        }
        Ok(dims)
    }

    /// Type and shape inference combined into full descriptors. Nothing is written back on
    /// failure; the caller stores the returned descriptors.
    pub fn infer(
        &self,
        info: &InputOutputInfo<'_, TensorShape>,
        requested: Option<DType>,
        quant: &QuantTable,
    ) -> Result<Vec<TensorShape>, OpError> {
        let dims = self.infer_shape(info)?;
        let types = self.infer_type(info, requested, quant)?;
        dims.into_iter()
            .zip(types)
            .enumerate()
            .map(|(i, (dims, dtype))| {
                let dtype = dtype.ok_or_else(|| OpError::UnresolvedType {
                    node: self.name.clone(),
                    output: i,
                })?;
                Ok(TensorShape {
                    dtype: Some(dtype),
                    dims,
                    format: self.output_formats.get(i).copied().unwrap_or_default(),
                })
            })
            .collect()
    }

    pub fn create_kernel(&mut self, ctx: &KernelCreateContext) -> Result<Box<dyn Kernel>, OpError> {
        if self.state != OpState::Finalized {
            return Err(self.wrong_state("Finalized"));
        }
        let kernel = self.op.create_kernel(ctx)?;
        self.state = OpState::KernelCreated;
        Ok(kernel)
    }

    pub fn copy_param(&self, dst: &mut Option<OpParam>) {
        self.op.copy_param(dst)
    }
}
