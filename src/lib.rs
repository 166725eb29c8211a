//! Host inference runtime for computation graphs.
//!
//! A [`Graph`] is built from node and edge names ([`GraphBuilder`], [`ModelDef`]), compiled for
//! an [`Engine`] by the [`Compiler`] and executed by a [`Runtime`]:
//!
//! ```no_run
//! # use nnrt::*;
//! # use std::collections::HashMap;
//! # fn main() -> Result<(), Error> {
//! let mut builder = GraphBuilder::new();
//! builder.add_node("relu", OpKind::new("", "Relu", 13), &["x"], &["y"]);
//! let graph = builder.finalize()?;
//!
//! let engine = Engine::embedded(EngineOptions::default())?;
//! let shapes = HashMap::from([("x".to_string(), TensorShape::new(DType::F32, &[2, 2]))]);
//! let compiled = Compiler::new(&engine).compile(graph, &shapes)?;
//!
//! let mut runtime = Runtime::new(compiled);
//! let x = HostTensor::from_vec_shape(vec![-1.0f32, 2.0, -3.0, 4.0], vec![2, 2])?;
//! let outputs = runtime.run(HashMap::from([("x".to_string(), x)]))?;
//! # Ok(())
//! # }
//! ```
pub mod compiler;
pub mod dtype;
pub mod engines;
pub mod graph;
pub mod host_tensor;
pub mod ir;
pub mod kernels;
pub mod memory;
pub mod ops;
pub mod optimizer;
pub mod oputils;
pub mod runtime;

pub use compiler::{CompiledGraph, Compiler, CompilerError};
pub use dtype::DType;
pub use engines::{DispatchError, Engine, EngineKind, EngineOptions, OptionsError};
pub use host_tensor::{HostTensor, HostTensorError};
pub use ir::{Graph, GraphBuilder, GraphError, ModelDef, OpKind};
pub use kernels::KernelError;
pub use memory::{MemoryError, MemoryPlan, MemoryPlanner};
pub use ops::{OpError, TensorShape};
pub use runtime::{Runtime, RuntimeError};

/// Coarse classification of every error the crate reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum ErrorKind {
    InvalidGraph,
    CyclicGraph,
    InvalidValue,
    UnsupportedOperator,
    ParameterBindingFailure,
    AllocationFailure,
    InvalidState,
    InvalidOption,
    Kernel,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    GraphError(#[from] GraphError),
    #[error(transparent)]
    OpError(#[from] OpError),
    #[error(transparent)]
    DispatchError(#[from] DispatchError),
    #[error(transparent)]
    MemoryError(#[from] MemoryError),
    #[error(transparent)]
    OptionsError(#[from] OptionsError),
    #[error(transparent)]
    KernelError(#[from] KernelError),
    #[error(transparent)]
    HostTensorError(#[from] HostTensorError),
    #[error(transparent)]
    CompilerError(#[from] CompilerError),
    #[error(transparent)]
    RuntimeError(#[from] RuntimeError),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::GraphError(e) => e.kind(),
            Error::OpError(e) => e.kind(),
            Error::DispatchError(_) => ErrorKind::UnsupportedOperator,
            Error::MemoryError(_) => ErrorKind::AllocationFailure,
            Error::OptionsError(_) => ErrorKind::InvalidOption,
            Error::KernelError(_) => ErrorKind::Kernel,
            Error::HostTensorError(_) => ErrorKind::InvalidValue,
            Error::CompilerError(e) => e.kind(),
            Error::RuntimeError(e) => e.kind(),
        }
    }
}

impl GraphError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GraphError::CyclicGraph { .. } => ErrorKind::CyclicGraph,
            _ => ErrorKind::InvalidGraph,
        }
    }
}

impl OpError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OpError::ParameterBindingFailure { .. } => ErrorKind::ParameterBindingFailure,
            OpError::InvalidState { .. } => ErrorKind::InvalidState,
            _ => ErrorKind::InvalidValue,
        }
    }
}

impl CompilerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CompilerError::GraphError(e) => e.kind(),
            CompilerError::OpError(e) => e.kind(),
            CompilerError::DispatchError(_) => ErrorKind::UnsupportedOperator,
            CompilerError::MemoryError(_) => ErrorKind::AllocationFailure,
            CompilerError::KernelError(_) => ErrorKind::Kernel,
            CompilerError::MissingInputShape(_) | CompilerError::UntypedInput(_) => ErrorKind::InvalidValue,
        }
    }
}

impl RuntimeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RuntimeError::MissingInput(_) | RuntimeError::HostTensorError(_) => ErrorKind::InvalidValue,
            RuntimeError::CompilerError(e) => e.kind(),
            RuntimeError::Unbound(_) | RuntimeError::OutputCount { .. } | RuntimeError::KernelError(_) => {
                ErrorKind::Kernel
            }
        }
    }
}
