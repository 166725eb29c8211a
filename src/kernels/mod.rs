//! Host reference kernels. They compute in f32 and narrow to the inferred output type.
mod elementwise;
mod matmul;
mod reduce;
mod roialign;

pub use elementwise::{BinaryKernel, UnaryKernel};
pub use matmul::{MatMulAlgo, MatMulKernel};
pub use reduce::ReduceKernel;
pub use roialign::RoiAlignKernel;

use crate::dtype::DType;
use crate::host_tensor::{HostTensor, HostTensorError};
use crate::ops::TensorShape;
use ndarray::ArrayD;
use std::fmt::Debug;

#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error("Kernel `{kernel}` expected {expected} inputs, got {got}")]
    InputCount {
        kernel: String,
        expected: usize,
        got: usize,
    },
    #[error("Kernel `{kernel}`: {detail}")]
    Incompatible { kernel: String, detail: String },
    #[error(transparent)]
    HostTensorError(#[from] HostTensorError),
    #[error(transparent)]
    ShapeError(#[from] ndarray::ShapeError),
}

/// An executable instance of one node's operator.
pub trait Kernel: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Runs the node. `outputs` carries the inferred descriptors the results must match.
    fn execute(&self, inputs: &[&HostTensor], outputs: &[TensorShape]) -> Result<Vec<HostTensor>, KernelError>;
}

pub(crate) fn expect_inputs(kernel: &str, inputs: &[&HostTensor], expected: usize) -> Result<(), KernelError> {
    if inputs.len() != expected {
        return Err(KernelError::InputCount {
            kernel: kernel.to_string(),
            expected,
            got: inputs.len(),
        });
    }
    Ok(())
}

/// Checks a result against its descriptor and narrows it to the descriptor's type.
pub(crate) fn finish(kernel: &str, values: ArrayD<f32>, output: Option<&TensorShape>) -> Result<HostTensor, KernelError> {
    let Some(output) = output else {
        return Ok(HostTensor::F32(values));
    };
    if values.shape() != output.dims.as_slice() {
        return Err(KernelError::Incompatible {
            kernel: kernel.to_string(),
            detail: format!("produced shape {:?}, expected {:?}", values.shape(), output.dims),
        });
    }
    Ok(HostTensor::from_f32(values, output.dtype.unwrap_or(DType::F32))?)
}
