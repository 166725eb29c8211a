//! Shape rules shared by the operators. Every rule validates its inputs completely and returns
//! the output dims; nothing is written on failure.
mod broadcast;
mod matmul;
mod reduce;
mod roialign;

pub use broadcast::{broadcast_dims, reshape_broadcast, reshape_same_as_input};
pub use matmul::reshape_matmul;
pub use reduce::{normalize_axes, reduced_dims, reshape_reduce};
pub use roialign::reshape_roialign;

use crate::ops::{InputOutputInfo, OpError, TensorShape};

pub(crate) fn invalid_value(info: &InputOutputInfo<'_, TensorShape>, input: usize, detail: String) -> OpError {
    let node = info.node();
    log::error!("node `{}` ({}) input {}: {}", node.name(), node.kind(), input, detail);
    OpError::InvalidValue {
        node: node.name().to_string(),
        input,
        detail,
    }
}

pub(crate) fn check_arity(
    info: &InputOutputInfo<'_, TensorShape>,
    inputs: usize,
    outputs: usize,
) -> Result<(), OpError> {
    if info.input_count() != inputs || info.output_count() != outputs {
        return Err(invalid_value(
            info,
            info.input_count(),
            format!(
                "expected {} inputs and {} outputs, got {} and {}",
                inputs,
                outputs,
                info.input_count(),
                info.output_count()
            ),
        ));
    }
    Ok(())
}

pub(crate) fn input_shape<'a>(info: &InputOutputInfo<'a, TensorShape>, idx: usize) -> Result<&'a TensorShape, OpError> {
    info.input(idx)
        .ok_or_else(|| invalid_value(info, idx, "no shape is bound to this input".to_string()))
}
