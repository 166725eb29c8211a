//! Reference operators of the default ONNX domain.
mod binary;
mod matmul;
mod reduce;
mod roialign;
mod unary;

pub use binary::{BinaryOp, PowOp, WhichBinaryOp};
pub use matmul::MatMulOp;
pub use reduce::{ReduceOp, WhichReduceOp};
pub use roialign::RoiAlignOp;
pub use unary::{UnaryOp, WhichUnaryOp};

use crate::ir::Node;
use crate::ops::OpError;

fn binding_failure(node: &Node, detail: impl Into<String>) -> OpError {
    let detail = detail.into();
    log::error!("binding parameters of node `{}` ({}) failed: {}", node.name(), node.kind(), detail);
    OpError::ParameterBindingFailure {
        node: node.name().to_string(),
        detail,
    }
}

/// Operators without parameters accept an absent, null or empty block only.
fn expect_no_params(node: &Node, raw: Option<&serde_json::Value>) -> Result<(), OpError> {
    match raw {
        None | Some(serde_json::Value::Null) => Ok(()),
        Some(serde_json::Value::Object(map)) if map.is_empty() => Ok(()),
        Some(other) => Err(binding_failure(node, format!("takes no parameters, got {other}"))),
    }
}
