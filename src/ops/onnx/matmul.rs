use crate::kernels::{Kernel, MatMulKernel};
use crate::ops::onnx::binding_failure;
use crate::ops::params::bind;
use crate::ops::{
    InferenceStrategy, KernelCreateContext, MatMulParam, OpError, OpParam, Operator, OptKernelOptions, TypePolicy,
    TypeRule,
};
use crate::oputils;

/// Matrix product with numpy-style batch broadcasting, optional transposition of the operands
/// and a scalar `alpha`.
#[derive(Clone, Debug)]
pub struct MatMulOp {
    force_half: bool,
    param: OpParam,
}

impl MatMulOp {
    pub fn new() -> Self {
        Self {
            force_half: false,
            param: OpParam::None,
        }
    }

    /// Variant whose outputs are always F16, used by engines that run matmuls in half precision.
    pub fn half_precision() -> Self {
        Self {
            force_half: true,
            param: OpParam::None,
        }
    }

    fn matmul_param(&self) -> MatMulParam {
        match &self.param {
            OpParam::MatMul(p) => p.clone(),
            _ => MatMulParam::default(),
        }
    }
}

impl Default for MatMulOp {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for MatMulOp {
    fn init(&mut self, _options: &OptKernelOptions) -> Result<InferenceStrategy, OpError> {
        self.param = OpParam::MatMul(MatMulParam::default());
        let rules: &[TypeRule] = if self.force_half { &[TypeRule::ForceHalf] } else { &[] };
        Ok(InferenceStrategy {
            type_policy: TypePolicy::new(rules),
            shape_fn: oputils::reshape_matmul,
        })
    }

    fn finalize(&mut self, options: &OptKernelOptions) -> Result<(), OpError> {
        let bound = bind::<MatMulParam>(options.params).map_err(|e| binding_failure(options.node, e))?;
        if let Some(param) = bound {
            if !param.alpha.is_finite() {
                return Err(binding_failure(options.node, format!("alpha must be finite, got {}", param.alpha)));
            }
            self.param = OpParam::MatMul(param);
        }
        Ok(())
    }

    fn param(&self) -> &OpParam {
        &self.param
    }

    fn create_kernel(&self, ctx: &KernelCreateContext) -> Result<Box<dyn Kernel>, OpError> {
        let options = ctx.engine_options;
        log::debug!(
            "matmul kernel for `{}`: winograd {}, tuning {}",
            ctx.node.name(),
            options.winograd_level,
            options.dynamic_tuning_level
        );
        Ok(Box::new(MatMulKernel::new(
            ctx.node.name(),
            self.matmul_param(),
            options.winograd_level,
            options.dynamic_tuning_level,
        )))
    }
}
