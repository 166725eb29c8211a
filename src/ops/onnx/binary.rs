use crate::kernels::{BinaryKernel, Kernel};
use crate::ops::onnx::expect_no_params;
use crate::ops::{
    InferenceStrategy, KernelCreateContext, OpError, OpParam, Operator, OptKernelOptions, TypePolicy, TypeRule,
};
use crate::oputils;

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum_macros::Display, strum_macros::EnumString)]
pub enum WhichBinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl WhichBinaryOp {
    fn func(&self) -> fn(f32, f32) -> f32 {
        match self {
            WhichBinaryOp::Add => |a, b| a + b,
            WhichBinaryOp::Sub => |a, b| a - b,
            WhichBinaryOp::Mul => |a, b| a * b,
            WhichBinaryOp::Div => |a, b| a / b,
        }
    }
}

/// Element-wise arithmetic with multidirectional broadcasting.
#[derive(Clone, Debug)]
pub struct BinaryOp {
    which: WhichBinaryOp,
    param: OpParam,
}

impl BinaryOp {
    pub fn new(which: WhichBinaryOp) -> Self {
        Self {
            which,
            param: OpParam::None,
        }
    }

    pub fn which(&self) -> WhichBinaryOp {
        self.which
    }
}

impl Operator for BinaryOp {
    fn init(&mut self, _options: &OptKernelOptions) -> Result<InferenceStrategy, OpError> {
        self.param = OpParam::None;
        Ok(InferenceStrategy {
            type_policy: TypePolicy::default(),
            shape_fn: oputils::reshape_broadcast,
        })
    }

    fn finalize(&mut self, options: &OptKernelOptions) -> Result<(), OpError> {
        expect_no_params(options.node, options.params)
    }

    fn param(&self) -> &OpParam {
        &self.param
    }

    fn create_kernel(&self, ctx: &KernelCreateContext) -> Result<Box<dyn Kernel>, OpError> {
        Ok(Box::new(BinaryKernel::new(ctx.node.name(), self.which.func())))
    }
}

/// `a ^ b` with broadcasting. Half-precision bases are computed and stored as F32.
#[derive(Clone, Debug)]
pub struct PowOp {
    param: OpParam,
}

impl PowOp {
    pub fn new() -> Self {
        Self { param: OpParam::None }
    }
}

impl Default for PowOp {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for PowOp {
    fn init(&mut self, _options: &OptKernelOptions) -> Result<InferenceStrategy, OpError> {
        self.param = OpParam::None;
        Ok(InferenceStrategy {
            type_policy: TypePolicy::new(&[TypeRule::PromoteHalfToFloat]),
            shape_fn: oputils::reshape_broadcast,
        })
    }

    fn finalize(&mut self, options: &OptKernelOptions) -> Result<(), OpError> {
        expect_no_params(options.node, options.params)
    }

    fn param(&self) -> &OpParam {
        &self.param
    }

    fn create_kernel(&self, ctx: &KernelCreateContext) -> Result<Box<dyn Kernel>, OpError> {
        Ok(Box::new(BinaryKernel::new(ctx.node.name(), f32::powf)))
    }
}
