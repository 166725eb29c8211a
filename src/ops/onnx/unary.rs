use crate::kernels::{Kernel, UnaryKernel};
use crate::ops::onnx::expect_no_params;
use crate::ops::{InferenceStrategy, KernelCreateContext, OpError, OpParam, Operator, OptKernelOptions, TypePolicy};
use crate::oputils;

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum_macros::Display, strum_macros::EnumString)]
pub enum WhichUnaryOp {
    Relu,
    Identity,
}

#[derive(Clone, Debug)]
pub struct UnaryOp {
    which: WhichUnaryOp,
    param: OpParam,
}

impl UnaryOp {
    pub fn new(which: WhichUnaryOp) -> Self {
        Self {
            which,
            param: OpParam::None,
        }
    }

    pub fn which(&self) -> WhichUnaryOp {
        self.which
    }
}

impl Operator for UnaryOp {
    fn init(&mut self, _options: &OptKernelOptions) -> Result<InferenceStrategy, OpError> {
        self.param = OpParam::None;
        Ok(InferenceStrategy {
            type_policy: TypePolicy::default(),
            shape_fn: oputils::reshape_same_as_input,
        })
    }

    fn finalize(&mut self, options: &OptKernelOptions) -> Result<(), OpError> {
        expect_no_params(options.node, options.params)
    }

    fn param(&self) -> &OpParam {
        &self.param
    }

    fn create_kernel(&self, ctx: &KernelCreateContext) -> Result<Box<dyn Kernel>, OpError> {
        let f: fn(f32) -> f32 = match self.which {
            WhichUnaryOp::Relu => |x| x.max(0.0),
            WhichUnaryOp::Identity => |x| x,
        };
        Ok(Box::new(UnaryKernel::new(ctx.node.name(), f)))
    }
}
