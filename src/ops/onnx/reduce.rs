use crate::kernels::{Kernel, ReduceKernel};
use crate::ops::onnx::binding_failure;
use crate::ops::params::bind;
use crate::ops::{
    InferenceStrategy, KernelCreateContext, OpError, OpParam, Operator, OptKernelOptions, ReduceParam, TypePolicy,
    TypeRule,
};
use crate::oputils;
use std::collections::HashSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum_macros::Display, strum_macros::EnumString)]
pub enum WhichReduceOp {
    ReduceL2,
    ReduceSum,
    ReduceMean,
}

#[derive(Clone, Debug)]
pub struct ReduceOp {
    which: WhichReduceOp,
    param: OpParam,
}

impl ReduceOp {
    pub fn new(which: WhichReduceOp) -> Self {
        Self {
            which,
            param: OpParam::None,
        }
    }

    pub fn which(&self) -> WhichReduceOp {
        self.which
    }
}

impl Operator for ReduceOp {
    fn init(&mut self, _options: &OptKernelOptions) -> Result<InferenceStrategy, OpError> {
        self.param = OpParam::Reduce(ReduceParam::default());
        Ok(InferenceStrategy {
            type_policy: TypePolicy::new(&[TypeRule::PromoteHalfToFloat]),
            shape_fn: oputils::reshape_reduce,
        })
    }

    fn finalize(&mut self, options: &OptKernelOptions) -> Result<(), OpError> {
        let bound = bind::<ReduceParam>(options.params).map_err(|e| binding_failure(options.node, e))?;
        if let Some(param) = bound {
            let mut seen = HashSet::new();
            if let Some(dup) = param.axes.iter().find(|a| !seen.insert(**a)) {
                return Err(binding_failure(options.node, format!("axis {dup} listed more than once")));
            }
            self.param = OpParam::Reduce(param);
        }
        Ok(())
    }

    fn param(&self) -> &OpParam {
        &self.param
    }

    fn create_kernel(&self, ctx: &KernelCreateContext) -> Result<Box<dyn Kernel>, OpError> {
        let param = match &self.param {
            OpParam::Reduce(p) => p.clone(),
            _ => ReduceParam::default(),
        };
        Ok(Box::new(ReduceKernel::new(ctx.node.name(), self.which, param)))
    }
}
