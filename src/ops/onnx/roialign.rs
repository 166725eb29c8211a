use crate::kernels::{Kernel, RoiAlignKernel};
use crate::ops::onnx::binding_failure;
use crate::ops::params::bind;
use crate::ops::{
    InferenceStrategy, KernelCreateContext, OpError, OpParam, Operator, OptKernelOptions, RoiAlignParam, TypePolicy,
};
use crate::oputils;

/// Region-of-interest pooling with bilinear sampling.
///
/// Inputs are the feature map `x` `[N, C, H, W]`, `rois` `[num_rois, 4]` holding
/// `(x1, y1, x2, y2)` boxes and `batch_indices` `[num_rois]`.
#[derive(Clone, Debug)]
pub struct RoiAlignOp {
    param: OpParam,
}

impl RoiAlignOp {
    pub fn new() -> Self {
        Self { param: OpParam::None }
    }
}

impl Default for RoiAlignOp {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for RoiAlignOp {
    fn init(&mut self, _options: &OptKernelOptions) -> Result<InferenceStrategy, OpError> {
        self.param = OpParam::None;
        Ok(InferenceStrategy {
            type_policy: TypePolicy::default(),
            shape_fn: oputils::reshape_roialign,
        })
    }

    fn finalize(&mut self, options: &OptKernelOptions) -> Result<(), OpError> {
        let param = bind::<RoiAlignParam>(options.params)
            .map_err(|e| binding_failure(options.node, e))?
            .ok_or_else(|| binding_failure(options.node, "output_height and output_width are required"))?;
        if param.output_height == 0 || param.output_width == 0 {
            return Err(binding_failure(
                options.node,
                format!("output size {}x{} is empty", param.output_height, param.output_width),
            ));
        }
        if param.spatial_scale.is_nan() || param.spatial_scale <= 0.0 {
            return Err(binding_failure(
                options.node,
                format!("spatial_scale must be positive, got {}", param.spatial_scale),
            ));
        }
        self.param = OpParam::RoiAlign(param);
        Ok(())
    }

    fn param(&self) -> &OpParam {
        &self.param
    }

    fn create_kernel(&self, ctx: &KernelCreateContext) -> Result<Box<dyn Kernel>, OpError> {
        match &self.param {
            OpParam::RoiAlign(p) => Ok(Box::new(RoiAlignKernel::new(ctx.node.name(), p.clone()))),
            _ => Err(binding_failure(ctx.node, "parameters were never bound")),
        }
    }
}
