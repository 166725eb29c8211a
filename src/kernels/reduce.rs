use crate::host_tensor::HostTensor;
use crate::kernels::{expect_inputs, finish, Kernel, KernelError};
use crate::ops::{ReduceParam, TensorShape, WhichReduceOp};
use crate::oputils::{normalize_axes, reduced_dims};
use ndarray::{Axis, IxDyn};

#[derive(Debug)]
pub struct ReduceKernel {
    name: String,
    which: WhichReduceOp,
    param: ReduceParam,
}

impl ReduceKernel {
    pub fn new(name: &str, which: WhichReduceOp, param: ReduceParam) -> Self {
        Self {
            name: name.to_string(),
            which,
            param,
        }
    }
}

impl Kernel for ReduceKernel {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, inputs: &[&HostTensor], outputs: &[TensorShape]) -> Result<Vec<HostTensor>, KernelError> {
        expect_inputs(&self.name, inputs, 1)?;
        let x = inputs[0].to_f32();
        let axes = normalize_axes(&self.param.axes, x.ndim()).map_err(|detail| KernelError::Incompatible {
            kernel: self.name.clone(),
            detail,
        })?;
        let count: usize = axes.iter().map(|a| x.shape()[*a]).product();
        let dims = reduced_dims(x.shape(), &axes, self.param.keepdims);

        let mut acc = match self.which {
            WhichReduceOp::ReduceL2 => x.mapv(|v| v * v),
            _ => x,
        };
        for axis in axes.iter().rev() {
            acc = acc.sum_axis(Axis(*axis));
        }
        match self.which {
            WhichReduceOp::ReduceL2 => acc.mapv_inplace(f32::sqrt),
            WhichReduceOp::ReduceMean => {
                let count = count.max(1) as f32;
                acc.mapv_inplace(|v| v / count)
            }
            WhichReduceOp::ReduceSum => {}
        }
        let res = acc.into_shape_with_order(IxDyn(&dims))?;
        Ok(vec![finish(&self.name, res, outputs.first())?])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduces_selected_axes() {
        let x = HostTensor::from_vec_shape(vec![3.0f32, 4.0, 1.0, 1.0, 1.0, 1.0], vec![2, 3]).unwrap();
        let param = ReduceParam {
            axes: vec![-1],
            keepdims: true,
        };
        let sum = ReduceKernel::new("s", WhichReduceOp::ReduceSum, param.clone())
            .execute(&[&x], &[])
            .unwrap();
        assert_eq!(sum[0].shape(), &[2, 1]);
        assert_eq!(sum[0].to_f32().as_slice().unwrap(), &[8.0, 3.0]);

        let mean = ReduceKernel::new("m", WhichReduceOp::ReduceMean, ReduceParam::default())
            .execute(&[&x], &[])
            .unwrap();
        assert_eq!(mean[0].shape(), &[1, 1]);
        assert!((mean[0].to_f32()[[0, 0]] - 11.0 / 6.0).abs() < 1e-6);

        let param = ReduceParam {
            axes: vec![1],
            keepdims: false,
        };
        let l2 = ReduceKernel::new("l2", WhichReduceOp::ReduceL2, param)
            .execute(&[&x], &[])
            .unwrap();
        assert_eq!(l2[0].shape(), &[2]);
        let l2 = l2[0].to_f32();
        assert!((l2[[0]] - 26f32.sqrt()).abs() < 1e-6);
        assert!((l2[[1]] - 3f32.sqrt()).abs() < 1e-6);
    }
}
