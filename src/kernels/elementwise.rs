use crate::host_tensor::HostTensor;
use crate::kernels::{expect_inputs, finish, Kernel, KernelError};
use crate::ops::TensorShape;
use crate::oputils::broadcast_dims;
use ndarray::{IxDyn, Zip};

#[derive(Debug)]
pub struct BinaryKernel {
    name: String,
    func: fn(f32, f32) -> f32,
}

impl BinaryKernel {
    pub fn new(name: &str, func: fn(f32, f32) -> f32) -> Self {
        Self {
            name: name.to_string(),
            func,
        }
    }
}

impl Kernel for BinaryKernel {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, inputs: &[&HostTensor], outputs: &[TensorShape]) -> Result<Vec<HostTensor>, KernelError> {
        expect_inputs(&self.name, inputs, 2)?;
        let a = inputs[0].to_f32();
        let b = inputs[1].to_f32();
        let incompatible = || KernelError::Incompatible {
            kernel: self.name.clone(),
            detail: format!("cannot broadcast {:?} with {:?}", a.shape(), b.shape()),
        };
        let dims = broadcast_dims(a.shape(), b.shape()).ok_or_else(incompatible)?;
        let av = a.broadcast(IxDyn(&dims)).ok_or_else(incompatible)?;
        let bv = b.broadcast(IxDyn(&dims)).ok_or_else(incompatible)?;
        let f = self.func;
        let res = Zip::from(&av).and(&bv).map_collect(|x, y| f(*x, *y));
        Ok(vec![finish(&self.name, res, outputs.first())?])
    }
}

#[derive(Debug)]
pub struct UnaryKernel {
    name: String,
    func: fn(f32) -> f32,
}

impl UnaryKernel {
    pub fn new(name: &str, func: fn(f32) -> f32) -> Self {
        Self {
            name: name.to_string(),
            func,
        }
    }
}

impl Kernel for UnaryKernel {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, inputs: &[&HostTensor], outputs: &[TensorShape]) -> Result<Vec<HostTensor>, KernelError> {
        expect_inputs(&self.name, inputs, 1)?;
        let res = inputs[0].to_f32().mapv(self.func);
        Ok(vec![finish(&self.name, res, outputs.first())?])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DType;

    #[test]
    fn binary_broadcasts_and_narrows() {
        let kernel = BinaryKernel::new("add", |a, b| a + b);
        let a = HostTensor::from_vec_shape(vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]).unwrap();
        let b = HostTensor::from_vec_shape(vec![10.0f32, 20.0, 30.0], vec![3]).unwrap();
        let out = kernel
            .execute(&[&a, &b], &[TensorShape::new(DType::F16, &[2, 3])])
            .unwrap();
        assert_eq!(out[0].dtype(), DType::F16);
        assert_eq!(out[0].to_f32().as_slice().unwrap(), &[11.0, 22.0, 33.0, 14.0, 25.0, 36.0]);
    }

    #[test]
    fn binary_rejects_mismatched_shapes() {
        let kernel = BinaryKernel::new("add", |a, b| a + b);
        let a = HostTensor::from_vec_shape(vec![1.0f32, 2.0], vec![2]).unwrap();
        let b = HostTensor::from_vec_shape(vec![1.0f32, 2.0, 3.0], vec![3]).unwrap();
        assert!(matches!(
            kernel.execute(&[&a, &b], &[]),
            Err(KernelError::Incompatible { .. })
        ));
    }
}
