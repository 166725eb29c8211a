use crate::dtype::{DType, DTypeOfPrimitive};
use half::f16;
use ndarray::{ArrayD, IxDyn};

#[derive(Debug, thiserror::Error)]
pub enum HostTensorError {
    #[error("Unsupported dtype for host tensors: {0}")]
    UnsupportedDType(DType),
    #[error("Unexpected dtype: expected {0}, got {1}")]
    UnexpectedDType(DType, DType),
    #[error(transparent)]
    ShapeError(#[from] ndarray::ShapeError),
    #[error("Storage too small: need {needed} bytes, have {available}")]
    StorageTooSmall { needed: usize, available: usize },
}

/// Dense host-side tensor used for constants, graph inputs/outputs and kernel I/O.
#[derive(Clone, Debug, PartialEq)]
pub enum HostTensor {
    F32(ArrayD<f32>),
    F16(ArrayD<f16>),
    I64(ArrayD<i64>),
    I8(ArrayD<i8>),
    U8(ArrayD<u8>),
}

pub trait HostElement: DTypeOfPrimitive + bytemuck::Pod {
    fn wrap(array: ArrayD<Self>) -> HostTensor;
    fn peek(tensor: &HostTensor) -> Option<&ArrayD<Self>>;
}

impl HostElement for f32 {
    fn wrap(array: ArrayD<Self>) -> HostTensor {
        HostTensor::F32(array)
    }
    fn peek(tensor: &HostTensor) -> Option<&ArrayD<Self>> {
        match tensor {
            HostTensor::F32(x) => Some(x),
            _ => None,
        }
    }
}

impl HostElement for f16 {
    fn wrap(array: ArrayD<Self>) -> HostTensor {
        HostTensor::F16(array)
    }
    fn peek(tensor: &HostTensor) -> Option<&ArrayD<Self>> {
        match tensor {
            HostTensor::F16(x) => Some(x),
            _ => None,
        }
    }
}

impl HostElement for i64 {
    fn wrap(array: ArrayD<Self>) -> HostTensor {
        HostTensor::I64(array)
    }
    fn peek(tensor: &HostTensor) -> Option<&ArrayD<Self>> {
        match tensor {
            HostTensor::I64(x) => Some(x),
            _ => None,
        }
    }
}

impl HostElement for i8 {
    fn wrap(array: ArrayD<Self>) -> HostTensor {
        HostTensor::I8(array)
    }
    fn peek(tensor: &HostTensor) -> Option<&ArrayD<Self>> {
        match tensor {
            HostTensor::I8(x) => Some(x),
            _ => None,
        }
    }
}

impl HostElement for u8 {
    fn wrap(array: ArrayD<Self>) -> HostTensor {
        HostTensor::U8(array)
    }
    fn peek(tensor: &HostTensor) -> Option<&ArrayD<Self>> {
        match tensor {
            HostTensor::U8(x) => Some(x),
            _ => None,
        }
    }
}

fn store<T: bytemuck::Pod>(array: &ArrayD<T>, storage: &mut [u64]) -> Result<(), HostTensorError> {
    let needed = array.len() * size_of::<T>();
    let available = storage.len() * size_of::<u64>();
    if needed > available {
        return Err(HostTensorError::StorageTooSmall { needed, available });
    }
    let dst: &mut [T] = bytemuck::cast_slice_mut(storage);
    for (d, s) in dst.iter_mut().zip(array.iter()) {
        *d = *s;
    }
    Ok(())
}

fn load<T: bytemuck::Pod>(storage: &[u64], shape: &[usize]) -> Result<ArrayD<T>, HostTensorError> {
    let len: usize = shape.iter().product();
    let needed = len * size_of::<T>();
    let available = storage.len() * size_of::<u64>();
    if needed > available {
        return Err(HostTensorError::StorageTooSmall { needed, available });
    }
    let src: &[T] = bytemuck::cast_slice(storage);
    Ok(ArrayD::from_shape_vec(IxDyn(shape), src[..len].to_vec())?)
}

impl HostTensor {
    pub fn from_vec_shape<T: HostElement>(data: Vec<T>, shape: Vec<usize>) -> Result<Self, HostTensorError> {
        Ok(T::wrap(ArrayD::from_shape_vec(IxDyn(&shape), data)?))
    }

    pub fn zeros(dtype: DType, shape: &[usize]) -> Result<Self, HostTensorError> {
        Ok(match dtype {
            DType::F32 => HostTensor::F32(ArrayD::zeros(IxDyn(shape))),
            DType::F16 => HostTensor::F16(ArrayD::from_elem(IxDyn(shape), f16::ZERO)),
            DType::I64 => HostTensor::I64(ArrayD::zeros(IxDyn(shape))),
            DType::I8 => HostTensor::I8(ArrayD::zeros(IxDyn(shape))),
            DType::U8 => HostTensor::U8(ArrayD::zeros(IxDyn(shape))),
            x => Err(HostTensorError::UnsupportedDType(x))?,
        })
    }

    pub fn dtype(&self) -> DType {
        match self {
            HostTensor::F32(_) => DType::F32,
            HostTensor::F16(_) => DType::F16,
            HostTensor::I64(_) => DType::I64,
            HostTensor::I8(_) => DType::I8,
            HostTensor::U8(_) => DType::U8,
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            HostTensor::F32(x) => x.shape(),
            HostTensor::F16(x) => x.shape(),
            HostTensor::I64(x) => x.shape(),
            HostTensor::I8(x) => x.shape(),
            HostTensor::U8(x) => x.shape(),
        }
    }

    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn byte_len(&self) -> usize {
        self.len() * self.dtype().size()
    }

    /// Widens to f32; the reference kernels compute in f32 and narrow on output. Quantized
    /// tensors are widened by value, see [`crate::ops::QuantParam::dequantize`] for the scaled form.
    pub fn to_f32(&self) -> ArrayD<f32> {
        match self {
            HostTensor::F32(x) => x.clone(),
            HostTensor::F16(x) => x.mapv(|v| v.to_f32()),
            HostTensor::I64(x) => x.mapv(|v| v as f32),
            HostTensor::I8(x) => x.mapv(|v| v as f32),
            HostTensor::U8(x) => x.mapv(|v| v as f32),
        }
    }

    pub fn from_f32(array: ArrayD<f32>, dtype: DType) -> Result<Self, HostTensorError> {
        Ok(match dtype {
            DType::F32 => HostTensor::F32(array),
            DType::F16 => HostTensor::F16(array.mapv(f16::from_f32)),
            DType::I64 => HostTensor::I64(array.mapv(|v| v as i64)),
            DType::I8 => HostTensor::I8(array.mapv(|v| v.round() as i8)),
            DType::U8 => HostTensor::U8(array.mapv(|v| v.round() as u8)),
            x => Err(HostTensorError::UnsupportedDType(x))?,
        })
    }

    pub fn cast(&self, dtype: DType) -> Result<Self, HostTensorError> {
        if self.dtype() == dtype {
            return Ok(self.clone());
        }
        Self::from_f32(self.to_f32(), dtype)
    }

    pub fn try_to_vec<T: HostElement>(&self) -> Result<Vec<T>, HostTensorError> {
        let array = T::peek(self).ok_or(HostTensorError::UnexpectedDType(T::DTYPE, self.dtype()))?;
        Ok(array.iter().copied().collect())
    }

    /// Copies the elements, in logical order, to the front of `storage`.
    pub fn write_to(&self, storage: &mut [u64]) -> Result<(), HostTensorError> {
        match self {
            HostTensor::F32(x) => store(x, storage),
            HostTensor::F16(x) => store(x, storage),
            HostTensor::I64(x) => store(x, storage),
            HostTensor::I8(x) => store(x, storage),
            HostTensor::U8(x) => store(x, storage),
        }
    }

    pub fn read_from(storage: &[u64], dtype: DType, shape: &[usize]) -> Result<Self, HostTensorError> {
        Ok(match dtype {
            DType::F32 => HostTensor::F32(load(storage, shape)?),
            DType::F16 => HostTensor::F16(load(storage, shape)?),
            DType::I64 => HostTensor::I64(load(storage, shape)?),
            DType::I8 => HostTensor::I8(load(storage, shape)?),
            DType::U8 => HostTensor::U8(load(storage, shape)?),
            x => Err(HostTensorError::UnsupportedDType(x))?,
        })
    }
}

impl From<ArrayD<f32>> for HostTensor {
    fn from(value: ArrayD<f32>) -> Self {
        HostTensor::F32(value)
    }
}
