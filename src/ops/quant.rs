use crate::dtype::DType;
use crate::host_tensor::{HostTensor, HostTensorError};
use crate::ir::EdgeId;
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

/// Affine quantization of one edge: `real = (q - zero_point) * scale`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuantParam {
    pub dtype: DType,
    pub scale: f32,
    #[serde(default)]
    pub zero_point: i32,
}

impl QuantParam {
    pub fn new(dtype: DType, scale: f32, zero_point: i32) -> Self {
        Self { dtype, scale, zero_point }
    }

    fn range(&self) -> (f32, f32) {
        match self.dtype {
            DType::I8 => (i8::MIN as f32, i8::MAX as f32),
            _ => (u8::MIN as f32, u8::MAX as f32),
        }
    }

    pub fn quantize(&self, values: &ArrayD<f32>) -> Result<HostTensor, HostTensorError> {
        if !self.dtype.is_quantized() {
            return Err(HostTensorError::UnsupportedDType(self.dtype));
        }
        let (lo, hi) = self.range();
        let q = values.mapv(|v| ((v / self.scale).round() + self.zero_point as f32).clamp(lo, hi));
        HostTensor::from_f32(q, self.dtype)
    }

    pub fn dequantize(&self, tensor: &HostTensor) -> ArrayD<f32> {
        tensor.to_f32().mapv(|q| (q - self.zero_point as f32) * self.scale)
    }
}

/// Quantization metadata indexed densely by edge id.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QuantTable {
    entries: Vec<Option<QuantParam>>,
}

impl QuantTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resize(&mut self, max_edge_id: EdgeId) {
        self.entries.resize(max_edge_id, None);
    }

    pub fn set(&mut self, edge: EdgeId, param: QuantParam) {
        if edge >= self.entries.len() {
            self.entries.resize(edge + 1, None);
        }
        self.entries[edge] = Some(param);
    }

    pub fn get(&self, edge: EdgeId) -> Option<&QuantParam> {
        self.entries.get(edge).and_then(|x| x.as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.iter().filter(|x| x.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
