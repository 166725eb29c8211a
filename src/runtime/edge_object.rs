use crate::host_tensor::{HostTensor, HostTensorError};
use crate::memory::SlotId;
use crate::ops::TensorShape;

/// Binding of one edge for a run: its descriptor and where its value lives.
#[derive(Clone, Debug, PartialEq)]
pub enum EdgeObject {
    /// Value held by the graph itself.
    Constant(TensorShape),
    /// Value stored in a planned slot of the runtime's storage.
    Slot { shape: TensorShape, slot: SlotId },
}

impl EdgeObject {
    pub fn shape(&self) -> &TensorShape {
        match self {
            EdgeObject::Constant(shape) => shape,
            EdgeObject::Slot { shape, .. } => shape,
        }
    }

    pub fn slot(&self) -> Option<SlotId> {
        match self {
            EdgeObject::Constant(_) => None,
            EdgeObject::Slot { slot, .. } => Some(*slot),
        }
    }

    /// Reads the value out of `storage`. Constants are not read here.
    pub fn load(&self, storage: &[Vec<u64>]) -> Result<Option<HostTensor>, HostTensorError> {
        let EdgeObject::Slot { shape, slot } = self else {
            return Ok(None);
        };
        let Some(dtype) = shape.dtype else {
            return Ok(None);
        };
        let Some(words) = storage.get(*slot) else {
            return Ok(None);
        };
        HostTensor::read_from(words, dtype, &shape.dims).map(Some)
    }

    pub fn store(&self, storage: &mut [Vec<u64>], value: &HostTensor) -> Result<(), HostTensorError> {
        if let EdgeObject::Slot { slot, .. } = self {
            if let Some(words) = storage.get_mut(*slot) {
                value.write_to(words)?;
            }
        }
        Ok(())
    }
}
