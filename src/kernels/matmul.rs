use crate::engines::{DynamicTuningLevel, WinogradLevel};
use crate::host_tensor::HostTensor;
use crate::kernels::{expect_inputs, finish, Kernel, KernelError};
use crate::ops::{MatMulParam, TensorShape};
use crate::oputils::broadcast_dims;
use ndarray::linalg::general_mat_mul;
use ndarray::{Array3, ArrayView2, ArrayViewMut2, Axis, IxDyn};
use num_traits::NumAssign;

const DEFAULT_BLOCK: usize = 8;
const BLOCKED_MIN_K: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatMulAlgo {
    /// Straight `ndarray` product.
    Dot,
    /// Cache-blocked loop nest over square tiles of the given edge.
    Blocked { block: usize },
}

#[derive(Debug)]
pub struct MatMulKernel {
    name: String,
    param: MatMulParam,
    winograd: WinogradLevel,
    tuning: DynamicTuningLevel,
}

impl MatMulKernel {
    pub fn new(name: &str, param: MatMulParam, winograd: WinogradLevel, tuning: DynamicTuningLevel) -> Self {
        Self {
            name: name.to_string(),
            param,
            winograd,
            tuning,
        }
    }

    /// Algorithm for an `m x k` by `k x n` product under the configured levels.
    pub fn select_algo(&self, m: usize, k: usize, n: usize) -> MatMulAlgo {
        let fixed_block = match self.winograd {
            WinogradLevel::Off => None,
            WinogradLevel::On => Some(DEFAULT_BLOCK),
            WinogradLevel::OnBlock2 => Some(2),
            WinogradLevel::OnBlock4 => Some(4),
        };
        match self.tuning {
            DynamicTuningLevel::Off => fixed_block.map_or(MatMulAlgo::Dot, |block| MatMulAlgo::Blocked { block }),
            DynamicTuningLevel::SelectAlgo if k >= BLOCKED_MIN_K => MatMulAlgo::Blocked {
                block: fixed_block.unwrap_or(DEFAULT_BLOCK),
            },
            DynamicTuningLevel::SelectBlockSize if k >= BLOCKED_MIN_K => {
                let edge = m.min(k).min(n);
                let block = [16, 8, 4].into_iter().find(|b| *b <= edge).unwrap_or(2);
                MatMulAlgo::Blocked { block }
            }
            _ => MatMulAlgo::Dot,
        }
    }

    fn incompatible(&self, detail: String) -> KernelError {
        KernelError::Incompatible {
            kernel: self.name.clone(),
            detail,
        }
    }
}

/// `c += alpha * a * b` over square tiles of `block`.
fn blocked_gemm<T>(alpha: T, a: ArrayView2<T>, b: ArrayView2<T>, mut c: ArrayViewMut2<T>, block: usize)
where
    T: Copy + NumAssign,
{
    let (m, k) = a.dim();
    let n = b.ncols();
    let block = block.max(1);
    for i0 in (0..m).step_by(block) {
        for p0 in (0..k).step_by(block) {
            for j0 in (0..n).step_by(block) {
                for i in i0..(i0 + block).min(m) {
                    for p in p0..(p0 + block).min(k) {
                        let av = alpha * a[[i, p]];
                        for j in j0..(j0 + block).min(n) {
                            c[[i, j]] += av * b[[p, j]];
                        }
                    }
                }
            }
        }
    }
}

impl Kernel for MatMulKernel {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, inputs: &[&HostTensor], outputs: &[TensorShape]) -> Result<Vec<HostTensor>, KernelError> {
        expect_inputs(&self.name, inputs, 2)?;
        let a_rank = inputs[0].shape().len();
        let b_rank = inputs[1].shape().len();
        if a_rank == 0 || b_rank == 0 {
            return Err(self.incompatible("matmul operands must have rank >= 1".to_string()));
        }

        let mut a = inputs[0].to_f32();
        if a_rank == 1 {
            a.insert_axis_inplace(Axis(0));
        } else if self.param.trans_a {
            a.swap_axes(a_rank - 2, a_rank - 1);
        }
        let mut b = inputs[1].to_f32();
        if b_rank == 1 {
            b.insert_axis_inplace(Axis(1));
        } else if self.param.trans_b {
            b.swap_axes(b_rank - 2, b_rank - 1);
        }

        let (ar, br) = (a.ndim(), b.ndim());
        let (m, k) = (a.shape()[ar - 2], a.shape()[ar - 1]);
        let (kb, n) = (b.shape()[br - 2], b.shape()[br - 1]);
        if k != kb {
            return Err(self.incompatible(format!("inner dimensions differ: {k} vs {kb}")));
        }
        let batch = broadcast_dims(&a.shape()[..ar - 2], &b.shape()[..br - 2])
            .ok_or_else(|| self.incompatible("batch dims cannot be broadcast".to_string()))?;
        let batches: usize = batch.iter().product();

        let full = |rows: usize, cols: usize| {
            let mut dims = batch.clone();
            dims.extend([rows, cols]);
            dims
        };
        let a3 = a
            .broadcast(IxDyn(&full(m, k)))
            .ok_or_else(|| self.incompatible("lhs cannot be broadcast".to_string()))?
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order((batches, m, k))?;
        let b3 = b
            .broadcast(IxDyn(&full(k, n)))
            .ok_or_else(|| self.incompatible("rhs cannot be broadcast".to_string()))?
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order((batches, k, n))?;

        let algo = self.select_algo(m, k, n);
        log::trace!("`{}`: {}x{}x{} batch {} via {:?}", self.name, m, k, n, batches, algo);
        let mut c = Array3::<f32>::zeros((batches, m, n));
        for i in 0..batches {
            let ai = a3.index_axis(Axis(0), i);
            let bi = b3.index_axis(Axis(0), i);
            let mut ci = c.index_axis_mut(Axis(0), i);
            match algo {
                MatMulAlgo::Dot => general_mat_mul(self.param.alpha, &ai, &bi, 0.0, &mut ci),
                MatMulAlgo::Blocked { block } => blocked_gemm(self.param.alpha, ai, bi, ci, block),
            }
        }

        let mut dims = batch;
        if a_rank > 1 {
            dims.push(m);
        }
        if b_rank > 1 {
            dims.push(n);
        }
        let res = c.into_dyn().into_shape_with_order(IxDyn(&dims))?;
        Ok(vec![finish(&self.name, res, outputs.first())?])
    }
}
