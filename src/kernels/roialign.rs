use crate::host_tensor::HostTensor;
use crate::kernels::{expect_inputs, finish, Kernel, KernelError};
use crate::ops::{CoordinateTransformMode, RoiAlignMode, RoiAlignParam, TensorShape};
use ndarray::{Array4, ArrayView2, Ix2, Ix4};

#[derive(Debug)]
pub struct RoiAlignKernel {
    name: String,
    param: RoiAlignParam,
}

impl RoiAlignKernel {
    pub fn new(name: &str, param: RoiAlignParam) -> Self {
        Self {
            name: name.to_string(),
            param,
        }
    }
}

fn bilinear(plane: ArrayView2<f32>, y: f32, x: f32) -> f32 {
    let (height, width) = plane.dim();
    if y < -1.0 || y > height as f32 || x < -1.0 || x > width as f32 || height == 0 || width == 0 {
        return 0.0;
    }
    let (mut y, mut x) = (y.max(0.0), x.max(0.0));
    let mut y_low = y as usize;
    let y_high = if y_low >= height - 1 {
        y_low = height - 1;
        y = y_low as f32;
        y_low
    } else {
        y_low + 1
    };
    let mut x_low = x as usize;
    let x_high = if x_low >= width - 1 {
        x_low = width - 1;
        x = x_low as f32;
        x_low
    } else {
        x_low + 1
    };
    let (ly, lx) = (y - y_low as f32, x - x_low as f32);
    let (hy, hx) = (1.0 - ly, 1.0 - lx);
    hy * hx * plane[[y_low, x_low]]
        + hy * lx * plane[[y_low, x_high]]
        + ly * hx * plane[[y_high, x_low]]
        + ly * lx * plane[[y_high, x_high]]
}

impl Kernel for RoiAlignKernel {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, inputs: &[&HostTensor], outputs: &[TensorShape]) -> Result<Vec<HostTensor>, KernelError> {
        expect_inputs(&self.name, inputs, 3)?;
        let x = inputs[0].to_f32();
        let x = x.view().into_dimensionality::<Ix4>()?;
        let rois = inputs[1].to_f32();
        let rois = rois.view().into_dimensionality::<Ix2>()?;
        let batch_indices: Vec<f32> = inputs[2].to_f32().iter().copied().collect();

        let p = &self.param;
        let (batch, channels, _, _) = x.dim();
        let num_rois = rois.nrows();
        let (out_h, out_w) = (p.output_height, p.output_width);
        let offset = match p.coordinate_transformation_mode {
            CoordinateTransformMode::HalfPixel => 0.5,
            CoordinateTransformMode::OutputHalfPixel => 0.0,
        };

        let mut out = Array4::<f32>::zeros((num_rois, channels, out_h, out_w));
        for r in 0..num_rois {
            let b = batch_indices.get(r).copied().unwrap_or(-1.0);
            if b < 0.0 || b as usize >= batch {
                return Err(KernelError::Incompatible {
                    kernel: self.name.clone(),
                    detail: format!("roi {r} refers to batch {b}, input has {batch}"),
                });
            }
            let b = b as usize;
            let corners = [rois[[r, 0]], rois[[r, 1]], rois[[r, 2]], rois[[r, 3]]];
            if corners.iter().any(|v| !(v * p.spatial_scale).is_finite()) {
                return Err(KernelError::Incompatible {
                    kernel: self.name.clone(),
                    detail: format!("roi {r} has non-finite coordinates {corners:?}"),
                });
            }
            let start_w = rois[[r, 0]] * p.spatial_scale - offset;
            let start_h = rois[[r, 1]] * p.spatial_scale - offset;
            let mut roi_w = rois[[r, 2]] * p.spatial_scale - offset - start_w;
            let mut roi_h = rois[[r, 3]] * p.spatial_scale - offset - start_h;
            if p.coordinate_transformation_mode == CoordinateTransformMode::OutputHalfPixel {
                roi_w = roi_w.max(1.0);
                roi_h = roi_h.max(1.0);
            }
            let bin_h = roi_h / out_h.max(1) as f32;
            let bin_w = roi_w / out_w.max(1) as f32;
            let grid = |bin: f32| {
                if p.sampling_ratio > 0 { p.sampling_ratio } else { bin.ceil().max(1.0) as usize }
            };
            let (grid_h, grid_w) = (grid(bin_h), grid(bin_w));
            let samples = grid_h.checked_mul(grid_w).ok_or_else(|| KernelError::Incompatible {
                kernel: self.name.clone(),
                detail: format!("roi {r} needs a {grid_h}x{grid_w} sampling grid"),
            })? as f32;

            for c in 0..channels {
                let plane = x.slice(ndarray::s![b, c, .., ..]);
                for ph in 0..out_h {
                    for pw in 0..out_w {
                        let mut sum = 0.0f32;
                        let mut max = f32::NEG_INFINITY;
                        for iy in 0..grid_h {
                            let y = start_h + ph as f32 * bin_h + (iy as f32 + 0.5) * bin_h / grid_h as f32;
                            for ix in 0..grid_w {
                                let xx = start_w + pw as f32 * bin_w + (ix as f32 + 0.5) * bin_w / grid_w as f32;
                                let v = bilinear(plane, y, xx);
                                sum += v;
                                max = max.max(v);
                            }
                        }
                        out[[r, c, ph, pw]] = match p.mode {
                            RoiAlignMode::Avg => sum / samples,
                            RoiAlignMode::Max => max,
                        };
                    }
                }
            }
        }
        Ok(vec![finish(&self.name, out.into_dyn(), outputs.first())?])
    }
}
