use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Layout hint attached to an output. Only advisory for the host kernels, which always produce
/// plain row-major data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display)]
pub enum DataFormat {
    #[default]
    Ndarray,
    Nhwc,
    N4cx,
    N8cx,
}

/// Parameters every operator accepts in addition to its own block.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommonParam {
    #[serde(default)]
    pub output_formats: Vec<DataFormat>,
}

fn one() -> f32 {
    1.0
}

fn yes() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatMulParam {
    #[serde(default, rename = "transA")]
    pub trans_a: bool,
    #[serde(default, rename = "transB")]
    pub trans_b: bool,
    #[serde(default = "one")]
    pub alpha: f32,
}

impl Default for MatMulParam {
    fn default() -> Self {
        Self {
            trans_a: false,
            trans_b: false,
            alpha: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReduceParam {
    /// Empty reduces over every axis.
    #[serde(default)]
    pub axes: Vec<i64>,
    #[serde(default = "yes")]
    pub keepdims: bool,
}

impl Default for ReduceParam {
    fn default() -> Self {
        Self {
            axes: Vec::new(),
            keepdims: true,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoiAlignMode {
    #[default]
    Avg,
    Max,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateTransformMode {
    #[default]
    HalfPixel,
    OutputHalfPixel,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoiAlignParam {
    pub output_height: usize,
    pub output_width: usize,
    #[serde(default = "one")]
    pub spatial_scale: f32,
    /// Zero samples adaptively, `ceil(roi_size / output_size)` per bin.
    #[serde(default)]
    pub sampling_ratio: usize,
    #[serde(default)]
    pub mode: RoiAlignMode,
    #[serde(default)]
    pub coordinate_transformation_mode: CoordinateTransformMode,
}

/// Per-node operator configuration. Cloning is a deep copy.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum OpParam {
    #[default]
    None,
    MatMul(MatMulParam),
    Reduce(ReduceParam),
    RoiAlign(RoiAlignParam),
}

/// Deserializes a raw block, `None` when the block is absent.
pub(crate) fn bind<T: DeserializeOwned>(raw: Option<&serde_json::Value>) -> Result<Option<T>, String> {
    match raw {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone()).map(Some).map_err(|e| e.to_string()),
    }
}
