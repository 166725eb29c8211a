use crate::ops::{InputOutputInfo, OpError, OpParam, ReduceParam, TensorShape};
use crate::oputils::{check_arity, input_shape, invalid_value};

/// Maps possibly negative axes into `0..rank`, sorted ascending. Empty selects every axis.
pub fn normalize_axes(axes: &[i64], rank: usize) -> Result<Vec<usize>, String> {
    if axes.is_empty() {
        return Ok((0..rank).collect());
    }
    let mut res = Vec::with_capacity(axes.len());
    for axis in axes {
        let a = if *axis < 0 { *axis + rank as i64 } else { *axis };
        if a < 0 || a >= rank as i64 {
            return Err(format!("axis {axis} is out of range for rank {rank}"));
        }
        res.push(a as usize);
    }
    res.sort_unstable();
    res.dedup();
    Ok(res)
}

pub fn reduced_dims(dims: &[usize], axes: &[usize], keepdims: bool) -> Vec<usize> {
    dims.iter()
        .enumerate()
        .filter_map(|(i, d)| match (axes.contains(&i), keepdims) {
            (false, _) => Some(*d),
            (true, true) => Some(1),
            (true, false) => None,
        })
        .collect()
}

pub fn reshape_reduce(info: &InputOutputInfo<'_, TensorShape>, param: &OpParam) -> Result<Vec<Vec<usize>>, OpError> {
    check_arity(info, 1, 1)?;
    let default = ReduceParam::default();
    let param = match param {
        OpParam::Reduce(p) => p,
        _ => &default,
    };
    let x = input_shape(info, 0)?;
    let axes = normalize_axes(&param.axes, x.rank()).map_err(|e| invalid_value(info, 0, e))?;
    Ok(vec![reduced_dims(&x.dims, &axes, param.keepdims)])
}
