use crate::oputils::{check_arity, input_shape, invalid_value};
use crate::ops::{InputOutputInfo, OpError, OpParam, TensorShape};

/// Numpy-style multidirectional broadcast of two shapes.
pub fn broadcast_dims(a: &[usize], b: &[usize]) -> Option<Vec<usize>> {
    let rank = a.len().max(b.len());
    let mut out = vec![0; rank];
    for i in 0..rank {
        let da = if i < rank - a.len() { 1 } else { a[i - (rank - a.len())] };
        let db = if i < rank - b.len() { 1 } else { b[i - (rank - b.len())] };
        out[i] = match (da, db) {
            (x, y) if x == y => x,
            (1, y) => y,
            (x, 1) => x,
            _ => return None,
        };
    }
    Some(out)
}

pub fn reshape_broadcast(info: &InputOutputInfo<'_, TensorShape>, _param: &OpParam) -> Result<Vec<Vec<usize>>, OpError> {
    check_arity(info, 2, 1)?;
    let a = input_shape(info, 0)?;
    let b = input_shape(info, 1)?;
    let dims = broadcast_dims(&a.dims, &b.dims).ok_or_else(|| {
        invalid_value(
            info,
            1,
            format!("shape {:?} cannot be broadcast against {:?}", b.dims, a.dims),
        )
    })?;
    Ok(vec![dims])
}

pub fn reshape_same_as_input(
    info: &InputOutputInfo<'_, TensorShape>,
    _param: &OpParam,
) -> Result<Vec<Vec<usize>>, OpError> {
    check_arity(info, 1, 1)?;
    Ok(vec![input_shape(info, 0)?.dims.clone()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcasting() {
        assert_eq!(broadcast_dims(&[2, 3], &[3]), Some(vec![2, 3]));
        assert_eq!(broadcast_dims(&[4, 1, 5], &[3, 1]), Some(vec![4, 3, 5]));
        assert_eq!(broadcast_dims(&[], &[2]), Some(vec![2]));
        assert_eq!(broadcast_dims(&[2, 3], &[2]), None);
    }
}
