use crate::ops::{InputOutputInfo, MatMulParam, OpError, OpParam, TensorShape};
use crate::oputils::{broadcast_dims, check_arity, input_shape, invalid_value};

pub fn reshape_matmul(info: &InputOutputInfo<'_, TensorShape>, param: &OpParam) -> Result<Vec<Vec<usize>>, OpError> {
    check_arity(info, 2, 1)?;
    let default = MatMulParam::default();
    let param = match param {
        OpParam::MatMul(p) => p,
        _ => &default,
    };
    let a = &input_shape(info, 0)?.dims;
    let b = &input_shape(info, 1)?.dims;
    if a.is_empty() {
        return Err(invalid_value(info, 0, "matmul operand must have rank >= 1".to_string()));
    }
    if b.is_empty() {
        return Err(invalid_value(info, 1, "matmul operand must have rank >= 1".to_string()));
    }

    // Rank-1 operands are promoted to matrices and the added axis dropped from the result.
    let (m, ka) = match a.len() {
        1 => (1, a[0]),
        r if param.trans_a => (a[r - 1], a[r - 2]),
        r => (a[r - 2], a[r - 1]),
    };
    let (kb, n) = match b.len() {
        1 => (b[0], 1),
        r if param.trans_b => (b[r - 1], b[r - 2]),
        r => (b[r - 2], b[r - 1]),
    };
    if ka != kb {
        return Err(invalid_value(
            info,
            1,
            format!("inner dimensions differ: {:?} x {:?} (k = {} vs {})", a, b, ka, kb),
        ));
    }

    let batch_a = if a.len() > 2 { &a[..a.len() - 2] } else { &[][..] };
    let batch_b = if b.len() > 2 { &b[..b.len() - 2] } else { &[][..] };
    let mut dims = broadcast_dims(batch_a, batch_b).ok_or_else(|| {
        invalid_value(
            info,
            1,
            format!("batch dims {:?} cannot be broadcast against {:?}", batch_b, batch_a),
        )
    })?;
    if a.len() > 1 {
        dims.push(m);
    }
    if b.len() > 1 {
        dims.push(n);
    }
    Ok(vec![dims])
}
