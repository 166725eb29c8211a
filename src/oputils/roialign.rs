use crate::ops::{InputOutputInfo, OpError, OpParam, TensorShape};
use crate::oputils::{check_arity, input_shape, invalid_value};

/// Output is `[num_rois, channels, output_height, output_width]`.
pub fn reshape_roialign(info: &InputOutputInfo<'_, TensorShape>, param: &OpParam) -> Result<Vec<Vec<usize>>, OpError> {
    check_arity(info, 3, 1)?;
    let OpParam::RoiAlign(param) = param else {
        let node = info.node();
        log::error!("node `{}` has no bound RoiAlign parameters", node.name());
        return Err(OpError::ParameterBindingFailure {
            node: node.name().to_string(),
            detail: "RoiAlign parameters are not bound".to_string(),
        });
    };

    let x = input_shape(info, 0)?;
    if x.rank() != 4 {
        return Err(invalid_value(info, 0, format!("x must have rank 4, got {:?}", x.dims)));
    }

    let rois = input_shape(info, 1)?;
    if rois.rank() != 2 {
        return Err(invalid_value(info, 1, format!("rois must have rank 2, got {:?}", rois.dims)));
    }
    if rois.dims[1] != 4 {
        return Err(invalid_value(
            info,
            1,
            format!("rois must have 4 coordinates per box, got {}", rois.dims[1]),
        ));
    }
    let num_rois = rois.dims[0];

    let batch_indices = input_shape(info, 2)?;
    if batch_indices.rank() != 1 {
        return Err(invalid_value(
            info,
            2,
            format!("batch_indices must have rank 1, got {:?}", batch_indices.dims),
        ));
    }
    if batch_indices.dims[0] != num_rois {
        return Err(invalid_value(
            info,
            2,
            format!("batch_indices has {} entries for {} rois", batch_indices.dims[0], num_rois),
        ));
    }

    Ok(vec![vec![num_rois, x.dims[1], param.output_height, param.output_width]])
}
