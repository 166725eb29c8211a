use crate::dtype::DType;
use crate::ops::{InputOutputInfo, QuantTable, TensorShape};

/// An operator-specific adjustment of the requested type. Rules run in order, before the
/// generic fallback, and each sees the request as left by the previous one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeRule {
    /// A half-precision first input turns the request into F32.
    PromoteHalfToFloat,
    /// The request becomes F16 whatever was asked for.
    ForceHalf,
}

impl TypeRule {
    fn apply(&self, info: &InputOutputInfo<'_, TensorShape>, requested: Option<DType>) -> Option<DType> {
        match self {
            TypeRule::PromoteHalfToFloat => {
                let input_is_half = info
                    .input(0)
                    .and_then(|s| s.dtype)
                    .is_some_and(|d| d.is_half());
                if input_is_half { Some(DType::F32) } else { requested }
            }
            TypeRule::ForceHalf => Some(DType::F16),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TypePolicy {
    pub rules: Vec<TypeRule>,
}

impl TypePolicy {
    pub fn new(rules: &[TypeRule]) -> Self {
        Self { rules: rules.to_vec() }
    }

    /// Resolves the type of every output.
    ///
    /// After the rules, an UNKNOWN request keeps the existing annotation of each output and
    /// falls back to the type of input 0; a quantized request copies the output edge's entry
    /// from the quantization table; any other request is forced onto every output.
    pub fn infer(
        &self,
        info: &InputOutputInfo<'_, TensorShape>,
        requested: Option<DType>,
        quant: &QuantTable,
    ) -> Vec<Option<DType>> {
        let requested = self.rules.iter().fold(requested, |req, rule| rule.apply(info, req));
        let first_input = info.input(0).and_then(|s| s.dtype);
        (0..info.output_count())
            .map(|i| match requested {
                None => info.output(i).and_then(|s| s.dtype).or(first_input),
                Some(dtype) if dtype.is_quantized() => info
                    .node()
                    .output(i)
                    .and_then(|eid| quant.get(eid))
                    .map(|q| q.dtype)
                    .or(Some(dtype)),
                Some(dtype) => Some(dtype),
            })
            .collect()
    }
}
