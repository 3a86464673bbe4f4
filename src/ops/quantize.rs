use crate::context::{InferTypes, InferenceContext};
use crate::error::InferError;
use crate::ops::{input_elem_type, output_tensor, propagate_shape};
use crate::types::DataType;

/// QuantizeLinear operator.
///
/// The output has the element type of the zero point, or `u8` if the zero
/// point is omitted.
pub struct QuantizeLinear;

impl InferTypes for QuantizeLinear {
    fn infer_types(&self, ctx: &mut InferenceContext<'_>) -> Result<(), InferError> {
        let elem_type = if ctx.has_input(2) {
            input_elem_type(ctx, 2)?
        } else {
            Some(DataType::UInt8)
        };
        if let Some(elem_type) = elem_type {
            output_tensor(ctx, 0)?.elem_type = Some(elem_type);
        }
        propagate_shape(ctx, 0, 0)
    }
}

/// DequantizeLinear operator.
pub struct DequantizeLinear {
    /// Take the output element type from the scale input. Otherwise the
    /// output is always `f32`.
    pub elem_type_from_scale: bool,
}

impl InferTypes for DequantizeLinear {
    fn infer_types(&self, ctx: &mut InferenceContext<'_>) -> Result<(), InferError> {
        let elem_type = if self.elem_type_from_scale {
            input_elem_type(ctx, 1)?
        } else {
            Some(DataType::Float)
        };
        if let Some(elem_type) = elem_type {
            output_tensor(ctx, 0)?.elem_type = Some(elem_type);
        }
        propagate_shape(ctx, 0, 0)
    }
}
