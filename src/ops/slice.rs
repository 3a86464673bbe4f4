use std::iter::zip;

use crate::context::{InferTypes, InferenceContext};
use crate::error::InferError;
use crate::ops::{input_shape, propagate_elem_type, resolve_axis, set_output_shape};
use crate::types::{Dimension, Shape};

/// Return the number of elements selected by slicing a dimension of size
/// `size` with `start`, `end` and `step`.
///
/// Out of range starts and ends are clamped as described at
/// https://onnx.ai/onnx/operators/onnx__Slice.html.
pub(crate) fn slice_len(size: i64, start: i64, end: i64, step: i64) -> i64 {
    if size <= 0 {
        return 0;
    }
    let resolve = |index: i64| if index < 0 { index.saturating_add(size) } else { index };
    let (start, end) = (resolve(start), resolve(end));

    let (len, step) = if step > 0 {
        let start = start.clamp(0, size);
        let end = end.clamp(0, size);
        (end - start, step)
    } else {
        let start = start.clamp(0, size - 1);
        let end = end.clamp(-1, size - 1);
        (start - end, step.saturating_neg())
    };
    if len <= 0 { 0 } else { (len - 1) / step + 1 }
}

/// Read the constant vector value of optional input `index`.
///
/// Returns `Ok(None)` if the input is present but its value is unknown.
fn read_vector(
    ctx: &InferenceContext<'_>,
    index: usize,
) -> Result<Option<Option<Vec<i64>>>, InferError> {
    if !ctx.has_input(index) {
        return Ok(Some(None));
    }
    let Some(tensor) = ctx.input_data(index)? else {
        return Ok(None);
    };
    let values = tensor.to_i64_vec().ok_or(InferError::UnsupportedInputEncoding {
        input: index,
        dtype: tensor.dtype(),
    })?;
    Ok(Some(Some(values)))
}

/// Slice operator.
///
/// The output shape can be determined exactly when the input shape is known
/// and `starts`, `ends`, `axes` and `steps` are constants. Otherwise only the
/// rank is known.
pub struct Slice;

impl InferTypes for Slice {
    fn infer_types(&self, ctx: &mut InferenceContext<'_>) -> Result<(), InferError> {
        propagate_elem_type(ctx, 0, 0)?;

        let Some(shape) = input_shape(ctx, 0)? else {
            return Ok(());
        };

        let (Some(Some(starts)), Some(Some(ends)), Some(axes), Some(steps)) = (
            read_vector(ctx, 1)?,
            read_vector(ctx, 2)?,
            read_vector(ctx, 3)?,
            read_vector(ctx, 4)?,
        ) else {
            return set_output_shape(ctx, 0, Shape::unknown_dims(shape.rank()));
        };

        if starts.len() != ends.len() {
            return Err(InferError::ShapeInference(format!(
                "slice has {} starts but {} ends",
                starts.len(),
                ends.len()
            )));
        }
        let axes = axes.unwrap_or_else(|| (0..starts.len() as i64).collect());
        let steps = steps.unwrap_or_else(|| vec![1; starts.len()]);
        if axes.len() != starts.len() || steps.len() != starts.len() {
            return Err(InferError::ShapeInference(format!(
                "slice has {} starts but {} axes and {} steps",
                starts.len(),
                axes.len(),
                steps.len()
            )));
        }

        let mut out_shape = shape.clone();
        for (axis, (&start, (&end, &step))) in zip(&axes, zip(&starts, zip(&ends, &steps))) {
            if step == 0 {
                return Err(InferError::ShapeInference("slice steps must be non-zero".into()));
            }
            let axis = resolve_axis(shape.rank(), *axis)?;
            out_shape[axis] = match &shape[axis] {
                Dimension::Fixed(size) => Dimension::Fixed(slice_len(*size, start, end, step)),

                // Slicing the whole of a dimension preserves its size even if
                // the size is not known.
                dim if start == 0 && end == i64::MAX && step == 1 => dim.clone(),
                _ => Dimension::Unknown,
            };
        }

        set_output_shape(ctx, 0, out_shape)
    }
}
