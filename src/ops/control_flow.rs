use crate::context::{InferTypes, InferenceContext};
use crate::error::InferError;
use crate::ops::{input_elem_type, merge_into_output};
use crate::types::{DataType, Dimension, Shape, TensorType, ValueType};

/// Return a type which describes values of either type `a` or type `b`.
///
/// Parts which differ between the two types become unknown. Element types
/// must agree where both are known.
fn union_types(a: &ValueType, b: &ValueType) -> Result<ValueType, InferError> {
    let union = match (a, b) {
        (ValueType::Unknown, _) | (_, ValueType::Unknown) => ValueType::Unknown,
        (ValueType::Tensor(a), ValueType::Tensor(b)) => {
            let elem_type = match (a.elem_type, b.elem_type) {
                (Some(x), Some(y)) if x != y => {
                    return Err(InferError::TypeInference(format!(
                        "branches produce different element types {} and {}",
                        x, y
                    )));
                }
                (Some(x), Some(_)) => Some(x),
                _ => None,
            };
            let shape = match (&a.shape, &b.shape) {
                (Some(x), Some(y)) if x.rank() == y.rank() => Some(
                    x.iter()
                        .zip(y.iter())
                        .map(|(x, y)| if x == y { x.clone() } else { Dimension::Unknown })
                        .collect(),
                ),
                _ => None,
            };
            ValueType::Tensor(TensorType::new(elem_type, shape))
        }
        (ValueType::Sequence(a), ValueType::Sequence(b)) => {
            ValueType::Sequence(Box::new(union_types(a, b)?))
        }
        (ValueType::Optional(a), ValueType::Optional(b)) => {
            ValueType::Optional(Box::new(union_types(a, b)?))
        }
        (ValueType::Map(key_a, a), ValueType::Map(key_b, b)) if key_a == key_b => {
            ValueType::Map(*key_a, Box::new(union_types(a, b)?))
        }
        _ => {
            return Err(InferError::TypeInference(format!(
                "branches produce incompatible types {} and {}",
                a, b
            )));
        }
    };
    Ok(union)
}

fn check_output_count(
    ctx: &InferenceContext<'_>,
    graph: &str,
    count: usize,
) -> Result<(), InferError> {
    if count != ctx.output_count() {
        return Err(InferError::TypeInference(format!(
            "{} has {} outputs but node has {}",
            graph,
            count,
            ctx.output_count()
        )));
    }
    Ok(())
}

/// If operator.
///
/// Both branches are inferred and each output gets a type compatible with
/// the corresponding output of either branch.
pub struct If;

impl InferTypes for If {
    fn infer_types(&self, ctx: &mut InferenceContext<'_>) -> Result<(), InferError> {
        match input_elem_type(ctx, 0)? {
            Some(DataType::Bool) | None => {}
            Some(other) => {
                return Err(InferError::TypeInference(format!(
                    "If condition must be a bool tensor, got {}",
                    other
                )));
            }
        }

        let then_types = ctx
            .graph_attribute_inferencer("then_branch")?
            .run_inference(&[], &[])?;
        let else_types = ctx
            .graph_attribute_inferencer("else_branch")?
            .run_inference(&[], &[])?;
        check_output_count(ctx, "then_branch", then_types.len())?;
        check_output_count(ctx, "else_branch", else_types.len())?;

        for (index, (then_type, else_type)) in then_types.iter().zip(&else_types).enumerate() {
            let output_type = union_types(then_type, else_type)?;
            merge_into_output(ctx, index, &output_type)?;
        }
        Ok(())
    }
}

/// Return the type passed to the loop body for a loop-carried value.
///
/// The shape of a carried tensor may change between iterations, so only its
/// element type is passed.
fn carried_type(value_type: Option<&ValueType>) -> ValueType {
    match value_type {
        Some(ValueType::Tensor(tensor)) => {
            ValueType::Tensor(TensorType::new(tensor.elem_type, None))
        }
        Some(other) => other.clone(),
        None => ValueType::Unknown,
    }
}

/// Return the type of a scan output given the type of one iteration's value.
fn scan_output_type(value_type: &ValueType) -> ValueType {
    match value_type {
        ValueType::Tensor(tensor) => {
            let shape = tensor.shape.as_ref().map(|shape| {
                std::iter::once(Dimension::Unknown)
                    .chain(shape.iter().cloned())
                    .collect::<Shape>()
            });
            ValueType::Tensor(TensorType::new(tensor.elem_type, shape))
        }
        _ => ValueType::Unknown,
    }
}

/// Loop operator.
///
/// The body graph takes the iteration number, the condition and the
/// loop-carried values. It returns the updated condition, the loop-carried
/// values and any scan outputs. The node's outputs are the final
/// loop-carried values followed by the scan outputs, which have an extra
/// leading dimension for the iteration.
pub struct Loop;

impl InferTypes for Loop {
    fn infer_types(&self, ctx: &mut InferenceContext<'_>) -> Result<(), InferError> {
        let mut body_inputs = vec![
            ValueType::tensor(DataType::Int64, Shape::default()),
            ValueType::tensor(DataType::Bool, Shape::default()),
        ];
        for index in 2..ctx.input_count() {
            body_inputs.push(carried_type(ctx.input_type(index)?));
        }
        let n_carried = body_inputs.len() - 2;

        let body_outputs = ctx
            .graph_attribute_inferencer("body")?
            .run_inference(&body_inputs, &[])?;

        if body_outputs.len() < n_carried + 1 {
            return Err(InferError::TypeInference(format!(
                "body has {} outputs but the loop has {} carried values",
                body_outputs.len(),
                n_carried
            )));
        }
        check_output_count(ctx, "body", body_outputs.len() - 1)?;

        for (index, body_output) in body_outputs[1..].iter().enumerate() {
            let output_type = if index < n_carried {
                body_output.clone()
            } else {
                scan_output_type(body_output)
            };
            merge_into_output(ctx, index, &output_type)?;
        }
        Ok(())
    }
}
