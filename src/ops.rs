//! Built-in type inference rules for a subset of the standard operators.
//!
//! The rules cover the operators commonly involved in shape computations and
//! control flow. Other operators can be supported by registering additional
//! schemas with an [`OpRegistry`].

use smallvec::SmallVec;

use crate::context::InferenceContext;
use crate::error::InferError;
use crate::graph::DEFAULT_DOMAIN;
use crate::merge::{check_compatible, merge};
use crate::registry::{OpRegistry, OpSchema};
use crate::types::{DataType, Shape, TensorType, ValueType};

mod binary;
mod control_flow;
mod layout;
mod quantize;
mod slice;

pub use binary::BinaryOp;
pub use control_flow::{If, Loop};
pub use layout::{
    Cast, Concat, Constant, Gather, Identity, Reshape, ShapeOp, Squeeze, Unsqueeze,
    constant_node_value,
};
pub(crate) use layout::shape_range;
pub use quantize::{DequantizeLinear, QuantizeLinear};
pub use slice::Slice;

/// Register the built-in rules in `reg`.
pub(crate) fn register_standard_ops(reg: &mut OpRegistry) {
    let schema =
        |name: &str, since_version: i64| OpSchema::new(name, DEFAULT_DOMAIN, since_version);

    reg.register(schema("Identity", 1).with_rule(Identity));
    reg.register(schema("Cast", 1).with_rule(Cast));
    reg.register(schema("Constant", 1).with_rule(Constant));
    reg.register(schema("Shape", 1).with_rule(ShapeOp { range_attrs: false }));
    reg.register(schema("Shape", 15).with_rule(ShapeOp { range_attrs: true }));
    reg.register(schema("Reshape", 5).with_rule(Reshape));
    reg.register(schema("Squeeze", 1).with_rule(Squeeze { axes_input: false }));
    reg.register(schema("Squeeze", 13).with_rule(Squeeze { axes_input: true }));
    reg.register(schema("Unsqueeze", 1).with_rule(Unsqueeze { axes_input: false }));
    reg.register(schema("Unsqueeze", 13).with_rule(Unsqueeze { axes_input: true }));
    reg.register(schema("Concat", 4).with_rule(Concat));
    reg.register(schema("Gather", 1).with_rule(Gather));
    reg.register(schema("Slice", 10).with_rule(Slice));

    for op in ["Add", "Sub", "Mul", "Div"] {
        reg.register(schema(op, 7).with_rule(BinaryOp));
    }

    reg.register(schema("If", 1).with_rule(If));
    reg.register(schema("Loop", 1).with_rule(Loop));

    reg.register(schema("QuantizeLinear", 10).with_rule(QuantizeLinear));
    reg.register(schema("DequantizeLinear", 10).with_rule(DequantizeLinear {
        elem_type_from_scale: false,
    }));
    reg.register(schema("DequantizeLinear", 19).with_rule(DequantizeLinear {
        elem_type_from_scale: true,
    }));
}

/// Return the tensor type of output `index` for updating.
///
/// Fails if the output has already been given a non-tensor type.
pub(crate) fn output_tensor<'c>(
    ctx: &'c mut InferenceContext<'_>,
    index: usize,
) -> Result<&'c mut TensorType, InferError> {
    let output = ctx.output_type_mut(index)?;
    let category = output.category();
    output.tensor_mut().ok_or_else(|| {
        InferError::TypeInference(format!(
            "output {} is a {}, expected a tensor",
            index, category
        ))
    })
}

/// Return the shape of tensor input `index`, if its rank is known.
pub fn input_shape<'a>(
    ctx: &InferenceContext<'a>,
    index: usize,
) -> Result<Option<&'a Shape>, InferError> {
    if index >= ctx.input_count() {
        return Ok(None);
    }
    Ok(ctx.input_type(index)?.and_then(|t| t.shape()))
}

/// Return the element type of tensor input `index`, if known.
pub fn input_elem_type(
    ctx: &InferenceContext<'_>,
    index: usize,
) -> Result<Option<DataType>, InferError> {
    if index >= ctx.input_count() {
        return Ok(None);
    }
    match ctx.input_type(index)? {
        None | Some(ValueType::Unknown) => Ok(None),
        Some(ValueType::Tensor(tensor)) => Ok(tensor.elem_type),
        Some(other) => Err(InferError::TypeInference(format!(
            "input {} is a {}, expected a tensor",
            index,
            other.category()
        ))),
    }
}

/// Copy the element type of tensor input `input` to output `output`.
pub fn propagate_elem_type(
    ctx: &mut InferenceContext<'_>,
    input: usize,
    output: usize,
) -> Result<(), InferError> {
    if let Some(elem_type) = input_elem_type(ctx, input)? {
        output_tensor(ctx, output)?.elem_type = Some(elem_type);
    }
    Ok(())
}

/// Copy the shape of tensor input `input` to output `output`.
pub fn propagate_shape(
    ctx: &mut InferenceContext<'_>,
    input: usize,
    output: usize,
) -> Result<(), InferError> {
    if let Some(shape) = input_shape(ctx, input)? {
        output_tensor(ctx, output)?.shape = Some(shape.clone());
    }
    Ok(())
}

/// Set the shape of output `output`.
pub fn set_output_shape(
    ctx: &mut InferenceContext<'_>,
    output: usize,
    shape: Shape,
) -> Result<(), InferError> {
    output_tensor(ctx, output)?.shape = Some(shape);
    Ok(())
}

/// Merge `value_type` into the inferred type of output `output`.
///
/// This is used by rules which compute an output type from several sources,
/// such as the branches of an `If`.
pub fn merge_into_output(
    ctx: &mut InferenceContext<'_>,
    output: usize,
    value_type: &ValueType,
) -> Result<(), InferError> {
    let existing = ctx.output_type_mut(output)?;
    check_compatible(value_type, existing)?;
    merge(value_type, existing);
    Ok(())
}

/// Resolve an index given as a value in `[-len, len-1]` to a positive index in
/// `[0, len)`, or return None if the index is out of bounds.
pub(crate) fn resolve_index(len: usize, index: i64) -> Option<usize> {
    let len = len.min(i64::MAX as usize) as i64;
    if index < -len || index >= len {
        return None;
    }

    if index >= 0 {
        Some(index as usize)
    } else {
        Some((len + index) as usize)
    }
}

/// Resolve an axis given as a value in `[-ndim, ndim-1]` to the zero-based
/// dimension of a tensor with `ndim` dimensions.
///
/// Negative axis values count backwards from the last dimension.
pub(crate) fn resolve_axis(ndim: usize, axis: i64) -> Result<usize, InferError> {
    resolve_index(ndim, axis).ok_or_else(|| {
        InferError::ShapeInference(format!(
            "axis {} is out of range for a tensor of rank {}",
            axis, ndim
        ))
    })
}

/// Resolve a list of axes and sort them, failing if any are repeated.
pub(crate) fn resolve_axes(ndim: usize, axes: &[i64]) -> Result<SmallVec<[usize; 4]>, InferError> {
    let mut resolved = SmallVec::with_capacity(axes.len());
    for &axis in axes {
        resolved.push(resolve_axis(ndim, axis)?);
    }
    resolved.sort();
    let len = resolved.len();
    resolved.dedup();
    if resolved.len() != len {
        return Err(InferError::ShapeInference(format!(
            "axes {:?} contain duplicates",
            axes
        )));
    }
    Ok(resolved)
}

#[cfg(test)]
pub(crate) use tests::RuleTest;

#[cfg(test)]
mod tests {
    use rustc_hash::FxHashMap;

    use super::{merge_into_output, resolve_axes, resolve_index};
    use crate::context::{GeneratedShapeData, InferTypes, InferenceContext};
    use crate::error::InferError;
    use crate::graph::Node;
    use crate::scope::ScopeEnv;
    use crate::tensor_data::ConstantTensor;
    use crate::types::{DataType, Dimension, Shape, ValueType, dims};

    /// Harness for running a rule against a node in isolation.
    #[derive(Default)]
    pub struct RuleTest {
        types: FxHashMap<String, ValueType>,
        constants: FxHashMap<String, ConstantTensor>,
        shape_data: GeneratedShapeData,
    }

    impl RuleTest {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn input(&mut self, name: &str, value_type: ValueType) -> &mut Self {
            self.types.insert(name.to_string(), value_type);
            self
        }

        pub fn constant(&mut self, name: &str, tensor: ConstantTensor) -> &mut Self {
            self.types.insert(name.to_string(), tensor.value_type());
            self.constants.insert(name.to_string(), tensor);
            self
        }

        pub fn shape_data(&mut self, name: &str, value_type: ValueType, shape: Shape) -> &mut Self {
            self.types.insert(name.to_string(), value_type);
            self.shape_data.insert(name, shape).unwrap();
            self
        }

        /// Run `rule` for `node` and return the inferred output types.
        pub fn run(
            &mut self,
            rule: &dyn InferTypes,
            node: &Node,
        ) -> Result<Vec<ValueType>, InferError> {
            let mut ctx =
                InferenceContext::new(node, ScopeEnv::new(None, &self.types), &self.constants)
                    .with_shape_data(&self.shape_data);
            rule.infer_types(&mut ctx)?;
            Ok(ctx.into_parts().outputs.into_vec())
        }
    }

    #[test]
    fn test_resolve_index() {
        assert_eq!(resolve_index(3, 0), Some(0));
        assert_eq!(resolve_index(3, -1), Some(2));
        assert_eq!(resolve_index(3, 3), None);
        assert_eq!(resolve_index(3, -4), None);
    }

    #[test]
    fn test_resolve_axes() {
        assert_eq!(resolve_axes(4, &[-1, 0]).unwrap().as_slice(), &[0, 3]);
        assert!(matches!(
            resolve_axes(4, &[1, -3]),
            Err(InferError::ShapeInference(_))
        ));
    }

    #[test]
    fn test_merge_into_output() {
        let node = Node::new("Test", &[], &["y"]);
        let types = FxHashMap::default();
        let constants = FxHashMap::default();
        let mut ctx = InferenceContext::new(&node, ScopeEnv::new(None, &types), &constants);

        merge_into_output(&mut ctx, 0, &ValueType::tensor(DataType::Float, dims!("n", 3)))
            .unwrap();
        merge_into_output(
            &mut ctx,
            0,
            &ValueType::tensor(DataType::Float, dims!(2, Dimension::Unknown)),
        )
        .unwrap();
        assert_eq!(
            ctx.output_type(0),
            Ok(&ValueType::tensor(DataType::Float, dims!(2, 3)))
        );

        let err = merge_into_output(&mut ctx, 0, &ValueType::tensor_of(DataType::Int64));
        assert!(matches!(err, Err(InferError::TypeConflict { .. })));
    }
}
