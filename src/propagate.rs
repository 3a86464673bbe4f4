//! Data propagation: computing the values of small integer tensors which
//! describe shapes.
//!
//! Shape computations in models are often expressed as subgraphs of the form
//! `Shape -> Gather/Slice -> Concat -> Reshape`. A propagator for each of
//! these operators computes the value of the operator's output as a [`Shape`]
//! from the constant data or generated shape data of its inputs. Downstream
//! rules such as `Reshape` read the result to infer their output shapes.
//!
//! Propagators only run for operators in the default domain. They do nothing
//! if the values they need are not statically known.

use tracing::warn;

use crate::context::InferenceContext;
use crate::error::InferError;
use crate::graph::{DEFAULT_DOMAIN, canonical_domain};
use crate::ops::shape_range;
use crate::tensor_data::{ConstantTensor, TensorData};
use crate::types::{Dimension, Shape, ValueType};

/// Function which computes generated shape data for a node's outputs.
pub type DataPropagator = fn(&mut InferenceContext<'_>) -> Result<(), InferError>;

/// Return the data propagator for an operator, if it has one.
pub fn data_propagator(domain: &str, op_type: &str) -> Option<DataPropagator> {
    if canonical_domain(domain) != DEFAULT_DOMAIN {
        return None;
    }
    let propagator: DataPropagator = match op_type {
        "Cast" | "Identity" | "Squeeze" | "Unsqueeze" => propagate_from_input,
        "Concat" => propagate_concat,
        "Gather" => propagate_gather,
        "Shape" => propagate_shape,
        "Slice" => propagate_slice,
        _ => return None,
    };
    Some(propagator)
}

/// Copy the generated shape data of input 0 to output 0.
pub fn propagate_from_input(ctx: &mut InferenceContext<'_>) -> Result<(), InferError> {
    if let Some(shape) = ctx.read_generated_shape(0)? {
        let shape = shape.clone();
        ctx.record_generated_shape(0, shape)?;
    }
    Ok(())
}

/// Read a shape-bearing constant as a list of `i64`s.
fn shape_values(input: usize, tensor: &ConstantTensor) -> Result<Vec<i64>, InferError> {
    tensor
        .to_i64_vec()
        .ok_or(InferError::UnsupportedInputEncoding {
            input,
            dtype: tensor.dtype(),
        })
}

pub fn propagate_concat(ctx: &mut InferenceContext<'_>) -> Result<(), InferError> {
    let axis = ctx.require_int("axis")?;
    if axis < 0 {
        return Ok(());
    }

    match ctx.output_type(0)? {
        ValueType::Tensor(tensor) => match &tensor.shape {
            Some(shape) if shape.is_fixed() => {}
            Some(_) => return Ok(()),
            None => {
                warn!(
                    output = ctx.output_name(0)?,
                    "concat output has no shape, skipping data propagation"
                );
                return Ok(());
            }
        },
        _ => return Ok(()),
    }

    let mut dims = Vec::new();
    for i in 0..ctx.input_count() {
        if let Some(data) = ctx.input_data(i)? {
            dims.extend(shape_values(i, data)?.into_iter().map(Dimension::Fixed));
        } else if let Some(shape) = ctx.read_generated_shape(i)? {
            dims.extend(shape.iter().cloned());
        } else {
            return Ok(());
        }
    }

    if !dims.is_empty() {
        ctx.record_generated_shape(0, Shape::new(dims))?;
    }
    Ok(())
}

pub fn propagate_gather(ctx: &mut InferenceContext<'_>) -> Result<(), InferError> {
    if ctx.input_count() < 2 || ctx.attr_int("axis").unwrap_or(0) != 0 {
        return Ok(());
    }

    let Some(data) = ctx.read_generated_shape(0)? else {
        return Ok(());
    };
    let Some(indices) = ctx.input_data(1)? else {
        return Ok(());
    };
    if ctx.input_type(1)?.and_then(|t| t.shape()).is_none() {
        return Ok(());
    }
    // Only int64 indices are supported, as used by shape computations.
    let TensorData::Int64(indices) = indices.data() else {
        return Ok(());
    };

    let in_range = |index: i64| index >= 0 && (index as usize) < data.rank();
    let dims: Vec<Dimension> = match indices.as_slice() {
        [index] if in_range(*index) => vec![data[*index as usize].clone()],
        indices => indices
            .iter()
            .take_while(|&&index| in_range(index))
            .map(|&index| data[index as usize].clone())
            .collect(),
    };

    if !dims.is_empty() {
        ctx.record_generated_shape(0, Shape::new(dims))?;
    }
    Ok(())
}

pub fn propagate_shape(ctx: &mut InferenceContext<'_>) -> Result<(), InferError> {
    let Some(shape) = ctx.input_type(0)?.and_then(|t| t.shape()) else {
        return Ok(());
    };
    // `start` and `end` were added in opset 15.
    let range_attrs = ctx
        .graph_context()
        .and_then(|graph_ctx| graph_ctx.opset_imports.version(DEFAULT_DOMAIN))
        .is_none_or(|version| version >= 15);
    let range = if range_attrs {
        shape_range(ctx, shape.rank())
    } else {
        0..shape.rank()
    };
    let dims: Shape = shape[range].iter().cloned().collect();
    ctx.record_generated_shape(0, dims)?;
    Ok(())
}

/// State of an optional shape-bearing input.
enum OptionalInput<'a> {
    /// The input is omitted or its shape is unknown.
    Absent,
    Constant(&'a ConstantTensor),
    /// The input has a known shape but its value is not known statically.
    Dynamic,
}

fn optional_input<'a>(
    ctx: &InferenceContext<'a>,
    index: usize,
) -> Result<OptionalInput<'a>, InferError> {
    if index >= ctx.input_count() {
        return Ok(OptionalInput::Absent);
    }
    let has_shape = ctx.input_type(index)?.and_then(|t| t.shape()).is_some();
    Ok(match (has_shape, ctx.input_data(index)?) {
        (false, _) => OptionalInput::Absent,
        (true, Some(data)) => OptionalInput::Constant(data),
        (true, None) => OptionalInput::Dynamic,
    })
}

pub fn propagate_slice(ctx: &mut InferenceContext<'_>) -> Result<(), InferError> {
    if ctx.input_count() < 3 {
        return Ok(());
    }
    let (Some(starts), Some(ends)) = (ctx.input_data(1)?, ctx.input_data(2)?) else {
        return Ok(());
    };

    let axes = match optional_input(ctx, 3)? {
        OptionalInput::Absent => None,
        OptionalInput::Constant(axes) => Some(axes),
        OptionalInput::Dynamic => return Ok(()),
    };
    let steps = match optional_input(ctx, 4)? {
        OptionalInput::Absent => None,
        OptionalInput::Constant(steps) => Some(steps),
        OptionalInput::Dynamic => return Ok(()),
    };

    let starts = shape_values(1, starts)?;
    let ends = shape_values(2, ends)?;
    if starts.len() != ends.len() {
        return Err(InferError::ShapeInference(format!(
            "slice has {} starts but {} ends",
            starts.len(),
            ends.len()
        )));
    }
    let axes = match axes {
        Some(axes) => shape_values(3, axes)?,
        None => (0..starts.len() as i64).collect(),
    };
    if axes.len() != starts.len() {
        return Err(InferError::ShapeInference(format!(
            "slice has {} axes but {} starts",
            axes.len(),
            starts.len()
        )));
    }
    let steps = match steps {
        Some(steps) => shape_values(4, steps)?,
        None => vec![1; starts.len()],
    };
    if steps.len() != starts.len() {
        return Err(InferError::ShapeInference(format!(
            "slice has {} steps but {} starts",
            steps.len(),
            starts.len()
        )));
    }

    if axes != [0] || steps.first() != Some(&1) {
        return Ok(());
    }
    let Some(data) = ctx.read_generated_shape(0)? else {
        return Ok(());
    };

    let len = data.rank() as i64;
    let resolve = |bound: i64| {
        let bound = if bound < 0 { bound + len } else { bound };
        bound.clamp(0, len) as usize
    };
    let (start, end) = (resolve(starts[0]), resolve(ends[0]));
    let dims: Shape = data[start..end.max(start)].iter().cloned().collect();
    ctx.record_generated_shape(0, dims)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use rustc_hash::FxHashMap;
    use shapeflow_testing::TestCases;

    use super::{
        data_propagator, propagate_concat, propagate_gather, propagate_shape, propagate_slice,
    };
    use crate::context::{GeneratedShapeData, InferenceContext};
    use crate::error::InferError;
    use crate::graph::{AttributeValue, Node};
    use crate::scope::ScopeEnv;
    use crate::tensor_data::{ConstantTensor, TensorData};
    use crate::types::{DataType, Shape, ValueType, dims};

    /// Values available to a propagator under test.
    #[derive(Default)]
    struct Env {
        types: FxHashMap<String, ValueType>,
        constants: FxHashMap<String, ConstantTensor>,
        shape_data: GeneratedShapeData,
    }

    impl Env {
        fn input(&mut self, name: &str, value_type: ValueType) {
            self.types.insert(name.to_string(), value_type);
        }

        fn constant(&mut self, name: &str, tensor: ConstantTensor) {
            self.types.insert(name.to_string(), tensor.value_type());
            self.constants.insert(name.to_string(), tensor);
        }

        fn shape_data(&mut self, name: &str, shape: Shape) {
            self.types.insert(
                name.to_string(),
                ValueType::tensor(DataType::Int64, dims!(shape.rank())),
            );
            self.shape_data.insert(name, shape).unwrap();
        }

        /// Run `propagator` for `node`, with the node's output type set to
        /// `output_type`. Returns the generated shape data for output 0.
        fn run(
            &mut self,
            node: &Node,
            output_type: ValueType,
            propagator: super::DataPropagator,
        ) -> Result<Option<Shape>, InferError> {
            let mut ctx =
                InferenceContext::new(node, ScopeEnv::new(None, &self.types), &self.constants)
                    .with_shape_data(&self.shape_data);
            *ctx.output_type_mut(0)? = output_type;
            propagator(&mut ctx)?;
            Ok(ctx.into_parts().shape_data.remove(&node.outputs[0]))
        }
    }

    fn i64_vec_type(len: usize) -> ValueType {
        ValueType::tensor(DataType::Int64, dims!(len))
    }

    #[test]
    fn test_data_propagator_lookup() {
        assert!(data_propagator("", "Concat").is_some());
        assert!(data_propagator("ai.onnx", "Gather").is_some());
        assert!(data_propagator("com.example", "Concat").is_none());
        assert!(data_propagator("", "Add").is_none());
    }

    #[test]
    fn test_propagate_gather() {
        #[derive(Debug)]
        struct Case {
            indices: ConstantTensor,
            axis: Option<i64>,
            expected: Option<Shape>,
        }

        let cases = [
            Case {
                indices: ConstantTensor::i64_scalar(2),
                axis: None,
                expected: Some(dims!(6)),
            },
            Case {
                indices: ConstantTensor::i64_vec(&[3, 0]),
                axis: Some(0),
                expected: Some(dims!(7, 4)),
            },
            // Emission stops at the first index which is out of range.
            Case {
                indices: ConstantTensor::i64_vec(&[1, 9, 2]),
                axis: None,
                expected: Some(dims!(5)),
            },
            Case {
                indices: ConstantTensor::i64_scalar(4),
                axis: None,
                expected: None,
            },
            Case {
                indices: ConstantTensor::i64_scalar(-1),
                axis: None,
                expected: None,
            },
            Case {
                indices: ConstantTensor::from_vec(TensorData::Int32(vec![0])),
                axis: None,
                expected: None,
            },
            Case {
                indices: ConstantTensor::i64_scalar(0),
                axis: Some(1),
                expected: None,
            },
        ];

        cases.test_each(|case| {
            let mut env = Env::default();
            env.shape_data("data", dims!(4, 5, 6, 7));
            env.constant("indices", case.indices.clone());

            let mut node = Node::new("Gather", &["data", "indices"], &["out"]);
            if let Some(axis) = case.axis {
                node = node.with_attr("axis", AttributeValue::Int(axis));
            }
            let result = env.run(&node, ValueType::Unknown, propagate_gather).unwrap();
            assert_eq!(result, case.expected);
        });
    }

    #[test]
    fn test_propagate_slice() {
        #[derive(Debug)]
        struct Case {
            starts: Vec<i64>,
            ends: Vec<i64>,
            axes: Option<Vec<i64>>,
            expected: Result<Option<Shape>, InferError>,
        }

        let cases = [
            Case {
                starts: vec![1],
                ends: vec![3],
                axes: Some(vec![0]),
                expected: Ok(Some(dims!(5, 6))),
            },
            Case {
                starts: vec![1],
                ends: vec![i64::MAX],
                axes: None,
                expected: Ok(Some(dims!(5, 6, 7))),
            },
            Case {
                starts: vec![-2],
                ends: vec![-1],
                axes: None,
                expected: Ok(Some(dims!(6))),
            },
            // An empty range is still recorded.
            Case {
                starts: vec![3],
                ends: vec![1],
                axes: None,
                expected: Ok(Some(Shape::default())),
            },
            Case {
                starts: vec![0],
                ends: vec![1],
                axes: Some(vec![1]),
                expected: Ok(None),
            },
            Case {
                starts: vec![0, 1],
                ends: vec![1],
                axes: None,
                expected: Err(InferError::ShapeInference(
                    "slice has 2 starts but 1 ends".into(),
                )),
            },
            Case {
                starts: vec![0],
                ends: vec![1],
                axes: Some(vec![0, 1]),
                expected: Err(InferError::ShapeInference(
                    "slice has 2 axes but 1 starts".into(),
                )),
            },
        ];

        cases.test_each(|case| {
            let mut env = Env::default();
            env.shape_data("data", dims!(4, 5, 6, 7));
            env.constant("starts", ConstantTensor::i64_vec(&case.starts));
            env.constant("ends", ConstantTensor::i64_vec(&case.ends));

            let mut inputs = vec!["data", "starts", "ends"];
            if let Some(axes) = &case.axes {
                env.constant("axes", ConstantTensor::i64_vec(axes));
                inputs.push("axes");
            }
            let node = Node::new("Slice", &inputs, &["out"]);
            let result = env.run(&node, ValueType::Unknown, propagate_slice);
            assert_eq!(result, case.expected);
        });
    }

    #[test]
    fn test_propagate_slice_float_bounds() {
        let mut env = Env::default();
        env.shape_data("data", dims!(4, 5));
        env.constant(
            "starts",
            ConstantTensor::from_vec(TensorData::Float(vec![0.0])),
        );
        env.constant("ends", ConstantTensor::i64_vec(&[1]));
        let node = Node::new("Slice", &["data", "starts", "ends"], &["out"]);
        assert_eq!(
            env.run(&node, ValueType::Unknown, propagate_slice),
            Err(InferError::UnsupportedInputEncoding {
                input: 1,
                dtype: DataType::Float
            })
        );
    }

    #[test]
    fn test_propagate_slice_steps_length() {
        let mut env = Env::default();
        env.shape_data("data", dims!(4, 5));
        env.constant("starts", ConstantTensor::i64_vec(&[0]));
        env.constant("ends", ConstantTensor::i64_vec(&[1]));
        env.constant("axes", ConstantTensor::i64_vec(&[0]));
        env.constant("steps", ConstantTensor::i64_vec(&[1, 5]));
        let node = Node::new("Slice", &["data", "starts", "ends", "axes", "steps"], &["out"]);
        assert_eq!(
            env.run(&node, ValueType::Unknown, propagate_slice),
            Err(InferError::ShapeInference(
                "slice has 2 steps but 1 starts".into()
            ))
        );
    }

    #[test]
    fn test_propagate_shape() {
        let mut env = Env::default();
        env.input(
            "x",
            ValueType::tensor(DataType::Float, dims!("batch", 3, 224)),
        );

        let node = Node::new("Shape", &["x"], &["out"]);
        let result = env.run(&node, i64_vec_type(3), propagate_shape);
        assert_eq!(result, Ok(Some(dims!("batch", 3, 224))));

        let node = Node::new("Shape", &["x"], &["out"])
            .with_attr("start", AttributeValue::Int(1))
            .with_attr("end", AttributeValue::Int(-1));
        let result = env.run(&node, i64_vec_type(1), propagate_shape);
        assert_eq!(result, Ok(Some(dims!(3))));
    }

    #[test]
    fn test_propagate_concat() {
        let mut env = Env::default();
        env.shape_data("a", dims!("batch", 3));
        env.constant("b", ConstantTensor::i64_vec(&[7]));
        let node = Node::new("Concat", &["a", "b"], &["out"])
            .with_attr("axis", AttributeValue::Int(0));

        let result = env.run(&node, i64_vec_type(3), propagate_concat).unwrap();
        assert_eq!(result, Some(dims!("batch", 3, 7)));
    }

    #[test]
    fn test_propagate_concat_skips() {
        #[derive(Debug)]
        struct Case {
            inputs: &'static [&'static str],
            axis: Option<i64>,
            output_type: ValueType,
            expected: Result<Option<Shape>, InferError>,
        }

        let cases = [
            // Input "missing" has neither constant nor generated data.
            Case {
                inputs: &["a", "missing"],
                axis: Some(0),
                output_type: i64_vec_type(3),
                expected: Ok(None),
            },
            Case {
                inputs: &["a"],
                axis: Some(-1),
                output_type: i64_vec_type(2),
                expected: Ok(None),
            },
            Case {
                inputs: &["a"],
                axis: Some(0),
                output_type: ValueType::tensor(DataType::Int64, dims!("n")),
                expected: Ok(None),
            },
            Case {
                inputs: &["a"],
                axis: Some(0),
                output_type: ValueType::tensor_of(DataType::Int64),
                expected: Ok(None),
            },
            Case {
                inputs: &["a"],
                axis: None,
                output_type: i64_vec_type(2),
                expected: Err(InferError::MissingAttribute {
                    name: "axis".into(),
                }),
            },
        ];

        cases.test_each(|case| {
            let mut env = Env::default();
            env.shape_data("a", dims!(2, 3));
            env.types.insert("missing".into(), i64_vec_type(1));

            let mut node = Node::new("Concat", case.inputs, &["out"]);
            if let Some(axis) = case.axis {
                node = node.with_attr("axis", AttributeValue::Int(axis));
            }
            let result = env.run(&node, case.output_type.clone(), propagate_concat);
            assert_eq!(result, case.expected);
        });
    }
}
