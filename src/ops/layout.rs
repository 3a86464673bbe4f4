use std::borrow::Cow;
use std::ops::Range;

use crate::context::{InferTypes, InferenceContext};
use crate::error::InferError;
use crate::graph::{AttributeValue, Node};
use crate::ops::{
    input_elem_type, input_shape, output_tensor, propagate_elem_type, propagate_shape,
    resolve_axes, resolve_axis, set_output_shape,
};
use crate::tensor_data::{ConstantTensor, TensorData};
use crate::types::{DataType, Dimension, Shape};

/// Identity operator.
///
/// The output has the same type as the input, which need not be a tensor.
pub struct Identity;

impl InferTypes for Identity {
    fn infer_types(&self, ctx: &mut InferenceContext<'_>) -> Result<(), InferError> {
        if let Some(input) = ctx.input_type(0)? {
            *ctx.output_type_mut(0)? = input.clone();
        }
        Ok(())
    }
}

/// Cast operator.
pub struct Cast;

impl InferTypes for Cast {
    fn infer_types(&self, ctx: &mut InferenceContext<'_>) -> Result<(), InferError> {
        let code = ctx.require_int("to")?;
        let to = DataType::from_code(code).ok_or_else(|| {
            InferError::TypeInference(format!("unsupported cast target type {}", code))
        })?;
        output_tensor(ctx, 0)?.elem_type = Some(to);
        propagate_shape(ctx, 0, 0)
    }
}

/// Return the value of a `Constant` node, if it is given by an attribute
/// this crate understands.
pub fn constant_node_value(node: &Node) -> Option<ConstantTensor> {
    node.attributes.iter().find_map(|attr| {
        let tensor = match (attr.name.as_str(), &attr.value) {
            ("value", AttributeValue::Tensor(tensor)) => tensor.clone(),
            ("value_int", AttributeValue::Int(value)) => ConstantTensor::i64_scalar(*value),
            ("value_ints", AttributeValue::Ints(values)) => ConstantTensor::i64_vec(values),
            ("value_float", AttributeValue::Float(value)) => {
                ConstantTensor::from_scalar(TensorData::Float(vec![*value]))?
            }
            ("value_floats", AttributeValue::Floats(values)) => {
                ConstantTensor::from_vec(TensorData::Float(values.clone()))
            }
            _ => return None,
        };
        Some(tensor)
    })
}

/// Constant operator.
pub struct Constant;

impl InferTypes for Constant {
    fn infer_types(&self, ctx: &mut InferenceContext<'_>) -> Result<(), InferError> {
        let value =
            constant_node_value(ctx.node()).ok_or_else(|| InferError::missing_attr("value"))?;
        *ctx.output_type_mut(0)? = value.value_type();
        Ok(())
    }
}

/// Shape operator.
///
/// Named `ShapeOp` to avoid confusion with [`Shape`].
pub struct ShapeOp {
    /// Whether the `start` and `end` attributes select a range of
    /// dimensions (opset 15+).
    pub range_attrs: bool,
}

impl InferTypes for ShapeOp {
    fn infer_types(&self, ctx: &mut InferenceContext<'_>) -> Result<(), InferError> {
        let len = match input_shape(ctx, 0)? {
            Some(shape) => {
                let range = if self.range_attrs {
                    shape_range(ctx, shape.rank())
                } else {
                    0..shape.rank()
                };
                Dimension::Fixed(range.len() as i64)
            }
            None => Dimension::Unknown,
        };
        let output = output_tensor(ctx, 0)?;
        output.elem_type = Some(DataType::Int64);
        output.shape = Some(Shape::new(vec![len]));
        Ok(())
    }
}

/// Return the dimensions of a rank `rank` input selected by the `start` and
/// `end` attributes of a `Shape` node.
///
/// Negative values count back from the last dimension. Out of range values
/// are clamped, and an empty range is returned if `end <= start`.
pub(crate) fn shape_range(ctx: &InferenceContext<'_>, rank: usize) -> Range<usize> {
    let rank = rank as i64;
    let resolve = |value: i64| {
        let value = if value < 0 { value + rank } else { value };
        value.clamp(0, rank) as usize
    };
    let start = resolve(ctx.attr_int("start").unwrap_or(0));
    let end = resolve(ctx.attr_int("end").unwrap_or(rank));
    start..end.max(start)
}

/// Reshape operator.
///
/// The target shape is read from the constant value of the `shape` input, or
/// from its generated shape data when it was computed from other shapes.
pub struct Reshape;

impl InferTypes for Reshape {
    fn infer_types(&self, ctx: &mut InferenceContext<'_>) -> Result<(), InferError> {
        propagate_elem_type(ctx, 0, 0)?;

        let target: Option<Shape> = if let Some(data) = ctx.input_data(1)? {
            let sizes = data.to_i64_vec().ok_or(InferError::UnsupportedInputEncoding {
                input: 1,
                dtype: data.dtype(),
            })?;
            Some(Shape::from_fixed(&sizes))
        } else {
            ctx.read_generated_shape(1)?.cloned()
        };

        let Some(target) = target else {
            // The output rank is the length of the target shape.
            if let Some(Some(len)) = input_shape(ctx, 1)?.map(|s| s.first().and_then(|d| d.fixed()))
            {
                set_output_shape(ctx, 0, Shape::unknown_dims(len.max(0) as usize))?;
            }
            return Ok(());
        };

        let allow_zero = ctx.attr_int("allowzero").unwrap_or(0) != 0;
        let input = input_shape(ctx, 0)?;
        let mut infer_dim = None;
        let mut dims = Vec::with_capacity(target.rank());

        for (i, dim) in target.iter().enumerate() {
            let dim = match dim {
                Dimension::Fixed(-1) => {
                    if infer_dim.is_some() {
                        return Err(InferError::ShapeInference(
                            "reshape target has more than one -1 dimension".to_string(),
                        ));
                    }
                    infer_dim = Some(i);
                    Dimension::Unknown
                }
                Dimension::Fixed(0) if !allow_zero => match input {
                    Some(input) if i < input.rank() => input[i].clone(),
                    Some(input) => {
                        return Err(InferError::ShapeInference(format!(
                            "reshape target copies dimension {} of a rank {} input",
                            i,
                            input.rank()
                        )));
                    }
                    None => Dimension::Unknown,
                },
                Dimension::Fixed(size) if *size < 0 => {
                    return Err(InferError::ShapeInference(format!(
                        "invalid reshape target size {}",
                        size
                    )));
                }
                dim => dim.clone(),
            };
            dims.push(dim);
        }

        // Resolve the -1 dimension when all other sizes are known.
        if let (Some(index), Some(input_len)) = (
            infer_dim,
            input.and_then(|s| s.to_fixed()).map(|s| s.iter().product::<i64>()),
        ) {
            let known: Option<i64> = dims
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != index)
                .map(|(_, d)| d.fixed())
                .product();
            if let Some(known) = known {
                if known != 0 && input_len % known == 0 {
                    dims[index] = Dimension::Fixed(input_len / known);
                } else if known != 0 {
                    return Err(InferError::ShapeInference(format!(
                        "cannot reshape {} elements with target {}",
                        input_len, target
                    )));
                }
            }
        }

        set_output_shape(ctx, 0, Shape::new(dims))
    }
}

/// Axes of a `Squeeze` or `Unsqueeze`, read from an input or attribute.
enum Axes<'a> {
    Absent,
    Known(Cow<'a, [i64]>),
    /// Axes are given by an input whose value is not known.
    Unknown,
}

fn read_axes<'a>(ctx: &InferenceContext<'a>, axes_input: bool) -> Result<Axes<'a>, InferError> {
    if !axes_input {
        return Ok(match ctx.attr_ints("axes") {
            Some(axes) => Axes::Known(axes.into()),
            None => Axes::Absent,
        });
    }
    if !ctx.has_input(1) {
        return Ok(Axes::Absent);
    }
    match ctx.input_data(1)? {
        Some(data) => {
            let axes = data.to_i64_vec().ok_or(InferError::UnsupportedInputEncoding {
                input: 1,
                dtype: data.dtype(),
            })?;
            Ok(Axes::Known(axes.into()))
        }
        None => Ok(Axes::Unknown),
    }
}

/// Squeeze operator.
///
/// Opset 13 and later read the axes from an input instead of an attribute.
pub struct Squeeze {
    pub axes_input: bool,
}

impl InferTypes for Squeeze {
    fn infer_types(&self, ctx: &mut InferenceContext<'_>) -> Result<(), InferError> {
        propagate_elem_type(ctx, 0, 0)?;
        let Some(input) = input_shape(ctx, 0)? else {
            return Ok(());
        };

        let dims: Vec<Dimension> = match read_axes(ctx, self.axes_input)? {
            Axes::Known(axes) => {
                let axes = resolve_axes(input.rank(), &axes)?;
                for &axis in &axes {
                    if let Dimension::Fixed(size) = input[axis] {
                        if size != 1 {
                            return Err(InferError::ShapeInference(format!(
                                "cannot squeeze dimension {} of size {}",
                                axis, size
                            )));
                        }
                    }
                }
                input
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| !axes.contains(i))
                    .map(|(_, d)| d.clone())
                    .collect()
            }
            Axes::Absent => {
                // All size-1 dims are removed, which requires knowing every
                // size.
                if !input.is_fixed() {
                    return Ok(());
                }
                input
                    .iter()
                    .filter(|d| d.fixed() != Some(1))
                    .cloned()
                    .collect()
            }
            Axes::Unknown => return Ok(()),
        };
        set_output_shape(ctx, 0, Shape::new(dims))
    }
}

/// Unsqueeze operator.
///
/// Opset 13 and later read the axes from an input instead of an attribute.
pub struct Unsqueeze {
    pub axes_input: bool,
}

impl InferTypes for Unsqueeze {
    fn infer_types(&self, ctx: &mut InferenceContext<'_>) -> Result<(), InferError> {
        propagate_elem_type(ctx, 0, 0)?;
        let axes = match read_axes(ctx, self.axes_input)? {
            Axes::Known(axes) => axes,
            Axes::Absent => return Err(InferError::missing_attr("axes")),
            Axes::Unknown => return Ok(()),
        };
        let Some(input) = input_shape(ctx, 0)? else {
            return Ok(());
        };

        let out_rank = input.rank() + axes.len();
        let axes = resolve_axes(out_rank, &axes)?;
        let mut input_dims = input.iter();
        let dims: Vec<Dimension> = (0..out_rank)
            .map(|i| {
                if axes.contains(&i) {
                    Dimension::Fixed(1)
                } else {
                    input_dims.next().cloned().unwrap_or_default()
                }
            })
            .collect();
        set_output_shape(ctx, 0, Shape::new(dims))
    }
}

/// Concat operator.
pub struct Concat;

impl InferTypes for Concat {
    fn infer_types(&self, ctx: &mut InferenceContext<'_>) -> Result<(), InferError> {
        let axis = ctx.require_int("axis")?;

        let mut elem_type = None;
        let mut shapes = Vec::with_capacity(ctx.input_count());
        let mut all_shapes_known = true;
        for i in 0..ctx.input_count() {
            match (elem_type, input_elem_type(ctx, i)?) {
                (Some(a), Some(b)) if a != b => {
                    return Err(InferError::TypeInference(format!(
                        "concat inputs have different element types {} and {}",
                        a, b
                    )));
                }
                (None, b) => elem_type = b,
                _ => {}
            }
            match input_shape(ctx, i)? {
                Some(shape) => shapes.push(shape),
                None => all_shapes_known = false,
            }
        }
        if let Some(elem_type) = elem_type {
            output_tensor(ctx, 0)?.elem_type = Some(elem_type);
        }

        let Some(rank) = shapes.first().map(|s| s.rank()) else {
            return Ok(());
        };
        if shapes.iter().any(|s| s.rank() != rank) {
            return Err(InferError::ShapeInference(
                "concat inputs have different ranks".to_string(),
            ));
        }
        let axis = resolve_axis(rank, axis)?;
        if !all_shapes_known {
            return set_output_shape(ctx, 0, Shape::unknown_dims(rank));
        }

        let dims = (0..rank)
            .map(|d| {
                if d == axis {
                    let sizes: Option<i64> = shapes.iter().map(|s| s[d].fixed()).sum();
                    sizes.map(Dimension::Fixed).unwrap_or_default()
                } else {
                    // Prefer a fixed size, then a symbol.
                    let dims = || shapes.iter().map(|s| &s[d]);
                    dims()
                        .find(|dim| dim.fixed().is_some())
                        .or_else(|| dims().find(|dim| dim.symbol().is_some()))
                        .cloned()
                        .unwrap_or_default()
                }
            })
            .collect();
        set_output_shape(ctx, 0, dims)
    }
}

/// Gather operator.
pub struct Gather;

impl InferTypes for Gather {
    fn infer_types(&self, ctx: &mut InferenceContext<'_>) -> Result<(), InferError> {
        propagate_elem_type(ctx, 0, 0)?;
        let (Some(data), Some(indices)) = (input_shape(ctx, 0)?, input_shape(ctx, 1)?) else {
            return Ok(());
        };
        if let Some(dtype) = input_elem_type(ctx, 1)? {
            if !matches!(dtype, DataType::Int32 | DataType::Int64) {
                return Err(InferError::TypeInference(format!(
                    "gather indices must be int32 or int64, got {}",
                    dtype
                )));
            }
        }

        let axis = resolve_axis(data.rank(), ctx.attr_int("axis").unwrap_or(0))?;
        let dims: Shape = data[..axis]
            .iter()
            .chain(indices.iter())
            .chain(data[axis + 1..].iter())
            .cloned()
            .collect();
        set_output_shape(ctx, 0, dims)
    }
}

#[cfg(test)]
mod tests {
    use shapeflow_testing::TestCases;

    use super::{Cast, Concat, Constant, Gather, Identity, Reshape, ShapeOp, Squeeze, Unsqueeze};
    use crate::context::InferTypes;
    use crate::error::InferError;
    use crate::graph::{AttributeValue, Node};
    use crate::ops::RuleTest;
    use crate::tensor_data::{ConstantTensor, TensorData};
    use crate::types::{DataType, Dimension, Shape, ValueType, dims};

    fn f32_tensor(shape: Shape) -> ValueType {
        ValueType::tensor(DataType::Float, shape)
    }

    #[test]
    fn test_identity_and_cast() {
        let mut test = RuleTest::new();
        let seq = ValueType::Sequence(Box::new(f32_tensor(dims!(2))));
        test.input("s", seq.clone());
        test.input("x", f32_tensor(dims!("n", 4)));

        let node = Node::new("Identity", &["s"], &["y"]);
        assert_eq!(test.run(&Identity, &node), Ok(vec![seq]));

        let node = Node::new("Cast", &["x"], &["y"])
            .with_attr("to", AttributeValue::Int(DataType::Int64.code()));
        assert_eq!(
            test.run(&Cast, &node),
            Ok(vec![ValueType::tensor(DataType::Int64, dims!("n", 4))])
        );

        let node = Node::new("Cast", &["x"], &["y"]);
        assert_eq!(
            test.run(&Cast, &node),
            Err(InferError::MissingAttribute { name: "to".into() })
        );
    }

    #[test]
    fn test_constant() {
        let mut test = RuleTest::new();
        let node = Node::new("Constant", &[], &["c"]).with_attr(
            "value",
            AttributeValue::Tensor(
                ConstantTensor::new(vec![2, 2], TensorData::Float(vec![0.; 4])).unwrap(),
            ),
        );
        assert_eq!(test.run(&Constant, &node), Ok(vec![f32_tensor(dims!(2, 2))]));

        let node = Node::new("Constant", &[], &["c"])
            .with_attr("value_ints", AttributeValue::Ints(vec![1, 2, 3]));
        assert_eq!(
            test.run(&Constant, &node),
            Ok(vec![ValueType::tensor(DataType::Int64, dims!(3))])
        );

        let node = Node::new("Constant", &[], &["c"]);
        assert!(matches!(
            test.run(&Constant, &node),
            Err(InferError::MissingAttribute { .. })
        ));
    }

    #[test]
    fn test_shape() {
        let mut test = RuleTest::new();
        test.input("x", f32_tensor(dims!("batch", 3, 224)));
        test.input("y", ValueType::tensor_of(DataType::Float));

        let node = Node::new("Shape", &["x"], &["s"]);
        assert_eq!(
            test.run(&ShapeOp { range_attrs: false }, &node),
            Ok(vec![ValueType::tensor(DataType::Int64, dims!(3))])
        );
        let node = Node::new("Shape", &["y"], &["s"]);
        assert_eq!(
            test.run(&ShapeOp { range_attrs: true }, &node),
            Ok(vec![ValueType::tensor(
                DataType::Int64,
                dims!(Dimension::Unknown)
            )])
        );

        // Range attributes are ignored before they were introduced.
        let node = Node::new("Shape", &["x"], &["s"]).with_attr("start", AttributeValue::Int(1));
        assert_eq!(
            test.run(&ShapeOp { range_attrs: false }, &node),
            Ok(vec![ValueType::tensor(DataType::Int64, dims!(3))])
        );
    }

    #[test]
    fn test_shape_range() {
        #[derive(Debug)]
        struct Case {
            start: Option<i64>,
            end: Option<i64>,
            expected: i64,
        }

        let cases = [
            Case {
                start: Some(1),
                end: None,
                expected: 2,
            },
            Case {
                start: None,
                end: Some(-1),
                expected: 2,
            },
            Case {
                start: Some(-2),
                end: Some(-1),
                expected: 1,
            },
            Case {
                start: Some(-10),
                end: Some(10),
                expected: 3,
            },
            Case {
                start: Some(2),
                end: Some(1),
                expected: 0,
            },
        ];

        cases.test_each(|case| {
            let mut test = RuleTest::new();
            test.input("x", f32_tensor(dims!("batch", 3, 224)));
            let mut node = Node::new("Shape", &["x"], &["s"]);
            if let Some(start) = case.start {
                node = node.with_attr("start", AttributeValue::Int(start));
            }
            if let Some(end) = case.end {
                node = node.with_attr("end", AttributeValue::Int(end));
            }
            assert_eq!(
                test.run(&ShapeOp { range_attrs: true }, &node),
                Ok(vec![ValueType::tensor(DataType::Int64, dims!(case.expected))])
            );
        })
    }

    #[test]
    fn test_reshape() {
        #[derive(Debug)]
        struct Case {
            input: Shape,
            target: Vec<i64>,
            expected: Result<Shape, InferError>,
        }

        let cases = [
            Case {
                input: dims!(2, 3, 4),
                target: vec![6, 4],
                expected: Ok(dims!(6, 4)),
            },
            Case {
                input: dims!(2, 3, 4),
                target: vec![-1, 4],
                expected: Ok(dims!(6, 4)),
            },
            Case {
                input: dims!("batch", 3, 4),
                target: vec![0, -1],
                expected: Ok(dims!("batch", Dimension::Unknown)),
            },
            Case {
                input: dims!(2, 3, 4),
                target: vec![0, 0, -1],
                expected: Ok(dims!(2, 3, 4)),
            },
            Case {
                input: dims!(2, 3, 4),
                target: vec![-1, -1],
                expected: Err(InferError::ShapeInference(
                    "reshape target has more than one -1 dimension".into(),
                )),
            },
            Case {
                input: dims!(2, 3, 4),
                target: vec![5, -1],
                expected: Err(InferError::ShapeInference(
                    "cannot reshape 24 elements with target [5, -1]".into(),
                )),
            },
        ];

        cases.test_each(|case| {
            let mut test = RuleTest::new();
            test.input("x", f32_tensor(case.input.clone()));
            test.constant("shape", ConstantTensor::i64_vec(&case.target));
            let node = Node::new("Reshape", &["x", "shape"], &["y"]);
            let result = test.run(&Reshape, &node);
            assert_eq!(result, case.expected.clone().map(|s| vec![f32_tensor(s)]));
        });
    }

    #[test]
    fn test_reshape_from_shape_data() {
        let mut test = RuleTest::new();
        test.input("x", f32_tensor(dims!("batch", 12)));
        test.shape_data(
            "shape",
            ValueType::tensor(DataType::Int64, dims!(3)),
            dims!("batch", 3, 4),
        );
        test.input("dynamic", ValueType::tensor(DataType::Int64, dims!(2)));

        let node = Node::new("Reshape", &["x", "shape"], &["y"]);
        assert_eq!(
            test.run(&Reshape, &node),
            Ok(vec![f32_tensor(dims!("batch", 3, 4))])
        );

        // Without a value for the target shape, only the rank is known.
        let node = Node::new("Reshape", &["x", "dynamic"], &["y"]);
        assert_eq!(
            test.run(&Reshape, &node),
            Ok(vec![f32_tensor(Shape::unknown_dims(2))])
        );
    }

    #[test]
    fn test_squeeze_unsqueeze() {
        #[derive(Debug)]
        struct Case {
            op: &'static str,
            axes_input: bool,
            input: Shape,
            axes: Option<Vec<i64>>,
            expected: Result<Option<Shape>, InferError>,
        }

        let cases = [
            Case {
                op: "Squeeze",
                axes_input: false,
                input: dims!(1, "n", 1),
                axes: Some(vec![0, -1]),
                expected: Ok(Some(dims!("n"))),
            },
            Case {
                op: "Squeeze",
                axes_input: true,
                input: dims!(1, 5, 1),
                axes: None,
                expected: Ok(Some(dims!(5))),
            },
            Case {
                op: "Squeeze",
                axes_input: true,
                input: dims!(1, "n"),
                axes: None,
                expected: Ok(None),
            },
            Case {
                op: "Squeeze",
                axes_input: true,
                input: dims!(2, 3),
                axes: Some(vec![0]),
                expected: Err(InferError::ShapeInference(
                    "cannot squeeze dimension 0 of size 2".into(),
                )),
            },
            Case {
                op: "Unsqueeze",
                axes_input: true,
                input: dims!("n", 3),
                axes: Some(vec![0, -1]),
                expected: Ok(Some(dims!(1, "n", 3, 1))),
            },
            Case {
                op: "Unsqueeze",
                axes_input: false,
                input: dims!(3),
                axes: Some(vec![1]),
                expected: Ok(Some(dims!(3, 1))),
            },
            Case {
                op: "Unsqueeze",
                axes_input: false,
                input: dims!(3),
                axes: None,
                expected: Err(InferError::MissingAttribute {
                    name: "axes".into(),
                }),
            },
        ];

        cases.test_each(|case| {
            let mut test = RuleTest::new();
            test.input("x", f32_tensor(case.input.clone()));

            let mut node = Node::new(case.op, &["x"], &["y"]);
            if let Some(axes) = &case.axes {
                if case.axes_input {
                    test.constant("axes", ConstantTensor::i64_vec(axes));
                    node.inputs.push("axes".to_string());
                } else {
                    node = node.with_attr("axes", AttributeValue::Ints(axes.clone()));
                }
            }

            let squeeze = Squeeze {
                axes_input: case.axes_input,
            };
            let unsqueeze = Unsqueeze {
                axes_input: case.axes_input,
            };
            let rule: &dyn InferTypes = if case.op == "Squeeze" {
                &squeeze
            } else {
                &unsqueeze
            };
            let expected = case.expected.clone().map(|shape| {
                vec![match shape {
                    Some(shape) => f32_tensor(shape),
                    None => ValueType::tensor_of(DataType::Float),
                }]
            });
            assert_eq!(test.run(rule, &node), expected);
        });
    }

    #[test]
    fn test_concat() {
        let mut test = RuleTest::new();
        test.input("a", f32_tensor(dims!("batch", 2)));
        test.input("b", f32_tensor(dims!(4, 3)));
        test.input("c", f32_tensor(dims!("batch", "n")));
        test.input("d", ValueType::tensor_of(DataType::Float));
        test.input("i", ValueType::tensor(DataType::Int64, dims!(4, 3)));

        let concat = |inputs: &[&str], axis: i64| {
            Node::new("Concat", inputs, &["y"]).with_attr("axis", AttributeValue::Int(axis))
        };

        assert_eq!(
            test.run(&Concat, &concat(&["a", "b"], 1)),
            Ok(vec![f32_tensor(dims!(4, 5))])
        );
        assert_eq!(
            test.run(&Concat, &concat(&["a", "c"], -1)),
            Ok(vec![f32_tensor(dims!("batch", Dimension::Unknown))])
        );
        assert_eq!(
            test.run(&Concat, &concat(&["a", "d"], 0)),
            Ok(vec![f32_tensor(Shape::unknown_dims(2))])
        );
        assert!(matches!(
            test.run(&Concat, &concat(&["a", "i"], 0)),
            Err(InferError::TypeInference(_))
        ));
        assert!(matches!(
            test.run(&Concat, &Node::new("Concat", &["a"], &["y"])),
            Err(InferError::MissingAttribute { .. })
        ));
    }

    #[test]
    fn test_gather() {
        let mut test = RuleTest::new();
        test.input("data", f32_tensor(dims!("batch", 10, 3)));
        test.input("indices", ValueType::tensor(DataType::Int64, dims!(2, 5)));
        test.constant("scalar", ConstantTensor::i64_scalar(1));

        let node = Node::new("Gather", &["data", "indices"], &["y"])
            .with_attr("axis", AttributeValue::Int(1));
        assert_eq!(
            test.run(&Gather, &node),
            Ok(vec![f32_tensor(dims!("batch", 2, 5, 3))])
        );

        let node = Node::new("Gather", &["data", "scalar"], &["y"]);
        assert_eq!(test.run(&Gather, &node), Ok(vec![f32_tensor(dims!(10, 3))]));
    }
}
