use crate::context::{InferTypes, InferenceContext};
use crate::error::InferError;
use crate::ops::{input_elem_type, input_shape, output_tensor, set_output_shape};
use crate::types::{Dimension, Shape};

/// Shape inference for broadcasting binary operators (`Add`, `Sub`, `Mul`,
/// `Div`).
///
/// The output shape is the result of broadcasting the two input shapes
/// together following ONNX's
/// [broadcasting rules](https://onnx.ai/onnx/repo-docs/Broadcasting.html).
pub struct BinaryOp;

impl InferTypes for BinaryOp {
    fn infer_types(&self, ctx: &mut InferenceContext<'_>) -> Result<(), InferError> {
        match (input_elem_type(ctx, 0)?, input_elem_type(ctx, 1)?) {
            (Some(a), Some(b)) if a != b => {
                return Err(InferError::TypeInference(format!(
                    "{} inputs have different element types {} and {}",
                    ctx.op_type(),
                    a,
                    b
                )));
            }
            (Some(elem_type), _) | (None, Some(elem_type)) => {
                output_tensor(ctx, 0)?.elem_type = Some(elem_type);
            }
            (None, None) => {}
        }

        let (Some(a), Some(b)) = (input_shape(ctx, 0)?, input_shape(ctx, 1)?) else {
            return Ok(());
        };
        let shape = broadcast_shapes(a, b)?;
        set_output_shape(ctx, 0, shape)
    }
}

/// Broadcast two shapes together.
pub fn broadcast_shapes(a: &Shape, b: &Shape) -> Result<Shape, InferError> {
    let a_pad = b.rank().saturating_sub(a.rank());
    let b_pad = a.rank().saturating_sub(b.rank());
    let one = Dimension::Fixed(1);

    let a_iter = std::iter::repeat(&one).take(a_pad).chain(a.iter());
    let b_iter = std::iter::repeat(&one).take(b_pad).chain(b.iter());

    let mut out_shape = Vec::with_capacity(a_pad + a.rank());
    for (index, (a, b)) in a_iter.zip(b_iter).enumerate() {
        let dim = match (a, b) {
            (a, b) if a == b && !a.is_unknown() => a.clone(),

            // If either size is 1, it will be broadcast against the other
            // size.
            (Dimension::Fixed(1), b) => b.clone(),
            (a, Dimension::Fixed(1)) => a.clone(),

            // If both sizes are fixed and different, we know execution
            // will fail.
            (Dimension::Fixed(x), Dimension::Fixed(y)) => {
                return Err(InferError::ShapeInference(format!(
                    "cannot broadcast sizes {} and {} in dimension {}",
                    x, y, index
                )));
            }

            // If one size is fixed and not 1, execution can only succeed if
            // the other has the same size.
            (Dimension::Fixed(size), _) | (_, Dimension::Fixed(size)) => Dimension::Fixed(*size),

            // Different symbols, or an unknown dimension. Either may be 1.
            _ => Dimension::Unknown,
        };
        out_shape.push(dim);
    }

    Ok(Shape::new(out_shape))
}

#[cfg(test)]
mod tests {
    use shapeflow_testing::TestCases;

    use super::{BinaryOp, broadcast_shapes};
    use crate::error::InferError;
    use crate::graph::Node;
    use crate::ops::RuleTest;
    use crate::types::{DataType, Dimension, Shape, ValueType, dims};

    #[test]
    fn test_broadcast_shapes() {
        #[derive(Debug)]
        struct Case {
            a: Shape,
            b: Shape,
            expected: Result<Shape, InferError>,
        }

        let cases = [
            Case {
                a: dims!(2, 3),
                b: dims!(3),
                expected: Ok(dims!(2, 3)),
            },
            Case {
                a: dims!("batch", 1, 4),
                b: dims!(5, 1),
                expected: Ok(dims!("batch", 5, 4)),
            },
            Case {
                a: dims!("n"),
                b: dims!(4),
                expected: Ok(dims!(4)),
            },
            Case {
                a: dims!("n"),
                b: dims!("m"),
                expected: Ok(dims!(Dimension::Unknown)),
            },
            Case {
                a: dims!(Dimension::Unknown),
                b: dims!(Dimension::Unknown),
                expected: Ok(dims!(Dimension::Unknown)),
            },
            Case {
                a: dims!(2, 3),
                b: dims!(4, 3),
                expected: Err(InferError::ShapeInference(
                    "cannot broadcast sizes 2 and 4 in dimension 0".into(),
                )),
            },
        ];

        cases.test_each(|case| {
            assert_eq!(broadcast_shapes(&case.a, &case.b), case.expected);
        })
    }

    #[test]
    fn test_binary_op() {
        let mut test = RuleTest::new();
        test.input("a", ValueType::tensor(DataType::Float, dims!("batch", 1)));
        test.input("b", ValueType::tensor(DataType::Float, dims!(8)));
        test.input("c", ValueType::tensor_of(DataType::Int64));
        test.input("u", ValueType::Unknown);

        let node = Node::new("Add", &["a", "b"], &["y"]);
        assert_eq!(
            test.run(&BinaryOp, &node),
            Ok(vec![ValueType::tensor(DataType::Float, dims!("batch", 8))])
        );

        let node = Node::new("Mul", &["u", "b"], &["y"]);
        assert_eq!(
            test.run(&BinaryOp, &node),
            Ok(vec![ValueType::tensor_of(DataType::Float)])
        );

        let node = Node::new("Sub", &["a", "c"], &["y"]);
        assert!(matches!(
            test.run(&BinaryOp, &node),
            Err(InferError::TypeInference(_))
        ));
    }
}
