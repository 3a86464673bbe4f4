//! Reconciliation of inferred types with existing (declared or previously
//! inferred) types.
//!
//! [`check_compatible`] decides whether two types can describe the same
//! value. [`merge`] then writes the more specific parts of the inferred type
//! into the existing one. Merging never loses information: a fixed size is
//! never replaced by a symbol and a known element type is never erased.

use crate::error::{InferError, ShapeMismatch};
use crate::types::{Dimension, Shape, TensorType, ValueType};

/// Check that `inferred` and `existing` may describe the same value.
pub fn check_compatible(inferred: &ValueType, existing: &ValueType) -> Result<(), InferError> {
    match (inferred, existing) {
        (ValueType::Unknown, _) | (_, ValueType::Unknown) => Ok(()),
        (ValueType::Tensor(a), ValueType::Tensor(b)) => check_tensors(a, b),
        (ValueType::Sequence(a), ValueType::Sequence(b))
        | (ValueType::Optional(a), ValueType::Optional(b)) => check_compatible(a, b),
        (ValueType::Map(key_a, a), ValueType::Map(key_b, b)) => {
            if key_a != key_b {
                return Err(InferError::type_conflict(inferred, existing));
            }
            check_compatible(a, b)
        }
        _ => Err(InferError::type_conflict(
            inferred.category(),
            existing.category(),
        )),
    }
}

fn check_tensors(inferred: &TensorType, existing: &TensorType) -> Result<(), InferError> {
    if let (Some(a), Some(b)) = (inferred.elem_type, existing.elem_type) {
        if a != b {
            return Err(InferError::type_conflict(a, b));
        }
    }
    if let (Some(a), Some(b)) = (&inferred.shape, &existing.shape) {
        check_shapes(a, b)?;
    }
    Ok(())
}

fn check_shapes(inferred: &Shape, existing: &Shape) -> Result<(), InferError> {
    if inferred.rank() != existing.rank() {
        return Err(InferError::ShapeConflict(ShapeMismatch::Rank {
            inferred: inferred.rank(),
            existing: existing.rank(),
        }));
    }
    for (index, (a, b)) in inferred.iter().zip(existing.iter()).enumerate() {
        if let (Dimension::Fixed(x), Dimension::Fixed(y)) = (a, b) {
            if x != y {
                return Err(InferError::ShapeConflict(ShapeMismatch::Dim {
                    index,
                    inferred: a.clone(),
                    existing: b.clone(),
                }));
            }
        }
    }
    Ok(())
}

/// Merge the information in `inferred` into `existing`.
///
/// The types must have passed [`check_compatible`]. Incompatible parts are
/// left unchanged.
pub fn merge(inferred: &ValueType, existing: &mut ValueType) {
    match (inferred, existing) {
        (ValueType::Unknown, _) => {}
        (inferred, existing @ ValueType::Unknown) => *existing = inferred.clone(),
        (ValueType::Tensor(a), ValueType::Tensor(b)) => merge_tensors(a, b),
        (ValueType::Sequence(a), ValueType::Sequence(b))
        | (ValueType::Optional(a), ValueType::Optional(b))
        | (ValueType::Map(_, a), ValueType::Map(_, b)) => merge(a, b),
        _ => {}
    }
}

fn merge_tensors(inferred: &TensorType, existing: &mut TensorType) {
    if existing.elem_type.is_none() {
        existing.elem_type = inferred.elem_type;
    }
    match (&inferred.shape, &mut existing.shape) {
        (Some(inferred), Some(existing)) if inferred.rank() == existing.rank() => {
            for (a, b) in inferred.iter().zip(existing.iter_mut()) {
                merge_dim(a, b);
            }
        }
        (Some(inferred), existing @ None) => *existing = Some(inferred.clone()),
        _ => {}
    }
}

fn merge_dim(inferred: &Dimension, existing: &mut Dimension) {
    let replace = match inferred {
        Dimension::Fixed(_) => true,
        Dimension::Symbolic(_) => existing.is_unknown(),
        Dimension::Unknown => false,
    };
    if replace {
        *existing = inferred.clone();
    }
}
