//! Statically known tensor values, such as initializers and the values of
//! `Constant` nodes.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::types::{DataType, Shape, ValueType};

/// Elements of a constant tensor, stored in row-major order.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TensorData {
    Float(Vec<f32>),
    Double(Vec<f64>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Int8(Vec<i8>),
    UInt8(Vec<u8>),
    Bool(Vec<bool>),
    String(Vec<String>),
}

impl TensorData {
    pub fn dtype(&self) -> DataType {
        match self {
            Self::Float(_) => DataType::Float,
            Self::Double(_) => DataType::Double,
            Self::Int32(_) => DataType::Int32,
            Self::Int64(_) => DataType::Int64,
            Self::Int8(_) => DataType::Int8,
            Self::UInt8(_) => DataType::UInt8,
            Self::Bool(_) => DataType::Bool,
            Self::String(_) => DataType::String,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Float(v) => v.len(),
            Self::Double(v) => v.len(),
            Self::Int32(v) => v.len(),
            Self::Int64(v) => v.len(),
            Self::Int8(v) => v.len(),
            Self::UInt8(v) => v.len(),
            Self::Bool(v) => v.len(),
            Self::String(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A tensor whose shape and elements are known statically.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConstantTensor {
    dims: Vec<i64>,
    data: TensorData,
}

impl ConstantTensor {
    /// Create a tensor with a given shape and elements.
    ///
    /// Returns `None` if the number of elements does not match the shape.
    pub fn new(dims: Vec<i64>, data: TensorData) -> Option<ConstantTensor> {
        let len: i64 = dims.iter().product();
        if len < 0 || len as usize != data.len() {
            return None;
        }
        Some(ConstantTensor { dims, data })
    }

    /// Create a 1D tensor from a vector of elements.
    pub fn from_vec(data: TensorData) -> ConstantTensor {
        ConstantTensor {
            dims: vec![data.len() as i64],
            data,
        }
    }

    /// Create a 0D tensor from a single element.
    pub fn from_scalar(data: TensorData) -> Option<ConstantTensor> {
        Self::new(Vec::new(), data)
    }

    /// Convenience constructor for a 1D int64 tensor.
    pub fn i64_vec(values: &[i64]) -> ConstantTensor {
        Self::from_vec(TensorData::Int64(values.to_vec()))
    }

    /// Convenience constructor for a 0D int64 tensor.
    pub fn i64_scalar(value: i64) -> ConstantTensor {
        ConstantTensor {
            dims: Vec::new(),
            data: TensorData::Int64(vec![value]),
        }
    }

    pub fn dims(&self) -> &[i64] {
        &self.dims
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    pub fn dtype(&self) -> DataType {
        self.data.dtype()
    }

    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Return the elements as `i64`s if this is an int32 or int64 tensor.
    pub fn to_i64_vec(&self) -> Option<Vec<i64>> {
        match &self.data {
            TensorData::Int64(values) => Some(values.clone()),
            TensorData::Int32(values) => Some(values.iter().map(|&x| x as i64).collect()),
            _ => None,
        }
    }

    /// Return the type of a graph value holding this tensor.
    pub fn value_type(&self) -> ValueType {
        ValueType::tensor(self.dtype(), Shape::from_fixed(&self.dims))
    }
}
