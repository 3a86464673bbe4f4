//! Value types: tensor element kinds, dimensions, shapes and the composite
//! types built from them.

use std::fmt;
use std::ops::{Deref, DerefMut};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Enum specifying the element type of a tensor.
///
/// Each variant corresponds to an ONNX `TensorProto.DataType` code, see
/// [`DataType::code`].
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[non_exhaustive]
pub enum DataType {
    Float,
    UInt8,
    Int8,
    UInt16,
    Int16,
    Int32,
    Int64,
    String,
    Bool,
    Float16,
    Double,
    UInt32,
    UInt64,
    BFloat16,
}

impl DataType {
    /// Return the data type that corresponds to an ONNX element type code.
    pub fn from_code(code: i64) -> Option<DataType> {
        let dtype = match code {
            1 => DataType::Float,
            2 => DataType::UInt8,
            3 => DataType::Int8,
            4 => DataType::UInt16,
            5 => DataType::Int16,
            6 => DataType::Int32,
            7 => DataType::Int64,
            8 => DataType::String,
            9 => DataType::Bool,
            10 => DataType::Float16,
            11 => DataType::Double,
            12 => DataType::UInt32,
            13 => DataType::UInt64,
            16 => DataType::BFloat16,
            _ => return None,
        };
        Some(dtype)
    }

    /// Return the ONNX element type code for this type.
    pub fn code(self) -> i64 {
        match self {
            DataType::Float => 1,
            DataType::UInt8 => 2,
            DataType::Int8 => 3,
            DataType::UInt16 => 4,
            DataType::Int16 => 5,
            DataType::Int32 => 6,
            DataType::Int64 => 7,
            DataType::String => 8,
            DataType::Bool => 9,
            DataType::Float16 => 10,
            DataType::Double => 11,
            DataType::UInt32 => 12,
            DataType::UInt64 => 13,
            DataType::BFloat16 => 16,
        }
    }
}

impl fmt::Display for DataType {
    /// Format this enum value in the style of the corresponding Rust type (eg.
    /// "i32" for `DataType::Int32`).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Float => "f32",
            DataType::UInt8 => "u8",
            DataType::Int8 => "i8",
            DataType::UInt16 => "u16",
            DataType::Int16 => "i16",
            DataType::Int32 => "i32",
            DataType::Int64 => "i64",
            DataType::String => "string",
            DataType::Bool => "bool",
            DataType::Float16 => "f16",
            DataType::Double => "f64",
            DataType::UInt32 => "u32",
            DataType::UInt64 => "u64",
            DataType::BFloat16 => "bf16",
        };
        write!(f, "{}", name)
    }
}

/// Size of a single dimension of a tensor.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Dimension {
    /// A dimension with a known size.
    ///
    /// Sizes are signed because generated shape data can carry values such
    /// as the `-1` placeholder of a `Reshape` target.
    Fixed(i64),

    /// A dimension whose size is determined at runtime. The symbol provides
    /// a name to identify when different values share a size.
    Symbolic(String),

    /// A dimension about which nothing is known.
    #[default]
    Unknown,
}

impl Dimension {
    /// Return the size of this dimension, if fixed.
    pub fn fixed(&self) -> Option<i64> {
        match self {
            Self::Fixed(size) => Some(*size),
            _ => None,
        }
    }

    /// Return the symbol name of this dimension, if symbolic.
    pub fn symbol(&self) -> Option<&str> {
        match self {
            Self::Symbolic(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

impl From<i64> for Dimension {
    fn from(size: i64) -> Self {
        Dimension::Fixed(size)
    }
}

impl From<i32> for Dimension {
    fn from(size: i32) -> Self {
        Dimension::Fixed(size as i64)
    }
}

impl From<usize> for Dimension {
    fn from(size: usize) -> Self {
        Dimension::Fixed(size as i64)
    }
}

impl From<&str> for Dimension {
    fn from(name: &str) -> Self {
        Dimension::Symbolic(name.to_string())
    }
}

impl From<String> for Dimension {
    fn from(name: String) -> Self {
        Dimension::Symbolic(name)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(size) => write!(f, "{}", size),
            Self::Symbolic(name) => write!(f, "\"{}\"", name),
            Self::Unknown => write!(f, "?"),
        }
    }
}

/// Ordered list of dimensions.
///
/// A `Shape` always has a known rank. Values whose rank is unknown have no
/// shape at all (see [`TensorType::shape`]).
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Shape(Vec<Dimension>);

impl Shape {
    pub fn new(dims: Vec<Dimension>) -> Shape {
        Shape(dims)
    }

    /// Create a shape where every dimension has a known size.
    pub fn from_fixed(sizes: &[i64]) -> Shape {
        Shape(sizes.iter().copied().map(Dimension::Fixed).collect())
    }

    /// Create a shape of the given rank where every dimension is unknown.
    pub fn unknown_dims(rank: usize) -> Shape {
        Shape(vec![Dimension::Unknown; rank])
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Return the sizes of all dimensions if they are all fixed.
    pub fn to_fixed(&self) -> Option<Vec<i64>> {
        self.0.iter().map(|d| d.fixed()).collect()
    }

    /// Return true if every dimension has a known size.
    pub fn is_fixed(&self) -> bool {
        self.0.iter().all(|d| d.fixed().is_some())
    }

    pub fn into_vec(self) -> Vec<Dimension> {
        self.0
    }
}

impl Deref for Shape {
    type Target = Vec<Dimension>;

    fn deref(&self) -> &Vec<Dimension> {
        &self.0
    }
}

impl DerefMut for Shape {
    fn deref_mut(&mut self) -> &mut Vec<Dimension> {
        &mut self.0
    }
}

impl From<Vec<Dimension>> for Shape {
    fn from(dims: Vec<Dimension>) -> Shape {
        Shape(dims)
    }
}

impl FromIterator<Dimension> for Shape {
    fn from_iter<I: IntoIterator<Item = Dimension>>(iter: I) -> Shape {
        Shape(iter.into_iter().collect())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, dim) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", dim)?;
        }
        write!(f, "]")
    }
}

/// Type of a tensor value.
///
/// Either part may be unknown. A `None` shape means the rank is unknown.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TensorType {
    pub elem_type: Option<DataType>,
    pub shape: Option<Shape>,
}

impl TensorType {
    pub fn new(elem_type: Option<DataType>, shape: Option<Shape>) -> TensorType {
        TensorType { elem_type, shape }
    }
}

/// Type of a value in the graph.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ValueType {
    /// Nothing is known about the value, not even its category.
    #[default]
    Unknown,
    Tensor(TensorType),
    /// Sequence of values with a shared element type.
    Sequence(Box<ValueType>),
    /// Map from a scalar key type to values.
    Map(DataType, Box<ValueType>),
    /// Value which may be absent.
    Optional(Box<ValueType>),
}

impl ValueType {
    /// Create a tensor type.
    pub fn tensor(elem_type: DataType, shape: impl Into<Shape>) -> ValueType {
        ValueType::Tensor(TensorType::new(Some(elem_type), Some(shape.into())))
    }

    /// Create a tensor type with a known element type and unknown rank.
    pub fn tensor_of(elem_type: DataType) -> ValueType {
        ValueType::Tensor(TensorType::new(Some(elem_type), None))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    pub fn as_tensor(&self) -> Option<&TensorType> {
        match self {
            Self::Tensor(tensor) => Some(tensor),
            _ => None,
        }
    }

    /// Return the tensor type, converting an unknown type into a tensor type
    /// first.
    ///
    /// Returns `None` if the value is known to be a non-tensor.
    pub fn tensor_mut(&mut self) -> Option<&mut TensorType> {
        if self.is_unknown() {
            *self = ValueType::Tensor(TensorType::default());
        }
        match self {
            Self::Tensor(tensor) => Some(tensor),
            _ => None,
        }
    }

    /// Return the tensor element type, if this is a tensor with a known
    /// element type.
    pub fn elem_type(&self) -> Option<DataType> {
        self.as_tensor().and_then(|t| t.elem_type)
    }

    /// Return the tensor shape, if this is a tensor with a known rank.
    pub fn shape(&self) -> Option<&Shape> {
        self.as_tensor().and_then(|t| t.shape.as_ref())
    }

    /// Short name of the value category, used in error messages.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Tensor(_) => "tensor",
            Self::Sequence(_) => "sequence",
            Self::Map(..) => "map",
            Self::Optional(_) => "optional",
        }
    }

    /// Visit every dimension of every tensor type nested in this type.
    pub(crate) fn for_each_dim(&self, f: &mut impl FnMut(&Dimension)) {
        match self {
            Self::Unknown => {}
            Self::Tensor(tensor) => {
                if let Some(shape) = &tensor.shape {
                    shape.iter().for_each(|dim| f(dim));
                }
            }
            Self::Sequence(elem) | Self::Optional(elem) | Self::Map(_, elem) => {
                elem.for_each_dim(f)
            }
        }
    }

    /// Mutably visit every dimension of every tensor type nested in this type.
    pub(crate) fn for_each_dim_mut<E>(
        &mut self,
        f: &mut impl FnMut(&mut Dimension) -> Result<(), E>,
    ) -> Result<(), E> {
        match self {
            Self::Unknown => Ok(()),
            Self::Tensor(tensor) => {
                if let Some(shape) = tensor.shape.as_mut() {
                    for dim in shape.iter_mut() {
                        f(dim)?;
                    }
                }
                Ok(())
            }
            Self::Sequence(elem) | Self::Optional(elem) | Self::Map(_, elem) => {
                elem.for_each_dim_mut(f)
            }
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "?"),
            Self::Tensor(TensorType { elem_type, shape }) => {
                match elem_type {
                    Some(dtype) => write!(f, "{}", dtype)?,
                    None => write!(f, "?")?,
                }
                match shape {
                    Some(shape) => write!(f, " {}", shape),
                    None => write!(f, " [..]"),
                }
            }
            Self::Sequence(elem) => write!(f, "seq({})", elem),
            Self::Map(key, value) => write!(f, "map({}, {})", key, value),
            Self::Optional(elem) => write!(f, "optional({})", elem),
        }
    }
}

#[cfg(test)]
pub(crate) use tests::dims;
