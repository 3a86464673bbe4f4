use std::error::Error;
use std::fmt::{Display, Formatter};

use crate::types::{DataType, Dimension};

/// Details of a shape mismatch found when merging types.
#[derive(Clone, Debug, PartialEq)]
pub enum ShapeMismatch {
    /// The two shapes have different ranks.
    Rank { inferred: usize, existing: usize },

    /// The shapes have different fixed sizes at dimension `index`.
    Dim {
        index: usize,
        inferred: Dimension,
        existing: Dimension,
    },
}

impl Display for ShapeMismatch {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rank { inferred, existing } => write!(
                f,
                "inferred rank {} differs from existing rank {}",
                inferred, existing
            ),
            Self::Dim {
                index,
                inferred,
                existing,
            } => write!(
                f,
                "inferred size {} differs from existing size {} in dimension {}",
                inferred, existing, index
            ),
        }
    }
}

/// Errors raised by inference rules, data propagators, the merge checker
/// and the inference driver.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum InferError {
    /// A required attribute is missing or has the wrong kind.
    MissingAttribute { name: String },

    /// Inferred and existing types have incompatible categories or element
    /// types.
    TypeConflict {
        /// Description of the inferred type.
        inferred: String,
        /// Description of the existing type.
        existing: String,
    },

    /// Inferred and existing tensor shapes are incompatible.
    ShapeConflict(ShapeMismatch),

    /// No inference rule is available for an operator.
    UnknownOperator {
        domain: String,
        op_type: String,
        /// Opset version of the operator's domain, or `None` if the domain
        /// is not imported.
        version: Option<i64>,
    },

    /// A fresh dimension symbol could not be created.
    SymbolExhaustion { attempts: u32 },

    /// An input or output index is out of range.
    IndexOutOfBounds { index: usize, len: usize },

    /// A shape-bearing input has an element type that is not supported.
    UnsupportedInputEncoding { input: usize, dtype: DataType },

    /// An inference rule rejected the node's types or attributes.
    TypeInference(String),

    /// An inference rule or data propagator rejected the node's shapes or
    /// values.
    ShapeInference(String),

    /// Inference of a subgraph or function body failed.
    Nested {
        /// Name of the graph attribute or function whose body failed.
        scope: String,
        errors: Vec<NodeError>,
    },
}

impl InferError {
    pub(crate) fn type_conflict(inferred: impl Display, existing: impl Display) -> Self {
        Self::TypeConflict {
            inferred: inferred.to_string(),
            existing: existing.to_string(),
        }
    }

    pub(crate) fn missing_attr(name: &str) -> Self {
        Self::MissingAttribute {
            name: name.to_string(),
        }
    }

    /// Return true if this error must abort the inference run regardless of
    /// the error mode.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::SymbolExhaustion { .. } => true,
            Self::Nested { errors, .. } => errors.iter().any(|e| e.error.is_fatal()),
            _ => false,
        }
    }

    /// Return true if this is a type or shape conflict found when merging.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::TypeConflict { .. } | Self::ShapeConflict(_))
    }
}

impl Display for InferError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingAttribute { name } => {
                write!(f, "required attribute \"{}\" is missing", name)
            }
            Self::TypeConflict { inferred, existing } => write!(
                f,
                "inferred type {} conflicts with existing type {}",
                inferred, existing
            ),
            Self::ShapeConflict(mismatch) => write!(f, "shape conflict: {}", mismatch),
            Self::UnknownOperator {
                domain,
                op_type,
                version,
            } => {
                let domain = if domain.is_empty() { "ai.onnx" } else { domain };
                match version {
                    Some(version) => write!(
                        f,
                        "no schema for operator {}::{} in opset version {}",
                        domain, op_type, version
                    ),
                    None => write!(
                        f,
                        "operator {}::{} uses a domain that is not imported",
                        domain, op_type
                    ),
                }
            }
            Self::SymbolExhaustion { attempts } => write!(
                f,
                "failed to create a unique dimension symbol after {} attempts",
                attempts
            ),
            Self::IndexOutOfBounds { index, len } => {
                write!(f, "index {} is out of bounds for length {}", index, len)
            }
            Self::UnsupportedInputEncoding { input, dtype } => write!(
                f,
                "input {} has unsupported element type {}",
                input, dtype
            ),
            Self::TypeInference(msg) => write!(f, "type inference error: {}", msg),
            Self::ShapeInference(msg) => write!(f, "shape inference error: {}", msg),
            Self::Nested { scope, errors } => {
                write!(f, "inference of \"{}\" failed: ", scope)?;
                for (i, error) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{}", error)?;
                }
                Ok(())
            }
        }
    }
}

impl Error for InferError {}

/// An [`InferError`] together with the node that caused it.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeError {
    /// Position of the node in its graph.
    pub index: usize,
    /// Node name, or operator type and index if the node has no name.
    pub node: String,
    pub op_type: String,
    pub error: InferError,
}

impl NodeError {
    /// Name hierarchy of the nodes that this error relates to.
    ///
    /// The first entry is the node in the graph passed to inference. When the
    /// error occurred in a subgraph, later entries contain the nodes of
    /// nested graphs, ending with the inner-most node.
    pub fn node_path(&self) -> Vec<&str> {
        let mut path = vec![self.node.as_str()];
        if let InferError::Nested { errors, .. } = &self.error {
            if let Some(first) = errors.first() {
                path.extend(first.node_path());
            }
        }
        path
    }
}

impl Display for NodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "node \"{}\" ({}) failed: {}",
            self.node, self.op_type, self.error
        )
    }
}

impl Error for NodeError {}

/// Errors returned by the inference entry points.
///
/// In fail-fast mode this contains exactly one error. In collect mode it
/// contains every error encountered, in node order.
#[derive(Clone, Debug, PartialEq)]
pub struct GraphInferenceError {
    errors: Vec<NodeError>,
}

impl GraphInferenceError {
    pub(crate) fn new(errors: Vec<NodeError>) -> Self {
        GraphInferenceError { errors }
    }

    pub fn errors(&self) -> &[NodeError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<NodeError> {
        self.errors
    }
}

impl Display for GraphInferenceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.errors.as_slice() {
            [error] => write!(f, "{}", error),
            errors => {
                write!(f, "inference failed with {} errors", errors.len())?;
                for error in errors {
                    write!(f, "\n  {}", error)?;
                }
                Ok(())
            }
        }
    }
}

impl Error for GraphInferenceError {}
