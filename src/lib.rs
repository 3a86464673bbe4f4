//! shapeflow is a static type and shape inference engine for
//! [ONNX](https://onnx.ai)-style dataflow graphs.
//!
//! Given a graph of operator invocations and the opset versions it was
//! authored against, shapeflow computes the most precise element type and
//! shape it can for every value in the graph. It uses:
//!
//! - A versioned registry of per-operator inference rules (see
//!   [`OpRegistry`] and [`InferTypes`])
//! - The statically known values of initializers and `Constant` nodes
//! - _Data propagation_, which evaluates small shape computations such as
//!   `Shape -> Slice -> Concat -> Reshape` symbolically (see [`propagate`])
//! - Recursive inference of the subgraphs of control flow operators, which
//!   may capture values from enclosing graphs
//!
//! Inferred types are merged with the types already declared in the graph.
//! Merging never discards information, and conflicts between inferred and
//! declared types are either logged or reported as errors depending on
//! [`InferenceOptions::check_type`].
//!
//! # Example
//!
//! ```
//! use shapeflow::{
//!     AttributeValue, ConstantTensor, DataType, Graph, InferenceOptions, Node, OpsetImports,
//!     Shape, ValueType, infer_graph, standard_registry,
//! };
//!
//! let mut graph = Graph::new();
//! graph
//!     .add_input("x", ValueType::tensor(DataType::Float, Shape::from_fixed(&[4, 6])))
//!     .add_initializer("target", ConstantTensor::i64_vec(&[2, -1]))
//!     .add_node(Node::new("Reshape", &["x", "target"], &["y"]))
//!     .add_node(
//!         Node::new("Concat", &["y", "y"], &["z"]).with_attr("axis", AttributeValue::Int(0)),
//!     )
//!     .add_output("z", ValueType::Unknown);
//!
//! infer_graph(
//!     &mut graph,
//!     &OpsetImports::default_domain(13),
//!     standard_registry(),
//!     &InferenceOptions::default(),
//! )
//! .unwrap();
//!
//! assert_eq!(
//!     graph.value_type("z"),
//!     Some(&ValueType::tensor(DataType::Float, Shape::from_fixed(&[4, 12])))
//! );
//! ```
//!
//! # Configuration
//!
//! [`InferenceOptions::from_env`] reads options from `SHAPEFLOW_*`
//! environment variables. Inference logs progress and ignored conflicts using
//! [tracing](https://docs.rs/tracing).

mod context;
mod env;
mod error;
mod graph;
mod infer;
mod options;
mod registry;
mod scope;
mod subgraph;
mod symbols;
mod tensor_data;
mod types;

pub mod merge;
pub mod ops;
pub mod propagate;

pub use context::{GeneratedShapeData, InferTypes, InferenceContext, InferredNode, ShapeDataMode};
pub use error::{GraphInferenceError, InferError, NodeError, ShapeMismatch};
pub use graph::{
    Attribute, AttributeValue, DEFAULT_DOMAIN, FunctionDef, Graph, Initializer, Model, Node,
    OpsetImports, ValueInfo,
};
pub use infer::{infer_function_node, infer_graph, infer_model};
pub use options::{ErrorMode, InferenceOptions};
pub use registry::{OpRegistry, OpSchema, SchemaRegistry, standard_registry};
pub use scope::ScopeEnv;
pub use subgraph::{GraphInferenceContext, GraphInferencer};
pub use symbols::SymbolTable;
pub use tensor_data::{ConstantTensor, TensorData};
pub use types::{DataType, Dimension, Shape, TensorType, ValueType};
