//! The interface through which operator inference rules and data propagators
//! read a node's inputs and attributes and write its output types.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::error::InferError;
use crate::graph::{AttributeValue, Graph, Node};
use crate::scope::ScopeEnv;
use crate::subgraph::{GraphInferenceContext, GraphInferencer};
use crate::tensor_data::ConstantTensor;
use crate::types::{Shape, ValueType};

/// Shapes computed by data propagators during one inference run.
///
/// Each entry maps the name of a 1D integer value to the shape its elements
/// describe, eg. the output of a `Shape` operator. Entries are written once.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GeneratedShapeData {
    shapes: FxHashMap<String, Shape>,
}

impl GeneratedShapeData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Shape> {
        self.shapes.get(name)
    }

    /// Record the shape data for a value.
    ///
    /// Fails if data has already been recorded for `name`.
    pub fn insert(&mut self, name: &str, shape: Shape) -> Result<(), InferError> {
        if self.shapes.contains_key(name) {
            return Err(already_generated(name));
        }
        self.shapes.insert(name.to_string(), shape);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.shapes.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Shape> {
        self.shapes.remove(name)
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}

fn already_generated(name: &str) -> InferError {
    InferError::ShapeInference(format!(
        "shape data for \"{}\" has already been generated",
        name
    ))
}

/// Where generated shape data is read from and written to.
pub enum ShapeDataMode<'a> {
    /// Reads find nothing and writes are discarded.
    ///
    /// Used when running a rule outside of a graph run.
    Isolated,

    /// Reads use the shape data of the current run. Writes are staged in the
    /// context and returned by [`InferenceContext::into_parts`], so they only
    /// reach the run if the node's outputs are accepted.
    RunScoped(&'a GeneratedShapeData),
}

/// Infer the output types of an operator.
///
/// Rules read the node's attributes, input types and input values from the
/// context and write what they can determine into the output types. Any
/// information a rule cannot determine is left unknown.
pub trait InferTypes {
    fn infer_types(&self, ctx: &mut InferenceContext<'_>) -> Result<(), InferError>;
}

impl<F> InferTypes for F
where
    F: Fn(&mut InferenceContext<'_>) -> Result<(), InferError>,
{
    fn infer_types(&self, ctx: &mut InferenceContext<'_>) -> Result<(), InferError> {
        self(ctx)
    }
}

/// Results of running inference for a node.
pub struct InferredNode {
    /// Inferred type of each output.
    pub outputs: SmallVec<[ValueType; 2]>,

    /// Annotated copies of graph attributes which were inferred, keyed by
    /// attribute name.
    pub subgraphs: Vec<(String, Graph)>,

    /// Shape data generated for the node's outputs.
    pub shape_data: GeneratedShapeData,
}

/// Context passed to inference rules and data propagators for a single node.
pub struct InferenceContext<'a> {
    node: &'a Node,
    scope: ScopeEnv<'a>,
    constants: &'a FxHashMap<String, ConstantTensor>,
    outputs: SmallVec<[ValueType; 2]>,
    shape_data: ShapeDataMode<'a>,
    staged_shape_data: GeneratedShapeData,
    graph_ctx: Option<&'a GraphInferenceContext<'a>>,

    /// Inferencers for graph attributes, created on first use.
    inferencers: FxHashMap<String, GraphInferencer<'a>>,
}

impl<'a> InferenceContext<'a> {
    /// Create a context for `node` whose input types are resolved from
    /// `scope` and input values from `constants`.
    ///
    /// The context starts with isolated shape data and without a graph
    /// context, so nested graphs cannot be inferred.
    pub fn new(
        node: &'a Node,
        scope: ScopeEnv<'a>,
        constants: &'a FxHashMap<String, ConstantTensor>,
    ) -> Self {
        InferenceContext {
            node,
            scope,
            constants,
            outputs: node.outputs.iter().map(|_| ValueType::Unknown).collect(),
            shape_data: ShapeDataMode::Isolated,
            staged_shape_data: GeneratedShapeData::new(),
            graph_ctx: None,
            inferencers: FxHashMap::default(),
        }
    }

    /// Read generated shape data of the current run and stage new entries.
    pub fn with_shape_data(mut self, shape_data: &'a GeneratedShapeData) -> Self {
        self.shape_data = ShapeDataMode::RunScoped(shape_data);
        self
    }

    /// Enable inference of nested graphs.
    pub fn with_graph_context(mut self, graph_ctx: &'a GraphInferenceContext<'a>) -> Self {
        self.graph_ctx = Some(graph_ctx);
        self
    }

    pub fn node(&self) -> &'a Node {
        self.node
    }

    pub fn op_type(&self) -> &'a str {
        &self.node.op_type
    }

    pub fn graph_context(&self) -> Option<&'a GraphInferenceContext<'a>> {
        self.graph_ctx
    }

    /// Look up an attribute value by name.
    pub fn attribute(&self, name: &str) -> Option<&'a AttributeValue> {
        self.node.attribute(name).map(|attr| &attr.value)
    }

    pub fn attr_int(&self, name: &str) -> Option<i64> {
        match self.attribute(name) {
            Some(AttributeValue::Int(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn attr_ints(&self, name: &str) -> Option<&'a [i64]> {
        match self.attribute(name) {
            Some(AttributeValue::Ints(values)) => Some(values),
            _ => None,
        }
    }

    pub fn attr_string(&self, name: &str) -> Option<&'a str> {
        match self.attribute(name) {
            Some(AttributeValue::String(value)) => Some(value),
            _ => None,
        }
    }

    pub fn attr_tensor(&self, name: &str) -> Option<&'a ConstantTensor> {
        match self.attribute(name) {
            Some(AttributeValue::Tensor(value)) => Some(value),
            _ => None,
        }
    }

    pub fn attr_graph(&self, name: &str) -> Option<&'a Graph> {
        match self.attribute(name) {
            Some(AttributeValue::Graph(value)) => Some(value),
            _ => None,
        }
    }

    /// Get an int attribute, failing if it is missing or has another kind.
    pub fn require_int(&self, name: &str) -> Result<i64, InferError> {
        self.attr_int(name).ok_or_else(|| InferError::missing_attr(name))
    }

    pub fn require_ints(&self, name: &str) -> Result<&'a [i64], InferError> {
        self.attr_ints(name).ok_or_else(|| InferError::missing_attr(name))
    }

    pub fn require_tensor(&self, name: &str) -> Result<&'a ConstantTensor, InferError> {
        self.attr_tensor(name).ok_or_else(|| InferError::missing_attr(name))
    }

    pub fn require_graph(&self, name: &str) -> Result<&'a Graph, InferError> {
        self.attr_graph(name).ok_or_else(|| InferError::missing_attr(name))
    }

    pub fn input_count(&self) -> usize {
        self.node.inputs.len()
    }

    /// Return true if input `index` exists and was not omitted.
    pub fn has_input(&self, index: usize) -> bool {
        self.node
            .inputs
            .get(index)
            .is_some_and(|name| !name.is_empty())
    }

    fn input_name(&self, index: usize) -> Result<&'a str, InferError> {
        self.node
            .inputs
            .get(index)
            .map(|s| s.as_str())
            .ok_or(InferError::IndexOutOfBounds {
                index,
                len: self.node.inputs.len(),
            })
    }

    /// Return the type of input `index`.
    ///
    /// Returns `None` for omitted inputs and for values whose type has not
    /// been recorded anywhere in scope.
    pub fn input_type(&self, index: usize) -> Result<Option<&'a ValueType>, InferError> {
        let name = self.input_name(index)?;
        if name.is_empty() {
            return Ok(None);
        }
        Ok(self.scope.lookup(name))
    }

    /// Return the statically known value of input `index`, if any.
    pub fn input_data(&self, index: usize) -> Result<Option<&'a ConstantTensor>, InferError> {
        let name = self.input_name(index)?;
        if name.is_empty() {
            return Ok(None);
        }
        Ok(self.constants.get(name))
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    pub fn output_name(&self, index: usize) -> Result<&'a str, InferError> {
        self.node
            .outputs
            .get(index)
            .map(|s| s.as_str())
            .ok_or(InferError::IndexOutOfBounds {
                index,
                len: self.node.outputs.len(),
            })
    }

    pub fn output_type(&self, index: usize) -> Result<&ValueType, InferError> {
        let len = self.outputs.len();
        self.outputs
            .get(index)
            .ok_or(InferError::IndexOutOfBounds { index, len })
    }

    /// Return the inferred type of output `index` for updating.
    ///
    /// Output types start out as [`ValueType::Unknown`].
    pub fn output_type_mut(&mut self, index: usize) -> Result<&mut ValueType, InferError> {
        let len = self.outputs.len();
        self.outputs
            .get_mut(index)
            .ok_or(InferError::IndexOutOfBounds { index, len })
    }

    /// Return an inferencer for the graph held by attribute `attr`.
    ///
    /// Repeated calls for the same attribute return the same inferencer, so
    /// the graph it infers is the one written back into the node.
    pub fn graph_attribute_inferencer(
        &mut self,
        attr: &str,
    ) -> Result<&mut GraphInferencer<'a>, InferError> {
        let Some(graph_ctx) = self.graph_ctx else {
            return Err(InferError::TypeInference(format!(
                "cannot infer graph attribute \"{}\" without a graph context",
                attr
            )));
        };
        let graph = match self.attribute(attr) {
            Some(AttributeValue::Graph(graph)) => graph,
            Some(other) => {
                return Err(InferError::TypeInference(format!(
                    "attribute \"{}\" is a {}, not a graph",
                    attr,
                    other.kind()
                )));
            }
            None => {
                return Err(InferError::TypeInference(format!(
                    "attribute \"{}\" is missing",
                    attr
                )));
            }
        };
        Ok(self
            .inferencers
            .entry(attr.to_string())
            .or_insert_with(|| GraphInferencer::new(attr, graph, graph_ctx)))
    }

    /// Record the shape described by the value of output `index`.
    ///
    /// Fails if shape data for the output has already been recorded in this
    /// run.
    pub fn record_generated_shape(
        &mut self,
        index: usize,
        shape: Shape,
    ) -> Result<(), InferError> {
        let name = self.output_name(index)?;
        match &self.shape_data {
            ShapeDataMode::Isolated => Ok(()),
            ShapeDataMode::RunScoped(data) => {
                if data.contains(name) {
                    return Err(already_generated(name));
                }
                tracing::trace!(value = name, shape = %shape, "generated shape data");
                self.staged_shape_data.insert(name, shape)
            }
        }
    }

    /// Return the generated shape data for input `index`, if any.
    pub fn read_generated_shape(&self, index: usize) -> Result<Option<&Shape>, InferError> {
        let name = self.input_name(index)?;
        if name.is_empty() {
            return Ok(None);
        }
        match &self.shape_data {
            ShapeDataMode::Isolated => Ok(None),
            ShapeDataMode::RunScoped(data) => {
                Ok(data.get(name).or_else(|| self.staged_shape_data.get(name)))
            }
        }
    }

    /// Consume the context and return the inferred output types, graphs and
    /// staged shape data.
    pub fn into_parts(self) -> InferredNode {
        let subgraphs = self
            .inferencers
            .into_iter()
            .filter_map(|(name, inferencer)| inferencer.into_inferred().map(|g| (name, g)))
            .collect();
        InferredNode {
            outputs: self.outputs,
            subgraphs,
            shape_data: self.staged_shape_data,
        }
    }
}
