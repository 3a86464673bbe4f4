//! Inference of graphs nested in node attributes, such as the branches of an
//! `If` operator or the body of a `Loop`.

use std::cell::RefCell;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::InferError;
use crate::graph::{FunctionDef, Graph, OpsetImports};
use crate::infer::run_graph;
use crate::merge::{check_compatible, merge};
use crate::options::InferenceOptions;
use crate::registry::SchemaRegistry;
use crate::scope::ScopeEnv;
use crate::symbols::SymbolTable;
use crate::tensor_data::ConstantTensor;
use crate::types::ValueType;

/// State shared by an inference run and the runs it starts for nested
/// graphs.
#[derive(Clone, Copy)]
pub struct GraphInferenceContext<'a> {
    pub(crate) outer_scope: Option<&'a ScopeEnv<'a>>,
    pub(crate) opset_imports: &'a OpsetImports,
    pub(crate) registry: &'a dyn SchemaRegistry,
    pub(crate) options: &'a InferenceOptions,
    pub(crate) functions: &'a [FunctionDef],

    /// Symbols in use across the whole inference, including nested graphs
    /// and function bodies. Created by the outermost run if not set.
    pub(crate) symbols: Option<&'a RefCell<SymbolTable>>,
}

impl<'a> GraphInferenceContext<'a> {
    pub fn new(
        opset_imports: &'a OpsetImports,
        registry: &'a dyn SchemaRegistry,
        options: &'a InferenceOptions,
    ) -> Self {
        GraphInferenceContext {
            outer_scope: None,
            opset_imports,
            registry,
            options,
            functions: &[],
            symbols: None,
        }
    }

    /// Set the model-local functions that nodes may invoke.
    pub fn with_functions(mut self, functions: &'a [FunctionDef]) -> Self {
        self.functions = functions;
        self
    }

    /// Set the scope from which values not defined in the graph are
    /// resolved.
    pub fn with_outer_scope(mut self, scope: &'a ScopeEnv<'a>) -> Self {
        self.outer_scope = Some(scope);
        self
    }

    pub fn outer_scope(&self) -> Option<&'a ScopeEnv<'a>> {
        self.outer_scope
    }

    pub fn opset_imports(&self) -> &'a OpsetImports {
        self.opset_imports
    }

    pub fn registry(&self) -> &'a dyn SchemaRegistry {
        self.registry
    }

    pub fn options(&self) -> &'a InferenceOptions {
        self.options
    }

    pub fn functions(&self) -> &'a [FunctionDef] {
        self.functions
    }
}

/// Runs inference over a graph held in a node attribute.
///
/// Created by `InferenceContext::graph_attribute_inferencer`. The graph
/// itself is not modified. The annotated copy produced by the last call to
/// [`run_inference`](Self::run_inference) is written back into the node once
/// the node's inference completes.
pub struct GraphInferencer<'a> {
    name: String,
    graph: &'a Graph,
    ctx: &'a GraphInferenceContext<'a>,
    inferred: Option<Graph>,
}

impl<'a> GraphInferencer<'a> {
    pub(crate) fn new(name: &str, graph: &'a Graph, ctx: &'a GraphInferenceContext<'a>) -> Self {
        GraphInferencer {
            name: name.to_string(),
            graph,
            ctx,
            inferred: None,
        }
    }

    /// Name of the attribute holding the graph.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn graph(&self) -> &'a Graph {
        self.graph
    }

    /// Infer the types of the graph's outputs given types and optionally
    /// values of its inputs.
    ///
    /// `input_types` must have one entry per graph input. Each is merged into
    /// the declared type of the input. `input_data` entries bind constant
    /// values to the corresponding inputs. It may be shorter than the input
    /// list.
    pub fn run_inference(
        &mut self,
        input_types: &[ValueType],
        input_data: &[Option<&ConstantTensor>],
    ) -> Result<Vec<ValueType>, InferError> {
        if input_types.len() != self.graph.inputs.len() {
            return Err(InferError::TypeInference(format!(
                "graph \"{}\" has {} inputs but {} input types were provided",
                self.name,
                self.graph.inputs.len(),
                input_types.len()
            )));
        }

        let mut graph = self.graph.clone();
        for (input, provided) in graph.inputs.iter_mut().zip(input_types) {
            check_compatible(provided, &input.value_type)?;
            merge(provided, &mut input.value_type);
        }

        let mut constants = FxHashMap::default();
        for (input, data) in graph.inputs.iter().zip(input_data) {
            if let Some(data) = data {
                constants.insert(input.name.clone(), (*data).clone());
            }
        }

        debug!(graph = %self.name, inputs = input_types.len(), "inferring nested graph");

        run_graph(&mut graph, self.ctx, constants).map_err(|err| InferError::Nested {
            scope: self.name.clone(),
            errors: err.into_errors(),
        })?;

        let output_types = graph
            .outputs
            .iter()
            .map(|output| output.value_type.clone())
            .collect();
        self.inferred = Some(graph);
        Ok(output_types)
    }

    /// Return the annotated graph produced by the last successful run.
    pub fn inferred_graph(&self) -> Option<&Graph> {
        self.inferred.as_ref()
    }

    pub(crate) fn into_inferred(self) -> Option<Graph> {
        self.inferred
    }
}

#[cfg(test)]
mod tests {
    use rustc_hash::FxHashMap;

    use super::GraphInferenceContext;
    use crate::context::InferenceContext;
    use crate::error::InferError;
    use crate::graph::{AttributeValue, Graph, Node, OpsetImports};
    use crate::options::InferenceOptions;
    use crate::registry::standard_registry;
    use crate::scope::ScopeEnv;
    use crate::tensor_data::ConstantTensor;
    use crate::types::{DataType, ValueType, dims};

    fn body() -> Graph {
        let mut graph = Graph::new();
        graph
            .add_input("x", ValueType::tensor_of(DataType::Float))
            .add_input("target", ValueType::tensor(DataType::Int64, dims!(2)))
            .add_node(Node::new("Reshape", &["x", "target"], &["y"]))
            .add_output("y", ValueType::Unknown);
        graph
    }

    #[test]
    fn test_run_inference() {
        let node = Node::new("Test", &[], &[]).with_attr("body", AttributeValue::Graph(body()));
        let opsets = OpsetImports::default_domain(13);
        let options = InferenceOptions::default();
        let graph_ctx = GraphInferenceContext::new(&opsets, standard_registry(), &options);
        let types = FxHashMap::default();
        let constants = FxHashMap::default();
        let mut ctx = InferenceContext::new(&node, ScopeEnv::new(None, &types), &constants)
            .with_graph_context(&graph_ctx);

        let inferencer = ctx.graph_attribute_inferencer("body").unwrap();
        assert_eq!(inferencer.name(), "body");
        assert!(matches!(
            inferencer.run_inference(&[ValueType::Unknown], &[]),
            Err(InferError::TypeInference(_))
        ));

        // Constant inputs are visible to the graph's nodes.
        let target = ConstantTensor::i64_vec(&[3, 4]);
        let x_type = ValueType::tensor(DataType::Float, dims!(12));
        let outputs = inferencer
            .run_inference(&[x_type, ValueType::Unknown], &[None, Some(&target)])
            .unwrap();
        assert_eq!(outputs, [ValueType::tensor(DataType::Float, dims!(3, 4))]);
        assert!(inferencer.inferred_graph().is_some());

        // Repeated requests return the same inferencer.
        assert!(ctx.graph_attribute_inferencer("body").unwrap().inferred_graph().is_some());

        let parts = ctx.into_parts();
        assert_eq!(parts.subgraphs.len(), 1);
        assert_eq!(
            parts.subgraphs[0].1.value_type("y"),
            Some(&ValueType::tensor(DataType::Float, dims!(3, 4)))
        );
    }

    #[test]
    fn test_incompatible_input_type() {
        let node = Node::new("Test", &[], &[]).with_attr("body", AttributeValue::Graph(body()));
        let opsets = OpsetImports::default_domain(13);
        let options = InferenceOptions::default();
        let graph_ctx = GraphInferenceContext::new(&opsets, standard_registry(), &options);
        let types = FxHashMap::default();
        let constants = FxHashMap::default();
        let mut ctx = InferenceContext::new(&node, ScopeEnv::new(None, &types), &constants)
            .with_graph_context(&graph_ctx);

        let inferencer = ctx.graph_attribute_inferencer("body").unwrap();
        let result = inferencer.run_inference(
            &[
                ValueType::tensor_of(DataType::Int32),
                ValueType::Unknown,
            ],
            &[],
        );
        assert!(matches!(result, Err(InferError::TypeConflict { .. })));
    }
}
