//! The inference driver: a single forward pass over the nodes of a graph.

use std::cell::RefCell;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::{debug, debug_span, warn};

use crate::context::{GeneratedShapeData, InferTypes, InferenceContext, InferredNode};
use crate::error::{GraphInferenceError, InferError, NodeError};
use crate::graph::{
    AttributeValue, DEFAULT_DOMAIN, FunctionDef, Graph, Model, Node, OpsetImports, ValueInfo,
    canonical_domain,
};
use crate::merge::{check_compatible, merge};
use crate::ops::{constant_node_value, merge_into_output};
use crate::options::{ErrorMode, InferenceOptions};
use crate::propagate::data_propagator;
use crate::registry::SchemaRegistry;
use crate::scope::ScopeEnv;
use crate::subgraph::GraphInferenceContext;
use crate::symbols::SymbolTable;
use crate::tensor_data::ConstantTensor;
use crate::types::{Dimension, ValueType};

/// Infer the types of all values in a model's main graph.
///
/// Inferred types of intermediate values are written to the graph's
/// `value_info` and inferred output types to its `outputs`. Nodes may invoke
/// the functions defined in the model.
pub fn infer_model(
    model: &mut Model,
    registry: &dyn SchemaRegistry,
    options: &InferenceOptions,
) -> Result<(), GraphInferenceError> {
    let Model {
        graph,
        opset_imports,
        functions,
    } = model;
    let ctx =
        GraphInferenceContext::new(opset_imports, registry, options).with_functions(functions);
    run_graph(graph, &ctx, FxHashMap::default())
}

/// Infer the types of all values in a graph which uses the operator sets in
/// `opset_imports`.
///
/// See [`infer_model`].
pub fn infer_graph(
    graph: &mut Graph,
    opset_imports: &OpsetImports,
    registry: &dyn SchemaRegistry,
    options: &InferenceOptions,
) -> Result<(), GraphInferenceError> {
    let ctx = GraphInferenceContext::new(opset_imports, registry, options);
    run_graph(graph, &ctx, FxHashMap::default())
}

/// Infer the output types of the node in `ctx` by inferring the body of
/// `function`.
///
/// The caller's input types and constant values are bound to the function's
/// inputs and attribute references in the body are replaced by the caller's
/// attributes. Values of the caller's graph are not visible in the body.
pub fn infer_function_node(
    function: &FunctionDef,
    registry: &dyn SchemaRegistry,
    options: &InferenceOptions,
    ctx: &mut InferenceContext<'_>,
) -> Result<(), InferError> {
    let caller = ctx.node();
    let mut graph = Graph::new();
    graph.name = function.name.clone();

    // Inputs the caller omitted are omitted wherever the body uses them.
    let mut renames = FxHashMap::default();
    let mut constants = FxHashMap::default();
    for (index, name) in function.inputs.iter().enumerate() {
        if !ctx.has_input(index) {
            renames.insert(name.as_str(), "");
            continue;
        }
        let value_type = ctx.input_type(index)?.cloned().unwrap_or_default();
        graph.inputs.push(ValueInfo::new(name, value_type));
        if let Some(data) = ctx.input_data(index)? {
            constants.insert(name.clone(), data.clone());
        }
    }

    graph.nodes = function.nodes.clone();
    for node in &mut graph.nodes {
        bind_function_node(node, caller, &renames);
    }
    for name in &function.outputs {
        graph.outputs.push(ValueInfo::new(name, ValueType::Unknown));
    }

    let caller_ctx = ctx.graph_context();
    let no_imports = OpsetImports::new();
    let opset_imports = if !function.opset_imports.is_empty() {
        &function.opset_imports
    } else {
        caller_ctx.map(|c| c.opset_imports).unwrap_or(&no_imports)
    };
    let mut body_ctx = GraphInferenceContext::new(opset_imports, registry, options)
        .with_functions(caller_ctx.map(|c| c.functions).unwrap_or(&[]));
    body_ctx.symbols = caller_ctx.and_then(|c| c.symbols);

    run_graph(&mut graph, &body_ctx, constants).map_err(|err| InferError::Nested {
        scope: function.name.clone(),
        errors: err.into_errors(),
    })?;

    let output_count = ctx.output_count();
    for (index, output) in graph.outputs.iter().take(output_count).enumerate() {
        merge_into_output(ctx, index, &output.value_type)?;
    }
    Ok(())
}

/// Prepare a node of a function body for inference on behalf of `caller`.
///
/// Attributes which refer to a caller attribute are replaced by its value,
/// or removed if the caller does not have it. Inputs named in `renames` are
/// renamed, including in nested graphs.
fn bind_function_node(node: &mut Node, caller: &Node, renames: &FxHashMap<&str, &str>) {
    for input in &mut node.inputs {
        if let Some(new_name) = renames.get(input.as_str()) {
            *input = new_name.to_string();
        }
    }

    node.attributes.retain_mut(|attr| {
        if let Some(ref_name) = attr.ref_attr_name.take() {
            match caller.attribute(&ref_name) {
                Some(value) => attr.value = value.value.clone(),
                None => return false,
            }
        }
        match &mut attr.value {
            AttributeValue::Graph(graph) => bind_function_graph(graph, caller, renames),
            AttributeValue::Graphs(graphs) => graphs
                .iter_mut()
                .for_each(|graph| bind_function_graph(graph, caller, renames)),
            _ => {}
        }
        true
    });
}

fn bind_function_graph(graph: &mut Graph, caller: &Node, renames: &FxHashMap<&str, &str>) {
    for node in &mut graph.nodes {
        bind_function_node(node, caller, renames);
    }
}

/// How the output types of a node are inferred.
enum Implementation<'r> {
    Rule(&'r (dyn InferTypes + Send + Sync)),
    Function(&'r FunctionDef),

    /// The operator is known but has neither a rule nor a body, so its
    /// outputs stay unknown.
    Opaque,
}

/// Mutable state of one inference run over a graph.
struct GraphRun<'s> {
    types: FxHashMap<String, ValueType>,
    constants: FxHashMap<String, ConstantTensor>,
    shape_data: GeneratedShapeData,
    symbols: &'s RefCell<SymbolTable>,
}

impl<'s> GraphRun<'s> {
    fn new(
        graph: &Graph,
        ctx: &GraphInferenceContext<'_>,
        symbols: &'s RefCell<SymbolTable>,
        mut constants: FxHashMap<String, ConstantTensor>,
    ) -> Result<GraphRun<'s>, InferError> {
        let mut types: FxHashMap<String, ValueType> = FxHashMap::default();
        for input in &graph.inputs {
            types.insert(input.name.clone(), input.value_type.clone());
        }

        // Initializers which are also graph inputs are defaults that the
        // caller may override, so their values are not constant.
        for init in &graph.initializers {
            let value_type = init.tensor.value_type();
            if !types.contains_key(&init.name) {
                constants
                    .entry(init.name.clone())
                    .or_insert_with(|| init.tensor.clone());
            }
            seed_type(&mut types, &init.name, &value_type)?;
        }
        for info in graph.value_info.iter().chain(&graph.outputs) {
            seed_type(&mut types, &info.name, &info.value_type)?;
        }

        {
            let mut symbols = symbols.borrow_mut();
            for value_type in types.values() {
                register_symbols(&mut symbols, value_type);
            }
            if let Some(outer) = ctx.outer_scope {
                outer.for_each_type(|_, value_type| register_symbols(&mut symbols, value_type));
            }
        }

        Ok(GraphRun {
            types,
            constants,
            shape_data: GeneratedShapeData::new(),
            symbols,
        })
    }

    /// Infer the output types of a node and merge them into the run's types.
    ///
    /// Returns annotated copies of the node's graph attributes.
    fn infer_node(
        &mut self,
        node: &Node,
        index: usize,
        ctx: &GraphInferenceContext<'_>,
    ) -> Result<Vec<(String, Graph)>, InferError> {
        let options = ctx.options;
        let implementation = resolve_implementation(node, ctx)?;

        let inferred = {
            let scope = ScopeEnv::new(ctx.outer_scope, &self.types);
            let child_ctx = GraphInferenceContext {
                outer_scope: Some(&scope),
                ..*ctx
            };
            let mut node_ctx = InferenceContext::new(node, scope, &self.constants)
                .with_shape_data(&self.shape_data)
                .with_graph_context(&child_ctx);

            match implementation {
                Implementation::Rule(rule) => rule.infer_types(&mut node_ctx)?,
                Implementation::Function(function) => {
                    infer_function_node(function, ctx.registry, options, &mut node_ctx)?
                }
                Implementation::Opaque => {}
            }
            if options.data_propagation {
                if let Some(propagate) = data_propagator(&node.domain, &node.op_type) {
                    propagate(&mut node_ctx)?;
                }
            }
            node_ctx.into_parts()
        };

        let InferredNode {
            outputs: inferred_types,
            subgraphs,
            shape_data: mut staged_shape_data,
        } = inferred;

        // Check every output before merging any, so a node's outputs are
        // updated together.
        let mut accepted: SmallVec<[bool; 2]> = SmallVec::with_capacity(node.outputs.len());
        for (name, inferred_type) in node.outputs.iter().zip(&inferred_types) {
            let result = match self.types.get(name) {
                Some(existing) if !name.is_empty() => check_compatible(inferred_type, existing),
                _ => Ok(()),
            };
            match result {
                Ok(()) => accepted.push(!name.is_empty()),
                Err(err) if !options.check_type && err.is_conflict() => {
                    warn!(
                        node = %node.debug_name(index),
                        output = %name,
                        error = %err,
                        "ignoring conflict with existing type"
                    );
                    accepted.push(false);
                }
                Err(err) => return Err(err),
            }
        }

        // Values derived from the node are only committed for accepted
        // outputs, so downstream nodes never see data of a rejected output.
        let constant = if node.op_type == "Constant"
            && canonical_domain(&node.domain) == DEFAULT_DOMAIN
            && accepted.first() == Some(&true)
        {
            constant_node_value(node)
        } else {
            None
        };

        let mut symbols = self.symbols.borrow_mut();
        for ((name, inferred_type), accepted) in
            node.outputs.iter().zip(&inferred_types).zip(accepted)
        {
            if !accepted {
                continue;
            }
            let existing = self.types.entry(name.clone()).or_default();
            merge(inferred_type, existing);
            register_symbols(&mut symbols, existing);
            if options.materialize_symbols {
                materialize_symbols(existing, &mut symbols)?;
            }
            if let Some(shape) = staged_shape_data.remove(name) {
                self.shape_data.insert(name, shape)?;
            }
        }
        drop(symbols);

        if let (Some(value), Some(output)) = (constant, node.outputs.first()) {
            self.constants.insert(output.clone(), value);
        }

        debug!(
            node = %node.debug_name(index),
            op_type = %node.op_type,
            "inferred node"
        );

        Ok(subgraphs)
    }
}

/// Find how to infer the outputs of `node`.
///
/// Functions defined in the model take precedence over registered schemas.
fn resolve_implementation<'r>(
    node: &Node,
    ctx: &GraphInferenceContext<'r>,
) -> Result<Implementation<'r>, InferError> {
    let domain = canonical_domain(&node.domain);
    let Some(version) = ctx.opset_imports.version(domain) else {
        return Err(InferError::UnknownOperator {
            domain: domain.to_string(),
            op_type: node.op_type.clone(),
            version: None,
        });
    };

    let functions: &'r [FunctionDef] = ctx.functions;
    if let Some(function) = functions
        .iter()
        .find(|f| f.name == node.op_type && canonical_domain(&f.domain) == domain)
    {
        return Ok(Implementation::Function(function));
    }

    let registry: &'r dyn SchemaRegistry = ctx.registry;
    let schema = registry
        .lookup(domain, &node.op_type, version)
        .ok_or_else(|| InferError::UnknownOperator {
            domain: domain.to_string(),
            op_type: node.op_type.clone(),
            version: Some(version),
        })?;
    let implementation = match (schema.rule(), schema.function()) {
        (Some(rule), _) => Implementation::Rule(rule),
        (None, Some(function)) => Implementation::Function(function),
        (None, None) => Implementation::Opaque,
    };
    Ok(implementation)
}

/// Add a declared type for `name` to `types`, merging with any type already
/// declared for it.
fn seed_type(
    types: &mut FxHashMap<String, ValueType>,
    name: &str,
    value_type: &ValueType,
) -> Result<(), InferError> {
    let existing = types.entry(name.to_string()).or_default();
    check_compatible(value_type, existing)?;
    merge(value_type, existing);
    Ok(())
}

fn register_symbols(symbols: &mut SymbolTable, value_type: &ValueType) {
    value_type.for_each_dim(&mut |dim| {
        if let Dimension::Symbolic(name) = dim {
            symbols.register_symbol(name);
        }
    });
}

/// Replace unknown dimensions in `value_type` with new symbols.
fn materialize_symbols(
    value_type: &mut ValueType,
    symbols: &mut SymbolTable,
) -> Result<(), InferError> {
    value_type.for_each_dim_mut(&mut |dim: &mut Dimension| -> Result<(), InferError> {
        if dim.is_unknown() {
            *dim = Dimension::Symbolic(symbols.create_symbol()?);
        }
        Ok(())
    })
}

/// Write inferred types into the graph's outputs and `value_info`.
fn persist_types(graph: &mut Graph, types: &FxHashMap<String, ValueType>) {
    for output in &mut graph.outputs {
        if let Some(value_type) = types.get(&output.name) {
            output.value_type = value_type.clone();
        }
    }

    let Graph {
        nodes,
        outputs,
        value_info,
        ..
    } = graph;
    let mut positions: FxHashMap<String, usize> = value_info
        .iter()
        .enumerate()
        .map(|(pos, info)| (info.name.clone(), pos))
        .collect();

    for name in nodes.iter().flat_map(|node| node.outputs.iter()) {
        if name.is_empty() || outputs.iter().any(|output| &output.name == name) {
            continue;
        }
        let Some(value_type) = types.get(name) else {
            continue;
        };
        match positions.get(name) {
            Some(&pos) => value_info[pos].value_type = value_type.clone(),
            None if !value_type.is_unknown() => {
                positions.insert(name.clone(), value_info.len());
                value_info.push(ValueInfo::new(name, value_type.clone()));
            }
            None => {}
        }
    }
}

/// Replace graph attributes of `node` with their annotated copies.
fn write_back_subgraphs(node: &mut Node, subgraphs: Vec<(String, Graph)>) {
    for (name, inferred) in subgraphs {
        if let Some(attr) = node.attributes.iter_mut().find(|attr| attr.name == name) {
            if let AttributeValue::Graph(graph) = &mut attr.value {
                *graph = inferred;
            }
        }
    }
}

/// Run inference over `graph`.
///
/// `constants` binds values to graph inputs. Inferred types are persisted
/// into `graph` when the run succeeds, or in collect mode when it finishes
/// with non-fatal errors.
pub(crate) fn run_graph(
    graph: &mut Graph,
    ctx: &GraphInferenceContext<'_>,
    constants: FxHashMap<String, ConstantTensor>,
) -> Result<(), GraphInferenceError> {
    if let Some(symbols) = ctx.symbols {
        return run_graph_with_symbols(graph, ctx, symbols, constants);
    }

    // Nested runs share the outermost run's table, so generated symbols are
    // unique across all graphs.
    let symbols = RefCell::new(match ctx.options.symbol_seed {
        Some(seed) => SymbolTable::with_seed(seed),
        None => SymbolTable::new(),
    });
    let ctx = GraphInferenceContext {
        symbols: Some(&symbols),
        ..*ctx
    };
    run_graph_with_symbols(graph, &ctx, &symbols, constants)
}

fn run_graph_with_symbols(
    graph: &mut Graph,
    ctx: &GraphInferenceContext<'_>,
    symbols: &RefCell<SymbolTable>,
    constants: FxHashMap<String, ConstantTensor>,
) -> Result<(), GraphInferenceError> {
    let span = debug_span!("run_graph", graph = %graph.name, nodes = graph.nodes.len());
    let _guard = span.enter();

    let mut run = GraphRun::new(graph, ctx, symbols, constants).map_err(|error| {
        GraphInferenceError::new(vec![NodeError {
            index: 0,
            node: format!("graph \"{}\"", graph.name),
            op_type: String::new(),
            error,
        }])
    })?;

    let mut errors = Vec::new();
    let mut subgraphs = Vec::new();
    for (index, node) in graph.nodes.iter().enumerate() {
        match run.infer_node(node, index, ctx) {
            Ok(inferred) if inferred.is_empty() => {}
            Ok(inferred) => subgraphs.push((index, inferred)),
            Err(error) => {
                let fatal = error.is_fatal();
                errors.push(NodeError {
                    index,
                    node: node.debug_name(index),
                    op_type: node.op_type.clone(),
                    error,
                });
                if fatal || ctx.options.error_mode == ErrorMode::FailFast {
                    return Err(GraphInferenceError::new(errors));
                }
            }
        }
    }

    for (index, inferred) in subgraphs {
        write_back_subgraphs(&mut graph.nodes[index], inferred);
    }
    persist_types(graph, &run.types);

    debug!(
        values = run.types.len(),
        symbols = run.symbols.borrow().len(),
        errors = errors.len(),
        "finished graph inference"
    );

    if errors.is_empty() {
        Ok(())
    } else {
        Err(GraphInferenceError::new(errors))
    }
}
