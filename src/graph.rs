//! Graphs, nodes and the other parts of a model definition that inference
//! operates on.

use rustc_hash::FxHashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::tensor_data::ConstantTensor;
use crate::types::ValueType;

/// Name of the default operator domain.
///
/// `"ai.onnx"` is accepted as an alias.
pub const DEFAULT_DOMAIN: &str = "";

/// Return the canonical form of a domain name.
pub fn canonical_domain(domain: &str) -> &str {
    if domain == "ai.onnx" {
        DEFAULT_DOMAIN
    } else {
        domain
    }
}

/// Value of a node attribute.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AttributeValue {
    Int(i64),
    Float(f32),
    String(String),
    Ints(Vec<i64>),
    Floats(Vec<f32>),
    Strings(Vec<String>),
    Tensor(ConstantTensor),
    Graph(Graph),
    Graphs(Vec<Graph>),
}

impl AttributeValue {
    /// Short name of the attribute kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Ints(_) => "ints",
            Self::Floats(_) => "floats",
            Self::Strings(_) => "strings",
            Self::Tensor(_) => "tensor",
            Self::Graph(_) => "graph",
            Self::Graphs(_) => "graphs",
        }
    }
}

/// A named attribute of a node.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Attribute {
    pub name: String,
    pub value: AttributeValue,

    /// In a function body, the name of the caller's attribute whose value
    /// this attribute takes. `value` is a placeholder in that case.
    #[cfg_attr(feature = "serde", serde(default))]
    pub ref_attr_name: Option<String>,
}

impl Attribute {
    pub fn new(name: &str, value: AttributeValue) -> Attribute {
        Attribute {
            name: name.to_string(),
            value,
            ref_attr_name: None,
        }
    }

    /// Create an attribute which refers to an attribute of the function's
    /// caller.
    pub fn reference(name: &str, ref_attr_name: &str) -> Attribute {
        Attribute {
            name: name.to_string(),
            value: AttributeValue::Ints(Vec::new()),
            ref_attr_name: Some(ref_attr_name.to_string()),
        }
    }
}

/// An operator invocation.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Node {
    /// Debug name of the node.
    #[cfg_attr(feature = "serde", serde(default))]
    pub name: Option<String>,
    pub op_type: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub domain: String,

    /// Names of input values. An empty name denotes an omitted optional
    /// input.
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub attributes: Vec<Attribute>,
}

impl Node {
    /// Create a node for an operator in the default domain.
    pub fn new(op_type: &str, inputs: &[&str], outputs: &[&str]) -> Node {
        Node {
            name: None,
            op_type: op_type.to_string(),
            domain: DEFAULT_DOMAIN.to_string(),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
            attributes: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: &str) -> Node {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_domain(mut self, domain: &str) -> Node {
        self.domain = domain.to_string();
        self
    }

    pub fn with_attr(mut self, name: &str, value: AttributeValue) -> Node {
        self.attributes.push(Attribute::new(name, value));
        self
    }

    /// Look up an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|attr| attr.name == name)
    }

    /// Return true if any attribute of this node holds a subgraph.
    pub fn has_subgraphs(&self) -> bool {
        self.attributes.iter().any(|attr| {
            matches!(
                attr.value,
                AttributeValue::Graph(_) | AttributeValue::Graphs(_)
            )
        })
    }

    /// Return the name used to identify this node in diagnostics.
    pub fn debug_name(&self, index: usize) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("{} #{}", self.op_type, index),
        }
    }
}

/// Name and type of a graph value.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ValueInfo {
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub value_type: ValueType,
}

impl ValueInfo {
    pub fn new(name: &str, value_type: ValueType) -> ValueInfo {
        ValueInfo {
            name: name.to_string(),
            value_type,
        }
    }
}

/// Constant value embedded in a graph.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Initializer {
    pub name: String,
    pub tensor: ConstantTensor,
}

/// A graph defines how to produce output values from input values and
/// constants by flowing them through a series of operators.
///
/// Nodes are expected to be in topological order: every node input is
/// either a graph input, an initializer, the output of an earlier node or a
/// value captured from an enclosing graph.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Graph {
    #[cfg_attr(feature = "serde", serde(default))]
    pub name: String,
    pub nodes: Vec<Node>,
    pub inputs: Vec<ValueInfo>,
    pub outputs: Vec<ValueInfo>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub initializers: Vec<Initializer>,

    /// Types of intermediate values.
    ///
    /// Inference adds an entry for every intermediate value whose type it
    /// learns something about.
    #[cfg_attr(feature = "serde", serde(default))]
    pub value_info: Vec<ValueInfo>,
}

impl Graph {
    /// Create a new empty graph.
    pub fn new() -> Graph {
        Graph::default()
    }

    /// Add a graph input with a declared type.
    pub fn add_input(&mut self, name: &str, value_type: ValueType) -> &mut Self {
        self.inputs.push(ValueInfo::new(name, value_type));
        self
    }

    /// Add a graph output, with a declared type which may be
    /// [`ValueType::Unknown`].
    pub fn add_output(&mut self, name: &str, value_type: ValueType) -> &mut Self {
        self.outputs.push(ValueInfo::new(name, value_type));
        self
    }

    pub fn add_initializer(&mut self, name: &str, tensor: ConstantTensor) -> &mut Self {
        self.initializers.push(Initializer {
            name: name.to_string(),
            tensor,
        });
        self
    }

    pub fn add_node(&mut self, node: Node) -> &mut Self {
        self.nodes.push(node);
        self
    }

    /// Look up the type of a value by name.
    ///
    /// This searches inputs, outputs and value_info, in that order.
    /// Initializers are not searched.
    pub fn value_type(&self, name: &str) -> Option<&ValueType> {
        self.inputs
            .iter()
            .chain(&self.outputs)
            .chain(&self.value_info)
            .find(|info| info.name == name)
            .map(|info| &info.value_type)
    }
}

/// Mapping from operator domain to the imported opset version.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OpsetImports {
    versions: FxHashMap<String, i64>,
}

impl OpsetImports {
    pub fn new() -> OpsetImports {
        OpsetImports::default()
    }

    /// Create imports for the default domain only.
    pub fn default_domain(version: i64) -> OpsetImports {
        let mut imports = OpsetImports::new();
        imports.insert(DEFAULT_DOMAIN, version);
        imports
    }

    pub fn insert(&mut self, domain: &str, version: i64) {
        self.versions
            .insert(canonical_domain(domain).to_string(), version);
    }

    /// Return the imported version of `domain`.
    pub fn version(&self, domain: &str) -> Option<i64> {
        self.versions.get(canonical_domain(domain)).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.versions.iter().map(|(d, v)| (d.as_str(), *v))
    }
}

/// Definition of a composite operator as a body of other operators.
///
/// Inputs and outputs of the body are referred to by the names in `inputs`
/// and `outputs`. Attributes of body nodes may refer to the caller's
/// attributes via [`Attribute::ref_attr_name`].
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FunctionDef {
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub domain: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,

    /// Names of attributes the function accepts.
    #[cfg_attr(feature = "serde", serde(default))]
    pub attributes: Vec<String>,
    pub nodes: Vec<Node>,

    /// Opsets used by the body. If empty, the caller's imports are used.
    #[cfg_attr(feature = "serde", serde(default))]
    pub opset_imports: OpsetImports,
}

/// A graph together with the opsets it was authored against and the
/// functions it defines.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Model {
    pub graph: Graph,
    pub opset_imports: OpsetImports,
    #[cfg_attr(feature = "serde", serde(default))]
    pub functions: Vec<FunctionDef>,
}
