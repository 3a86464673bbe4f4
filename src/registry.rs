use std::fmt;
use std::sync::OnceLock;

use rustc_hash::FxHashMap;

use crate::context::InferTypes;
use crate::graph::{FunctionDef, canonical_domain};

/// Schema of one version of an operator.
///
/// A schema provides a type inference rule, a function body defining the
/// operator in terms of other operators, or both. When both are present the
/// rule is used.
pub struct OpSchema {
    name: String,
    domain: String,
    since_version: i64,
    rule: Option<Box<dyn InferTypes + Send + Sync>>,
    function: Option<FunctionDef>,
}

impl OpSchema {
    /// Create a schema for operator `name`, introduced in opset version
    /// `since_version` of `domain`.
    pub fn new(name: &str, domain: &str, since_version: i64) -> OpSchema {
        OpSchema {
            name: name.to_string(),
            domain: canonical_domain(domain).to_string(),
            since_version,
            rule: None,
            function: None,
        }
    }

    pub fn with_rule(mut self, rule: impl InferTypes + Send + Sync + 'static) -> OpSchema {
        self.rule = Some(Box::new(rule));
        self
    }

    pub fn with_function(mut self, function: FunctionDef) -> OpSchema {
        self.function = Some(function);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn since_version(&self) -> i64 {
        self.since_version
    }

    pub fn rule(&self) -> Option<&(dyn InferTypes + Send + Sync)> {
        self.rule.as_deref()
    }

    pub fn function(&self) -> Option<&FunctionDef> {
        self.function.as_ref()
    }
}

impl fmt::Debug for OpSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpSchema")
            .field("name", &self.name)
            .field("domain", &self.domain)
            .field("since_version", &self.since_version)
            .field("has_rule", &self.rule.is_some())
            .field("has_function", &self.function.is_some())
            .finish()
    }
}

/// Source of operator schemas used during inference.
///
/// Registries are read-only while inference runs and may be shared between
/// threads running inference on different graphs.
pub trait SchemaRegistry: Send + Sync {
    /// Find the schema for `op_type` in `domain` which applies to models
    /// importing opset `version` of that domain.
    fn lookup(&self, domain: &str, op_type: &str, version: i64) -> Option<&OpSchema>;
}

/// Registry of operator schemas, indexed by domain and name.
///
/// New registries have no operators registered. To create a registry with
/// the built-in inference rules use [`OpRegistry::with_standard_ops`], or
/// use the shared instance returned by [`standard_registry`].
#[derive(Default)]
pub struct OpRegistry {
    /// Map of (domain, op_type) to schemas, sorted by `since_version`.
    schemas: FxHashMap<(String, String), Vec<OpSchema>>,
}

impl OpRegistry {
    /// Create a new empty registry.
    pub fn new() -> OpRegistry {
        OpRegistry::default()
    }

    /// Create a new registry with the built-in inference rules registered.
    pub fn with_standard_ops() -> OpRegistry {
        let mut reg = OpRegistry::new();
        crate::ops::register_standard_ops(&mut reg);
        reg
    }

    /// Add a schema to the registry.
    ///
    /// A schema with the same domain, name and version as an existing one
    /// replaces it.
    pub fn register(&mut self, schema: OpSchema) {
        let versions = self
            .schemas
            .entry((schema.domain.clone(), schema.name.clone()))
            .or_default();
        match versions.binary_search_by_key(&schema.since_version, |s| s.since_version) {
            Ok(pos) => versions[pos] = schema,
            Err(pos) => versions.insert(pos, schema),
        }
    }

    /// Return the number of registered schemas, counting each version.
    pub fn len(&self) -> usize {
        self.schemas.values().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

impl SchemaRegistry for OpRegistry {
    fn lookup(&self, domain: &str, op_type: &str, version: i64) -> Option<&OpSchema> {
        let key = (canonical_domain(domain).to_string(), op_type.to_string());
        self.schemas
            .get(&key)?
            .iter()
            .rev()
            .find(|schema| schema.since_version <= version)
    }
}

/// Return a shared registry with the built-in inference rules registered.
///
/// The registry is created on first use.
pub fn standard_registry() -> &'static OpRegistry {
    static REGISTRY: OnceLock<OpRegistry> = OnceLock::new();
    REGISTRY.get_or_init(OpRegistry::with_standard_ops)
}

#[cfg(test)]
mod tests {
    use shapeflow_testing::TestCases;

    use super::{OpRegistry, OpSchema, SchemaRegistry, standard_registry};
    use crate::context::InferenceContext;
    use crate::error::InferError;

    #[test]
    fn test_lookup_picks_latest_applicable_version() {
        // The registry is not unwind safe, so each case builds its own.
        let make_registry = || {
            let mut reg = OpRegistry::new();
            reg.register(OpSchema::new("Squeeze", "", 13));
            reg.register(OpSchema::new("Squeeze", "", 1));
            reg.register(OpSchema::new("Squeeze", "", 21));
            reg
        };
        assert_eq!(make_registry().len(), 3);

        #[derive(Debug)]
        struct Case {
            domain: &'static str,
            version: i64,
            expected: Option<i64>,
        }

        let cases = [
            Case {
                domain: "",
                version: 0,
                expected: None,
            },
            Case {
                domain: "",
                version: 1,
                expected: Some(1),
            },
            Case {
                domain: "",
                version: 12,
                expected: Some(1),
            },
            Case {
                domain: "ai.onnx",
                version: 13,
                expected: Some(13),
            },
            Case {
                domain: "",
                version: 30,
                expected: Some(21),
            },
            Case {
                domain: "com.example",
                version: 13,
                expected: None,
            },
        ];

        cases.test_each(|case| {
            let reg = make_registry();
            let schema = reg.lookup(case.domain, "Squeeze", case.version);
            assert_eq!(schema.map(|s| s.since_version()), case.expected);
        });
    }

    fn no_op(_ctx: &mut InferenceContext<'_>) -> Result<(), InferError> {
        Ok(())
    }

    #[test]
    fn test_register_replaces_same_version() {
        let mut reg = OpRegistry::new();
        reg.register(OpSchema::new("Foo", "com.example", 1));
        reg.register(OpSchema::new("Foo", "com.example", 1).with_rule(no_op));
        assert_eq!(reg.len(), 1);
        assert!(reg.lookup("com.example", "Foo", 1).unwrap().rule().is_some());
    }

    #[test]
    fn test_standard_registry() {
        let reg = standard_registry();
        assert!(std::ptr::eq(reg, standard_registry()));
        for op in ["Add", "Concat", "Gather", "If", "Loop", "Reshape", "Shape", "Slice"] {
            assert!(reg.lookup("", op, 13).is_some(), "missing {}", op);
        }
        assert!(reg.lookup("", "NotAnOp", 13).is_none());
    }
}
