use rustc_hash::FxHashMap;

use crate::types::ValueType;

/// An environment from which value types are resolved during inference.
///
/// Subgraphs used by control flow operators (`If`, `Loop` etc.) may refer to
/// values defined in enclosing graphs, like a captured value in a Rust
/// closure. Scopes are arranged in a chain: lookups search the types of the
/// graph being inferred first and then the parent scopes, innermost first.
///
/// A scope only exposes value types. Constant data and generated shape data
/// of enclosing graphs are not visible to nested graphs.
#[derive(Clone, Copy)]
pub struct ScopeEnv<'a> {
    parent: Option<&'a ScopeEnv<'a>>,
    types: &'a FxHashMap<String, ValueType>,
}

impl<'a> ScopeEnv<'a> {
    /// Create a scope that resolves names from `types`, then from `parent`.
    pub fn new(parent: Option<&'a ScopeEnv<'a>>, types: &'a FxHashMap<String, ValueType>) -> Self {
        ScopeEnv { parent, types }
    }

    /// Look up the type of a value by name in this scope and its ancestors.
    pub fn lookup(&self, name: &str) -> Option<&'a ValueType> {
        let mut scope = Some(self);
        while let Some(env) = scope {
            if let Some(ty) = env.types.get(name) {
                return Some(ty);
            }
            scope = env.parent;
        }
        None
    }

    pub fn parent(&self) -> Option<&'a ScopeEnv<'a>> {
        self.parent
    }

    /// Visit the types of every value visible in this scope, innermost scope
    /// first. Shadowed values are included.
    pub fn for_each_type(&self, mut f: impl FnMut(&str, &ValueType)) {
        let mut scope = Some(self);
        while let Some(env) = scope {
            for (name, ty) in env.types {
                f(name, ty);
            }
            scope = env.parent;
        }
    }
}
