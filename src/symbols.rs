//! Generation of placeholder names for dimensions of unknown size.

use std::borrow::Cow;

use rustc_hash::FxHashSet;

use crate::error::InferError;

/// Number of attempts made to find an unused name before giving up.
const MAX_ATTEMPTS: u32 = 3;

/// Tracks the dimension symbols in use during an inference run and generates
/// new ones.
///
/// Generated names consist of a prefix followed by a random three digit
/// suffix, eg. "unk__042".
pub struct SymbolTable {
    prefix: Cow<'static, str>,
    symbols: FxHashSet<String>,
    rng: fastrand::Rng,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::with_rng("unk__".into(), fastrand::Rng::new())
    }

    /// Create a table whose generated names are determined by `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng("unk__".into(), fastrand::Rng::with_seed(seed))
    }

    pub fn with_prefix(prefix: Cow<'static, str>) -> Self {
        Self::with_rng(prefix, fastrand::Rng::new())
    }

    fn with_rng(prefix: Cow<'static, str>, rng: fastrand::Rng) -> Self {
        SymbolTable {
            prefix,
            symbols: FxHashSet::default(),
            rng,
        }
    }

    /// Add an existing symbol to the table.
    ///
    /// Returns false if the symbol was already present.
    pub fn register_symbol(&mut self, name: &str) -> bool {
        if self.symbols.contains(name) {
            return false;
        }
        self.symbols.insert(name.to_string())
    }

    /// Generate a new symbol which is not in the table and add it.
    pub fn create_symbol(&mut self) -> Result<String, InferError> {
        for _ in 0..MAX_ATTEMPTS {
            let name = format!("{}{:03}", self.prefix, self.rng.u32(0..1000));
            if self.register_symbol(&name) {
                return Ok(name);
            }
        }
        Err(InferError::SymbolExhaustion {
            attempts: MAX_ATTEMPTS,
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.symbols.contains(name)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}
