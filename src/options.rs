use std::fmt;

use tracing::warn;

use crate::env::{env_flag, env_u64};

/// Controls what happens when inference of a node fails.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ErrorMode {
    /// Stop at the first failing node.
    #[default]
    FailFast,

    /// Skip failing nodes, continue with the rest of the graph and report
    /// every failure at the end.
    Collect,
}

impl ErrorMode {
    /// Parse an error mode name ("fail-fast" or "collect").
    pub fn from_name(name: &str) -> Option<ErrorMode> {
        match name {
            "fail-fast" | "failfast" => Some(ErrorMode::FailFast),
            "collect" => Some(ErrorMode::Collect),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorMode::FailFast => write!(f, "fail-fast"),
            ErrorMode::Collect => write!(f, "collect"),
        }
    }
}

/// Options that control the strictness and extent of inference.
#[derive(Clone, Debug, PartialEq)]
pub struct InferenceOptions {
    /// Treat conflicts between inferred and existing types as errors.
    ///
    /// When false, conflicts are logged and the existing type is kept.
    pub check_type: bool,

    pub error_mode: ErrorMode,

    /// Run data propagators to compute generated shape data.
    pub data_propagation: bool,

    /// Replace dimensions that are still unknown after inference with fresh
    /// symbols.
    pub materialize_symbols: bool,

    /// Seed for the symbol generator. `None` uses a random seed.
    pub symbol_seed: Option<u64>,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        InferenceOptions {
            check_type: false,
            error_mode: ErrorMode::FailFast,
            data_propagation: true,
            materialize_symbols: false,
            symbol_seed: None,
        }
    }
}

impl InferenceOptions {
    /// Create options from the defaults, overridden by `SHAPEFLOW_*`
    /// environment variables.
    ///
    /// - `SHAPEFLOW_CHECK_TYPE`: boolean, see [`check_type`](Self::check_type)
    /// - `SHAPEFLOW_ERROR_MODE`: "fail-fast" or "collect"
    /// - `SHAPEFLOW_DATA_PROP`: boolean
    /// - `SHAPEFLOW_SYMBOLS`: boolean, see
    ///   [`materialize_symbols`](Self::materialize_symbols)
    /// - `SHAPEFLOW_SYMBOL_SEED`: integer
    pub fn from_env() -> InferenceOptions {
        let defaults = InferenceOptions::default();
        let error_mode = match std::env::var("SHAPEFLOW_ERROR_MODE") {
            Ok(name) => ErrorMode::from_name(name.trim()).unwrap_or_else(|| {
                warn!(value = %name, "unrecognized error mode");
                defaults.error_mode
            }),
            Err(_) => defaults.error_mode,
        };

        InferenceOptions {
            check_type: env_flag("SHAPEFLOW_CHECK_TYPE", defaults.check_type),
            error_mode,
            data_propagation: env_flag("SHAPEFLOW_DATA_PROP", defaults.data_propagation),
            materialize_symbols: env_flag("SHAPEFLOW_SYMBOLS", defaults.materialize_symbols),
            symbol_seed: env_u64("SHAPEFLOW_SYMBOL_SEED").or(defaults.symbol_seed),
        }
    }

    /// Return options with strict type checking enabled.
    pub fn strict() -> InferenceOptions {
        InferenceOptions {
            check_type: true,
            ..Default::default()
        }
    }
}
