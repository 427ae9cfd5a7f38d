// ============================================================================
// Engine configuration
// ============================================================================

use rhai::Engine;
use rhai::module_resolvers::{FileModuleResolver, ModuleResolversCollection};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Execution limits applied to every photon script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RhaiEngineConfig {
    /// Maximum call stack depth
    pub max_call_stack_depth: usize,
    /// Maximum number of operations per evaluation
    pub max_operations: u64,
    /// Maximum array size
    pub max_array_size: usize,
    /// Maximum string size
    pub max_string_size: usize,
    /// Whether loops are allowed
    pub allow_loops: bool,
}

impl Default for RhaiEngineConfig {
    fn default() -> Self {
        Self {
            max_call_stack_depth: 64,
            max_operations: 1_000_000,
            max_array_size: 10_000,
            max_string_size: 1_000_000,
            allow_loops: true,
        }
    }
}

/// Build an engine for a script living in `base_dir`.
pub(crate) fn build_engine(
    config: &RhaiEngineConfig,
    base_dir: Option<&Path>,
    search_path: &[PathBuf],
) -> Engine {
    let mut engine = Engine::new();

    engine.set_max_call_levels(config.max_call_stack_depth);
    engine.set_max_operations(config.max_operations);
    engine.set_max_array_size(config.max_array_size);
    engine.set_max_string_size(config.max_string_size);
    if !config.allow_loops {
        engine.set_allow_looping(false);
    }
    engine.set_strict_variables(false);

    let mut resolvers = ModuleResolversCollection::new();
    if let Some(dir) = base_dir {
        resolvers.push(FileModuleResolver::new_with_path(dir));
    }
    for dir in search_path {
        if Some(dir.as_path()) != base_dir {
            resolvers.push(FileModuleResolver::new_with_path(dir));
        }
    }
    engine.set_module_resolver(resolvers);

    engine.on_print(|text| info!(target: "luminal::script", "{text}"));
    engine.on_debug(|text, source, pos| {
        debug!(target: "luminal::script", source = source.unwrap_or(""), "{text} ({pos})");
    });

    engine
}
