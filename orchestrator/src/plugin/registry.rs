//! Explicit plugin registry.
//!
//! Spec strings look like `<module path>:<symbol>`; the symbol defaults to
//! `Plugin`. Only module paths under the `solutions.` namespace resolve, and
//! only to constructors registered here.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::debug;

use crate::plugin::echo::EchoPlugin;
use crate::plugin::interface::SolutionPlugin;

pub const PLUGIN_NAMESPACE: &str = "solutions.";
pub const DEFAULT_SYMBOL: &str = "Plugin";
pub const ECHO_PLUGIN_SPEC: &str = "solutions.security.echo.plugin:EchoPlugin";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginLoadError {
    #[error("Taskpack missing 'plugin'. Provide e.g. 'solutions.security.echo.plugin:EchoPlugin'.")]
    MissingSpec,
    #[error("Invalid plugin spec '{0}'. Use 'module:ClassName'.")]
    InvalidSpec(String),
    #[error("Plugin module '{0}' is outside the allowed 'solutions.' namespace.")]
    OutsideNamespace(String),
    #[error("Failed importing plugin module '{0}': no such module is registered.")]
    UnknownModule(String),
    #[error("Plugin symbol '{symbol}' not found in module '{module}'.")]
    UnknownSymbol { module: String, symbol: String },
    #[error("Plugin '{spec}' returned an empty {field}().")]
    InvalidIdentity { spec: String, field: &'static str },
}

/// A parsed `module:symbol` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginSpec {
    pub module: String,
    pub symbol: String,
}

impl PluginSpec {
    pub fn parse(spec: &str) -> Result<Self, PluginLoadError> {
        match spec.split_once(':') {
            Some((module, symbol)) => {
                let (module, symbol) = (module.trim(), symbol.trim());
                if module.is_empty() || symbol.is_empty() {
                    return Err(PluginLoadError::InvalidSpec(spec.to_string()));
                }
                Ok(Self {
                    module: module.to_string(),
                    symbol: symbol.to_string(),
                })
            }
            None => Ok(Self {
                module: spec.trim().to_string(),
                symbol: DEFAULT_SYMBOL.to_string(),
            }),
        }
    }
}

type Constructor = Box<dyn Fn() -> Box<dyn SolutionPlugin>>;

/// Identifier → constructor map.
#[derive(Default)]
pub struct PluginRegistry {
    modules: BTreeMap<String, BTreeMap<String, Constructor>>,
}

impl PluginRegistry {
    /// Registry holding every plugin that ships with the orchestrator.
    pub fn builtin() -> Self {
        let mut registry = Self::default();
        registry
            .register(ECHO_PLUGIN_SPEC, || Box::new(EchoPlugin))
            .expect("builtin plugin spec should be valid");
        registry
    }

    /// Register a constructor under `spec`. The spec must be well formed and
    /// inside the plugin namespace.
    pub fn register<F>(&mut self, spec: &str, constructor: F) -> Result<(), PluginLoadError>
    where
        F: Fn() -> Box<dyn SolutionPlugin> + 'static,
    {
        let parsed = parse_allowed(spec)?;
        self.modules
            .entry(parsed.module)
            .or_default()
            .insert(parsed.symbol, Box::new(constructor));
        Ok(())
    }

    /// Resolve `spec` and construct the plugin, checking its identity.
    ///
    /// No plugin method beyond `id()`/`version()` is called here.
    pub fn load(&self, spec: Option<&str>) -> Result<Box<dyn SolutionPlugin>, PluginLoadError> {
        let spec = spec
            .filter(|s| !s.trim().is_empty())
            .ok_or(PluginLoadError::MissingSpec)?;
        let parsed = parse_allowed(spec)?;
        let symbols = self
            .modules
            .get(&parsed.module)
            .ok_or_else(|| PluginLoadError::UnknownModule(parsed.module.clone()))?;
        let constructor =
            symbols
                .get(&parsed.symbol)
                .ok_or_else(|| PluginLoadError::UnknownSymbol {
                    module: parsed.module.clone(),
                    symbol: parsed.symbol.clone(),
                })?;

        let plugin = constructor();
        for (field, value) in [("id", plugin.id()), ("version", plugin.version())] {
            if value.trim().is_empty() {
                return Err(PluginLoadError::InvalidIdentity {
                    spec: spec.to_string(),
                    field,
                });
            }
        }
        debug!(spec, id = plugin.id(), version = plugin.version(), "plugin loaded");
        Ok(plugin)
    }
}

fn parse_allowed(spec: &str) -> Result<PluginSpec, PluginLoadError> {
    let parsed = PluginSpec::parse(spec)?;
    if !parsed.module.starts_with(PLUGIN_NAMESPACE) {
        return Err(PluginLoadError::OutsideNamespace(parsed.module));
    }
    Ok(parsed)
}
