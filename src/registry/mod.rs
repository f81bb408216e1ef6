//! Pluggable renderers keyed by node type and widget type.
//!
//! The registry is built once, filled by extension initializers and then
//! shared read-only by the renderers. Lookups are exact (widget types are
//! lowercased first); callers fall back to built-in rendering on a miss.

mod definition;
mod handler;

use std::{
    collections::{HashMap, HashSet},
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{FormError, Result, ShareLock};

pub use definition::{DeclarativeHandler, InfoBanner, NodeDefinition, PreviewConfig, WidgetNames};
pub use handler::{FnHandler, NodeHandler, OutputHandler, WidgetHandler, node_handler, output_handler, widget_handler};

/// Initializer run once by [`ExtensionRegistry::initialize_extensions`].
pub type ExtensionInit = Arc<dyn Fn(&ExtensionRegistry) -> Result<()> + Send + Sync>;

/// One type name or several. A single string may also hold a comma-joined list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeNames(Vec<String>);

impl TypeNames {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|s| s.as_str())
    }
}

impl From<&str> for TypeNames {
    fn from(value: &str) -> Self {
        TypeNames(value.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect())
    }
}

impl From<String> for TypeNames {
    fn from(value: String) -> Self {
        TypeNames::from(value.as_str())
    }
}

impl From<Vec<&str>> for TypeNames {
    fn from(value: Vec<&str>) -> Self {
        TypeNames(value.into_iter().flat_map(|v| TypeNames::from(v).0).collect())
    }
}

impl From<Vec<String>> for TypeNames {
    fn from(value: Vec<String>) -> Self {
        TypeNames(value.iter().flat_map(|v| TypeNames::from(v.as_str()).0).collect())
    }
}

impl<const N: usize> From<[&str; N]> for TypeNames {
    fn from(value: [&str; N]) -> Self {
        TypeNames::from(value.to_vec())
    }
}

/// Outcome of [`ExtensionRegistry::initialize_extensions`].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ExtensionReport {
    pub loaded: Vec<String>,
    pub failed: Vec<(String, FormError)>,
}

/// Run a handler, turning both errors and panics into [`FormError::Handler`].
pub(crate) fn guarded<T>(
    kind: &str,
    f: impl FnOnce() -> Result<T>,
) -> Result<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(FormError::handler(kind, e.to_string())),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panicked".to_string());
            Err(FormError::handler(kind, message))
        }
    }
}

#[derive(Default)]
pub struct ExtensionRegistry {
    node_handlers: ShareLock<HashMap<String, Arc<dyn NodeHandler>>>,
    widget_handlers: ShareLock<HashMap<String, Arc<dyn WidgetHandler>>>,
    output_handlers: ShareLock<HashMap<String, Arc<dyn OutputHandler>>>,
    output_node_types: ShareLock<HashSet<String>>,
    extensions: ShareLock<Vec<(String, ExtensionInit)>>,
    initialized: ShareLock<HashSet<String>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_node_handler(
        &self,
        types: impl Into<TypeNames>,
        handler: Arc<dyn NodeHandler>,
    ) {
        let mut handlers = self.node_handlers.write().unwrap();
        for t in types.into().iter() {
            if handlers.insert(t.to_string(), handler.clone()).is_some() {
                debug!("node handler for '{}' replaced", t);
            }
        }
    }

    pub fn register_widget_handler(
        &self,
        types: impl Into<TypeNames>,
        handler: Arc<dyn WidgetHandler>,
    ) {
        let mut handlers = self.widget_handlers.write().unwrap();
        for t in types.into().iter() {
            if handlers.insert(t.to_lowercase(), handler.clone()).is_some() {
                debug!("widget handler for '{}' replaced", t);
            }
        }
    }

    pub fn register_output_handler(
        &self,
        types: impl Into<TypeNames>,
        handler: Arc<dyn OutputHandler>,
    ) {
        let mut handlers = self.output_handlers.write().unwrap();
        for t in types.into().iter() {
            handlers.insert(t.to_string(), handler.clone());
        }
    }

    pub fn register_output_node_type(
        &self,
        types: impl Into<TypeNames>,
    ) {
        let mut output_types = self.output_node_types.write().unwrap();
        output_types.extend(types.into().iter().map(String::from));
    }

    pub fn get_node_handler(
        &self,
        node_type: &str,
    ) -> Option<Arc<dyn NodeHandler>> {
        self.node_handlers.read().unwrap().get(node_type).cloned()
    }

    pub fn get_widget_handler(
        &self,
        widget_type: &str,
    ) -> Option<Arc<dyn WidgetHandler>> {
        self.widget_handlers.read().unwrap().get(&widget_type.to_lowercase()).cloned()
    }

    pub fn get_output_handler(
        &self,
        node_type: &str,
    ) -> Option<Arc<dyn OutputHandler>> {
        self.output_handlers.read().unwrap().get(node_type).cloned()
    }

    pub fn is_output_node_type(
        &self,
        node_type: &str,
    ) -> bool {
        self.output_node_types.read().unwrap().contains(node_type)
    }

    pub fn output_node_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.output_node_types.read().unwrap().iter().cloned().collect();
        types.sort();
        types
    }

    /// Register node handlers generated from `definition`.
    pub fn define_nodes(
        &self,
        types: impl Into<TypeNames>,
        definition: NodeDefinition,
    ) {
        self.register_node_handler(types, definition.into_handler());
    }

    /// Register every `{"TypeA,TypeB": {definition}}` entry of a JSON object.
    pub fn define_nodes_from_json(
        &self,
        definitions: &Value,
    ) -> Result<usize> {
        let Some(map) = definitions.as_object() else {
            return Err(FormError::Config("node definitions must be a JSON object".to_string()));
        };
        for (types, value) in map {
            let definition = NodeDefinition::from_json(value.clone())?;
            self.define_nodes(types.as_str(), definition);
        }
        Ok(map.len())
    }

    pub fn register_extension<F>(
        &self,
        name: impl Into<String>,
        init: F,
    ) where
        F: Fn(&ExtensionRegistry) -> Result<()> + Send + Sync + 'static,
    {
        self.extensions.write().unwrap().push((name.into(), Arc::new(init)));
    }

    /// Run every extension not yet initialized, in registration order.
    ///
    /// A failing or panicking extension is logged and reported; the rest still load.
    pub fn initialize_extensions(&self) -> ExtensionReport {
        let pending: Vec<(String, ExtensionInit)> = {
            let initialized = self.initialized.read().unwrap();
            self.extensions.read().unwrap().iter().filter(|(name, _)| !initialized.contains(name)).cloned().collect()
        };

        let mut report = ExtensionReport::default();
        for (name, init) in pending {
            self.initialized.write().unwrap().insert(name.clone());
            match guarded(&name, || init(self)) {
                Ok(()) => {
                    info!("extension '{}' loaded", name);
                    report.loaded.push(name);
                }
                Err(e) => {
                    warn!("extension '{}' failed to load: {}", name, e);
                    report.failed.push((name, e));
                }
            }
        }
        report
    }
}
