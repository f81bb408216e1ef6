use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, trace};

use crate::{
    FormError, Result,
    graph::{GraphNode, GraphView},
};

use super::{Payload, SettingsRepository};

/// Settings payload stored as a JSON string in a widget of a sentinel node.
///
/// The host saves that widget like any other, so the settings travel with the
/// graph file.
pub struct EmbeddedRepository {
    graph: Arc<dyn GraphView>,
    sentinel_type: String,
    widget: String,
}

impl EmbeddedRepository {
    pub fn new(
        graph: Arc<dyn GraphView>,
        sentinel_type: impl Into<String>,
        widget: impl Into<String>,
    ) -> Self {
        Self {
            graph,
            sentinel_type: sentinel_type.into(),
            widget: widget.into(),
        }
    }

    fn sentinel(&self) -> Option<GraphNode> {
        self.graph.find_node_by_type(&self.sentinel_type)
    }
}

impl SettingsRepository for EmbeddedRepository {
    fn name(&self) -> &'static str {
        "embedded"
    }

    fn is_available(&self) -> bool {
        self.sentinel().is_some()
    }

    fn load(&self) -> Option<Payload> {
        let node = self.sentinel()?;
        let raw = match &node.widget(&self.widget)?.value {
            Value::String(s) if !s.trim().is_empty() => s.clone(),
            _ => return None,
        };
        match serde_json::from_str::<Payload>(&raw) {
            Ok(payload) if !payload.is_empty() => Some(payload),
            Ok(_) => None,
            Err(e) => {
                debug!("ignoring corrupt embedded settings on node {}: {}", node.id, e);
                None
            }
        }
    }

    fn store(
        &self,
        payload: &Payload,
    ) -> Result<()> {
        let node = self.sentinel().ok_or(FormError::Settings(format!("no {} node in graph", self.sentinel_type)))?;
        trace!("settings::embedded::store(node {})", node.id);
        let text = serde_json::to_string(payload)?;
        self.graph.set_widget_value(node.id, &self.widget, Value::String(text))?;
        self.graph.mark_dirty();
        Ok(())
    }
}
