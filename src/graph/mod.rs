//! Adapter over the host's live node graph.
//!
//! The host owns nodes, widgets and groups and mutates them at any time (users
//! drag nodes, rename them, rewire widgets). The form only ever reads
//! snapshots through [`GraphView`] and writes back through its narrow set of
//! mutators, so the rest of the crate runs the same against the real host or
//! against [`MemGraph`].

mod mem;
mod model;

use std::sync::Arc;

use serde_json::Value;

use crate::Result;

pub use mem::MemGraph;
pub use model::*;

/// Host-side change notification attached to a widget.
pub type WidgetCallback = Arc<dyn Fn(&Value) + Send + Sync>;

/// Read/write view of the host graph.
pub trait GraphView: Send + Sync {
    /// Snapshot of every node, in the host's internal order.
    fn nodes(&self) -> Vec<GraphNode>;

    /// Snapshot of every group, in the host's internal order.
    fn groups(&self) -> Vec<GraphGroup>;

    /// Snapshot of one node.
    fn node(
        &self,
        id: NodeId,
    ) -> Option<GraphNode>;

    /// First node of the given type.
    fn find_node_by_type(
        &self,
        node_type: &str,
    ) -> Option<GraphNode> {
        self.nodes().into_iter().find(|n| n.node_type == node_type)
    }

    /// Identity of the widget instance the host currently holds.
    ///
    /// Changes whenever the host re-creates the node (a workflow reload, a
    /// remove then re-add under the same id), which drops every callback
    /// chained onto the old instance. `None` when the widget does not exist.
    fn widget_generation(
        &self,
        id: NodeId,
        widget: &str,
    ) -> Option<u64>;

    /// Overwrite a widget's value without notifying anyone.
    fn set_widget_value(
        &self,
        id: NodeId,
        widget: &str,
        value: Value,
    ) -> Result<()>;

    /// Invoke the widget's callback chain with its current value.
    fn fire_callback(
        &self,
        id: NodeId,
        widget: &str,
    ) -> Result<()>;

    /// Wrap the widget's callback so `callback` runs after the existing chain.
    fn chain_callback(
        &self,
        id: NodeId,
        widget: &str,
        callback: WidgetCallback,
    ) -> Result<()>;

    fn set_title(
        &self,
        id: NodeId,
        title: &str,
    ) -> Result<()>;

    fn set_mode(
        &self,
        id: NodeId,
        mode: i32,
    ) -> Result<()>;

    /// Tell the host the graph changed and must be persisted on next save.
    fn mark_dirty(&self);

    /// Default description the host publishes for a node type.
    fn node_description(
        &self,
        node_type: &str,
    ) -> Option<String>;
}
