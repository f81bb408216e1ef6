use std::{
    collections::HashMap,
    sync::{
        Arc, RwLock,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use serde::Deserialize;
use serde_json::Value;
use tracing::trace;

use crate::{FormError, Result, ShareLock};

use super::{GraphGroup, GraphNode, GraphView, MediaRef, NodeId, WidgetCallback};

#[derive(Debug, Default, Deserialize)]
struct GraphState {
    #[serde(default)]
    nodes: Vec<GraphNode>,
    #[serde(default)]
    groups: Vec<GraphGroup>,
}

/// In-memory host graph.
///
/// Used by native embeddings and by tests in place of the browser host.
pub struct MemGraph {
    state: ShareLock<GraphState>,
    callbacks: ShareLock<HashMap<(NodeId, String), Vec<WidgetCallback>>>,
    descriptions: ShareLock<HashMap<String, String>>,
    /// bumped every time a node instance is created
    generations: ShareLock<HashMap<NodeId, u64>>,
    next_generation: AtomicU64,
    dirty: AtomicBool,
}

impl Default for MemGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl MemGraph {
    pub fn new() -> Self {
        Self::with_state(GraphState::default())
    }

    fn with_state(state: GraphState) -> Self {
        let ids: Vec<NodeId> = state.nodes.iter().map(|n| n.id).collect();
        let graph = Self {
            state: Arc::new(RwLock::new(state)),
            callbacks: Arc::new(RwLock::new(HashMap::new())),
            descriptions: Arc::new(RwLock::new(HashMap::new())),
            generations: Arc::new(RwLock::new(HashMap::new())),
            next_generation: AtomicU64::new(1),
            dirty: AtomicBool::new(false),
        };
        for id in ids {
            graph.bump_generation(id);
        }
        graph
    }

    fn bump_generation(
        &self,
        id: NodeId,
    ) {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        self.generations.write().unwrap().insert(id, generation);
    }

    /// Load a graph from `{"nodes": [...], "groups": [...]}`.
    pub fn from_json(s: &str) -> Result<Self> {
        let state = serde_json::from_str::<GraphState>(s).map_err(|e| FormError::Graph(format!("invalid graph: {}", e)))?;
        Ok(Self::with_state(state))
    }

    pub fn add_node(
        &self,
        node: GraphNode,
    ) {
        let id = node.id;
        self.state.write().unwrap().nodes.push(node);
        self.bump_generation(id);
    }

    pub fn add_group(
        &self,
        group: GraphGroup,
    ) {
        self.state.write().unwrap().groups.push(group);
    }

    pub fn remove_node(
        &self,
        id: NodeId,
    ) {
        self.state.write().unwrap().nodes.retain(|n| n.id != id);
        self.callbacks.write().unwrap().retain(|(nid, _), _| *nid != id);
        self.generations.write().unwrap().remove(&id);
    }

    /// Move a node's anchor point, as a user drag on the canvas would.
    pub fn move_node(
        &self,
        id: NodeId,
        x: f64,
        y: f64,
    ) -> Result<()> {
        self.with_node(id, |node| {
            node.pos = [x, y];
            Ok(())
        })
    }

    /// Attach execution results to a node.
    pub fn set_images(
        &self,
        id: NodeId,
        images: Vec<MediaRef>,
    ) -> Result<()> {
        self.with_node(id, |node| {
            node.images = images;
            Ok(())
        })
    }

    pub fn set_description(
        &self,
        node_type: impl Into<String>,
        description: impl Into<String>,
    ) {
        self.descriptions.write().unwrap().insert(node_type.into(), description.into());
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    pub fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::SeqCst);
    }

    pub fn widget_value(
        &self,
        id: NodeId,
        widget: &str,
    ) -> Option<Value> {
        self.node(id).and_then(|n| n.widget(widget).map(|w| w.value.clone()))
    }

    fn with_node<T>(
        &self,
        id: NodeId,
        f: impl FnOnce(&mut GraphNode) -> Result<T>,
    ) -> Result<T> {
        let mut state = self.state.write().unwrap();
        let node = state.nodes.iter_mut().find(|n| n.id == id).ok_or(FormError::Graph(format!("node {} not found", id)))?;
        f(node)
    }
}

impl GraphView for MemGraph {
    fn nodes(&self) -> Vec<GraphNode> {
        self.state.read().unwrap().nodes.clone()
    }

    fn groups(&self) -> Vec<GraphGroup> {
        self.state.read().unwrap().groups.clone()
    }

    fn node(
        &self,
        id: NodeId,
    ) -> Option<GraphNode> {
        self.state.read().unwrap().nodes.iter().find(|n| n.id == id).cloned()
    }

    fn widget_generation(
        &self,
        id: NodeId,
        widget: &str,
    ) -> Option<u64> {
        self.node(id)?.widget(widget)?;
        self.generations.read().unwrap().get(&id).copied()
    }

    fn set_widget_value(
        &self,
        id: NodeId,
        widget: &str,
        value: Value,
    ) -> Result<()> {
        trace!("graph::set_widget_value({}, {})", id, widget);
        self.with_node(id, |node| {
            let target = node
                .widgets
                .as_mut()
                .and_then(|ws| ws.iter_mut().find(|w| w.name == widget))
                .ok_or(FormError::Graph(format!("widget {} not found on node {}", widget, id)))?;
            target.value = value;
            Ok(())
        })
    }

    fn fire_callback(
        &self,
        id: NodeId,
        widget: &str,
    ) -> Result<()> {
        let value = self.widget_value(id, widget).ok_or(FormError::Graph(format!("widget {} not found on node {}", widget, id)))?;
        // callbacks may read the graph again, so run them without holding any lock
        let chain = self.callbacks.read().unwrap().get(&(id, widget.to_string())).cloned().unwrap_or_default();
        for callback in chain {
            callback(&value);
        }
        Ok(())
    }

    fn chain_callback(
        &self,
        id: NodeId,
        widget: &str,
        callback: WidgetCallback,
    ) -> Result<()> {
        if self.node(id).and_then(|n| n.widget(widget).cloned()).is_none() {
            return Err(FormError::Graph(format!("widget {} not found on node {}", widget, id)));
        }
        self.callbacks.write().unwrap().entry((id, widget.to_string())).or_default().push(callback);
        Ok(())
    }

    fn set_title(
        &self,
        id: NodeId,
        title: &str,
    ) -> Result<()> {
        self.with_node(id, |node| {
            node.title = title.to_string();
            Ok(())
        })
    }

    fn set_mode(
        &self,
        id: NodeId,
        mode: i32,
    ) -> Result<()> {
        self.with_node(id, |node| {
            node.mode = mode;
            Ok(())
        })
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    fn node_description(
        &self,
        node_type: &str,
    ) -> Option<String> {
        self.descriptions.read().unwrap().get(node_type).cloned()
    }
}
