//! Execution notifications from the host.
//!
//! The host reports progress over its event stream as `{"type": ..., "data": ...}`
//! messages. [`ExecutionMonitor`] folds them into the state the form shows:
//! the running node, progress, queue size, the last error and the media each
//! node produced.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, RwLock},
};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::{
    FormError, Result, ShareLock,
    gallery::{MediaItem, classify_output},
    graph::{GraphView, NodeId},
    registry::{ExtensionRegistry, guarded},
    utils,
};

#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    ExecutionStart,
    /// `None` once the whole prompt finished
    Executing(Option<NodeId>),
    Executed {
        node: NodeId,
        output: Value,
    },
    ExecutionCached(Vec<NodeId>),
    ExecutionError {
        message: String,
        node: Option<NodeId>,
    },
    Status {
        queue_remaining: u64,
    },
    Progress {
        value: u64,
        max: u64,
        node: Option<NodeId>,
    },
}

/// Node ids arrive as numbers or strings; subgraph ids like `"12:3"` keep the outer id.
fn node_id(value: &Value) -> Option<NodeId> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.split(':').next().and_then(|id| id.trim().parse().ok()),
        _ => None,
    }
}

impl HostEvent {
    pub fn name(&self) -> &'static str {
        match self {
            HostEvent::ExecutionStart => "execution_start",
            HostEvent::Executing(_) => "executing",
            HostEvent::Executed {
                ..
            } => "executed",
            HostEvent::ExecutionCached(_) => "execution_cached",
            HostEvent::ExecutionError {
                ..
            } => "execution_error",
            HostEvent::Status {
                ..
            } => "status",
            HostEvent::Progress {
                ..
            } => "progress",
        }
    }

    /// Parse one `{"type", "data"}` message.
    pub fn parse(message: &Value) -> Result<HostEvent> {
        let kind = message.get("type").and_then(Value::as_str).ok_or_else(|| FormError::Convert("event without a type".to_string()))?;
        let data = message.get("data").cloned().unwrap_or(Value::Null);
        Self::from_parts(kind, &data)
    }

    pub fn from_parts(
        kind: &str,
        data: &Value,
    ) -> Result<HostEvent> {
        let event = match kind {
            "execution_start" => HostEvent::ExecutionStart,
            "executing" => HostEvent::Executing(data.get("node").and_then(node_id)),
            "executed" => {
                let node = data.get("node").and_then(node_id).ok_or_else(|| FormError::Convert("executed event without a node".to_string()))?;
                HostEvent::Executed {
                    node,
                    output: data.get("output").cloned().unwrap_or(Value::Null),
                }
            }
            "execution_cached" => {
                let nodes = data.get("nodes").and_then(Value::as_array).map(|ids| ids.iter().filter_map(node_id).collect()).unwrap_or_default();
                HostEvent::ExecutionCached(nodes)
            }
            "execution_error" => HostEvent::ExecutionError {
                message: data
                    .get("exception_message")
                    .or_else(|| data.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or("execution failed")
                    .to_string(),
                node: data.get("node_id").and_then(node_id),
            },
            "status" => HostEvent::Status {
                queue_remaining: data.pointer("/status/exec_info/queue_remaining").and_then(Value::as_u64).unwrap_or(0),
            },
            "progress" => HostEvent::Progress {
                value: data.get("value").and_then(Value::as_u64).unwrap_or(0),
                max: data.get("max").and_then(Value::as_u64).unwrap_or(0),
                node: data.get("node").and_then(node_id),
            },
            other => return Err(FormError::Convert(format!("unknown event type '{}'", other))),
        };
        Ok(event)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Progress {
    pub value: u64,
    pub max: u64,
    pub node: Option<NodeId>,
}

impl Progress {
    /// Completed fraction in `[0, 1]`.
    pub fn ratio(&self) -> f64 {
        if self.max == 0 { 0.0 } else { (self.value as f64 / self.max as f64).min(1.0) }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionFailure {
    pub message: String,
    pub node: Option<NodeId>,
    pub timestamp: i64,
}

/// Media one node produced in its latest run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeOutput {
    pub node: NodeId,
    pub items: Vec<MediaItem>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionState {
    pub running: bool,
    pub current: Option<NodeId>,
    pub progress: Option<Progress>,
    pub queue_remaining: u64,
    pub last_error: Option<ExecutionFailure>,
    pub cached: HashSet<NodeId>,
    pub outputs: HashMap<NodeId, NodeOutput>,
    pub start_time: i64,
    pub end_time: i64,
}

pub struct ExecutionMonitor {
    graph: Arc<dyn GraphView>,
    registry: Arc<ExtensionRegistry>,
    state: ShareLock<ExecutionState>,
}

impl ExecutionMonitor {
    pub fn new(
        graph: Arc<dyn GraphView>,
        registry: Arc<ExtensionRegistry>,
    ) -> Self {
        Self {
            graph,
            registry,
            state: Arc::new(RwLock::new(ExecutionState::default())),
        }
    }

    pub fn state(&self) -> ExecutionState {
        self.state.read().unwrap().clone()
    }

    pub fn output(
        &self,
        node: NodeId,
    ) -> Option<NodeOutput> {
        self.state.read().unwrap().outputs.get(&node).cloned()
    }

    /// Apply one event. Returns the media it produced, if any.
    pub fn handle(
        &self,
        event: &HostEvent,
    ) -> Vec<MediaItem> {
        trace!("host event {}", event.name());
        let now = utils::time::time_millis();

        // classify before taking the lock; output handlers are extension code
        let produced = match event {
            HostEvent::Executed {
                node,
                output,
            } => self.classify(*node, output),
            _ => Vec::new(),
        };

        let mut state = self.state.write().unwrap();
        match event {
            HostEvent::ExecutionStart => {
                state.running = true;
                state.current = None;
                state.progress = None;
                state.last_error = None;
                state.cached.clear();
                state.start_time = now;
                state.end_time = 0;
            }
            HostEvent::Executing(Some(node)) => {
                state.running = true;
                state.current = Some(*node);
                state.progress = None;
            }
            HostEvent::Executing(None) => {
                state.running = false;
                state.current = None;
                state.progress = None;
                state.end_time = now;
            }
            HostEvent::Executed {
                node,
                ..
            } => {
                if !produced.is_empty() {
                    state.outputs.insert(
                        *node,
                        NodeOutput {
                            node: *node,
                            items: produced.clone(),
                            timestamp: now,
                        },
                    );
                }
            }
            HostEvent::ExecutionCached(nodes) => {
                state.cached.extend(nodes.iter().copied());
            }
            HostEvent::ExecutionError {
                message,
                node,
            } => {
                debug!("execution failed at {:?}: {}", node, message);
                state.running = false;
                state.current = None;
                state.progress = None;
                state.end_time = now;
                state.last_error = Some(ExecutionFailure {
                    message: message.clone(),
                    node: *node,
                    timestamp: now,
                });
            }
            HostEvent::Status {
                queue_remaining,
            } => {
                state.queue_remaining = *queue_remaining;
            }
            HostEvent::Progress {
                value,
                max,
                node,
            } => {
                state.progress = Some(Progress {
                    value: *value,
                    max: *max,
                    node: node.or(state.current),
                });
            }
        }
        produced
    }

    /// Parse and apply a raw `{"type", "data"}` message. Unknown messages are ignored.
    pub fn handle_message(
        &self,
        message: &Value,
    ) -> Vec<MediaItem> {
        match HostEvent::parse(message) {
            Ok(event) => self.handle(&event),
            Err(e) => {
                trace!("ignoring host message: {}", e);
                Vec::new()
            }
        }
    }

    fn classify(
        &self,
        node: NodeId,
        output: &Value,
    ) -> Vec<MediaItem> {
        let node_type = self.graph.node(node).map(|n| n.node_type);
        let handler = node_type.as_deref().and_then(|t| self.registry.get_output_handler(t));
        match (node_type, handler) {
            (Some(node_type), Some(handler)) => match guarded(&node_type, || handler.classify(&node_type, output)) {
                Ok(items) => items,
                Err(e) => {
                    warn!("{}, classifying output of node {} by extension", e, node);
                    classify_output(output)
                }
            },
            _ => classify_output(output),
        }
    }
}
