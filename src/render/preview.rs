use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, RwLock},
};

use serde::{Serialize, Serializer};
use tracing::debug;

use crate::{
    ShareLock,
    gallery::MediaKind,
    graph::{GraphNode, GraphView, MediaRef, NodeId, WidgetCallback, value_to_string},
    upload::ViewEndpoint,
};

/// Which widgets feed a live preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewSpec {
    pub kind: MediaKind,
    /// widget holding the filename
    pub widget: String,
    /// widget holding the subfolder, when kept separately
    pub subfolder_widget: Option<String>,
    /// host folder the file lives in (`input`, `output`, `temp`)
    pub folder_type: String,
}

impl PreviewSpec {
    pub fn new(
        kind: MediaKind,
        widget: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            widget: widget.into(),
            subfolder_widget: None,
            folder_type: "input".to_string(),
        }
    }

    /// The file the node currently points at, if any.
    pub fn resolve(
        &self,
        node: &GraphNode,
    ) -> Option<MediaRef> {
        let value = value_to_string(&node.widget(&self.widget)?.value);
        let subfolder = self.subfolder_widget.as_deref().and_then(|w| node.widget(w)).map(|w| value_to_string(&w.value));
        match subfolder {
            Some(subfolder) => Some(value.trim()).filter(|v| !v.is_empty()).map(|v| MediaRef::new(v, subfolder, self.folder_type.clone())),
            None => media_from_value(&value, &self.folder_type),
        }
    }
}

/// Interpret a filename widget value, which may carry a `subfolder/` prefix.
pub(crate) fn media_from_value(
    value: &str,
    folder_type: &str,
) -> Option<MediaRef> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let media = match value.rsplit_once('/') {
        Some((dir, file)) => MediaRef::new(file, dir, folder_type),
        None => MediaRef::new(value, "", folder_type),
    };
    Some(media)
}

/// Shared slot holding the url a preview currently shows.
#[derive(Debug, Clone, Default)]
pub struct PreviewHandle(ShareLock<Option<String>>);

impl PreviewHandle {
    pub fn new(url: Option<String>) -> Self {
        Self(Arc::new(RwLock::new(url)))
    }

    pub fn url(&self) -> Option<String> {
        self.0.read().unwrap().clone()
    }

    pub fn set(
        &self,
        url: Option<String>,
    ) {
        *self.0.write().unwrap() = url;
    }
}

impl Serialize for PreviewHandle {
    fn serialize<S: Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        self.url().serialize(serializer)
    }
}

/// A live preview element.
#[derive(Debug, Clone, Serialize)]
pub struct Preview {
    pub kind: MediaKind,
    pub url: PreviewHandle,
}

/// A handle plus the widget instance its refresh callback is chained onto.
struct Attached {
    handle: PreviewHandle,
    generation: Option<u64>,
}

/// Live previews by `(node, widget)`, so each source widget's callback is
/// wrapped once per widget instance no matter how often the node re-renders.
pub struct PreviewRegistry {
    view: ViewEndpoint,
    handles: ShareLock<HashMap<(NodeId, String), Attached>>,
}

impl PreviewRegistry {
    pub fn new(view: ViewEndpoint) -> Self {
        Self {
            view,
            handles: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn view(&self) -> &ViewEndpoint {
        &self.view
    }

    /// Preview for `spec` on `node`, or `None` when the source widget is empty.
    ///
    /// The callback is chained again when the host has re-created the widget
    /// since the last attach.
    pub fn attach(
        &self,
        graph: &Arc<dyn GraphView>,
        node: &GraphNode,
        spec: &PreviewSpec,
    ) -> Option<Preview> {
        let media = spec.resolve(node)?;
        let url = Some(self.view.url(&media));
        let key = (node.id, spec.widget.clone());
        let generation = graph.widget_generation(node.id, &spec.widget);

        let cached = self.handles.read().unwrap().get(&key).map(|a| (a.handle.clone(), a.generation));
        let handle = match cached {
            Some((handle, chained)) if chained == generation => {
                handle.set(url);
                return Some(Preview {
                    kind: spec.kind,
                    url: handle,
                });
            }
            Some((handle, _)) => {
                debug!("node {} was re-created, chaining live preview again", node.id);
                handle.set(url);
                handle
            }
            None => PreviewHandle::new(url),
        };

        let callback = self.refresh_callback(graph, node.id, spec, &handle);
        let mut sources = vec![spec.widget.as_str()];
        sources.extend(spec.subfolder_widget.as_deref());
        for source in sources {
            if let Err(e) = graph.chain_callback(node.id, source, callback.clone()) {
                debug!("live preview on node {} will not follow '{}': {}", node.id, source, e);
            }
        }

        self.handles.write().unwrap().insert(
            key,
            Attached {
                handle: handle.clone(),
                generation,
            },
        );
        Some(Preview {
            kind: spec.kind,
            url: handle,
        })
    }

    /// Forget previews of nodes that are no longer in the graph.
    pub fn retain_nodes(
        &self,
        live: &HashSet<NodeId>,
    ) {
        self.handles.write().unwrap().retain(|(id, _), _| live.contains(id));
    }

    /// Number of previews currently tracked.
    pub fn len(&self) -> usize {
        self.handles.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn refresh_callback(
        &self,
        graph: &Arc<dyn GraphView>,
        id: NodeId,
        spec: &PreviewSpec,
        handle: &PreviewHandle,
    ) -> WidgetCallback {
        let graph = Arc::downgrade(graph);
        let view = self.view.clone();
        let spec = spec.clone();
        let handle = handle.clone();
        Arc::new(move |_| {
            let Some(graph) = graph.upgrade() else {
                return;
            };
            let url = graph.node(id).and_then(|n| spec.resolve(&n)).map(|m| view.url(&m));
            handle.set(url);
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        config::UploadConfig,
        graph::{MemGraph, Widget},
    };

    fn registry() -> PreviewRegistry {
        PreviewRegistry::new(ViewEndpoint::new(&UploadConfig::default()).unwrap())
    }

    #[test]
    fn test_resolve_splits_subfolder() {
        let node = GraphNode::new(1, "LoadImage").with_widget(Widget::new("image", "combo", "pasted/cat.png"));
        let media = PreviewSpec::new(MediaKind::Image, "image").resolve(&node).unwrap();
        assert_eq!(media, MediaRef::new("cat.png", "pasted", "input"));
    }

    #[test]
    fn test_resolve_empty_value() {
        let node = GraphNode::new(1, "LoadImage").with_widget(Widget::new("image", "combo", ""));
        assert!(PreviewSpec::new(MediaKind::Image, "image").resolve(&node).is_none());
    }

    #[test]
    fn test_preview_follows_widget_changes() {
        let mem = Arc::new(MemGraph::new());
        mem.add_node(
            GraphNode::new(1, "SaveVideo")
                .with_widget(Widget::new("file", "text", "a.mp4"))
                .with_widget(Widget::new("dir", "text", "runs")),
        );
        let graph: Arc<dyn GraphView> = mem.clone();
        let spec = PreviewSpec {
            kind: MediaKind::Video,
            widget: "file".into(),
            subfolder_widget: Some("dir".into()),
            folder_type: "output".into(),
        };

        let registry = registry();
        let preview = registry.attach(&graph, &graph.node(1).unwrap(), &spec).unwrap();
        assert!(preview.url.url().unwrap().contains("filename=a.mp4&subfolder=runs&type=output"));

        mem.set_widget_value(1, "file", json!("b.mp4")).unwrap();
        mem.fire_callback(1, "file").unwrap();
        assert!(preview.url.url().unwrap().contains("filename=b.mp4"));

        mem.set_widget_value(1, "dir", json!("final")).unwrap();
        mem.fire_callback(1, "dir").unwrap();
        assert!(preview.url.url().unwrap().contains("subfolder=final"));
    }

    #[test]
    fn test_attach_twice_reuses_handle() {
        let mem = Arc::new(MemGraph::new());
        mem.add_node(GraphNode::new(1, "LoadImage").with_widget(Widget::new("image", "combo", "a.png")));
        let graph: Arc<dyn GraphView> = mem.clone();
        let spec = PreviewSpec::new(MediaKind::Image, "image");
        let registry = registry();

        let first = registry.attach(&graph, &graph.node(1).unwrap(), &spec).unwrap();
        let second = registry.attach(&graph, &graph.node(1).unwrap(), &spec).unwrap();

        mem.set_widget_value(1, "image", json!("b.png")).unwrap();
        mem.fire_callback(1, "image").unwrap();
        assert_eq!(first.url.url(), second.url.url());
        assert!(first.url.url().unwrap().contains("b.png"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_recreated_node_is_followed_again() {
        let mem = Arc::new(MemGraph::new());
        mem.add_node(GraphNode::new(5, "LoadImage").with_widget(Widget::new("image", "combo", "a.png")));
        let graph: Arc<dyn GraphView> = mem.clone();
        let spec = PreviewSpec::new(MediaKind::Image, "image");
        let registry = registry();
        registry.attach(&graph, &graph.node(5).unwrap(), &spec).unwrap();

        mem.remove_node(5);
        mem.add_node(GraphNode::new(5, "LoadImage").with_widget(Widget::new("image", "combo", "b.png")));
        let preview = registry.attach(&graph, &graph.node(5).unwrap(), &spec).unwrap();
        assert!(preview.url.url().unwrap().contains("filename=b.png"));

        mem.set_widget_value(5, "image", json!("c.png")).unwrap();
        mem.fire_callback(5, "image").unwrap();
        assert!(preview.url.url().unwrap().contains("filename=c.png"));
    }

    #[test]
    fn test_retain_nodes_drops_removed_nodes() {
        let mem = Arc::new(MemGraph::new());
        mem.add_node(GraphNode::new(1, "LoadImage").with_widget(Widget::new("image", "combo", "a.png")));
        mem.add_node(GraphNode::new(2, "LoadImage").with_widget(Widget::new("image", "combo", "b.png")));
        let graph: Arc<dyn GraphView> = mem.clone();
        let spec = PreviewSpec::new(MediaKind::Image, "image");
        let registry = registry();
        registry.attach(&graph, &graph.node(1).unwrap(), &spec).unwrap();
        registry.attach(&graph, &graph.node(2).unwrap(), &spec).unwrap();
        assert_eq!(registry.len(), 2);

        registry.retain_nodes(&HashSet::from([2]));
        assert_eq!(registry.len(), 1);
        registry.retain_nodes(&HashSet::new());
        assert!(registry.is_empty());
    }
}
