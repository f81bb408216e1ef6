//! The form - the main entry point of the crate.
//!
//! `MobileForm` ties the pieces together:
//! - derives sections from the host's groups
//! - renders every node through the registry and built-ins
//! - keeps per-node settings and the saved order
//! - follows execution events and collects output media

use std::{
    collections::HashSet,
    sync::{Arc, RwLock},
};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::{
    Config, FormError, Result, ShareLock,
    events::{ExecutionMonitor, NodeOutput},
    gallery::MediaItem,
    graph::{GraphNode, GraphView, MODE_ACTIVE, MODE_BYPASSED, NodeId},
    layout::{EmptyState, FormLayout, LayoutDeriver},
    registry::ExtensionRegistry,
    render::{NodeRenderer, RenderedNode, SeedControl, UploadControl},
    settings::{Palette, SettingsStore, WidgetSettings},
    upload::{MediaUploader, UploadFile},
};

/// One rendered section.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedSection {
    pub key: String,
    pub title: String,
    pub color: Option<Palette>,
    pub collapsed: bool,
    /// the trailing "Other" bucket, which has no group behind it
    pub synthetic: bool,
    pub nodes: Vec<RenderedNode>,
}

/// The whole form for one render pass.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedForm {
    pub sections: Vec<RenderedSection>,
    pub empty: Option<EmptyState>,
}

impl RenderedForm {
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Guidance text when there is nothing to show.
    pub fn guidance(&self) -> Option<&'static str> {
        self.empty.map(|e| e.guidance())
    }

    pub fn nodes(&self) -> impl Iterator<Item = &RenderedNode> {
        self.sections.iter().flat_map(|s| s.nodes.iter())
    }

    pub fn node(
        &self,
        id: NodeId,
    ) -> Option<&RenderedNode> {
        self.nodes().find(|n| n.id == id)
    }
}

/// A form synthesized from the host graph.
///
/// Build one with [`FormBuilder`](crate::FormBuilder). Every call to
/// [`MobileForm::render`] recomputes layout from the live graph; nothing
/// about node positions is cached between passes.
///
/// # Example
///
/// ```rust,ignore
/// let form = FormBuilder::new().build(graph)?;
/// let rendered = form.render();
/// for section in &rendered.sections {
///     println!("{} ({} nodes)", section.title, section.nodes.len());
/// }
/// ```
pub struct MobileForm {
    /// Host graph adapter.
    graph: Arc<dyn GraphView>,
    config: Config,
    /// Handlers registered by extensions.
    registry: Arc<ExtensionRegistry>,
    /// Per-node settings and saved order.
    settings: Arc<SettingsStore>,
    layout: LayoutDeriver,
    nodes: NodeRenderer,
    /// Execution state and output media.
    monitor: ExecutionMonitor,
    uploader: Arc<dyn MediaUploader>,
    /// Keys of collapsed sections.
    collapsed: ShareLock<HashSet<String>>,
}

impl MobileForm {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        graph: Arc<dyn GraphView>,
        config: Config,
        registry: Arc<ExtensionRegistry>,
        settings: Arc<SettingsStore>,
        layout: LayoutDeriver,
        nodes: NodeRenderer,
        monitor: ExecutionMonitor,
        uploader: Arc<dyn MediaUploader>,
    ) -> Self {
        Self {
            graph,
            config,
            registry,
            settings,
            layout,
            nodes,
            monitor,
            uploader,
            collapsed: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    pub fn graph(&self) -> &Arc<dyn GraphView> {
        &self.graph
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ExtensionRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    pub fn monitor(&self) -> &ExecutionMonitor {
        &self.monitor
    }

    /// Nodes the form considers, i.e. all but the settings holder.
    fn candidate_nodes(&self) -> Vec<GraphNode> {
        let sentinel = &self.config.settings.sentinel_type;
        self.graph.nodes().into_iter().filter(|n| &n.node_type != sentinel).collect()
    }

    /// Current layout without rendering.
    pub fn layout(&self) -> FormLayout {
        self.layout.derive(&self.candidate_nodes(), &self.graph.groups(), &self.settings.get_order())
    }

    /// Render every section of the form.
    ///
    /// Nodes that produce nothing are left out, and so are sections left
    /// with no nodes.
    pub fn render(&self) -> RenderedForm {
        if self.settings.migrate() {
            info!("settings copied into the graph");
        }
        self.nodes.forget_removed();

        let layout = self.layout();
        let collapsed = self.collapsed.read().unwrap().clone();
        let mut sections = Vec::new();
        for section in &layout.sections {
            let nodes: Vec<RenderedNode> = section.nodes.iter().filter_map(|n| self.nodes.render(n, section.color)).collect();
            if nodes.is_empty() {
                debug!("section '{}' has nothing to show", section.title);
                continue;
            }
            let key = section.key();
            sections.push(RenderedSection {
                collapsed: collapsed.contains(&key),
                key,
                title: section.title.clone(),
                color: section.color,
                synthetic: section.is_synthetic(),
                nodes,
            });
        }

        let empty = layout.empty.or_else(|| sections.is_empty().then_some(EmptyState::NothingRenderable));
        RenderedForm {
            sections,
            empty,
        }
    }

    /// Re-render one node with the color of the section it sits in.
    pub fn render_node(
        &self,
        id: NodeId,
    ) -> Option<RenderedNode> {
        let node = self.graph.node(id)?;
        let color = self.layout().sections.iter().find(|s| s.nodes.iter().any(|n| n.id == id)).and_then(|s| s.color);
        self.nodes.render(&node, color)
    }

    /// Feed one raw host event to the execution monitor.
    pub fn handle_event(
        &self,
        message: &Value,
    ) -> Vec<MediaItem> {
        self.monitor.handle_message(message)
    }

    pub fn rename_node(
        &self,
        id: NodeId,
        title: &str,
    ) -> Result<()> {
        let title = title.trim();
        if title.is_empty() {
            return Err(FormError::Graph(format!("node {} cannot have an empty title", id)));
        }
        self.graph.set_title(id, title)?;
        self.graph.mark_dirty();
        Ok(())
    }

    pub fn set_bypassed(
        &self,
        id: NodeId,
        bypassed: bool,
    ) -> Result<()> {
        self.graph.set_mode(id, if bypassed { MODE_BYPASSED } else { MODE_ACTIVE })?;
        self.graph.mark_dirty();
        Ok(())
    }

    /// Move a node to `index` in the overall display order and persist it.
    ///
    /// Returns the saved order. The node stays in its section; the order
    /// decides its position among that section's nodes.
    pub fn move_node(
        &self,
        id: NodeId,
        index: usize,
    ) -> Result<Vec<NodeId>> {
        let mut order = self.layout().node_ids();
        let Some(from) = order.iter().position(|n| *n == id) else {
            return Err(FormError::Graph(format!("node {} is not in the form", id)));
        };
        order.remove(from);
        order.insert(index.min(order.len()), id);
        self.settings.save_order(&order);
        Ok(order)
    }

    /// Flip a section's collapsed state. Returns the new state.
    pub fn toggle_section(
        &self,
        key: &str,
    ) -> bool {
        let mut collapsed = self.collapsed.write().unwrap();
        if collapsed.remove(key) {
            false
        } else {
            collapsed.insert(key.to_string());
            true
        }
    }

    pub fn is_collapsed(
        &self,
        key: &str,
    ) -> bool {
        self.collapsed.read().unwrap().contains(key)
    }

    pub fn update_settings<F>(
        &self,
        id: NodeId,
        f: F,
    ) -> WidgetSettings
    where
        F: FnOnce(&mut WidgetSettings),
    {
        self.settings.update_settings(id, f)
    }

    pub fn set_widget_hidden(
        &self,
        id: NodeId,
        widget: &str,
        hidden: bool,
    ) {
        self.settings.set_widget_hidden(id, widget, hidden);
    }

    /// Whether `node` is shown in the output gallery.
    pub fn is_output_node(
        &self,
        node: &GraphNode,
    ) -> bool {
        self.registry.is_output_node_type(&node.node_type) || self.layout.find_output_group(&self.graph.groups()).is_some_and(|g| g.contains_node(node))
    }

    /// Latest media of every output node, newest first.
    pub fn gallery(&self) -> Vec<NodeOutput> {
        let mut outputs: Vec<NodeOutput> =
            self.graph.nodes().iter().filter(|n| self.is_output_node(n)).filter_map(|n| self.monitor.output(n.id)).collect();
        outputs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(a.node.cmp(&b.node)));
        outputs
    }

    /// Upload `file` through the configured uploader into `control`'s widget.
    pub async fn upload(
        &self,
        control: &mut UploadControl,
        file: UploadFile,
    ) -> Result<String> {
        control.upload(self.graph.as_ref(), self.uploader.as_ref(), file).await
    }

    /// Randomize a seed with the thread-local generator.
    pub fn randomize_seed(
        &self,
        control: &mut SeedControl,
    ) -> Result<u64> {
        control.randomize(self.graph.as_ref(), &mut rand::rng())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use serde_json::json;

    use super::*;
    use crate::{
        FormBuilder,
        gallery::MediaKind,
        graph::{GraphGroup, MemGraph, Rect, Widget},
        registry::node_handler,
        render::{Control, Element},
    };

    fn form_graph() -> Arc<MemGraph> {
        let mem = Arc::new(MemGraph::new());
        mem.add_group(GraphGroup::new("Mobile Form", Rect::new(0.0, 0.0, 1000.0, 1000.0)));
        mem
    }

    fn build(mem: &Arc<MemGraph>) -> MobileForm {
        FormBuilder::new().build(mem.clone()).unwrap()
    }

    #[test]
    fn test_scenario_a_one_ungrouped_row() {
        let mem = form_graph();
        mem.add_node(GraphNode::new(2, "CLIPTextEncode").at(100.0, 50.0).with_widget(Widget::new("text", "string", "a cat")));
        mem.add_node(GraphNode::new(1, "EmptyLatentImage").at(0.0, 50.0).with_widget(Widget::new("width", "int", 512)));
        let form = build(&mem);

        let rendered = form.render();
        assert_eq!(rendered.sections.len(), 1);
        assert!(rendered.sections[0].synthetic);
        let kinds: Vec<&str> = rendered.nodes().flat_map(|n| n.controls()).map(|c| c.kind_name()).collect();
        assert_eq!(kinds, vec!["number", "text"]);
    }

    #[test]
    fn test_scenario_b_bypass_flag() {
        let mem = form_graph();
        mem.add_node(GraphNode::new(1, "KSampler").at(10.0, 10.0).with_widget(Widget::new("steps", "int", 20)));
        let form = build(&mem);

        form.set_bypassed(1, true).unwrap();
        assert!(form.render().node(1).unwrap().attrs.bypassed);
        assert!(mem.is_dirty());

        form.set_bypassed(1, false).unwrap();
        assert!(!form.render().node(1).unwrap().attrs.bypassed);
    }

    #[test]
    fn test_scenario_c_inferred_toggle_round_trip() {
        let mem = form_graph();
        mem.add_node(GraphNode::new(1, "Custom").at(10.0, 10.0).with_widget(Widget::new("enabled", "MYSTERY", false)));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        mem.chain_callback(
            1,
            "enabled",
            Arc::new(move |v| {
                assert_eq!(v, &json!(true));
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();
        let form = build(&mem);

        let rendered = form.render();
        let Some(Control::Toggle(mut toggle)) = rendered.node(1).unwrap().control("enabled").cloned() else {
            panic!("expected a toggle");
        };
        toggle.toggle(form.graph().as_ref()).unwrap();
        assert_eq!(mem.widget_value(1, "enabled"), Some(json!(true)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_scenario_d_hidden_widgets() {
        let mem = form_graph();
        mem.add_node(
            GraphNode::new(1, "KSampler")
                .at(10.0, 10.0)
                .with_widget(Widget::new("seed", "seed", 1))
                .with_widget(Widget::new("steps", "int", 20))
                .with_widget(Widget::new("cfg", "float", 7.0))
                .with_widget(Widget::new("sampler_name", "combo", "euler")),
        );
        let form = build(&mem);
        form.update_settings(1, |s| {
            s.hidden_widgets.insert("steps".into());
        });
        assert_eq!(form.render().node(1).unwrap().field_labels(), vec!["seed", "cfg", "sampler_name"]);
    }

    #[test]
    fn test_settings_node_is_not_rendered_and_receives_migration() {
        let mem = form_graph();
        mem.add_node(GraphNode::new(1, "KSampler").at(10.0, 10.0).with_widget(Widget::new("steps", "int", 20)));
        let form = build(&mem);
        form.update_settings(1, |s| s.tooltip = Some("cached".into()));

        mem.add_node(GraphNode::new(50, "MobileFormSettings").at(20.0, 20.0).with_widget(Widget::new("settings_json", "string", "")));
        let rendered = form.render();
        assert!(rendered.node(50).is_none());
        let payload = mem.widget_value(50, "settings_json").unwrap();
        assert!(payload.as_str().unwrap().contains("cached"));
        assert_eq!(rendered.node(1).unwrap().attrs.tooltip, "cached");
    }

    #[test]
    fn test_empty_states() {
        let mem = Arc::new(MemGraph::new());
        let form = build(&mem);
        let rendered = form.render();
        assert_eq!(rendered.empty, Some(EmptyState::NoFormGroup));
        assert!(rendered.guidance().is_some());

        let mem = form_graph();
        mem.add_node(GraphNode::new(1, "Reroute").at(10.0, 10.0));
        assert_eq!(build(&mem).render().empty, Some(EmptyState::NothingRenderable));
    }

    #[test]
    fn test_sections_carry_colors_and_collapse_state() {
        let mem = form_graph();
        mem.add_group(GraphGroup::new("Prompt", Rect::new(0.0, 0.0, 400.0, 300.0)));
        mem.add_node(GraphNode::new(1, "CLIPTextEncode").at(10.0, 10.0).with_widget(Widget::new("text", "string", "")));
        mem.add_node(GraphNode::new(2, "KSampler").at(10.0, 500.0).with_widget(Widget::new("steps", "int", 20)));
        let form = build(&mem);
        form.update_settings(1, |s| s.color = Palette::Red);

        assert!(form.toggle_section("prompt"));
        let rendered = form.render();
        assert_eq!(rendered.sections[0].title, "Prompt");
        assert!(rendered.sections[0].collapsed);
        assert_eq!(rendered.node(1).unwrap().attrs.color, Palette::Blue);
        assert_eq!(rendered.sections[1].title, "Other");
        assert_eq!(form.render_node(1).unwrap().attrs.color, Palette::Blue);

        assert!(!form.toggle_section("prompt"));
        assert!(!form.is_collapsed("prompt"));
    }

    #[test]
    fn test_move_node_persists_order() {
        let mem = form_graph();
        for (id, x) in [(1, 0.0), (2, 100.0), (3, 200.0)] {
            mem.add_node(GraphNode::new(id, "Int").at(x, 0.0).with_widget(Widget::new("value", "int", 1)));
        }
        let form = build(&mem);
        assert_eq!(form.move_node(3, 0).unwrap(), vec![3, 1, 2]);
        assert_eq!(form.settings().get_order(), vec![3, 1, 2]);
        let ids: Vec<NodeId> = form.render().nodes().map(|n| n.id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
        assert!(form.move_node(99, 0).is_err());
    }

    #[test]
    fn test_rename_node() {
        let mem = form_graph();
        mem.add_node(GraphNode::new(1, "KSampler").at(10.0, 10.0).with_widget(Widget::new("steps", "int", 20)));
        let form = build(&mem);
        form.rename_node(1, "  Main sampler ").unwrap();
        let rendered = form.render();
        assert_eq!(rendered.node(1).unwrap().title, "Main sampler");
        assert!(matches!(&rendered.node(1).unwrap().elements[0], Element::Title { text } if text == "Main sampler"));
        assert!(form.rename_node(1, "   ").is_err());
    }

    #[test]
    fn test_extension_handler_renders_node() {
        let mem = form_graph();
        mem.add_node(GraphNode::new(1, "ShowText").at(10.0, 10.0));
        let form = FormBuilder::new()
            .extension("show-text", |registry| {
                registry.register_node_handler(
                    "ShowText",
                    node_handler(|ctx| {
                        ctx.add_title(None);
                        ctx.add_text("hello");
                        Ok(true)
                    }),
                );
                Ok(())
            })
            .build(mem.clone())
            .unwrap();
        assert!(form.render().node(1).is_some());
    }

    #[test]
    fn test_gallery_collects_output_nodes() {
        let mem = form_graph();
        mem.add_group(GraphGroup::new("Mobile Outputs", Rect::new(2000.0, 0.0, 500.0, 500.0)));
        mem.add_node(GraphNode::new(7, "PreviewImage").at(2100.0, 10.0));
        mem.add_node(GraphNode::new(8, "SaveVideo").at(5000.0, 10.0));
        mem.add_node(GraphNode::new(9, "Inspector").at(5000.0, 10.0));
        let form = build(&mem);
        form.registry().register_output_node_type("SaveVideo");

        let output = |node: &str, file: &str| json!({"type": "executed", "data": {"node": node, "output": {"images": [{"filename": file, "subfolder": "", "type": "output"}]}}});
        form.handle_event(&output("7", "a.png"));
        form.handle_event(&output("8", "b.mp4"));
        form.handle_event(&output("9", "c.png"));

        let gallery = form.gallery();
        let nodes: HashSet<NodeId> = gallery.iter().map(|o| o.node).collect();
        assert_eq!(nodes, HashSet::from([7, 8]));
        let video = gallery.iter().find(|o| o.node == 8).unwrap();
        assert_eq!(video.items[0].kind, MediaKind::Video);
    }

    #[test]
    fn test_randomize_seed() {
        let mem = form_graph();
        mem.add_node(GraphNode::new(1, "KSampler").at(10.0, 10.0).with_widget(Widget::new("seed", "seed", 3)));
        let form = build(&mem);
        let Some(Control::Seed(mut seed)) = form.render().node(1).unwrap().control("seed").cloned() else {
            panic!("expected a seed control");
        };
        let drawn = form.randomize_seed(&mut seed).unwrap();
        assert_eq!(mem.widget_value(1, "seed"), Some(json!(drawn)));
        assert_eq!(seed.last, Some(3));
    }
}
