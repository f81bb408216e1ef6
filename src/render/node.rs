use std::{collections::HashSet, sync::Arc};

use tracing::{trace, warn};

use crate::{
    config::RenderConfig,
    gallery::MediaKind,
    graph::{GraphNode, GraphView, Widget, value_to_string},
    registry::{ExtensionRegistry, NodeDefinition, NodeHandler, PreviewConfig, WidgetNames, guarded},
    settings::{Palette, SettingsStore, WidgetSettings},
};

use super::{ContainerAttrs, Element, Preview, PreviewRegistry, PreviewSpec, RenderedNode, WidgetContext, WidgetRenderer};

/// Shared collaborators handed to every context.
#[derive(Clone)]
struct Services {
    graph: Arc<dyn GraphView>,
    widgets: Arc<WidgetRenderer>,
    previews: Arc<PreviewRegistry>,
}

/// What a node handler gets to work with.
pub struct NodeContext {
    node: GraphNode,
    settings: WidgetSettings,
    pub elements: Vec<Element>,
    media_shown: bool,
    services: Services,
}

impl NodeContext {
    fn new(
        node: GraphNode,
        settings: WidgetSettings,
        services: Services,
    ) -> Self {
        Self {
            node,
            settings,
            elements: Vec::new(),
            media_shown: false,
            services,
        }
    }

    pub fn node(&self) -> &GraphNode {
        &self.node
    }

    pub fn settings(&self) -> &WidgetSettings {
        &self.settings
    }

    pub fn graph(&self) -> &Arc<dyn GraphView> {
        &self.services.graph
    }

    /// Add the title, or the node's own title when `title` is `None`.
    pub fn add_title(
        &mut self,
        title: Option<&str>,
    ) {
        let text = title.map(String::from).unwrap_or_else(|| self.node.title.clone());
        self.elements.push(Element::title(text));
    }

    pub fn add_info(
        &mut self,
        icon: &str,
        text: &str,
    ) {
        self.elements.push(Element::Info {
            icon: icon.to_string(),
            text: text.to_string(),
        });
    }

    pub fn add_text(
        &mut self,
        text: &str,
    ) {
        self.elements.push(Element::text(text));
    }

    pub fn add_element(
        &mut self,
        element: Element,
    ) {
        self.elements.push(element);
    }

    /// Render `widget` inside a field labeled with its name.
    pub fn add_widget(
        &mut self,
        widget: &Widget,
    ) -> bool {
        let label = widget.name.clone();
        self.add_widget_labeled(widget, label)
    }

    fn add_widget_labeled(
        &mut self,
        widget: &Widget,
        label: String,
    ) -> bool {
        let mut ctx = WidgetContext::new(widget.clone(), self.node.clone());
        if !self.services.widgets.render_into(&mut ctx) {
            return false;
        }
        self.elements.push(Element::Field {
            label,
            children: ctx.elements,
        });
        true
    }

    /// Add a live preview that follows the widgets named in `spec`.
    pub fn add_preview(
        &mut self,
        spec: &PreviewSpec,
    ) -> Option<Preview> {
        let preview = self.services.previews.attach(&self.services.graph, &self.node, spec)?;
        self.elements.push(Element::Preview {
            preview: preview.clone(),
        });
        Some(preview)
    }

    pub fn is_widget_hidden(
        &self,
        widget: &str,
    ) -> bool {
        self.settings.is_widget_hidden(widget)
    }

    /// Declare that execution results are already shown, so the renderer
    /// does not append its own thumbnails.
    pub fn mark_media_shown(&mut self) {
        self.media_shown = true;
    }

    fn reset(&mut self) {
        self.elements.clear();
        self.media_shown = false;
    }
}

pub struct NodeRenderer {
    registry: Arc<ExtensionRegistry>,
    settings: Arc<SettingsStore>,
    services: Services,
    config: RenderConfig,
    loaders: Vec<(&'static [&'static str], Arc<dyn NodeHandler>)>,
}

impl NodeRenderer {
    pub fn new(
        graph: Arc<dyn GraphView>,
        registry: Arc<ExtensionRegistry>,
        settings: Arc<SettingsStore>,
        widgets: Arc<WidgetRenderer>,
        previews: Arc<PreviewRegistry>,
        config: RenderConfig,
    ) -> Self {
        let image = NodeDefinition::new().preview(PreviewConfig::new(MediaKind::Image, "image"));
        let video = NodeDefinition::new().preview(PreviewConfig {
            widget: WidgetNames(vec!["video".to_string(), "file".to_string()]),
            ..PreviewConfig::new(MediaKind::Video, "video")
        });
        let loaders: Vec<(&'static [&'static str], Arc<dyn NodeHandler>)> = vec![
            (&["LoadImage", "LoadImageMask"][..], image.into_handler()),
            (&["LoadVideo", "VHS_LoadVideo"][..], video.into_handler()),
        ];

        Self {
            registry,
            settings,
            services: Services {
                graph,
                widgets,
                previews,
            },
            config,
            loaders,
        }
    }

    /// Drop live previews of nodes the host no longer has.
    pub fn forget_removed(&self) {
        let live: HashSet<_> = self.services.graph.nodes().iter().map(|n| n.id).collect();
        self.services.previews.retain_nodes(&live);
    }

    /// Render `node`. `None` means it produced nothing and should be omitted.
    ///
    /// `section_color` replaces the node's saved color when the node sits in a
    /// colored section.
    pub fn render(
        &self,
        node: &GraphNode,
        section_color: Option<Palette>,
    ) -> Option<RenderedNode> {
        let settings = self.settings.get_settings(node.id);
        let mut attrs = ContainerAttrs {
            width: settings.width,
            height: settings.height,
            color: section_color.unwrap_or(settings.color),
            break_before: settings.break_before,
            bypassed: node.is_bypassed(),
            tooltip: String::new(),
        };

        let mut ctx = NodeContext::new(node.clone(), settings, self.services.clone());
        let mut produced = match self.registry.get_node_handler(&node.node_type) {
            Some(handler) => match guarded(&node.node_type, || handler.render(&mut ctx)) {
                Ok(produced) => produced,
                Err(e) => {
                    warn!("{}, falling back to built-in rendering for node {}", e, node.id);
                    ctx.reset();
                    self.render_built_in(&mut ctx)
                }
            },
            None => self.render_built_in(&mut ctx),
        };

        if !ctx.media_shown {
            let thumbnails = thumbnails(&ctx.node, &self.services.previews);
            produced |= !thumbnails.is_empty();
            ctx.elements.extend(thumbnails);
        }

        if !produced {
            trace!("node {} ({}) rendered nothing", node.id, node.node_type);
            return None;
        }

        // handlers may have renamed the node
        let title = self.services.graph.node(node.id).map(|n| n.title).unwrap_or_else(|| node.title.clone());
        attrs.tooltip = ctx
            .settings
            .custom_tooltip()
            .map(String::from)
            .or_else(|| self.services.graph.node_description(&node.node_type))
            .unwrap_or_else(|| title.clone());

        Some(RenderedNode {
            id: node.id,
            node_type: node.node_type.clone(),
            title,
            attrs,
            elements: ctx.elements,
        })
    }

    fn render_built_in(
        &self,
        ctx: &mut NodeContext,
    ) -> bool {
        let node_type = ctx.node.node_type.clone();
        match node_type.as_str() {
            "PrimitiveNode" => self.render_primitive(ctx),
            "Note" | "MarkdownNote" => render_note(ctx),
            other => match self.loaders.iter().find(|(types, _)| types.iter().any(|t| *t == other)) {
                Some((_, handler)) => match handler.render(ctx) {
                    Ok(produced) => produced,
                    Err(e) => {
                        warn!("built-in loader rendering failed for node {}: {}", ctx.node.id, e);
                        ctx.reset();
                        self.render_default(ctx)
                    }
                },
                None => self.render_default(ctx),
            },
        }
    }

    /// Only the value widget, labeled with the node title.
    fn render_primitive(
        &self,
        ctx: &mut NodeContext,
    ) -> bool {
        let Some(widget) = ctx.node.widgets().iter().find(|w| self.is_renderable(ctx, w)).cloned() else {
            return false;
        };
        let label = ctx.node.title.clone();
        ctx.add_widget_labeled(&widget, label)
    }

    fn render_default(
        &self,
        ctx: &mut NodeContext,
    ) -> bool {
        ctx.add_title(None);
        let widgets: Vec<Widget> = ctx.node.widgets().iter().filter(|w| self.is_renderable(ctx, w)).cloned().collect();
        let mut produced = false;
        for widget in &widgets {
            produced |= ctx.add_widget(widget);
        }
        produced
    }

    fn is_renderable(
        &self,
        ctx: &NodeContext,
        widget: &Widget,
    ) -> bool {
        let prefix = &self.config.internal_widget_prefix;
        let internal = !prefix.is_empty() && widget.name.starts_with(prefix.as_str());
        !widget.hidden && !widget.is_converted() && !internal && !ctx.is_widget_hidden(&widget.name)
    }
}

/// Notes are shown as static text, never as an editable control.
fn render_note(ctx: &mut NodeContext) -> bool {
    let Some(text) = ctx.node.widgets().first().map(|w| value_to_string(&w.value)) else {
        return false;
    };
    ctx.add_title(None);
    ctx.add_text(&text);
    true
}

/// Read-only previews of the node's execution results, grouped by kind.
fn thumbnails(
    node: &GraphNode,
    previews: &PreviewRegistry,
) -> Vec<Element> {
    let mut groups: Vec<(MediaKind, Vec<String>)> = Vec::new();
    let mut push = |kind: MediaKind, url: String| match groups.iter_mut().find(|(k, _)| *k == kind) {
        Some((_, urls)) => urls.push(url),
        None => groups.push((kind, vec![url])),
    };

    for media in &node.images {
        let kind = MediaKind::from_filename(&media.filename).unwrap_or(MediaKind::Image);
        push(kind, previews.view().url(media));
    }
    for url in &node.imgs {
        push(MediaKind::Image, url.clone());
    }

    groups
        .into_iter()
        .map(|(kind, urls)| Element::Thumbnails {
            kind,
            urls,
        })
        .collect()
}
