use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::{
    config::RenderConfig,
    gallery::MediaKind,
    graph::{GraphNode, Widget},
    registry::{ExtensionRegistry, WidgetHandler, guarded},
    upload::ViewEndpoint,
};

use super::{
    Element,
    control::{
        ButtonControl, ComboControl, Control, NumberControl, SeedControl, SliderControl, TextControl, ToggleControl, UploadControl,
        WidgetRef,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberKind {
    Int,
    Float,
    /// integer when the current value is integral
    Number,
}

/// Built-in control families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    Number(NumberKind),
    Combo,
    Text { multiline: bool },
    Toggle,
    Button,
    Slider,
    Seed,
    Upload(MediaKind),
}

/// How a widget ends up rendered.
#[derive(Clone)]
pub enum Resolution {
    Registered(Arc<dyn WidgetHandler>),
    BuiltIn(ControlKind),
    Inferred(ControlKind),
    Unrepresentable,
}

impl std::fmt::Debug for Resolution {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Resolution::Registered(_) => f.write_str("Registered"),
            Resolution::BuiltIn(kind) => f.debug_tuple("BuiltIn").field(kind).finish(),
            Resolution::Inferred(kind) => f.debug_tuple("Inferred").field(kind).finish(),
            Resolution::Unrepresentable => f.write_str("Unrepresentable"),
        }
    }
}

/// What a widget handler gets to work with.
pub struct WidgetContext {
    pub widget: Widget,
    pub node: GraphNode,
    pub elements: Vec<Element>,
}

impl WidgetContext {
    pub fn new(
        widget: Widget,
        node: GraphNode,
    ) -> Self {
        Self {
            widget,
            node,
            elements: Vec::new(),
        }
    }

    pub fn target(&self) -> WidgetRef {
        WidgetRef::new(self.node.id, self.widget.name.clone())
    }

    pub fn push(
        &mut self,
        element: Element,
    ) {
        self.elements.push(element);
    }

    pub fn add_control(
        &mut self,
        control: Control,
    ) {
        self.elements.push(Element::Control {
            control,
        });
    }
}

type Resolver = fn(&WidgetRenderer, &Widget) -> Option<Resolution>;

/// Resolvers tried in order; the first `Some` decides unless a registered
/// handler declines.
const RESOLVERS: [Resolver; 3] = [WidgetRenderer::registered, WidgetRenderer::built_in, WidgetRenderer::inferred];

pub struct WidgetRenderer {
    registry: Arc<ExtensionRegistry>,
    config: RenderConfig,
    view: ViewEndpoint,
}

impl WidgetRenderer {
    pub fn new(
        registry: Arc<ExtensionRegistry>,
        config: RenderConfig,
        view: ViewEndpoint,
    ) -> Self {
        Self {
            registry,
            config,
            view,
        }
    }

    fn registered(
        &self,
        widget: &Widget,
    ) -> Option<Resolution> {
        self.registry.get_widget_handler(&widget.widget_type).map(Resolution::Registered)
    }

    fn built_in(
        &self,
        widget: &Widget,
    ) -> Option<Resolution> {
        built_in_kind(widget).map(Resolution::BuiltIn)
    }

    fn inferred(
        &self,
        widget: &Widget,
    ) -> Option<Resolution> {
        infer_kind(widget).map(Resolution::Inferred)
    }

    /// The first strategy that claims `widget`.
    pub fn resolve(
        &self,
        widget: &Widget,
    ) -> Resolution {
        RESOLVERS.iter().find_map(|r| r(self, widget)).unwrap_or(Resolution::Unrepresentable)
    }

    /// Render the context's widget. Returns whether anything visible was added.
    pub fn render_into(
        &self,
        ctx: &mut WidgetContext,
    ) -> bool {
        for resolver in RESOLVERS {
            let Some(resolution) = resolver(self, &ctx.widget) else {
                continue;
            };
            match resolution {
                Resolution::Registered(handler) => {
                    let kind = ctx.widget.type_key();
                    match guarded(&kind, || handler.render(ctx)) {
                        Ok(true) => return true,
                        Ok(false) => trace!("widget handler for '{}' declined {}", kind, ctx.widget.name),
                        Err(e) => warn!("{}, using built-in rendering for {}", e, ctx.widget.name),
                    }
                    ctx.elements.clear();
                }
                Resolution::BuiltIn(kind) | Resolution::Inferred(kind) => {
                    let control = self.control(kind, ctx.target(), &ctx.widget);
                    ctx.add_control(control);
                    return true;
                }
                Resolution::Unrepresentable => break,
            }
        }
        debug!("nothing to render for widget {} ({})", ctx.widget.name, ctx.widget.widget_type);
        false
    }

    /// Build the control for `kind` bound to `target`.
    pub fn control(
        &self,
        kind: ControlKind,
        target: WidgetRef,
        widget: &Widget,
    ) -> Control {
        match kind {
            ControlKind::Number(number) => {
                let integer = match number {
                    NumberKind::Int => true,
                    NumberKind::Float => false,
                    NumberKind::Number => is_integral(&widget.value),
                };
                Control::Number(NumberControl::new(target, widget, integer))
            }
            ControlKind::Combo => Control::Combo(ComboControl::new(target, widget, self.config.combo_filter_threshold)),
            ControlKind::Text {
                multiline,
            } => Control::Text(TextControl::new(target, widget, multiline)),
            ControlKind::Toggle => Control::Toggle(ToggleControl::new(target, widget)),
            ControlKind::Button => Control::Button(ButtonControl::new(target, widget)),
            ControlKind::Slider => Control::Slider(SliderControl::new(target, widget)),
            ControlKind::Seed => Control::Seed(SeedControl::new(target, widget)),
            ControlKind::Upload(media) => Control::Upload(UploadControl::new(target, widget, media, self.view.clone())),
        }
    }
}

fn is_integral(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.is_i64() || n.is_u64(),
        _ => false,
    }
}

fn is_multiline(widget: &Widget) -> bool {
    widget.options.multiline.unwrap_or(false) || widget.value.as_str().is_some_and(|s| s.contains('\n'))
}

fn built_in_kind(widget: &Widget) -> Option<ControlKind> {
    let kind = match widget.type_key().as_str() {
        "combo" | "dropdown" => ControlKind::Combo,
        "number" => ControlKind::Number(NumberKind::Number),
        "float" => ControlKind::Number(NumberKind::Float),
        "int" => ControlKind::Number(NumberKind::Int),
        "string" | "text" => ControlKind::Text {
            multiline: is_multiline(widget),
        },
        "multiline" | "customtext" => ControlKind::Text {
            multiline: true,
        },
        "boolean" | "toggle" => ControlKind::Toggle,
        "button" => ControlKind::Button,
        "slider" => ControlKind::Slider,
        "seed" => ControlKind::Seed,
        "image-upload" => ControlKind::Upload(MediaKind::Image),
        "video-upload" => ControlKind::Upload(MediaKind::Video),
        _ => return None,
    };
    Some(kind)
}

fn infer_kind(widget: &Widget) -> Option<ControlKind> {
    if widget.options.has_values() {
        return Some(ControlKind::Combo);
    }
    match &widget.value {
        Value::Number(_) => Some(ControlKind::Number(NumberKind::Number)),
        Value::Bool(_) => Some(ControlKind::Toggle),
        Value::String(_) => Some(ControlKind::Text {
            multiline: is_multiline(widget),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::{
        FormError,
        config::UploadConfig,
        graph::WidgetOptions,
        registry::widget_handler,
    };

    fn renderer(registry: ExtensionRegistry) -> WidgetRenderer {
        WidgetRenderer::new(Arc::new(registry), RenderConfig::default(), ViewEndpoint::new(&UploadConfig::default()).unwrap())
    }

    fn render(
        renderer: &WidgetRenderer,
        widget: Widget,
    ) -> (bool, WidgetContext) {
        let node = GraphNode::new(3, "Anything").with_widget(widget.clone());
        let mut ctx = WidgetContext::new(widget, node);
        let produced = renderer.render_into(&mut ctx);
        (produced, ctx)
    }

    #[test]
    fn test_built_in_types_are_case_insensitive() {
        let r = renderer(ExtensionRegistry::new());
        assert!(matches!(r.resolve(&Widget::new("a", "INT", 1)), Resolution::BuiltIn(ControlKind::Number(NumberKind::Int))));
        assert!(matches!(r.resolve(&Widget::new("a", "Dropdown", "x")), Resolution::BuiltIn(ControlKind::Combo)));
        assert!(matches!(
            r.resolve(&Widget::new("a", "customtext", "")),
            Resolution::BuiltIn(ControlKind::Text {
                multiline: true
            })
        ));
        assert!(matches!(r.resolve(&Widget::new("a", "video-upload", "")), Resolution::BuiltIn(ControlKind::Upload(MediaKind::Video))));
    }

    #[test]
    fn test_inference_by_shape() {
        let r = renderer(ExtensionRegistry::new());
        let with_values = Widget::new("a", "SAMPLER", "euler").with_options(WidgetOptions {
            values: Some(vec![json!("euler"), json!("ddim")]),
            ..Default::default()
        });
        assert!(matches!(r.resolve(&with_values), Resolution::Inferred(ControlKind::Combo)));
        assert!(matches!(r.resolve(&Widget::new("a", "weird", 2.5)), Resolution::Inferred(ControlKind::Number(NumberKind::Number))));
        assert!(matches!(r.resolve(&Widget::new("a", "weird", true)), Resolution::Inferred(ControlKind::Toggle)));
        assert!(matches!(
            r.resolve(&Widget::new("a", "weird", "line\nline")),
            Resolution::Inferred(ControlKind::Text {
                multiline: true
            })
        ));
        assert!(matches!(r.resolve(&Widget::new("a", "weird", json!({"x": 1}))), Resolution::Unrepresentable));
    }

    #[test]
    fn test_unrepresentable_renders_nothing() {
        let r = renderer(ExtensionRegistry::new());
        let (produced, ctx) = render(&r, Widget::new("blob", "weird", Value::Null));
        assert!(!produced);
        assert!(ctx.elements.is_empty());
    }

    #[test]
    fn test_number_kind_follows_value() {
        let r = renderer(ExtensionRegistry::new());
        let (_, ctx) = render(&r, Widget::new("steps", "number", 20));
        match ctx.elements[0].as_control() {
            Some(Control::Number(n)) => {
                assert!(n.integer);
                assert_eq!(n.step, 1.0);
            }
            other => panic!("expected number control, got {:?}", other),
        }
        let (_, ctx) = render(&r, Widget::new("cfg", "number", 7.5));
        match ctx.elements[0].as_control() {
            Some(Control::Number(n)) => assert_eq!(n.step, 0.1),
            other => panic!("expected number control, got {:?}", other),
        }
    }

    #[test]
    fn test_registered_handler_wins() {
        let registry = ExtensionRegistry::new();
        registry.register_widget_handler(
            "Color",
            widget_handler(|ctx| {
                ctx.push(Element::Custom {
                    kind: "color".into(),
                    data: ctx.widget.value.clone(),
                });
                Ok(true)
            }),
        );
        let r = renderer(registry);
        let (produced, ctx) = render(&r, Widget::new("tint", "COLOR", "#ff0000"));
        assert!(produced);
        assert!(matches!(&ctx.elements[0], Element::Custom { kind, .. } if kind == "color"));
    }

    #[test]
    fn test_declining_handler_falls_through() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let registry = ExtensionRegistry::new();
        registry.register_widget_handler(
            "toggle",
            widget_handler(move |ctx| {
                counter.fetch_add(1, Ordering::SeqCst);
                ctx.push(Element::text("partial"));
                Ok(false)
            }),
        );
        let r = renderer(registry);
        let (produced, ctx) = render(&r, Widget::new("on", "toggle", true));
        assert!(produced);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.elements.len(), 1);
        assert!(matches!(ctx.elements[0].as_control(), Some(Control::Toggle(_))));
    }

    #[test]
    fn test_failing_handler_falls_through() {
        let registry = ExtensionRegistry::new();
        registry.register_widget_handler("int", widget_handler(|_| Err(FormError::Extension("boom".into()))));
        registry.register_widget_handler("float", widget_handler(|_| panic!("handler bug")));
        let r = renderer(registry);

        let (produced, ctx) = render(&r, Widget::new("steps", "int", 20));
        assert!(produced);
        assert!(matches!(ctx.elements[0].as_control(), Some(Control::Number(_))));

        let (produced, _) = render(&r, Widget::new("cfg", "float", 1.5));
        assert!(produced);
    }
}
