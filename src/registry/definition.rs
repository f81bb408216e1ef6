use std::{fmt, sync::Arc};

use serde::Deserialize;
use serde_json::Value;

use crate::{
    Result,
    gallery::MediaKind,
    graph::GraphNode,
    render::{NodeContext, PreviewSpec},
};

use super::NodeHandler;

/// Names one widget or a list of candidate widgets.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(from = "OneOrManyRaw")]
pub struct WidgetNames(pub Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrManyRaw {
    One(String),
    Many(Vec<String>),
}

impl From<OneOrManyRaw> for WidgetNames {
    fn from(raw: OneOrManyRaw) -> Self {
        match raw {
            OneOrManyRaw::One(s) => WidgetNames(vec![s]),
            OneOrManyRaw::Many(v) => WidgetNames(v),
        }
    }
}

impl WidgetNames {
    /// First name that exists on `node`.
    pub fn find_on(
        &self,
        node: &GraphNode,
    ) -> Option<String> {
        self.0.iter().find(|name| node.widget(name).is_some()).cloned()
    }
}

/// Live preview driven by a filename widget.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PreviewConfig {
    #[serde(rename = "type")]
    pub kind: MediaKind,
    #[serde(alias = "widgets")]
    pub widget: WidgetNames,
    #[serde(default)]
    pub subfolder: WidgetNames,
    /// host folder the file lives in
    #[serde(default = "default_source")]
    pub source: String,
}

fn default_source() -> String {
    "input".to_string()
}

impl PreviewConfig {
    pub fn new(
        kind: MediaKind,
        widget: &str,
    ) -> Self {
        Self {
            kind,
            widget: WidgetNames(vec![widget.to_string()]),
            subfolder: WidgetNames::default(),
            source: default_source(),
        }
    }

    /// Resolve against the widgets `node` actually has.
    pub fn spec_for(
        &self,
        node: &GraphNode,
    ) -> Option<PreviewSpec> {
        let widget = self.widget.find_on(node)?;
        Some(PreviewSpec {
            kind: self.kind,
            widget,
            subfolder_widget: self.subfolder.find_on(node),
            folder_type: self.source.clone(),
        })
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct InfoBanner {
    #[serde(default)]
    pub icon: String,
    pub text: String,
}

/// Declarative rendering of one or more node types.
#[derive(Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodeDefinition {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub preview: Option<PreviewConfig>,
    #[serde(default)]
    pub info: Option<InfoBanner>,
    #[serde(default)]
    pub skip_widgets: Vec<String>,
    /// replaces every declarative behavior when set
    #[serde(skip)]
    pub custom: Option<Arc<dyn NodeHandler>>,
}

impl fmt::Debug for NodeDefinition {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("NodeDefinition")
            .field("title", &self.title)
            .field("preview", &self.preview)
            .field("info", &self.info)
            .field("skip_widgets", &self.skip_widgets)
            .field("custom", &self.custom.is_some())
            .finish()
    }
}

impl NodeDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(
        mut self,
        title: impl Into<String>,
    ) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn preview(
        mut self,
        preview: PreviewConfig,
    ) -> Self {
        self.preview = Some(preview);
        self
    }

    pub fn info(
        mut self,
        icon: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        self.info = Some(InfoBanner {
            icon: icon.into(),
            text: text.into(),
        });
        self
    }

    pub fn skip(
        mut self,
        widgets: &[&str],
    ) -> Self {
        self.skip_widgets.extend(widgets.iter().map(|w| w.to_string()));
        self
    }

    pub fn custom(
        mut self,
        handler: Arc<dyn NodeHandler>,
    ) -> Self {
        self.custom = Some(handler);
        self
    }

    /// Parse a definition after checking it against [`NodeDefinition::schema`].
    pub fn from_json(value: Value) -> Result<Self> {
        jsonschema::validate(&Self::schema(), &value)?;
        let definition = serde_json::from_value::<Self>(value)?;
        Ok(definition)
    }

    pub fn schema() -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "preview": {
                    "type": "object",
                    "properties": {
                        "type": { "type": "string", "enum": ["image", "video", "gif", "audio"] },
                        "widget": { "type": ["string", "array"], "items": { "type": "string" } },
                        "widgets": { "type": ["string", "array"], "items": { "type": "string" } },
                        "subfolder": { "type": ["string", "array"], "items": { "type": "string" } },
                        "source": { "type": "string" }
                    },
                    "required": ["type"],
                    "anyOf": [{ "required": ["widget"] }, { "required": ["widgets"] }]
                },
                "info": {
                    "type": "object",
                    "properties": {
                        "icon": { "type": "string" },
                        "text": { "type": "string" }
                    },
                    "required": ["text"]
                },
                "skipWidgets": { "type": "array", "items": { "type": "string" } }
            },
            "additionalProperties": false
        })
    }

    /// The handler registered for this definition.
    pub fn into_handler(self) -> Arc<dyn NodeHandler> {
        match self.custom {
            Some(custom) => custom,
            None => Arc::new(DeclarativeHandler {
                definition: self,
            }),
        }
    }
}

/// Handler generated from a [`NodeDefinition`] without `custom`.
pub struct DeclarativeHandler {
    definition: NodeDefinition,
}

impl NodeHandler for DeclarativeHandler {
    fn render(
        &self,
        ctx: &mut NodeContext,
    ) -> Result<bool> {
        let def = &self.definition;
        let mut produced = false;

        ctx.add_title(def.title.as_deref());
        if let Some(info) = &def.info {
            ctx.add_info(&info.icon, &info.text);
            produced = true;
        }
        if let Some(spec) = def.preview.as_ref().and_then(|p| p.spec_for(ctx.node())) {
            produced |= ctx.add_preview(&spec).is_some();
        }

        let widgets = ctx.node().widgets().to_vec();
        for widget in widgets.iter().filter(|w| !def.skip_widgets.contains(&w.name)) {
            if widget.hidden || widget.is_converted() || ctx.is_widget_hidden(&widget.name) {
                continue;
            }
            produced |= ctx.add_widget(widget);
        }
        Ok(produced)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_from_json() {
        let def = NodeDefinition::from_json(json!({
            "title": "Video",
            "preview": {"type": "video", "widgets": ["video", "filename"], "subfolder": "dir", "source": "output"},
            "info": {"icon": "i", "text": "Loads a clip"},
            "skipWidgets": ["frame_load_cap"]
        }))
        .unwrap();

        assert_eq!(def.title.as_deref(), Some("Video"));
        let preview = def.preview.unwrap();
        assert_eq!(preview.kind, MediaKind::Video);
        assert_eq!(preview.widget, WidgetNames(vec!["video".into(), "filename".into()]));
        assert_eq!(preview.subfolder, WidgetNames(vec!["dir".into()]));
        assert_eq!(def.skip_widgets, vec!["frame_load_cap"]);
    }

    #[test]
    fn test_from_json_rejects_unknown_keys() {
        assert!(NodeDefinition::from_json(json!({"titel": "typo"})).is_err());
        assert!(NodeDefinition::from_json(json!({"preview": {"type": "hologram", "widget": "x"}})).is_err());
    }

    #[test]
    fn test_from_json_requires_preview_widget() {
        let err = NodeDefinition::from_json(json!({"preview": {"type": "image"}})).unwrap_err();
        assert!(matches!(err, crate::FormError::Config(_)));
        assert!(NodeDefinition::from_json(json!({"preview": {"type": "image", "widgets": ["image"]}})).is_ok());
    }

    #[test]
    fn test_preview_spec_picks_first_present_widget() {
        let node = GraphNode::new(1, "VHS_LoadVideo").with_widget(crate::graph::Widget::new("filename", "combo", "a.mp4"));
        let config = PreviewConfig {
            kind: MediaKind::Video,
            widget: WidgetNames(vec!["video".into(), "filename".into()]),
            subfolder: WidgetNames::default(),
            source: "input".into(),
        };
        let spec = config.spec_for(&node).unwrap();
        assert_eq!(spec.widget, "filename");
        assert_eq!(spec.subfolder_widget, None);
    }
}
