use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::Result;

/// node id, unique within one graph
pub type NodeId = i64;

/// Mode of a node that takes part in execution.
pub const MODE_ACTIVE: i32 = 0;
/// Mode of a node skipped during execution.
pub const MODE_BYPASSED: i32 = 4;

/// Widget type of inputs rewired to accept a graph connection.
pub const CONVERTED_WIDGET: &str = "converted-widget";

/// Axis-aligned rectangle in canvas coordinates.
///
/// Serialized the way the host stores group bounds: `[x, y, width, height]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    ) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Point-in-rectangle test, edges included.
    pub fn contains_point(
        &self,
        x: f64,
        y: f64,
    ) -> bool {
        x >= self.x && x <= self.right() && y >= self.y && y <= self.bottom()
    }

    /// True when all four edges of `other` lie inside this rectangle.
    pub fn contains_rect(
        &self,
        other: &Rect,
    ) -> bool {
        other.x >= self.x && other.y >= self.y && other.right() <= self.right() && other.bottom() <= self.bottom()
    }
}

impl From<[f64; 4]> for Rect {
    fn from(v: [f64; 4]) -> Self {
        Rect::new(v[0], v[1], v[2], v[3])
    }
}

impl From<Rect> for [f64; 4] {
    fn from(r: Rect) -> Self {
        [r.x, r.y, r.width, r.height]
    }
}

/// A titled rectangle on the host canvas. Purely geometric; it owns no nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphGroup {
    #[serde(default)]
    pub title: String,
    pub bounding: Rect,
}

impl GraphGroup {
    pub fn new(
        title: impl Into<String>,
        bounding: Rect,
    ) -> Self {
        Self {
            title: title.into(),
            bounding,
        }
    }

    /// True when the node's anchor point (its top-left position) lies inside the group.
    pub fn contains_node(
        &self,
        node: &GraphNode,
    ) -> bool {
        self.bounding.contains_point(node.pos[0], node.pos[1])
    }
}

/// Reference to a file served by the host, as reported in execution results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type", default = "default_folder_type")]
    pub folder_type: String,
}

fn default_folder_type() -> String {
    "output".to_string()
}

impl MediaRef {
    pub fn new(
        filename: impl Into<String>,
        subfolder: impl Into<String>,
        folder_type: impl Into<String>,
    ) -> Self {
        Self {
            filename: filename.into(),
            subfolder: subfolder.into(),
            folder_type: folder_type.into(),
        }
    }
}

/// Produces combo options lazily, at render time.
#[derive(Clone)]
pub struct ValuesProvider(Arc<dyn Fn() -> Result<Vec<String>> + Send + Sync>);

impl ValuesProvider {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() -> Result<Vec<String>> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self) -> Result<Vec<String>> {
        (self.0)()
    }
}

impl fmt::Debug for ValuesProvider {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str("ValuesProvider")
    }
}

/// Optional constraints attached to a widget.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WidgetOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    /// enumerated values of a combo
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<Value>>,
    /// enumerated values computed by the host at render time
    #[serde(skip)]
    pub values_provider: Option<ValuesProvider>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiline: Option<bool>,
    #[serde(default, rename = "maxLength", alias = "max_length", skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

impl WidgetOptions {
    pub fn has_values(&self) -> bool {
        self.values.is_some() || self.values_provider.is_some()
    }

    /// Evaluate the enumerated values once. A failing provider yields no options.
    pub fn resolve_values(&self) -> Vec<String> {
        if let Some(provider) = &self.values_provider {
            return match provider.call() {
                Ok(values) => values,
                Err(e) => {
                    debug!("combo values provider failed: {}", e);
                    Vec::new()
                }
            };
        }
        self.values.as_ref().map(|values| values.iter().map(value_to_string).collect()).unwrap_or_default()
    }
}

/// Render a json value the way a text input would show it.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        v => v.to_string(),
    }
}

/// One input control of a node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Widget {
    pub name: String,
    #[serde(rename = "type", default)]
    pub widget_type: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub options: WidgetOptions,
    #[serde(default)]
    pub hidden: bool,
}

impl Widget {
    pub fn new(
        name: impl Into<String>,
        widget_type: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            name: name.into(),
            widget_type: widget_type.into(),
            value: value.into(),
            options: WidgetOptions::default(),
            hidden: false,
        }
    }

    pub fn with_options(
        mut self,
        options: WidgetOptions,
    ) -> Self {
        self.options = options;
        self
    }

    /// Lower-cased widget type; widget types match case-insensitively.
    pub fn type_key(&self) -> String {
        self.widget_type.to_ascii_lowercase()
    }

    pub fn is_converted(&self) -> bool {
        self.widget_type.eq_ignore_ascii_case(CONVERTED_WIDGET)
    }
}

/// A node of the host graph, as seen by the form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub pos: [f64; 2],
    #[serde(default)]
    pub size: [f64; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub widgets: Option<Vec<Widget>>,
    #[serde(default)]
    pub mode: i32,
    /// execution results reported by the host
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<MediaRef>,
    /// already-resolved preview urls
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imgs: Vec<String>,
}

impl GraphNode {
    pub fn new(
        id: NodeId,
        node_type: impl Into<String>,
    ) -> Self {
        let node_type = node_type.into();
        Self {
            id,
            title: node_type.clone(),
            node_type,
            ..Default::default()
        }
    }

    pub fn with_title(
        mut self,
        title: impl Into<String>,
    ) -> Self {
        self.title = title.into();
        self
    }

    pub fn at(
        mut self,
        x: f64,
        y: f64,
    ) -> Self {
        self.pos = [x, y];
        self
    }

    pub fn with_widget(
        mut self,
        widget: Widget,
    ) -> Self {
        self.widgets.get_or_insert_with(Vec::new).push(widget);
        self
    }

    pub fn with_mode(
        mut self,
        mode: i32,
    ) -> Self {
        self.mode = mode;
        self
    }

    pub fn widgets(&self) -> &[Widget] {
        self.widgets.as_deref().unwrap_or_default()
    }

    pub fn widget(
        &self,
        name: &str,
    ) -> Option<&Widget> {
        self.widgets().iter().find(|w| w.name == name)
    }

    pub fn is_bypassed(&self) -> bool {
        self.mode == MODE_BYPASSED
    }

    pub fn has_media(&self) -> bool {
        !self.images.is_empty() || !self.imgs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_rect_contains_point_inclusive() {
        let r = Rect::new(0.0, 0.0, 100.0, 50.0);
        assert!(r.contains_point(0.0, 0.0));
        assert!(r.contains_point(100.0, 50.0));
        assert!(r.contains_point(100.0, 0.0));
        assert!(!r.contains_point(101.0, 10.0));
        assert!(!r.contains_point(10.0, -1.0));
    }

    #[test]
    fn test_rect_contains_rect() {
        let outer = Rect::new(0.0, 0.0, 100.0, 100.0);
        assert!(outer.contains_rect(&Rect::new(10.0, 10.0, 90.0, 90.0)));
        assert!(!outer.contains_rect(&Rect::new(10.0, 10.0, 91.0, 20.0)));
    }

    #[test]
    fn test_node_deserialize() {
        let node: GraphNode = serde_json::from_value(json!({
            "id": 7,
            "type": "KSampler",
            "title": "Sampler",
            "pos": [10.0, 20.0],
            "mode": 4,
            "widgets": [
                {"name": "steps", "type": "INT", "value": 20, "options": {"min": 1, "max": 100}},
                {"name": "sampler", "type": "combo", "value": "euler", "options": {"values": ["euler", "dpm"]}}
            ]
        }))
        .unwrap();

        assert_eq!(node.id, 7);
        assert!(node.is_bypassed());
        assert_eq!(node.widgets().len(), 2);
        assert_eq!(node.widget("steps").unwrap().type_key(), "int");
        assert_eq!(node.widget("sampler").unwrap().options.resolve_values(), vec!["euler", "dpm"]);
    }

    #[test]
    fn test_group_bounding_from_array() {
        let group: GraphGroup = serde_json::from_value(json!({"title": "Mobile Form", "bounding": [1, 2, 3, 4]})).unwrap();
        assert_eq!(group.bounding, Rect::new(1.0, 2.0, 3.0, 4.0));
    }

    #[test]
    fn test_values_provider_error_yields_empty() {
        let options = WidgetOptions {
            values_provider: Some(ValuesProvider::new(|| Err(crate::FormError::Graph("gone".into())))),
            ..Default::default()
        };
        assert!(options.has_values());
        assert!(options.resolve_values().is_empty());
    }

    #[test]
    fn test_converted_widget_case_insensitive() {
        assert!(Widget::new("seed", "Converted-Widget", 1).is_converted());
        assert!(!Widget::new("seed", "number", 1).is_converted());
    }
}
