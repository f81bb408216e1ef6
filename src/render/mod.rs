//! Node and widget rendering.
//!
//! Rendering produces a value tree rather than DOM: each graph node becomes a
//! [`RenderedNode`] holding [`Element`]s, and interactive elements carry a
//! [`Control`] bound to the widget it edits. The embedding layer draws the tree
//! and forwards user input to the control methods, which write back through the
//! [`GraphView`](crate::graph::GraphView).

mod control;
mod node;
mod preview;
mod widget;

use serde::Serialize;
use serde_json::Value;

use crate::{
    gallery::MediaKind,
    graph::NodeId,
    settings::{ColumnSpan, HeightMode, Palette},
};

pub use control::*;
pub use node::{NodeContext, NodeRenderer};
pub use preview::{Preview, PreviewHandle, PreviewRegistry, PreviewSpec};
pub use widget::{ControlKind, NumberKind, Resolution, WidgetContext, WidgetRenderer};

/// One piece of rendered content.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "element", rename_all = "snake_case")]
pub enum Element {
    /// node title
    Title { text: String },
    /// static icon + text banner
    Info { icon: String, text: String },
    /// read-only text, e.g. the body of a note
    Text { text: String },
    /// a control without a wrapper
    Control { control: Control },
    /// a widget rendering wrapped under its name
    Field { label: String, children: Vec<Element> },
    /// live preview that follows a filename widget
    Preview { preview: Preview },
    /// read-only execution result previews
    Thumbnails { kind: MediaKind, urls: Vec<String> },
    /// content produced by an extension
    Custom { kind: String, data: Value },
}

impl Element {
    pub fn title(text: impl Into<String>) -> Self {
        Element::Title {
            text: text.into(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Element::Text {
            text: text.into(),
        }
    }

    /// Iterate over this element and every nested element.
    pub fn walk(&self) -> Vec<&Element> {
        let mut out = vec![self];
        if let Element::Field {
            children,
            ..
        } = self
        {
            for child in children {
                out.extend(child.walk());
            }
        }
        out
    }

    pub fn as_control(&self) -> Option<&Control> {
        match self {
            Element::Control {
                control,
            } => Some(control),
            _ => None,
        }
    }
}

/// Layout attributes applied to a node's container before any content.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContainerAttrs {
    pub width: ColumnSpan,
    pub height: HeightMode,
    pub color: Palette,
    pub break_before: bool,
    pub bypassed: bool,
    pub tooltip: String,
}

/// Rendering of one graph node.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedNode {
    pub id: NodeId,
    pub node_type: String,
    pub title: String,
    pub attrs: ContainerAttrs,
    pub elements: Vec<Element>,
}

impl RenderedNode {
    /// Every control in the rendering, in document order.
    pub fn controls(&self) -> Vec<&Control> {
        self.elements.iter().flat_map(|e| e.walk()).filter_map(Element::as_control).collect()
    }

    /// The control bound to the named widget.
    pub fn control(
        &self,
        widget: &str,
    ) -> Option<&Control> {
        self.controls().into_iter().find(|c| c.target().widget == widget)
    }

    /// Labels of every field, in document order.
    pub fn field_labels(&self) -> Vec<&str> {
        self.elements
            .iter()
            .flat_map(|e| e.walk())
            .filter_map(|e| match e {
                Element::Field {
                    label,
                    ..
                } => Some(label.as_str()),
                _ => None,
            })
            .collect()
    }
}
