//! Interactive controls and their commit semantics.
//!
//! Every control keeps the state a user sees (the text in a box, the slider
//! readout) separate from the widget value in the graph. Methods named after
//! user gestures decide when the value is written and when the widget's
//! callback fires.

use rand::Rng;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::{
    FormError, Result,
    gallery::MediaKind,
    graph::{GraphView, NodeId, Widget, value_to_string},
    upload::{MediaUploader, UploadFile, UploadSource, ViewEndpoint},
};

use super::preview::media_from_value;

/// The widget a control edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WidgetRef {
    pub node: NodeId,
    pub widget: String,
}

impl WidgetRef {
    pub fn new(
        node: NodeId,
        widget: impl Into<String>,
    ) -> Self {
        Self {
            node,
            widget: widget.into(),
        }
    }

    fn write(
        &self,
        graph: &dyn GraphView,
        value: Value,
    ) -> Result<()> {
        graph.set_widget_value(self.node, &self.widget, value)
    }

    fn notify(
        &self,
        graph: &dyn GraphView,
    ) -> Result<()> {
        graph.fire_callback(self.node, &self.widget)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Control {
    Number(NumberControl),
    Combo(ComboControl),
    Text(TextControl),
    Toggle(ToggleControl),
    Button(ButtonControl),
    Slider(SliderControl),
    Seed(SeedControl),
    Upload(UploadControl),
}

impl Control {
    pub fn target(&self) -> &WidgetRef {
        match self {
            Control::Number(c) => &c.target,
            Control::Combo(c) => &c.target,
            Control::Text(c) => &c.target,
            Control::Toggle(c) => &c.target,
            Control::Button(c) => &c.target,
            Control::Slider(c) => &c.target,
            Control::Seed(c) => &c.target,
            Control::Upload(c) => &c.target,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Control::Number(_) => "number",
            Control::Combo(_) => "combo",
            Control::Text(_) => "text",
            Control::Toggle(_) => "toggle",
            Control::Button(_) => "button",
            Control::Slider(_) => "slider",
            Control::Seed(_) => "seed",
            Control::Upload(_) => "upload",
        }
    }
}

/// Numeric input with increment/decrement.
#[derive(Debug, Clone, Serialize)]
pub struct NumberControl {
    pub target: WidgetRef,
    pub value: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: f64,
    pub precision: Option<u32>,
    pub integer: bool,
    /// text currently shown in the input
    pub display: String,
}

impl NumberControl {
    pub fn new(
        target: WidgetRef,
        widget: &Widget,
        integer: bool,
    ) -> Self {
        let value = widget.value.as_f64().unwrap_or_default();
        let step = widget.options.step.filter(|s| *s > 0.0).unwrap_or(if integer { 1.0 } else { 0.1 });
        let mut control = Self {
            target,
            value,
            min: widget.options.min,
            max: widget.options.max,
            step,
            precision: widget.options.precision,
            integer,
            display: String::new(),
        };
        control.display = control.format(value);
        control
    }

    pub fn format(
        &self,
        value: f64,
    ) -> String {
        match self.precision {
            Some(p) => format!("{:.*}", p as usize, value),
            None if self.integer => format!("{}", value.round() as i64),
            None => value.to_string(),
        }
    }

    pub fn clamp(
        &self,
        value: f64,
    ) -> f64 {
        let mut v = value;
        if let Some(min) = self.min {
            v = v.max(min);
        }
        if let Some(max) = self.max {
            v = v.min(max);
        }
        if self.integer { v.round() } else { v }
    }

    /// Keystrokes only change the displayed text.
    pub fn type_text(
        &mut self,
        text: &str,
    ) {
        self.display = text.to_string();
    }

    /// Blur or enter: parse the displayed text, clamp, write and notify.
    pub fn commit_display(
        &mut self,
        graph: &dyn GraphView,
    ) -> Result<f64> {
        match self.display.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => self.commit(graph, v),
            _ => {
                let current = self.format(self.value);
                let rejected = std::mem::replace(&mut self.display, current);
                Err(FormError::Convert(format!("'{}' is not a number", rejected)))
            }
        }
    }

    pub fn commit(
        &mut self,
        graph: &dyn GraphView,
        value: f64,
    ) -> Result<f64> {
        let v = self.clamp(value);
        let json = if self.integer { Value::from(v as i64) } else { Value::from(v) };
        self.target.write(graph, json)?;
        self.value = v;
        self.display = self.format(v);
        self.target.notify(graph)?;
        Ok(v)
    }

    pub fn increment(
        &mut self,
        graph: &dyn GraphView,
    ) -> Result<f64> {
        self.commit(graph, self.value + self.step)
    }

    pub fn decrement(
        &mut self,
        graph: &dyn GraphView,
    ) -> Result<f64> {
        self.commit(graph, self.value - self.step)
    }
}

/// Dropdown, with an inline filter when the option list is long.
#[derive(Debug, Clone, Serialize)]
pub struct ComboControl {
    pub target: WidgetRef,
    pub options: Vec<String>,
    pub selected: String,
    /// `Some` when the filter box is shown
    pub filter: Option<String>,
    visible: Vec<usize>,
}

impl ComboControl {
    pub fn new(
        target: WidgetRef,
        widget: &Widget,
        filter_threshold: usize,
    ) -> Self {
        let options = widget.options.resolve_values();
        let visible = (0..options.len()).collect();
        let filter = (options.len() > filter_threshold).then(String::new);
        Self {
            target,
            selected: value_to_string(&widget.value),
            options,
            filter,
            visible,
        }
    }

    pub fn has_filter(&self) -> bool {
        self.filter.is_some()
    }

    /// Hide options not containing `query`. The widget value is untouched.
    pub fn filter(
        &mut self,
        query: &str,
    ) {
        if self.filter.is_none() {
            return;
        }
        let needle = query.to_lowercase();
        self.visible = self.options.iter().enumerate().filter(|(_, o)| o.to_lowercase().contains(&needle)).map(|(i, _)| i).collect();
        self.filter = Some(query.to_string());
    }

    pub fn visible_options(&self) -> Vec<&str> {
        self.visible.iter().map(|i| self.options[*i].as_str()).collect()
    }

    pub fn select(
        &mut self,
        graph: &dyn GraphView,
        option: &str,
    ) -> Result<()> {
        if !self.options.iter().any(|o| o == option) {
            return Err(FormError::Graph(format!("'{}' is not an option of {}", option, self.target.widget)));
        }
        self.target.write(graph, Value::String(option.to_string()))?;
        self.selected = option.to_string();
        self.target.notify(graph)
    }
}

/// Text input, always drawn as a resizable multi-line box.
#[derive(Debug, Clone, Serialize)]
pub struct TextControl {
    pub target: WidgetRef,
    pub value: String,
    pub placeholder: Option<String>,
    pub max_length: Option<usize>,
    /// the widget holds multi-line text
    pub multiline: bool,
    pending: bool,
}

impl TextControl {
    pub fn new(
        target: WidgetRef,
        widget: &Widget,
        multiline: bool,
    ) -> Self {
        Self {
            target,
            value: value_to_string(&widget.value),
            placeholder: widget.options.placeholder.clone(),
            max_length: widget.options.max_length,
            multiline,
            pending: false,
        }
    }

    /// Every keystroke updates the widget value; the callback waits for commit.
    pub fn input(
        &mut self,
        graph: &dyn GraphView,
        text: &str,
    ) -> Result<()> {
        let text = match self.max_length {
            Some(max) => text.chars().take(max).collect(),
            None => text.to_string(),
        };
        self.target.write(graph, Value::String(text.clone()))?;
        self.value = text;
        self.pending = true;
        Ok(())
    }

    /// Blur or change: fire the callback once for all pending keystrokes.
    pub fn commit(
        &mut self,
        graph: &dyn GraphView,
    ) -> Result<()> {
        if !self.pending {
            return Ok(());
        }
        self.pending = false;
        self.target.notify(graph)
    }
}

/// Toggle switch; writes and notifies immediately.
#[derive(Debug, Clone, Serialize)]
pub struct ToggleControl {
    pub target: WidgetRef,
    pub value: bool,
}

impl ToggleControl {
    pub fn new(
        target: WidgetRef,
        widget: &Widget,
    ) -> Self {
        let value = match &widget.value {
            Value::Bool(b) => *b,
            Value::String(s) => s == "true",
            Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
            _ => false,
        };
        Self {
            target,
            value,
        }
    }

    pub fn set(
        &mut self,
        graph: &dyn GraphView,
        value: bool,
    ) -> Result<()> {
        self.target.write(graph, Value::Bool(value))?;
        self.value = value;
        self.target.notify(graph)
    }

    pub fn toggle(
        &mut self,
        graph: &dyn GraphView,
    ) -> Result<bool> {
        let next = !self.value;
        self.set(graph, next)?;
        Ok(next)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ButtonControl {
    pub target: WidgetRef,
    pub label: String,
}

impl ButtonControl {
    pub fn new(
        target: WidgetRef,
        widget: &Widget,
    ) -> Self {
        let label = match &widget.value {
            Value::String(s) if !s.is_empty() => s.clone(),
            _ => widget.name.clone(),
        };
        Self {
            target,
            label,
        }
    }

    pub fn press(
        &self,
        graph: &dyn GraphView,
    ) -> Result<()> {
        self.target.notify(graph)
    }
}

/// Range input with a live readout.
#[derive(Debug, Clone, Serialize)]
pub struct SliderControl {
    pub target: WidgetRef,
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub readout: String,
    dragging: bool,
}

impl SliderControl {
    pub fn new(
        target: WidgetRef,
        widget: &Widget,
    ) -> Self {
        let min = widget.options.min.unwrap_or(0.0);
        let max = widget.options.max.unwrap_or(100.0).max(min);
        let value = widget.value.as_f64().unwrap_or(min).clamp(min, max);
        Self {
            target,
            value,
            min,
            max,
            step: widget.options.step.filter(|s| *s > 0.0).unwrap_or(1.0),
            readout: value.to_string(),
            dragging: false,
        }
    }

    /// Value and readout follow the drag; the callback waits for release.
    pub fn drag(
        &mut self,
        graph: &dyn GraphView,
        value: f64,
    ) -> Result<f64> {
        let v = value.clamp(self.min, self.max);
        self.target.write(graph, Value::from(v))?;
        self.value = v;
        self.readout = v.to_string();
        self.dragging = true;
        Ok(v)
    }

    pub fn release(
        &mut self,
        graph: &dyn GraphView,
    ) -> Result<()> {
        if !self.dragging {
            return Ok(());
        }
        self.dragging = false;
        self.target.notify(graph)
    }
}

/// Seed input with randomize and restore-last.
#[derive(Debug, Clone, Serialize)]
pub struct SeedControl {
    pub target: WidgetRef,
    pub value: u64,
    pub min: u64,
    pub max: u64,
    /// value held before the latest randomize or edit
    pub last: Option<u64>,
}

impl SeedControl {
    pub fn new(
        target: WidgetRef,
        widget: &Widget,
    ) -> Self {
        let min = widget.options.min.filter(|m| *m > 0.0).map(|m| m as u64).unwrap_or(0);
        let max = widget.options.max.filter(|m| *m >= min as f64).map(|m| m as u64).unwrap_or(u64::MAX);
        let value = match &widget.value {
            Value::Number(n) => n.as_u64().or_else(|| n.as_f64().filter(|f| *f > 0.0).map(|f| f as u64)).unwrap_or(0),
            Value::String(s) => s.trim().parse().unwrap_or(0),
            _ => 0,
        };
        Self {
            target,
            value,
            min,
            max,
            last: None,
        }
    }

    fn store(
        &mut self,
        graph: &dyn GraphView,
        value: u64,
    ) -> Result<u64> {
        self.target.write(graph, Value::from(value))?;
        self.last = Some(self.value);
        self.value = value;
        self.target.notify(graph)?;
        Ok(value)
    }

    /// Draw a new seed uniformly from `[min, max]`.
    pub fn randomize<R: Rng>(
        &mut self,
        graph: &dyn GraphView,
        rng: &mut R,
    ) -> Result<u64> {
        let next = rng.random_range(self.min..=self.max);
        self.store(graph, next)
    }

    pub fn edit(
        &mut self,
        graph: &dyn GraphView,
        value: u64,
    ) -> Result<u64> {
        self.store(graph, value.clamp(self.min, self.max))
    }

    /// Swap back to the previous value. Restoring twice returns to where it started.
    pub fn restore(
        &mut self,
        graph: &dyn GraphView,
    ) -> Result<Option<u64>> {
        let Some(previous) = self.last else {
            return Ok(None);
        };
        self.store(graph, previous).map(Some)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum UploadState {
    Idle,
    Uploading,
    Failed(String),
}

/// Image or video picker backed by the host upload endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct UploadControl {
    pub target: WidgetRef,
    pub kind: MediaKind,
    pub value: Option<String>,
    pub preview_url: Option<String>,
    /// camera capture is offered for images only
    pub camera: bool,
    pub state: UploadState,
    #[serde(skip)]
    view: ViewEndpoint,
}

impl UploadControl {
    pub fn new(
        target: WidgetRef,
        widget: &Widget,
        kind: MediaKind,
        view: ViewEndpoint,
    ) -> Self {
        let value = Some(value_to_string(&widget.value)).filter(|v| !v.trim().is_empty());
        let mut control = Self {
            target,
            kind,
            value: None,
            preview_url: None,
            camera: kind == MediaKind::Image,
            state: UploadState::Idle,
            view,
        };
        control.show(value);
        control
    }

    fn show(
        &mut self,
        value: Option<String>,
    ) {
        self.preview_url = value.as_deref().and_then(|v| media_from_value(v, "input")).map(|m| self.view.url(&m));
        self.value = value;
    }

    /// Upload `file` and point the widget at it.
    ///
    /// On failure the state becomes [`UploadState::Failed`] and the previous
    /// value and preview stay as they were.
    pub async fn upload(
        &mut self,
        graph: &dyn GraphView,
        uploader: &dyn MediaUploader,
        file: UploadFile,
    ) -> Result<String> {
        if file.source == UploadSource::Camera && !self.camera {
            return Err(FormError::Upload(format!("camera capture is not available for {}", self.kind.as_ref())));
        }

        self.state = UploadState::Uploading;
        let response = match uploader.upload(file).await {
            Ok(response) => response,
            Err(e) => {
                debug!("upload for {} failed: {}", self.target.widget, e);
                self.state = UploadState::Failed(e.to_string());
                return Err(e);
            }
        };

        let name = response.canonical_name();
        if let Err(e) = self.target.write(graph, Value::String(name.clone())) {
            self.state = UploadState::Failed(e.to_string());
            return Err(e);
        }
        self.show(Some(name.clone()));
        self.state = UploadState::Idle;
        self.target.notify(graph)?;
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use rand::{SeedableRng, rngs::StdRng};
    use serde_json::json;

    use super::*;
    use crate::{
        config::UploadConfig,
        graph::{GraphNode, MemGraph, WidgetOptions},
        upload::UploadResponse,
    };

    fn graph_with(widget: Widget) -> (MemGraph, Arc<AtomicUsize>) {
        let graph = MemGraph::new();
        let name = widget.name.clone();
        graph.add_node(GraphNode::new(1, "Test").with_widget(widget));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        graph
            .chain_callback(
                1,
                &name,
                Arc::new(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        (graph, calls)
    }

    fn target(name: &str) -> WidgetRef {
        WidgetRef::new(1, name)
    }

    #[test]
    fn test_number_clamps_on_commit_only() {
        let widget = Widget::new("cfg", "float", 7.5).with_options(WidgetOptions {
            min: Some(1.0),
            max: Some(10.0),
            precision: Some(2),
            ..Default::default()
        });
        let (graph, calls) = graph_with(widget.clone());
        let mut control = NumberControl::new(target("cfg"), &widget, false);
        assert_eq!(control.display, "7.50");
        assert_eq!(control.step, 0.1);

        control.type_text("25");
        assert_eq!(graph.widget_value(1, "cfg"), Some(json!(7.5)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert_eq!(control.commit_display(&graph).unwrap(), 10.0);
        assert_eq!(control.display, "10.00");
        assert_eq!(graph.widget_value(1, "cfg"), Some(json!(10.0)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_int_step_and_rejected_text() {
        let widget = Widget::new("steps", "int", 20);
        let (graph, calls) = graph_with(widget.clone());
        let mut control = NumberControl::new(target("steps"), &widget, true);
        assert_eq!(control.step, 1.0);
        assert_eq!(control.display, "20");

        assert_eq!(control.increment(&graph).unwrap(), 21.0);
        assert_eq!(graph.widget_value(1, "steps"), Some(json!(21)));

        control.type_text("abc");
        assert!(control.commit_display(&graph).is_err());
        assert_eq!(control.display, "21");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_combo_filter_keeps_value() {
        let values: Vec<Value> = (0..12).map(|i| json!(format!("model_{}", i))).collect();
        let widget = Widget::new("ckpt", "combo", "model_0").with_options(WidgetOptions {
            values: Some(values),
            ..Default::default()
        });
        let (graph, calls) = graph_with(widget.clone());
        let mut control = ComboControl::new(target("ckpt"), &widget, 10);
        assert!(control.has_filter());

        control.filter("_1");
        assert_eq!(control.visible_options(), vec!["model_1", "model_10", "model_11"]);
        assert_eq!(graph.widget_value(1, "ckpt"), Some(json!("model_0")));

        control.select(&graph, "model_11").unwrap();
        assert_eq!(graph.widget_value(1, "ckpt"), Some(json!("model_11")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(control.select(&graph, "missing").is_err());
    }

    #[test]
    fn test_short_combo_has_no_filter() {
        let widget = Widget::new("mode", "combo", "a").with_options(WidgetOptions {
            values: Some(vec![json!("a"), json!("b")]),
            ..Default::default()
        });
        let mut control = ComboControl::new(target("mode"), &widget, 10);
        assert!(!control.has_filter());
        control.filter("zzz");
        assert_eq!(control.visible_options(), vec!["a", "b"]);
    }

    #[test]
    fn test_text_syncs_value_but_defers_callback() {
        let widget = Widget::new("prompt", "string", "").with_options(WidgetOptions {
            max_length: Some(5),
            ..Default::default()
        });
        let (graph, calls) = graph_with(widget.clone());
        let mut control = TextControl::new(target("prompt"), &widget, false);

        control.input(&graph, "a ca").unwrap();
        control.input(&graph, "a cat sat").unwrap();
        assert_eq!(graph.widget_value(1, "prompt"), Some(json!("a cat")));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        control.commit(&graph).unwrap();
        control.commit(&graph).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_toggle_notifies_immediately() {
        let widget = Widget::new("enabled", "toggle", false);
        let (graph, calls) = graph_with(widget.clone());
        let mut control = ToggleControl::new(target("enabled"), &widget);
        assert!(control.toggle(&graph).unwrap());
        assert_eq!(graph.widget_value(1, "enabled"), Some(json!(true)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_slider_callback_on_release() {
        let widget = Widget::new("denoise", "slider", 0.5).with_options(WidgetOptions {
            min: Some(0.0),
            max: Some(1.0),
            ..Default::default()
        });
        let (graph, calls) = graph_with(widget.clone());
        let mut control = SliderControl::new(target("denoise"), &widget);

        control.drag(&graph, 0.7).unwrap();
        control.drag(&graph, 1.4).unwrap();
        assert_eq!(control.readout, "1");
        assert_eq!(graph.widget_value(1, "denoise"), Some(json!(1.0)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        control.release(&graph).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_seed_randomize_and_restore() {
        let widget = Widget::new("seed", "seed", 42).with_options(WidgetOptions {
            min: Some(10.0),
            max: Some(20.0),
            ..Default::default()
        });
        let (graph, calls) = graph_with(widget.clone());
        let mut control = SeedControl::new(target("seed"), &widget);
        let mut rng = StdRng::seed_from_u64(7);

        let drawn = control.randomize(&graph, &mut rng).unwrap();
        assert!((10..=20).contains(&drawn));
        assert_eq!(control.last, Some(42));
        assert_eq!(graph.widget_value(1, "seed"), Some(json!(drawn)));

        assert_eq!(control.restore(&graph).unwrap(), Some(42));
        assert_eq!(graph.widget_value(1, "seed"), Some(json!(42)));
        assert_eq!(control.restore(&graph).unwrap(), Some(drawn));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_seed_defaults_to_full_u64_range() {
        let widget = Widget::new("seed", "seed", json!(u64::MAX));
        let control = SeedControl::new(target("seed"), &widget);
        assert_eq!(control.min, 0);
        assert_eq!(control.max, u64::MAX);
        assert_eq!(control.value, u64::MAX);
    }

    #[test]
    fn test_seed_restore_without_history() {
        let widget = Widget::new("seed", "seed", 1);
        let (graph, calls) = graph_with(widget.clone());
        let mut control = SeedControl::new(target("seed"), &widget);
        assert_eq!(control.restore(&graph).unwrap(), None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    struct FakeUploader {
        result: Mutex<Option<Result<UploadResponse>>>,
    }

    #[async_trait]
    impl MediaUploader for FakeUploader {
        async fn upload(
            &self,
            _file: UploadFile,
        ) -> Result<UploadResponse> {
            self.result.lock().unwrap().take().unwrap()
        }
    }

    fn view() -> ViewEndpoint {
        ViewEndpoint::new(&UploadConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_upload_success_updates_value() {
        let widget = Widget::new("image", "image-upload", "old.png");
        let (graph, calls) = graph_with(widget.clone());
        let mut control = UploadControl::new(target("image"), &widget, MediaKind::Image, view());
        let uploader = FakeUploader {
            result: Mutex::new(Some(Ok(UploadResponse {
                name: "new.png".into(),
                subfolder: "clipspace".into(),
                folder_type: "input".into(),
            }))),
        };

        let name = control.upload(&graph, &uploader, UploadFile::new("new.png", vec![1, 2, 3])).await.unwrap();
        assert_eq!(name, "clipspace/new.png");
        assert_eq!(graph.widget_value(1, "image"), Some(json!("clipspace/new.png")));
        assert_eq!(control.state, UploadState::Idle);
        assert!(control.preview_url.as_ref().unwrap().contains("subfolder=clipspace"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_upload_failure_keeps_previous_value() {
        let widget = Widget::new("image", "image-upload", "old.png");
        let (graph, calls) = graph_with(widget.clone());
        let mut control = UploadControl::new(target("image"), &widget, MediaKind::Image, view());
        let before = control.preview_url.clone();
        let uploader = FakeUploader {
            result: Mutex::new(Some(Err(FormError::Upload("502".into())))),
        };

        assert!(control.upload(&graph, &uploader, UploadFile::new("x.png", vec![])).await.is_err());
        assert_eq!(control.state, UploadState::Failed("502".into()));
        assert_eq!(control.value.as_deref(), Some("old.png"));
        assert_eq!(control.preview_url, before);
        assert_eq!(graph.widget_value(1, "image"), Some(json!("old.png")));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_video_upload_rejects_camera() {
        let widget = Widget::new("video", "video-upload", "");
        let (graph, _) = graph_with(widget.clone());
        let mut control = UploadControl::new(target("video"), &widget, MediaKind::Video, view());
        assert!(!control.camera);
        let uploader = FakeUploader {
            result: Mutex::new(None),
        };
        let file = UploadFile::new("clip.mp4", vec![]).with_source(UploadSource::Camera);
        assert!(control.upload(&graph, &uploader, file).await.is_err());
        assert_eq!(control.state, UploadState::Idle);
    }
}
