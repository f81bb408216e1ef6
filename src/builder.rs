use std::sync::Arc;

use tracing::warn;

use crate::{
    Config, MobileForm, Result,
    events::ExecutionMonitor,
    graph::GraphView,
    layout::LayoutDeriver,
    registry::ExtensionRegistry,
    render::{NodeRenderer, PreviewRegistry, WidgetRenderer},
    settings::SettingsStore,
    upload::{HttpUploader, MediaUploader, ViewEndpoint},
};

pub struct FormBuilder {
    config: Config,
    registry: Arc<ExtensionRegistry>,
    uploader: Option<Arc<dyn MediaUploader>>,
}

impl Default for FormBuilder {
    fn default() -> Self {
        Self {
            config: Config::default(),
            registry: Arc::new(ExtensionRegistry::new()),
            uploader: None,
        }
    }
}

impl FormBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(
        mut self,
        config: Config,
    ) -> Self {
        self.config = config;
        self
    }

    /// Use a registry shared with other forms.
    pub fn registry(
        mut self,
        registry: Arc<ExtensionRegistry>,
    ) -> Self {
        self.registry = registry;
        self
    }

    /// Register an extension initialized by [`FormBuilder::build`].
    pub fn extension<F>(
        self,
        name: impl Into<String>,
        init: F,
    ) -> Self
    where
        F: Fn(&ExtensionRegistry) -> Result<()> + Send + Sync + 'static,
    {
        self.registry.register_extension(name, init);
        self
    }

    /// Replace the HTTP uploader, e.g. with a fake in tests.
    pub fn uploader(
        mut self,
        uploader: Arc<dyn MediaUploader>,
    ) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn build(
        self,
        graph: Arc<dyn GraphView>,
    ) -> Result<MobileForm> {
        let report = self.registry.initialize_extensions();
        for (name, e) in &report.failed {
            warn!("form starts without extension '{}': {}", name, e);
        }

        let layout = LayoutDeriver::new(&self.config.layout)?;
        let view = ViewEndpoint::new(&self.config.upload)?;
        let uploader: Arc<dyn MediaUploader> = match self.uploader {
            Some(uploader) => uploader,
            None => Arc::new(HttpUploader::new(&self.config.upload)?),
        };

        let settings = Arc::new(SettingsStore::new(graph.clone(), &self.config.settings));
        let widgets = Arc::new(WidgetRenderer::new(self.registry.clone(), self.config.render.clone(), view.clone()));
        let previews = Arc::new(PreviewRegistry::new(view));
        let nodes = NodeRenderer::new(graph.clone(), self.registry.clone(), settings.clone(), widgets, previews, self.config.render.clone());
        let monitor = ExecutionMonitor::new(graph.clone(), self.registry.clone());

        Ok(MobileForm::new(graph, self.config, self.registry, settings, layout, nodes, monitor, uploader))
    }
}
