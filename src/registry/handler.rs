use std::sync::Arc;

use serde_json::Value;

use crate::{
    Result,
    gallery::MediaItem,
    render::{NodeContext, WidgetContext},
};

/// Renders a whole node into its context.
pub trait NodeHandler: Send + Sync {
    /// Returns whether anything visible was rendered.
    fn render(
        &self,
        ctx: &mut NodeContext,
    ) -> Result<bool>;
}

/// Renders one widget into its context.
pub trait WidgetHandler: Send + Sync {
    /// Returns whether anything visible was rendered. `false` lets the
    /// built-in widget resolution take over.
    fn render(
        &self,
        ctx: &mut WidgetContext,
    ) -> Result<bool>;
}

/// Turns an execution result of an output node into displayable media.
pub trait OutputHandler: Send + Sync {
    fn classify(
        &self,
        node_type: &str,
        output: &Value,
    ) -> Result<Vec<MediaItem>>;
}

/// Adapts a closure to any of the handler traits.
pub struct FnHandler<F>(F);

impl<F> NodeHandler for FnHandler<F>
where
    F: Fn(&mut NodeContext) -> Result<bool> + Send + Sync,
{
    fn render(
        &self,
        ctx: &mut NodeContext,
    ) -> Result<bool> {
        (self.0)(ctx)
    }
}

impl<F> WidgetHandler for FnHandler<F>
where
    F: Fn(&mut WidgetContext) -> Result<bool> + Send + Sync,
{
    fn render(
        &self,
        ctx: &mut WidgetContext,
    ) -> Result<bool> {
        (self.0)(ctx)
    }
}

impl<F> OutputHandler for FnHandler<F>
where
    F: Fn(&str, &Value) -> Result<Vec<MediaItem>> + Send + Sync,
{
    fn classify(
        &self,
        node_type: &str,
        output: &Value,
    ) -> Result<Vec<MediaItem>> {
        (self.0)(node_type, output)
    }
}

pub fn node_handler<F>(f: F) -> Arc<dyn NodeHandler>
where
    F: Fn(&mut NodeContext) -> Result<bool> + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

pub fn widget_handler<F>(f: F) -> Arc<dyn WidgetHandler>
where
    F: Fn(&mut WidgetContext) -> Result<bool> + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

pub fn output_handler<F>(f: F) -> Arc<dyn OutputHandler>
where
    F: Fn(&str, &Value) -> Result<Vec<MediaItem>> + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}
