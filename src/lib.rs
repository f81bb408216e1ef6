//! # Mobile Form
//!
//! Synthesizes a sectioned, touch-friendly form from the live graph of a
//! node-graph editor. The host keeps owning its nodes, widgets and groups;
//! this crate reads them through [`GraphView`], lays them out and renders
//! each node into a value tree the embedding layer draws.
//!
//! ## Core Features
//!
//! - **Group-driven layout**: a group titled "Mobile Form" selects the nodes; nested groups become colored sections
//! - **Pluggable rendering**: node, widget and output handlers registered by extensions, with built-in fallbacks
//! - **Portable settings**: per-node layout settings embedded in the graph itself, seeded from a transient cache
//! - **Execution tracking**: progress, errors and output media from the host's event stream
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mobile_form::{FormBuilder, MemGraph};
//!
//! let graph = Arc::new(MemGraph::from_json(workflow_json)?);
//! let form = FormBuilder::new()
//!     .extension("video", |registry| {
//!         registry.register_output_node_type("SaveVideo");
//!         Ok(())
//!     })
//!     .build(graph)?;
//!
//! let rendered = form.render();
//! ```

mod builder;
mod common;
mod config;
mod error;
mod form;
mod utils;

pub mod events;
pub mod gallery;
pub mod graph;
pub mod layout;
pub mod registry;
pub mod render;
pub mod settings;
pub mod upload;

use std::sync::{Arc, RwLock};

pub use builder::FormBuilder;
pub use config::{Config, LayoutConfig, RenderConfig, SettingsConfig, UploadConfig};
pub use error::FormError;
pub use form::{MobileForm, RenderedForm, RenderedSection};
pub use graph::{GraphGroup, GraphNode, GraphView, MemGraph, Widget};
pub use registry::{ExtensionRegistry, NodeDefinition};

/// Result type alias for form operations.
pub type Result<T> = std::result::Result<T, FormError>;

/// Thread-safe shared lock wrapper using Arc<RwLock<T>>.
pub(crate) type ShareLock<T> = Arc<RwLock<T>>;
