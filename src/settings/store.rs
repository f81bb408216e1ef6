use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{
    common::MemCache,
    config::SettingsConfig,
    graph::{GraphView, NodeId},
};

use super::{CacheRepository, EmbeddedRepository, MigratingRepository, ORDER_KEY, SettingsRepository, WidgetSettings};

/// Typed access to per-node settings and the saved display order.
///
/// Storage is best-effort: reads never fail and write failures are logged.
pub struct SettingsStore {
    repo: MigratingRepository,
}

impl SettingsStore {
    pub fn new(
        graph: Arc<dyn GraphView>,
        config: &SettingsConfig,
    ) -> Self {
        let cache = CacheRepository::new(Arc::new(MemCache::new(config.cache_capacity)), config.cache_key.clone());
        let embedded = EmbeddedRepository::new(graph, config.sentinel_type.clone(), config.sentinel_widget.clone());
        Self::with_repositories(Box::new(embedded), Box::new(cache))
    }

    pub fn with_repositories(
        primary: Box<dyn SettingsRepository>,
        fallback: Box<dyn SettingsRepository>,
    ) -> Self {
        Self {
            repo: MigratingRepository::new(primary, fallback),
        }
    }

    pub fn repository(&self) -> &MigratingRepository {
        &self.repo
    }

    /// Defaults, overlaid with the cached entry, overlaid with the embedded entry.
    pub fn get_settings(
        &self,
        id: NodeId,
    ) -> WidgetSettings {
        match self.repo.entry(&id.to_string()) {
            Some(Value::Object(entry)) => overlay_defaults(id, entry),
            Some(_) => {
                debug!("settings for node {} are not an object, using defaults", id);
                WidgetSettings::default()
            }
            None => WidgetSettings::default(),
        }
    }

    pub fn save_settings(
        &self,
        id: NodeId,
        settings: &WidgetSettings,
    ) {
        let value = match serde_json::to_value(settings) {
            Ok(v) => v,
            Err(e) => {
                warn!("failed to serialize settings for node {}: {}", id, e);
                return;
            }
        };
        if let Err(e) = self.repo.write_entry(&id.to_string(), value) {
            warn!("failed to save settings for node {}: {}", id, e);
        }
    }

    /// Read, mutate and persist one node's settings.
    pub fn update_settings<F>(
        &self,
        id: NodeId,
        f: F,
    ) -> WidgetSettings
    where
        F: FnOnce(&mut WidgetSettings),
    {
        let mut settings = self.get_settings(id);
        f(&mut settings);
        self.save_settings(id, &settings);
        settings
    }

    pub fn get_order(&self) -> Vec<NodeId> {
        match self.repo.entry(ORDER_KEY) {
            Some(Value::Array(ids)) => ids.iter().filter_map(Value::as_i64).collect(),
            _ => Vec::new(),
        }
    }

    pub fn save_order(
        &self,
        ids: &[NodeId],
    ) {
        if let Err(e) = self.repo.write_entry(ORDER_KEY, Value::from(ids.to_vec())) {
            warn!("failed to save node order: {}", e);
        }
    }

    /// Seed the graph-embedded payload from the transient cache.
    pub fn migrate(&self) -> bool {
        self.repo.migrate().unwrap_or_else(|e| {
            warn!("settings migration failed: {}", e);
            false
        })
    }

    pub fn is_widget_hidden(
        &self,
        id: NodeId,
        widget: &str,
    ) -> bool {
        self.get_settings(id).is_widget_hidden(widget)
    }

    pub fn set_widget_hidden(
        &self,
        id: NodeId,
        widget: &str,
        hidden: bool,
    ) {
        self.update_settings(id, |s| {
            if hidden {
                s.hidden_widgets.insert(widget.to_string());
            } else {
                s.hidden_widgets.remove(widget);
            }
        });
    }
}

/// Overlay `entry` onto the defaults one key at a time, dropping keys that do not parse.
fn overlay_defaults(
    id: NodeId,
    entry: Map<String, Value>,
) -> WidgetSettings {
    let mut merged = match serde_json::to_value(WidgetSettings::default()) {
        Ok(Value::Object(m)) => m,
        _ => return WidgetSettings::default(),
    };

    for (key, value) in entry {
        let mut candidate = merged.clone();
        candidate.insert(key.clone(), value);
        match serde_json::from_value::<WidgetSettings>(Value::Object(candidate.clone())) {
            Ok(_) => merged = candidate,
            Err(e) => debug!("dropping invalid setting '{}' of node {}: {}", key, id, e),
        }
    }

    serde_json::from_value(Value::Object(merged)).unwrap_or_default()
}
