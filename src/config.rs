use std::{fs, path::Path};

use serde::Deserialize;

use crate::Result;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// group matching and spatial clustering
    pub layout: LayoutConfig,
    /// persisted settings location
    pub settings: SettingsConfig,
    /// control rendering
    pub render: RenderConfig,
    /// host http endpoints
    pub upload: UploadConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// case-insensitive pattern naming the form group
    pub form_pattern: String,
    /// case-insensitive pattern naming the preferred output group
    pub mobile_outputs_pattern: String,
    /// case-insensitive fallback pattern naming the output group
    pub outputs_pattern: String,
    /// vertical gap in canvas units that starts a new row
    pub row_gap: f64,
    /// sub-groups whose top edges differ by less than this share a row
    pub group_row_tolerance: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// node type holding the embedded payload
    pub sentinel_type: String,
    /// widget on the sentinel node holding the payload
    pub sentinel_widget: String,
    /// key of the payload in the transient cache
    pub cache_key: String,
    /// transient cache capacity
    pub cache_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// combos with more options than this get an inline filter
    pub combo_filter_threshold: usize,
    /// widget names with this prefix are skipped by the default node path
    pub internal_widget_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// host base url
    pub base_url: String,
    /// multipart upload endpoint
    pub image_endpoint: String,
    /// file serving endpoint
    pub view_endpoint: String,
    /// request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            form_pattern: r"mobile[\s_-]*(form|ui|inputs?)".to_string(),
            mobile_outputs_pattern: r"mobile[\s_-]*outputs?".to_string(),
            outputs_pattern: r"\boutputs?\b".to_string(),
            row_gap: 30.0,
            group_row_tolerance: 50.0,
        }
    }
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            sentinel_type: "MobileFormSettings".to_string(),
            sentinel_widget: "settings_json".to_string(),
            cache_key: "mobile-form.widget-settings".to_string(),
            cache_capacity: 64,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            combo_filter_threshold: 10,
            internal_widget_prefix: "$$".to_string(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8188".to_string(),
            image_endpoint: "/upload/image".to_string(),
            view_endpoint: "/view".to_string(),
            timeout_ms: 30_000,
        }
    }
}

impl Config {
    pub fn create<T: AsRef<Path>>(path: T) -> Result<Self> {
        let data = fs::read_to_string(path.as_ref())?;

        Self::load_from_str(data.as_str())
    }

    pub fn load_from_str(toml_str: &str) -> Result<Self> {
        let config = toml::from_str::<Config>(toml_str)?;
        Ok(config)
    }
}
