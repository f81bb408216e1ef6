//! Per-node layout settings.
//!
//! Settings live in two places:
//! - `CacheRepository`: a transient in-memory cache, used before the graph has a settings node
//! - `EmbeddedRepository`: a JSON payload stored on a sentinel node, saved with the graph itself
//!
//! `MigratingRepository` layers the two and copies the cache into the graph once.
//! `SettingsStore` is the typed entry point used by the renderers.

mod cache;
mod embedded;
mod migrate;
mod store;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Result;

pub use cache::CacheRepository;
pub use embedded::EmbeddedRepository;
pub use migrate::MigratingRepository;
pub use store::SettingsStore;

/// Reserved payload key holding the saved display order.
pub const ORDER_KEY: &str = "_order";

/// The whole persisted payload: node id string -> settings object, plus [`ORDER_KEY`].
pub type Payload = Map<String, Value>;

/// A backing store for the settings payload.
pub trait SettingsRepository: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Whether the store can be read and written right now.
    fn is_available(&self) -> bool;

    /// Load the payload. Missing or corrupt data yields `None`.
    fn load(&self) -> Option<Payload>;

    /// Replace the payload.
    fn store(
        &self,
        payload: &Payload,
    ) -> Result<()>;
}

/// Column span of a node in the four-column grid.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
pub enum ColumnSpan {
    #[default]
    #[serde(rename = "1")]
    #[strum(serialize = "1")]
    One,
    #[serde(rename = "2")]
    #[strum(serialize = "2")]
    Two,
    #[serde(rename = "3")]
    #[strum(serialize = "3")]
    Three,
    #[serde(rename = "4")]
    #[strum(serialize = "4")]
    Four,
}

impl ColumnSpan {
    pub fn columns(&self) -> u8 {
        match self {
            ColumnSpan::One => 1,
            ColumnSpan::Two => 2,
            ColumnSpan::Three => 3,
            ColumnSpan::Four => 4,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HeightMode {
    #[default]
    Auto,
    Compact,
    Medium,
    Tall,
}

/// Fixed color palette shared by nodes and sections.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum::AsRefStr, strum::EnumString, strum::EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Palette {
    #[default]
    Default,
    Red,
    Orange,
    Yellow,
    Green,
    Teal,
    Blue,
    Purple,
    Pink,
    Gray,
}

/// Layout settings of one node.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct WidgetSettings {
    pub width: ColumnSpan,
    pub height: HeightMode,
    pub color: Palette,
    /// force a new row before this node
    #[serde(rename = "break", with = "bool_string")]
    pub break_before: bool,
    /// overrides the node's default description
    pub tooltip: Option<String>,
    #[serde(rename = "hiddenWidgets")]
    pub hidden_widgets: BTreeSet<String>,
    /// keys written by newer versions, kept across a read-modify-write
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WidgetSettings {
    pub fn is_widget_hidden(
        &self,
        widget: &str,
    ) -> bool {
        self.hidden_widgets.contains(widget)
    }

    /// The tooltip override, ignoring blank strings.
    pub fn custom_tooltip(&self) -> Option<&str> {
        self.tooltip.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

/// `"true"` / `"false"` on the wire; plain booleans are accepted too.
mod bool_string {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(
        value: &bool,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if *value { "true" } else { "false" })
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Str(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Bool(b) => Ok(b),
            Raw::Str(s) => match s.as_str() {
                "true" => Ok(true),
                "false" | "" => Ok(false),
                other => Err(D::Error::custom(format!("invalid break flag '{}'", other))),
            },
        }
    }
}
