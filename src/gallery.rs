//! Classification of execution results into displayable media.
//!
//! The host reports what a node produced as `{"images": [...], "gifs": [...], ...}`
//! where every entry is a `{filename, subfolder, type}` reference.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::graph::MediaRef;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    Gif,
    Audio,
}

impl MediaKind {
    /// Guess the kind from a file extension.
    pub fn from_filename(filename: &str) -> Option<MediaKind> {
        let ext = Path::new(filename).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "png" | "jpg" | "jpeg" | "bmp" | "tif" | "tiff" => Some(MediaKind::Image),
            "gif" | "webp" | "apng" => Some(MediaKind::Gif),
            "mp4" | "webm" | "mov" | "mkv" | "avi" => Some(MediaKind::Video),
            "mp3" | "wav" | "flac" | "ogg" | "m4a" | "opus" => Some(MediaKind::Audio),
            _ => None,
        }
    }

    /// Kind implied by the output key the host used.
    fn from_output_key(key: &str) -> Option<MediaKind> {
        match key {
            "images" => Some(MediaKind::Image),
            "gifs" | "animated" => Some(MediaKind::Gif),
            "video" | "videos" => Some(MediaKind::Video),
            "audio" => Some(MediaKind::Audio),
            _ => None,
        }
    }
}

/// One displayable execution result.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    pub kind: MediaKind,
    pub media: MediaRef,
}

impl MediaItem {
    pub fn new(
        kind: MediaKind,
        media: MediaRef,
    ) -> Self {
        Self {
            kind,
            media,
        }
    }
}

/// Classify a node's execution output.
///
/// The file extension wins over the output key, so an mp4 reported under
/// `gifs` is a video. Entries that do not parse are skipped.
pub fn classify_output(output: &Value) -> Vec<MediaItem> {
    let Some(map) = output.as_object() else {
        return Vec::new();
    };

    let mut items = Vec::new();
    for (key, entries) in map {
        let Some(key_kind) = MediaKind::from_output_key(key) else {
            continue;
        };
        let Some(entries) = entries.as_array() else {
            continue;
        };
        for entry in entries {
            match serde_json::from_value::<MediaRef>(entry.clone()) {
                Ok(media) => {
                    let kind = match (key_kind, MediaKind::from_filename(&media.filename)) {
                        (MediaKind::Image, Some(MediaKind::Gif)) => MediaKind::Image,
                        (_, Some(kind)) => kind,
                        (kind, None) => kind,
                    };
                    items.push(MediaItem::new(kind, media));
                }
                Err(e) => debug!("skipping unreadable {} entry: {}", key, e),
            }
        }
    }
    items
}
