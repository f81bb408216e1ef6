use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tracing::{debug, warn};

use crate::Result;

use super::{ORDER_KEY, Payload, SettingsRepository};

/// Layers a transient `fallback` store under a graph-embedded `primary` store.
///
/// Reads merge the fallback entry with the primary entry on top. Writes go to
/// both. The first time the primary becomes available its payload is seeded
/// from the fallback, unless it already carries node settings.
pub struct MigratingRepository {
    primary: Box<dyn SettingsRepository>,
    fallback: Box<dyn SettingsRepository>,
    migrated: AtomicBool,
}

impl MigratingRepository {
    pub fn new(
        primary: Box<dyn SettingsRepository>,
        fallback: Box<dyn SettingsRepository>,
    ) -> Self {
        Self {
            primary,
            fallback,
            migrated: AtomicBool::new(false),
        }
    }

    pub fn primary(&self) -> &dyn SettingsRepository {
        self.primary.as_ref()
    }

    pub fn fallback(&self) -> &dyn SettingsRepository {
        self.fallback.as_ref()
    }

    /// Copy every fallback entry into the primary payload.
    ///
    /// Returns `true` when the primary payload was written. A primary payload
    /// holding anything besides [`ORDER_KEY`] is never touched.
    pub fn migrate(&self) -> Result<bool> {
        if !self.primary.is_available() {
            return Ok(false);
        }
        self.migrated.store(true, Ordering::SeqCst);

        let mut target = self.primary.load().unwrap_or_default();
        if target.keys().any(|k| k != ORDER_KEY) {
            return Ok(false);
        }
        let Some(source) = self.fallback.load() else {
            return Ok(false);
        };

        let mut changed = false;
        for (key, value) in source {
            if !target.contains_key(&key) {
                target.insert(key, value);
                changed = true;
            }
        }
        if !changed {
            return Ok(false);
        }

        debug!("migrating {} settings entries from {} to {}", target.len(), self.fallback.name(), self.primary.name());
        self.primary.store(&target)?;
        Ok(true)
    }

    fn ensure_migrated(&self) {
        if self.migrated.load(Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.migrate() {
            warn!("settings migration failed: {}", e);
        }
    }

    /// Read one entry, merged across both stores.
    pub fn entry(
        &self,
        key: &str,
    ) -> Option<Value> {
        self.ensure_migrated();

        let cached = self.fallback.load().and_then(|mut p| p.remove(key));
        let embedded = if self.primary.is_available() {
            self.primary.load().and_then(|mut p| p.remove(key))
        } else {
            None
        };

        match (cached, embedded) {
            (None, None) => None,
            (Some(v), None) | (None, Some(v)) => Some(v),
            (Some(base), Some(top)) => Some(merge(base, top)),
        }
    }

    /// Write one entry to both stores, merging into whatever is there.
    pub fn write_entry(
        &self,
        key: &str,
        value: Value,
    ) -> Result<()> {
        self.ensure_migrated();

        write_into(self.fallback.as_ref(), key, value.clone())?;
        if self.primary.is_available() {
            write_into(self.primary.as_ref(), key, value)?;
        }
        Ok(())
    }
}

fn write_into(
    repo: &dyn SettingsRepository,
    key: &str,
    value: Value,
) -> Result<()> {
    let mut payload = repo.load().unwrap_or_default();
    let merged = match payload.remove(key) {
        Some(existing) => merge(existing, value),
        None => value,
    };
    payload.insert(key.to_string(), merged);
    repo.store(&payload)
}

/// Overlay `top` onto `base`. Objects merge key by key, anything else is replaced.
fn merge(
    base: Value,
    top: Value,
) -> Value {
    match (base, top) {
        (Value::Object(mut base), Value::Object(top)) => {
            for (k, v) in top {
                base.insert(k, v);
            }
            Value::Object(base)
        }
        (_, top) => top,
    }
}
