//! Per-(host, scene) scratchpads.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;

type Key = (String, String);

/// Opaque key/value scratch space scenes use for their own per-frame state.
///
/// Entries persist across frames and survive driver swaps, but are cleared
/// on every scene entry; a switch always starts clean. Access for one host
/// is serialized by that host's scheduler, so a plain mutex map is enough.
#[derive(Default)]
pub struct StateStore {
    pads: Mutex<HashMap<Key, HashMap<String, Value>>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, host: &str, scene: &str, key: &str) -> Option<Value> {
        self.pads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(host.to_string(), scene.to_string()))
            .and_then(|pad| pad.get(key).cloned())
    }

    /// Lookup with caller-supplied default for absent keys.
    pub fn get_or(&self, host: &str, scene: &str, key: &str, default: Value) -> Value {
        self.get(host, scene, key).unwrap_or(default)
    }

    pub fn set(&self, host: &str, scene: &str, key: &str, value: Value) {
        self.pads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry((host.to_string(), scene.to_string()))
            .or_default()
            .insert(key.to_string(), value);
    }

    /// Scene-entry reset; runs before `init`.
    pub fn clear(&self, host: &str, scene: &str) {
        self.pads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&(host.to_string(), scene.to_string()));
    }

    /// Number of keys in one scratchpad (test hook).
    pub fn len(&self, host: &str, scene: &str) -> usize {
        self.pads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(host.to_string(), scene.to_string()))
            .map(|pad| pad.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pads_are_keyed_per_host_and_scene() {
        let store = StateStore::new();
        store.set("desk", "bounce", "x", json!(3));
        store.set("attic", "bounce", "x", json!(9));
        assert_eq!(store.get("desk", "bounce", "x"), Some(json!(3)));
        assert_eq!(store.get("attic", "bounce", "x"), Some(json!(9)));
        assert_eq!(store.get("desk", "fill", "x"), None);
    }

    #[test]
    fn default_applies_only_when_absent() {
        let store = StateStore::new();
        assert_eq!(store.get_or("desk", "fill", "n", json!(0)), json!(0));
        store.set("desk", "fill", "n", json!(5));
        assert_eq!(store.get_or("desk", "fill", "n", json!(0)), json!(5));
    }

    #[test]
    fn clear_empties_exactly_one_pad() {
        let store = StateStore::new();
        store.set("desk", "bounce", "x", json!(1));
        store.set("desk", "fill", "c", json!("red"));
        store.clear("desk", "bounce");
        assert_eq!(store.len("desk", "bounce"), 0);
        assert_eq!(store.len("desk", "fill"), 1);
    }
}
