//! Persistent settings store and the request-scoped layered resolver.
//!
//! This module provides:
//! - `setting`: the dotted-path keys the add-on reads and writes
//! - `SettingsStore`: the persistent base store contract supplied by the host
//! - `MemorySettings`: an in-process store over a JSON value tree
//! - `SettingsResolver`: request-scoped override lookup layered over the base
//! - `defaults()`: the settings tree installed on first startup
//!
//! The resolver walks dotted paths iteratively and falls back to the base
//! store whenever any segment is absent on the override side; it introduces
//! no error kind of its own. The override map is an owned per-run value
//! passed in at construction, so overrides can never leak between
//! concurrent requests.

use crate::errors::SettingsError;
use serde_json::{Map, Value, json};
use std::sync::{Arc, Mutex};

/// Dotted-path keys for every setting the add-on recognizes.
pub mod setting {
    /// Comma-separated file extensions eligible for transfer
    pub const ACCEPT_EXTENSIONS: &str = "accept_extensions";
    /// Transport command timeout in milliseconds
    pub const COMM_TIMEOUT: &str = "comm_timeout_ms";
    /// Whether the printer announced the binary transfer capability
    pub const HAS_CAPABILITY: &str = "has_capability";
    /// Cleanup policy for the uploaded local file
    pub const DELETE_UPLOAD: &str = "delete_upload";
    /// The durable current phase of the transfer lifecycle
    pub const PHASE: &str = "phase";
    /// Gcode lines dispatched after a successful transfer
    pub const POST_TRANSFER_GCODE: &str = "post_transfer_gcode";
    pub const POST_TRANSFER_GCODE_ENABLE: &str = "post_transfer_gcode_enable";
    /// Whether to re-establish the printer connection after success
    pub const RECONNECT: &str = "reconnect";
    /// Storage location for uploaded files
    pub const UPLOAD_FOLDER: &str = "upload_folder";
    pub const WAIT_AFTER_CONNECT: &str = "wait_after_connect_ms";
    pub const WAIT_BEFORE_RECONNECT: &str = "wait_before_reconnect_ms";
}

/// The settings tree installed when the add-on first starts up.
pub fn defaults() -> Value {
    json!({
        "accept_extensions": "bin,cur",
        "comm_timeout_ms": 1000,
        "has_capability": false,
        "delete_upload": "Never",
        "phase": "Inactive",
        "post_transfer_gcode": ["M997"],
        "post_transfer_gcode_enable": false,
        "reconnect": true,
        "upload_folder": "marlinbft",
        "wait_after_connect_ms": 0,
        "wait_before_reconnect_ms": 0,
    })
}

/// Walk a dotted path through a JSON value tree.
fn walk<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut node = root;
    for segment in path.split('.') {
        node = node.as_object()?.get(segment)?;
    }
    Some(node)
}

fn as_i64(value: &Value, path: &str) -> Result<i64, SettingsError> {
    value.as_i64().ok_or_else(|| SettingsError::WrongType {
        path: path.to_string(),
        expected: "number",
    })
}

fn as_bool(value: &Value, path: &str) -> Result<bool, SettingsError> {
    value.as_bool().ok_or_else(|| SettingsError::WrongType {
        path: path.to_string(),
        expected: "boolean",
    })
}

fn as_string(value: &Value, path: &str) -> Result<String, SettingsError> {
    value
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| SettingsError::WrongType {
            path: path.to_string(),
            expected: "string",
        })
}

fn as_string_list(value: &Value, path: &str) -> Result<Vec<String>, SettingsError> {
    let items = value.as_array().ok_or_else(|| SettingsError::WrongType {
        path: path.to_string(),
        expected: "string list",
    })?;
    items
        .iter()
        .map(|item| as_string(item, path))
        .collect()
}

/// Persistent base settings store supplied by the host application.
/// Real implementation: the host's settings backend. In-process
/// implementation: `MemorySettings`.
pub trait SettingsStore: Send + Sync {
    /// Look up the value at a dotted path. Fails with
    /// `SettingsError::MissingKey` when the path is absent.
    fn get(&self, path: &str) -> Result<Value, SettingsError>;

    /// Write the value at a dotted path, creating intermediate objects.
    fn set(&self, path: &str, value: Value) -> Result<(), SettingsError>;

    fn get_int(&self, path: &str) -> Result<i64, SettingsError> {
        as_i64(&self.get(path)?, path)
    }

    fn get_bool(&self, path: &str) -> Result<bool, SettingsError> {
        as_bool(&self.get(path)?, path)
    }

    fn get_str(&self, path: &str) -> Result<String, SettingsError> {
        as_string(&self.get(path)?, path)
    }
}

/// In-process settings store over a JSON value tree.
pub struct MemorySettings {
    root: Mutex<Value>,
}

impl MemorySettings {
    pub fn new(root: Value) -> Self {
        Self {
            root: Mutex::new(root),
        }
    }

    /// A store pre-populated with the add-on defaults.
    pub fn with_defaults() -> Self {
        Self::new(defaults())
    }
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, path: &str) -> Result<Value, SettingsError> {
        let root = self.root.lock().expect("settings tree poisoned");
        walk(&root, path)
            .cloned()
            .ok_or_else(|| SettingsError::MissingKey {
                path: path.to_string(),
            })
    }

    fn set(&self, path: &str, value: Value) -> Result<(), SettingsError> {
        let mut root = self.root.lock().expect("settings tree poisoned");
        let mut node = &mut *root;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            let map = match node {
                Value::Object(map) => map,
                _ => {
                    return Err(SettingsError::WrongType {
                        path: path.to_string(),
                        expected: "object",
                    });
                }
            };
            if segments.peek().is_none() {
                map.insert(segment.to_string(), value);
                return Ok(());
            }
            node = map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        Ok(())
    }
}

/// Request-scoped layered settings lookup.
///
/// `get` consults the owned override map first, walking nested levels of
/// the dotted path; if any segment is absent it falls back to the base
/// store for the same path. Reads are pure; the override map is installed
/// once at construction and never mutated afterwards.
pub struct SettingsResolver {
    base: Arc<dyn SettingsStore>,
    overrides: Value,
}

impl SettingsResolver {
    /// Build a resolver for one request. `overrides` is owned by this
    /// resolver for the lifetime of the run that carries it.
    pub fn new(base: Arc<dyn SettingsStore>, overrides: Map<String, Value>) -> Self {
        Self {
            base,
            overrides: Value::Object(overrides),
        }
    }

    /// A resolver with no request overrides.
    pub fn without_overrides(base: Arc<dyn SettingsStore>) -> Self {
        Self::new(base, Map::new())
    }

    pub fn get(&self, path: &str) -> Result<Value, SettingsError> {
        match walk(&self.overrides, path) {
            Some(value) => Ok(value.clone()),
            None => self.base.get(path),
        }
    }

    pub fn get_int(&self, path: &str) -> Result<i64, SettingsError> {
        as_i64(&self.get(path)?, path)
    }

    pub fn get_bool(&self, path: &str) -> Result<bool, SettingsError> {
        as_bool(&self.get(path)?, path)
    }

    pub fn get_str(&self, path: &str) -> Result<String, SettingsError> {
        as_string(&self.get(path)?, path)
    }

    pub fn get_str_list(&self, path: &str) -> Result<Vec<String>, SettingsError> {
        as_string_list(&self.get(path)?, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Arc<dyn SettingsStore> {
        Arc::new(MemorySettings::with_defaults())
    }

    #[test]
    fn test_memory_store_get_default() {
        let store = MemorySettings::with_defaults();
        assert_eq!(store.get_int(setting::COMM_TIMEOUT).unwrap(), 1000);
        assert_eq!(store.get_str(setting::PHASE).unwrap(), "Inactive");
        assert!(!store.get_bool(setting::HAS_CAPABILITY).unwrap());
    }

    #[test]
    fn test_memory_store_missing_key() {
        let store = MemorySettings::with_defaults();
        let err = store.get("no_such_setting").unwrap_err();
        assert!(matches!(err, SettingsError::MissingKey { .. }));
    }

    #[test]
    fn test_memory_store_set_and_get_nested() {
        let store = MemorySettings::new(json!({}));
        store.set("dialog.show_progress", json!(true)).unwrap();
        assert!(store.get_bool("dialog.show_progress").unwrap());
        // Intermediate object was created
        assert!(store.get("dialog").unwrap().is_object());
    }

    #[test]
    fn test_memory_store_set_overwrites() {
        let store = MemorySettings::with_defaults();
        store.set(setting::PHASE, json!("Transfer")).unwrap();
        assert_eq!(store.get_str(setting::PHASE).unwrap(), "Transfer");
    }

    #[test]
    fn test_memory_store_wrong_type() {
        let store = MemorySettings::with_defaults();
        let err = store.get_int(setting::PHASE).unwrap_err();
        assert!(matches!(err, SettingsError::WrongType { .. }));
    }

    #[test]
    fn test_resolver_override_takes_precedence() {
        let mut overrides = Map::new();
        overrides.insert("comm_timeout_ms".to_string(), json!(500));
        let resolver = SettingsResolver::new(base(), overrides);
        assert_eq!(resolver.get_int(setting::COMM_TIMEOUT).unwrap(), 500);
    }

    #[test]
    fn test_resolver_falls_back_to_base() {
        let resolver = SettingsResolver::without_overrides(base());
        assert_eq!(resolver.get_int(setting::COMM_TIMEOUT).unwrap(), 1000);
    }

    #[test]
    fn test_resolver_partial_override_path_falls_back() {
        // Override holds an unrelated nested object; the queried path is
        // absent at the leaf level and must fall back to the base.
        let mut overrides = Map::new();
        overrides.insert("dialog".to_string(), json!({"show_progress": true}));
        let store = MemorySettings::with_defaults();
        store.set("dialog.auto_close", json!(false)).unwrap();
        let resolver = SettingsResolver::new(Arc::new(store), overrides);
        assert!(!resolver.get_bool("dialog.auto_close").unwrap());
        assert!(resolver.get_bool("dialog.show_progress").unwrap());
    }

    #[test]
    fn test_resolver_missing_everywhere_propagates_base_failure() {
        let resolver = SettingsResolver::without_overrides(base());
        let err = resolver.get("dialog.show_progress").unwrap_err();
        assert!(matches!(err, SettingsError::MissingKey { .. }));
    }

    #[test]
    fn test_resolver_str_list() {
        let resolver = SettingsResolver::without_overrides(base());
        assert_eq!(
            resolver.get_str_list(setting::POST_TRANSFER_GCODE).unwrap(),
            vec!["M997".to_string()]
        );
    }

    #[test]
    fn test_resolver_overrides_do_not_write_through() {
        let store: Arc<dyn SettingsStore> = Arc::new(MemorySettings::with_defaults());
        let mut overrides = Map::new();
        overrides.insert("comm_timeout_ms".to_string(), json!(500));
        let resolver = SettingsResolver::new(store.clone(), overrides);
        assert_eq!(resolver.get_int(setting::COMM_TIMEOUT).unwrap(), 500);
        // The base store never sees the override.
        assert_eq!(store.get_int(setting::COMM_TIMEOUT).unwrap(), 1000);
    }

    #[test]
    fn test_defaults_tree_is_complete() {
        let tree = defaults();
        for key in [
            setting::ACCEPT_EXTENSIONS,
            setting::COMM_TIMEOUT,
            setting::HAS_CAPABILITY,
            setting::DELETE_UPLOAD,
            setting::PHASE,
            setting::POST_TRANSFER_GCODE,
            setting::POST_TRANSFER_GCODE_ENABLE,
            setting::RECONNECT,
            setting::UPLOAD_FOLDER,
            setting::WAIT_AFTER_CONNECT,
            setting::WAIT_BEFORE_RECONNECT,
        ] {
            assert!(walk(&tree, key).is_some(), "missing default for {key}");
        }
    }
}
