//! Key-value persistence behind the note store.
//!
//! The store only ever reads and writes whole values under one key, so a
//! backend needs nothing beyond `get` and `set`. Values travel as
//! [`serde_json::Value`] to keep the trait object-safe and the persisted
//! layout identical across backends.

#[cfg(target_arch = "wasm32")]
pub mod browser;

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::BackendError;

pub type BackendResult<T> = std::result::Result<T, BackendError>;

#[async_trait(?Send)]
pub trait KvBackend {
    /// The value stored under `key`, or `default` when nothing is stored.
    async fn get(&self, key: &str, default: Value) -> BackendResult<Value>;

    async fn set(&self, key: &str, value: Value) -> BackendResult<()>;

    /// Writes `value` only if the current value equals `expected` (a missing
    /// key compares equal to `null`). Returns whether the write happened.
    ///
    /// The provided implementation is a plain read followed by a write, so it
    /// narrows the race window without closing it. Backends that can do
    /// better override it.
    async fn compare_and_set(&self, key: &str, expected: &Value, value: Value) -> BackendResult<bool> {
        let current = self.get(key, Value::Null).await?;
        if &current != expected {
            return Ok(false);
        }
        self.set(key, value).await?;
        Ok(true)
    }
}

#[async_trait(?Send)]
impl<B: KvBackend + ?Sized> KvBackend for Box<B> {
    async fn get(&self, key: &str, default: Value) -> BackendResult<Value> {
        (**self).get(key, default).await
    }

    async fn set(&self, key: &str, value: Value) -> BackendResult<()> {
        (**self).set(key, value).await
    }

    async fn compare_and_set(&self, key: &str, expected: &Value, value: Value) -> BackendResult<bool> {
        (**self).compare_and_set(key, expected, value).await
    }
}

/// In-process backend; also what the tests run against.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend that already holds `value` under `key`.
    pub fn with_entry(key: impl Into<String>, value: Value) -> Self {
        let mut entries = HashMap::new();
        entries.insert(key.into(), value);
        Self {
            entries: Mutex::new(entries),
        }
    }

    /// Current value under `key`, without going through the async interface.
    pub fn snapshot(&self, key: &str) -> Option<Value> {
        self.lock().ok()?.get(key).cloned()
    }

    fn lock(&self) -> BackendResult<MutexGuard<'_, HashMap<String, Value>>> {
        self.entries
            .lock()
            .map_err(|_| BackendError::unavailable("memory backend lock poisoned"))
    }
}

#[async_trait(?Send)]
impl KvBackend for MemoryBackend {
    async fn get(&self, key: &str, default: Value) -> BackendResult<Value> {
        Ok(self.lock()?.get(key).cloned().unwrap_or(default))
    }

    async fn set(&self, key: &str, value: Value) -> BackendResult<()> {
        self.lock()?.insert(key.to_string(), value);
        Ok(())
    }

    async fn compare_and_set(&self, key: &str, expected: &Value, value: Value) -> BackendResult<bool> {
        let mut entries = self.lock()?;
        let current = entries.get(key).unwrap_or(&Value::Null);
        if current != expected {
            return Ok(false);
        }
        entries.insert(key.to_string(), value);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn get_falls_back_to_default() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.get("notes", json!([])).await.unwrap(), json!([]));
        backend.set("notes", json!([1])).await.unwrap();
        assert_eq!(backend.get("notes", json!([])).await.unwrap(), json!([1]));
    }

    #[tokio::test]
    async fn compare_and_set_only_writes_on_match() {
        let backend = MemoryBackend::with_entry("k", json!("a"));
        assert!(!backend.compare_and_set("k", &json!("b"), json!("c")).await.unwrap());
        assert_eq!(backend.snapshot("k"), Some(json!("a")));
        assert!(backend.compare_and_set("k", &json!("a"), json!("c")).await.unwrap());
        assert_eq!(backend.snapshot("k"), Some(json!("c")));
    }

    #[tokio::test]
    async fn missing_key_compares_as_null() {
        let backend = MemoryBackend::new();
        assert!(backend.compare_and_set("k", &Value::Null, json!(1)).await.unwrap());
        assert_eq!(backend.snapshot("k"), Some(json!(1)));
    }

    #[tokio::test]
    async fn boxed_backends_delegate() {
        let backend: Box<dyn KvBackend> = Box::new(MemoryBackend::new());
        backend.set("k", json!({ "x": 1 })).await.unwrap();
        assert_eq!(backend.get("k", Value::Null).await.unwrap(), json!({ "x": 1 }));
        assert!(backend.compare_and_set("k", &json!({ "x": 1 }), json!(2)).await.unwrap());
    }
}
