//! Backends for the extension runtime: `chrome.storage.sync` and IndexedDB.

use std::cell::RefCell;

use async_trait::async_trait;
use js_sys::{Function, Object, Promise, Reflect};
use serde::Serialize;
use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{IdbDatabase, IdbFactory, IdbOpenDbRequest, IdbRequest, IdbTransactionMode};

use super::{BackendResult, KvBackend};
use crate::config::{BackendKind, NotesConfig};
use crate::error::BackendError;

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(catch, js_namespace = ["chrome", "storage", "sync"], js_name = get)]
    async fn sync_get(items: JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "storage", "sync"], js_name = set)]
    async fn sync_set(items: JsValue) -> Result<JsValue, JsValue>;
}

fn js_message(err: &JsValue) -> String {
    err.as_string()
        .or_else(|| {
            Reflect::get(err, &JsValue::from_str("message"))
                .ok()
                .and_then(|message| message.as_string())
        })
        .unwrap_or_else(|| format!("{err:?}"))
}

fn to_js(value: &Value) -> BackendResult<JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| BackendError::Serialization(e.to_string()))
}

fn from_js(value: JsValue, default: Value) -> BackendResult<Value> {
    if value.is_undefined() || value.is_null() {
        return Ok(default);
    }
    serde_wasm_bindgen::from_value(value).map_err(|e| BackendError::Serialization(e.to_string()))
}

fn single_entry(key: &str, value: &JsValue) -> BackendResult<JsValue> {
    let object = Object::new();
    Reflect::set(&object, &JsValue::from_str(key), value)
        .map_err(|e| BackendError::Serialization(js_message(&e)))?;
    Ok(object.into())
}

/// `chrome.storage.sync`, bounded by the per-item quota.
pub struct SyncStorage {
    quota_bytes: usize,
}

impl SyncStorage {
    pub fn new(quota_bytes: usize) -> Self {
        Self { quota_bytes }
    }
}

#[async_trait(?Send)]
impl KvBackend for SyncStorage {
    async fn get(&self, key: &str, default: Value) -> BackendResult<Value> {
        let request = single_entry(key, &to_js(&default)?)?;
        let data = sync_get(request)
            .await
            .map_err(|e| BackendError::rejected(format!("Failed to get data: {}", js_message(&e))))?;
        let value = Reflect::get(&data, &JsValue::from_str(key))
            .map_err(|e| BackendError::rejected(js_message(&e)))?;
        from_js(value, default)
    }

    async fn set(&self, key: &str, value: Value) -> BackendResult<()> {
        // Chrome counts the key plus the JSON-encoded value.
        let size = key.len() + value.to_string().len();
        if size > self.quota_bytes {
            return Err(BackendError::QuotaExceeded {
                size,
                limit: self.quota_bytes,
            });
        }
        let items = single_entry(key, &to_js(&value)?)?;
        sync_set(items)
            .await
            .map_err(|e| BackendError::rejected(format!("Failed to save data: {}", js_message(&e))))?;
        Ok(())
    }
}

/// One object store in one IndexedDB database, opened lazily.
pub struct IndexedDbStorage {
    db_name: String,
    store_name: String,
    db: RefCell<Option<IdbDatabase>>,
}

impl IndexedDbStorage {
    pub fn new(db_name: impl Into<String>, store_name: impl Into<String>) -> Self {
        Self {
            db_name: db_name.into(),
            store_name: store_name.into(),
            db: RefCell::new(None),
        }
    }

    async fn database(&self) -> BackendResult<IdbDatabase> {
        if let Some(db) = self.db.borrow().as_ref() {
            return Ok(db.clone());
        }

        let factory: IdbFactory = Reflect::get(&js_sys::global(), &JsValue::from_str("indexedDB"))
            .ok()
            .and_then(|factory| factory.dyn_into().ok())
            .ok_or_else(|| BackendError::unavailable("IndexedDB is not available here"))?;
        let open: IdbOpenDbRequest = factory
            .open_with_u32(&self.db_name, 1)
            .map_err(|e| BackendError::unavailable(js_message(&e)))?;

        let store_name = self.store_name.clone();
        let upgrade_request = open.clone();
        let on_upgrade = Closure::once_into_js(move |_event: web_sys::IdbVersionChangeEvent| {
            let Ok(result) = upgrade_request.result() else {
                return;
            };
            let db: IdbDatabase = result.unchecked_into();
            if !db.object_store_names().contains(&store_name) {
                let _ = db.create_object_store(&store_name);
            }
        });
        open.set_onupgradeneeded(Some(on_upgrade.unchecked_ref()));

        let db: IdbDatabase = request_done(&open)
            .await
            .map_err(|e| BackendError::unavailable(format!("IndexedDB error: {}", js_message(&e))))?
            .unchecked_into();
        *self.db.borrow_mut() = Some(db.clone());
        Ok(db)
    }

    async fn run(
        &self,
        mode: IdbTransactionMode,
        build: impl FnOnce(&web_sys::IdbObjectStore) -> Result<IdbRequest, JsValue>,
    ) -> Result<JsValue, JsValue> {
        let db = self.database().await.map_err(|e| JsValue::from_str(&e.to_string()))?;
        let transaction = db.transaction_with_str_and_mode(&self.store_name, mode)?;
        let store = transaction.object_store(&self.store_name)?;
        let request = build(&store)?;
        request_done(&request).await
    }
}

// Resolves with the request's result once `onsuccess` fires.
async fn request_done(request: &IdbRequest) -> Result<JsValue, JsValue> {
    let promise = Promise::new(&mut |resolve: Function, reject: Function| {
        let success_request = request.clone();
        let on_success = Closure::once_into_js(move |_event: web_sys::Event| {
            let result = success_request.result().unwrap_or(JsValue::UNDEFINED);
            let _ = resolve.call1(&JsValue::NULL, &result);
        });
        let error_request = request.clone();
        let on_error = Closure::once_into_js(move |_event: web_sys::Event| {
            let error = error_request
                .error()
                .ok()
                .flatten()
                .map(JsValue::from)
                .unwrap_or(JsValue::UNDEFINED);
            let _ = reject.call1(&JsValue::NULL, &error);
        });
        request.set_onsuccess(Some(on_success.unchecked_ref()));
        request.set_onerror(Some(on_error.unchecked_ref()));
    });
    JsFuture::from(promise).await
}

#[async_trait(?Send)]
impl KvBackend for IndexedDbStorage {
    async fn get(&self, key: &str, default: Value) -> BackendResult<Value> {
        let js_key = JsValue::from_str(key);
        let value = self
            .run(IdbTransactionMode::Readonly, |store| store.get(&js_key))
            .await
            .map_err(|e| BackendError::rejected(format!("Failed to get data: {}", js_message(&e))))?;
        from_js(value, default)
    }

    async fn set(&self, key: &str, value: Value) -> BackendResult<()> {
        let js_key = JsValue::from_str(key);
        let js_value = to_js(&value)?;
        self.run(IdbTransactionMode::Readwrite, |store| store.put_with_key(&js_value, &js_key))
            .await
            .map_err(|e| BackendError::rejected(format!("Failed to save data: {}", js_message(&e))))?;
        Ok(())
    }
}

/// Whichever browser backend the settings select.
pub enum BrowserStorage {
    Sync(SyncStorage),
    IndexedDb(IndexedDbStorage),
}

impl BrowserStorage {
    pub fn from_config(config: &NotesConfig) -> Self {
        match config.backend {
            BackendKind::Sync => BrowserStorage::Sync(SyncStorage::new(config.sync_quota_bytes)),
            BackendKind::IndexedDb => BrowserStorage::IndexedDb(IndexedDbStorage::new(
                config.indexed_db.db_name.clone(),
                config.indexed_db.store_name.clone(),
            )),
        }
    }
}

#[async_trait(?Send)]
impl KvBackend for BrowserStorage {
    async fn get(&self, key: &str, default: Value) -> BackendResult<Value> {
        match self {
            BrowserStorage::Sync(storage) => storage.get(key, default).await,
            BrowserStorage::IndexedDb(storage) => storage.get(key, default).await,
        }
    }

    async fn set(&self, key: &str, value: Value) -> BackendResult<()> {
        match self {
            BrowserStorage::Sync(storage) => storage.set(key, value).await,
            BrowserStorage::IndexedDb(storage) => storage.set(key, value).await,
        }
    }
}
