//! The surface the extension's popup and content scripts call into.

use std::rc::Rc;

use js_sys::Promise;
use serde::Serialize;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;

use crate::backend::browser::BrowserStorage;
use crate::config::NotesConfig;
use crate::editor_core::{CellDraft, Selection, ToolbarAction};
use crate::highlight::{render_code_cell, Language};
use crate::logging;
use crate::markup::MarkupTransformer;
use crate::model::{new_timestamp, CellType};
use crate::store::{AddOutcome, NoteStore};

#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
}

fn reject(err: impl std::fmt::Display) -> JsValue {
    js_sys::Error::new(&err.to_string()).into()
}

fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(reject)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolbarEdit {
    timestamp: String,
    content: String,
    cell_type: CellType,
    selection_start: usize,
    selection_end: usize,
}

fn cell_type(value: &str) -> Result<CellType, JsValue> {
    CellType::parse(value).ok_or_else(|| reject(format!("unknown cell type: {value}")))
}

#[wasm_bindgen]
pub struct NotesApi {
    store: Rc<NoteStore<BrowserStorage>>,
    markup: MarkupTransformer,
}

#[wasm_bindgen]
impl NotesApi {
    /// `settings` is the JSON settings document; missing fields default.
    #[wasm_bindgen(constructor)]
    pub fn new(settings: Option<String>) -> Result<NotesApi, JsError> {
        let config = NotesConfig::from_json(settings.as_deref().unwrap_or_default())?;
        logging::init(config.log_filter());
        let backend = BrowserStorage::from_config(&config);
        Ok(NotesApi {
            store: Rc::new(NoteStore::with_config(backend, &config)),
            markup: MarkupTransformer::default(),
        })
    }

    #[wasm_bindgen(js_name = getOrCreateNote)]
    pub fn get_or_create_note(&self, url: String) -> Promise {
        let store = Rc::clone(&self.store);
        future_to_promise(async move {
            let note = store.get_or_create_note(&url).await.map_err(reject)?;
            to_js(&note)
        })
    }

    /// Resolves to the note or `null`; never creates one.
    #[wasm_bindgen(js_name = getNote)]
    pub fn get_note(&self, url: String) -> Promise {
        let store = Rc::clone(&self.store);
        future_to_promise(async move {
            let note = store.find_note(&url).await.map_err(reject)?;
            to_js(&note)
        })
    }

    #[wasm_bindgen(js_name = allNotes)]
    pub fn all_notes(&self) -> Promise {
        let store = Rc::clone(&self.store);
        future_to_promise(async move {
            let notes = store.all_notes().await.map_err(reject)?;
            to_js(&notes)
        })
    }

    /// Resolves to the new cell's index, or `null` when `targetTimestamp`
    /// named no cell and nothing was added.
    #[wasm_bindgen(js_name = addCell)]
    pub fn add_cell(
        &self,
        url: String,
        timestamp: String,
        content: String,
        cell_type_name: String,
        target_timestamp: Option<String>,
    ) -> Promise {
        let store = Rc::clone(&self.store);
        future_to_promise(async move {
            let kind = cell_type(&cell_type_name)?;
            let outcome = store
                .add_cell(&url, &timestamp, &content, kind, target_timestamp.as_deref())
                .await
                .map_err(reject)?;
            Ok(match outcome {
                AddOutcome::Inserted { index } => JsValue::from(index as u32),
                AddOutcome::TargetNotFound => JsValue::NULL,
            })
        })
    }

    /// Resolves to whether a cell was updated.
    #[wasm_bindgen(js_name = updateCell)]
    pub fn update_cell(&self, url: String, timestamp: String, content: String, cell_type_name: String) -> Promise {
        let store = Rc::clone(&self.store);
        future_to_promise(async move {
            let kind = cell_type(&cell_type_name)?;
            let outcome = store
                .update_cell(&url, &timestamp, &content, kind)
                .await
                .map_err(reject)?;
            Ok(JsValue::from_bool(outcome.is_updated()))
        })
    }

    /// Resolves to the number of cells removed.
    #[wasm_bindgen(js_name = deleteCell)]
    pub fn delete_cell(&self, url: String, timestamp: String) -> Promise {
        let store = Rc::clone(&self.store);
        future_to_promise(async move {
            let removed = store.delete_cell(&url, &timestamp).await.map_err(reject)?;
            Ok(JsValue::from(removed as u32))
        })
    }

    pub fn render(&self, markdown: &str) -> String {
        self.markup.render(markdown)
    }

    /// Applies a toolbar button to `text` with the textarea's selection.
    /// Returns the edit to persist plus the caret position to restore.
    #[wasm_bindgen(js_name = applyToolbar)]
    pub fn apply_toolbar(
        &self,
        timestamp: String,
        text: String,
        selection_start: usize,
        selection_end: usize,
        action: &str,
    ) -> Result<JsValue, JsError> {
        let action = ToolbarAction::parse(action)?;
        let mut draft = CellDraft::new(timestamp, text);
        draft.set_selection(Selection::from_utf16(&draft.text, selection_start, selection_end));
        let edit = draft.apply_toolbar(action)?;
        let (selection_start, selection_end) = draft.selection.to_utf16(&draft.text);
        let result = ToolbarEdit {
            timestamp: edit.timestamp,
            content: edit.content,
            cell_type: edit.cell_type,
            selection_start,
            selection_end,
        };
        Ok(result.serialize(&serde_wasm_bindgen::Serializer::json_compatible())?)
    }

    #[wasm_bindgen(js_name = renderCode)]
    pub fn render_code(&self, code: &str, language: Option<String>) -> String {
        let language = language
            .as_deref()
            .and_then(Language::parse)
            .unwrap_or_default();
        render_code_cell(code, language)
    }

    #[wasm_bindgen(js_name = normalizeUrl)]
    pub fn normalize_url(&self, url: Option<String>) -> String {
        self.store.normalizer().normalize_opt(url.as_deref())
    }

    #[wasm_bindgen(js_name = newTimestamp)]
    pub fn new_timestamp() -> String {
        new_timestamp()
    }
}
