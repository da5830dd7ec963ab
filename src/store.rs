//! Notes keyed by normalized page URL, persisted as one record.
//!
//! Every mutation reads the whole `notes` record, changes it in memory and
//! writes it back. Under [`ConflictPolicy::LastWriteWins`] two overlapping
//! mutations can lose one of the updates; [`ConflictPolicy::DetectConflicts`]
//! turns that into a retry or a [`StoreError::Conflict`].

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::backend::KvBackend;
use crate::config::{ConflictPolicy, NotesConfig};
use crate::error::{BackendError, Result, StoreError};
use crate::model::{Cell, CellType, Note};
use crate::url::UrlNormalizer;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddOutcome {
    Inserted { index: usize },
    /// The insert-after target does not exist; the cell was not added.
    TargetNotFound,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    NoteNotFound,
    CellNotFound,
}

impl UpdateOutcome {
    pub fn is_updated(self) -> bool {
        self == UpdateOutcome::Updated
    }
}

enum Write<T> {
    Persist(T),
    Skip(T),
}

pub struct NoteStore<B> {
    backend: B,
    normalizer: UrlNormalizer,
    storage_key: String,
    conflict_policy: ConflictPolicy,
}

impl<B: KvBackend> NoteStore<B> {
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, &NotesConfig::default())
    }

    pub fn with_config(backend: B, config: &NotesConfig) -> Self {
        Self {
            backend,
            normalizer: config.normalizer(),
            storage_key: config.storage_key.clone(),
            conflict_policy: config.conflict_policy,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn normalizer(&self) -> UrlNormalizer {
        self.normalizer
    }

    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    pub async fn all_notes(&self) -> Result<Vec<Note>> {
        let raw = self.backend.get(&self.storage_key, Value::Array(Vec::new())).await?;
        decode(raw)
    }

    /// The note for `url`, if one was ever created.
    pub async fn find_note(&self, url: &str) -> Result<Option<Note>> {
        let key = self.normalizer.normalize(url);
        let notes = self.all_notes().await?;
        Ok(notes.into_iter().find(|note| note.url == key))
    }

    pub async fn get_or_create_note(&self, url: &str) -> Result<Note> {
        let key = self.normalizer.normalize(url);
        self.mutate(|notes| match notes.iter().find(|note| note.url == key) {
            Some(note) => Write::Skip(note.clone()),
            None => {
                let note = Note::new(key.clone());
                notes.push(note.clone());
                Write::Persist(note)
            }
        })
        .await
    }

    /// Adds a cell after `target`, or at the end when `target` is `None` or
    /// empty. A target that names no cell leaves the cells untouched.
    pub async fn add_cell(
        &self,
        url: &str,
        timestamp: &str,
        content: &str,
        cell_type: CellType,
        target: Option<&str>,
    ) -> Result<AddOutcome> {
        let key = self.normalizer.normalize(url);
        let target = target.filter(|t| !t.is_empty());
        let outcome = self
            .mutate(|notes| {
                let note = note_entry(notes, &key);
                let cell = Cell::new(timestamp, content, cell_type);
                let outcome = match note.insert_after(cell, target) {
                    Some(index) => AddOutcome::Inserted { index },
                    None => AddOutcome::TargetNotFound,
                };
                Write::Persist(outcome)
            })
            .await?;
        if outcome == AddOutcome::TargetNotFound {
            warn!(url = %key, target = ?target, "insert-after target not found; cell not added");
        }
        Ok(outcome)
    }

    pub async fn update_cell(
        &self,
        url: &str,
        timestamp: &str,
        content: &str,
        cell_type: CellType,
    ) -> Result<UpdateOutcome> {
        let key = self.normalizer.normalize(url);
        let outcome = self
            .mutate(|notes| {
                let Some(note) = notes.iter_mut().find(|note| note.url == key) else {
                    return Write::Skip(UpdateOutcome::NoteNotFound);
                };
                let Some(cell) = note.cell_mut(timestamp) else {
                    return Write::Skip(UpdateOutcome::CellNotFound);
                };
                cell.content = content.to_string();
                cell.cell_type = cell_type;
                Write::Persist(UpdateOutcome::Updated)
            })
            .await?;
        match outcome {
            UpdateOutcome::NoteNotFound => warn!(url = %key, "note not found while updating cell"),
            UpdateOutcome::CellNotFound => {
                warn!(url = %key, timestamp, "cell not found while updating content")
            }
            UpdateOutcome::Updated => debug!(url = %key, timestamp, "cell updated"),
        }
        Ok(outcome)
    }

    /// Removes the cell(s) with `timestamp` and returns how many were removed.
    /// The record is written back even when nothing matched.
    pub async fn delete_cell(&self, url: &str, timestamp: &str) -> Result<usize> {
        let key = self.normalizer.normalize(url);
        self.mutate(|notes| Write::Persist(note_entry(notes, &key).remove(timestamp)))
            .await
    }

    async fn mutate<T, F>(&self, mut apply: F) -> Result<T>
    where
        F: FnMut(&mut Vec<Note>) -> Write<T>,
    {
        let max_retries = match self.conflict_policy {
            ConflictPolicy::LastWriteWins => {
                let mut notes = self.all_notes().await?;
                return match apply(&mut notes) {
                    Write::Persist(out) => {
                        self.persist(&notes).await?;
                        Ok(out)
                    }
                    Write::Skip(out) => Ok(out),
                };
            }
            ConflictPolicy::DetectConflicts { max_retries } => max_retries,
        };

        let attempts = max_retries + 1;
        for attempt in 1..=attempts {
            let raw = self.backend.get(&self.storage_key, Value::Null).await?;
            let mut notes = decode(raw.clone())?;
            let out = match apply(&mut notes) {
                Write::Skip(out) => return Ok(out),
                Write::Persist(out) => out,
            };
            let value = encode(&notes)?;
            if self.backend.compare_and_set(&self.storage_key, &raw, value).await? {
                debug!(key = %self.storage_key, notes = notes.len(), attempt, "notes persisted");
                return Ok(out);
            }
            warn!(key = %self.storage_key, attempt, "notes record changed since it was read; retrying");
        }
        Err(StoreError::Conflict { attempts })
    }

    async fn persist(&self, notes: &[Note]) -> Result<()> {
        let value = encode(notes)?;
        self.backend.set(&self.storage_key, value).await?;
        debug!(key = %self.storage_key, notes = notes.len(), "notes persisted");
        Ok(())
    }
}

fn decode(raw: Value) -> Result<Vec<Note>> {
    if raw.is_null() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_value(raw)?)
}

// A value that will not convert is a write-side failure, not a malformed record.
fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| BackendError::Serialization(e.to_string()).into())
}

fn note_entry<'a>(notes: &'a mut Vec<Note>, key: &str) -> &'a mut Note {
    let index = match notes.iter().position(|note| note.url == key) {
        Some(index) => index,
        None => {
            notes.push(Note::new(key));
            notes.len() - 1
        }
    };
    &mut notes[index]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use serde_json::json;

    fn seeded(value: Value) -> NoteStore<MemoryBackend> {
        NoteStore::new(MemoryBackend::with_entry("notes", value))
    }

    #[tokio::test]
    async fn adds_cell_to_existing_note() {
        let store = seeded(json!([{ "url": "note-url", "cells": [] }]));
        let outcome = store
            .add_cell("note-url", "123456", "New cell content", CellType::Markdown, None)
            .await
            .unwrap();
        assert_eq!(outcome, AddOutcome::Inserted { index: 0 });
        assert_eq!(
            store.backend().snapshot("notes").unwrap(),
            json!([{
                "url": "note-url",
                "cells": [{ "timestamp": "123456", "content": "New cell content", "cellType": "markdown" }]
            }])
        );
    }

    #[tokio::test]
    async fn creates_note_and_cell_in_one_write() {
        let store = NoteStore::new(MemoryBackend::new());
        store
            .add_cell("https://a.test/page?x=1", "t1", "hello", CellType::Code, None)
            .await
            .unwrap();
        let notes = store.all_notes().await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].url, "https://a.test/page");
        assert_eq!(notes[0].cells, vec![Cell::new("t1", "hello", CellType::Code)]);
    }

    #[tokio::test]
    async fn empty_target_means_append() {
        let store = seeded(json!([{ "url": "u", "cells": [{ "timestamp": "1", "content": "", "cellType": "markdown" }] }]));
        let outcome = store.add_cell("u", "2", "", CellType::Markdown, Some("")).await.unwrap();
        assert_eq!(outcome, AddOutcome::Inserted { index: 1 });
    }

    #[tokio::test]
    async fn update_missing_note_skips_write() {
        let store = NoteStore::new(MemoryBackend::new());
        let outcome = store.update_cell("u", "1", "x", CellType::Code).await.unwrap();
        assert_eq!(outcome, UpdateOutcome::NoteNotFound);
        assert_eq!(store.backend().snapshot("notes"), None);
    }

    #[tokio::test]
    async fn delete_on_unknown_url_creates_empty_note() {
        let store = NoteStore::new(MemoryBackend::new());
        assert_eq!(store.delete_cell("https://a.test/", "nope").await.unwrap(), 0);
        assert_eq!(
            store.backend().snapshot("notes").unwrap(),
            json!([{ "url": "https://a.test", "cells": [] }])
        );
    }

    #[tokio::test]
    async fn null_record_reads_as_empty() {
        let store = seeded(Value::Null);
        assert!(store.all_notes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_record_is_a_decode_error() {
        let store = seeded(json!({ "not": "a list" }));
        assert!(matches!(store.all_notes().await, Err(StoreError::Decode(_))));
    }

    #[test]
    fn unencodable_values_are_serialization_errors() {
        let tuple_keys = std::collections::HashMap::from([((1, 2), "x")]);
        assert!(matches!(
            encode(&tuple_keys),
            Err(StoreError::Backend(BackendError::Serialization(_)))
        ));
        assert_eq!(encode(&[Note::new("u")]).unwrap(), json!([{ "url": "u", "cells": [] }]));
    }

    #[tokio::test]
    async fn custom_storage_key_is_used() {
        let config = NotesConfig {
            storage_key: "pageNotes".to_string(),
            ..NotesConfig::default()
        };
        let store = NoteStore::with_config(MemoryBackend::new(), &config);
        store.get_or_create_note("u").await.unwrap();
        assert!(store.backend().snapshot("pageNotes").is_some());
        assert!(store.backend().snapshot("notes").is_none());
    }
}
