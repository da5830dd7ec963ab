use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// How a cell is shown and edited.
///
/// `Markdown` is the editable source, `MarkdownPreview` is the same source
/// shown rendered, and `Code` is a code cell. Preview and code never mix: a
/// cell has to return to `Markdown` before switching to the other.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellType {
    #[default]
    #[serde(rename = "markdown", alias = "text")]
    Markdown,
    #[serde(rename = "markdownFormat")]
    MarkdownPreview,
    #[serde(rename = "code")]
    Code,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cannot switch a {from:?} cell to {to:?}")]
pub struct TransitionError {
    pub from: CellType,
    pub to: CellType,
}

impl CellType {
    pub fn as_str(self) -> &'static str {
        match self {
            CellType::Markdown => "markdown",
            CellType::MarkdownPreview => "markdownFormat",
            CellType::Code => "code",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "markdown" | "text" => Some(CellType::Markdown),
            "markdownFormat" => Some(CellType::MarkdownPreview),
            "code" => Some(CellType::Code),
            _ => None,
        }
    }

    /// Markdown source, whether edited or previewed.
    pub fn is_markdown(self) -> bool {
        matches!(self, CellType::Markdown | CellType::MarkdownPreview)
    }

    /// `Markdown <-> MarkdownPreview`.
    pub fn toggle_preview(self) -> Result<Self, TransitionError> {
        match self {
            CellType::Markdown => Ok(CellType::MarkdownPreview),
            CellType::MarkdownPreview => Ok(CellType::Markdown),
            CellType::Code => Err(TransitionError {
                from: self,
                to: CellType::MarkdownPreview,
            }),
        }
    }

    /// `Markdown <-> Code`.
    pub fn toggle_code(self) -> Result<Self, TransitionError> {
        match self {
            CellType::Markdown => Ok(CellType::Code),
            CellType::Code => Ok(CellType::Markdown),
            CellType::MarkdownPreview => Err(TransitionError {
                from: self,
                to: CellType::Code,
            }),
        }
    }
}

/// A new cell identity in the same shape the extension has always used
/// (`2024-05-01T12:30:00.000Z`).
pub fn new_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    #[serde(deserialize_with = "timestamp_from_string_or_number")]
    pub timestamp: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub cell_type: CellType,
}

impl Cell {
    pub fn new(timestamp: impl Into<String>, content: impl Into<String>, cell_type: CellType) -> Self {
        Self {
            timestamp: timestamp.into(),
            content: content.into(),
            cell_type,
        }
    }
}

// Early builds stored `Date.now()` numbers as cell identities.
fn timestamp_from_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Int(n) => n.to_string(),
        Raw::Float(n) => n.to_string(),
    })
}

/// The cells attached to one normalized page URL, in display order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub url: String,
    #[serde(default)]
    pub cells: Vec<Cell>,
}

impl Note {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            cells: Vec::new(),
        }
    }

    pub fn position(&self, timestamp: &str) -> Option<usize> {
        self.cells.iter().position(|cell| cell.timestamp == timestamp)
    }

    pub fn cell(&self, timestamp: &str) -> Option<&Cell> {
        self.cells.iter().find(|cell| cell.timestamp == timestamp)
    }

    pub fn cell_mut(&mut self, timestamp: &str) -> Option<&mut Cell> {
        self.cells.iter_mut().find(|cell| cell.timestamp == timestamp)
    }

    /// Inserts `cell` right after the cell identified by `target`, or appends
    /// when there is no target. Returns the index the cell landed at, or
    /// `None` (cell dropped) when `target` names a cell that is not here.
    pub fn insert_after(&mut self, cell: Cell, target: Option<&str>) -> Option<usize> {
        match target {
            Some(target) => {
                let index = self.position(target)? + 1;
                self.cells.insert(index, cell);
                Some(index)
            }
            None => {
                self.cells.push(cell);
                Some(self.cells.len() - 1)
            }
        }
    }

    /// Removes every cell with this timestamp and returns how many went.
    pub fn remove(&mut self, timestamp: &str) -> usize {
        let before = self.cells.len();
        self.cells.retain(|cell| cell.timestamp != timestamp);
        before - self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn note_with(ids: &[&str]) -> Note {
        let mut note = Note::new("https://example.com");
        for id in ids {
            note.cells.push(Cell::new(*id, format!("cell {id}"), CellType::Markdown));
        }
        note
    }

    fn ids(note: &Note) -> Vec<&str> {
        note.cells.iter().map(|c| c.timestamp.as_str()).collect()
    }

    #[test]
    fn insert_after_places_cell_behind_target() {
        let mut note = note_with(&["111", "333"]);
        let index = note.insert_after(Cell::new("222", "", CellType::Code), Some("111"));
        assert_eq!(index, Some(1));
        assert_eq!(ids(&note), ["111", "222", "333"]);
    }

    #[test]
    fn insert_after_unknown_target_drops_cell() {
        let mut note = note_with(&["111"]);
        assert_eq!(note.insert_after(Cell::new("222", "", CellType::Code), Some("999")), None);
        assert_eq!(ids(&note), ["111"]);
    }

    #[test]
    fn insert_without_target_appends() {
        let mut note = note_with(&["1", "2"]);
        assert_eq!(note.insert_after(Cell::new("3", "", CellType::Markdown), None), Some(2));
        assert_eq!(ids(&note), ["1", "2", "3"]);
    }

    #[test]
    fn remove_drops_all_matches() {
        let mut note = note_with(&["a", "b", "a", "c"]);
        assert_eq!(note.remove("a"), 2);
        assert_eq!(ids(&note), ["b", "c"]);
        assert_eq!(note.remove("zzz"), 0);
    }

    #[test]
    fn cell_type_transitions() {
        assert_eq!(CellType::Markdown.toggle_preview(), Ok(CellType::MarkdownPreview));
        assert_eq!(CellType::MarkdownPreview.toggle_preview(), Ok(CellType::Markdown));
        assert_eq!(CellType::Markdown.toggle_code(), Ok(CellType::Code));
        assert_eq!(CellType::Code.toggle_code(), Ok(CellType::Markdown));
        assert!(CellType::Code.toggle_preview().is_err());
        assert!(CellType::MarkdownPreview.toggle_code().is_err());
    }

    #[test]
    fn cell_serializes_in_persisted_layout() {
        let cell = Cell::new("2024-01-01T00:00:00.000Z", "hi", CellType::Code);
        assert_eq!(
            serde_json::to_value(&cell).unwrap(),
            json!({ "timestamp": "2024-01-01T00:00:00.000Z", "content": "hi", "cellType": "code" })
        );
        let preview = serde_json::to_value(CellType::MarkdownPreview).unwrap();
        assert_eq!(preview, json!("markdownFormat"));
    }

    #[test]
    fn reads_legacy_records() {
        let note: Note = serde_json::from_value(json!({
            "url": "https://example.com",
            "cells": [
                { "timestamp": 1714561800000_i64, "content": "old", "cellType": "text" },
                { "timestamp": "t2", "content": "new", "cellType": "markdownFormat" }
            ]
        }))
        .unwrap();
        assert_eq!(note.cells[0].timestamp, "1714561800000");
        assert_eq!(note.cells[0].cell_type, CellType::Markdown);
        assert_eq!(note.cells[1].cell_type, CellType::MarkdownPreview);
    }

    #[test]
    fn note_without_cells_field_is_empty() {
        let note: Note = serde_json::from_value(json!({ "url": "u" })).unwrap();
        assert!(note.is_empty());
    }

    #[test]
    fn new_timestamp_looks_like_iso_millis() {
        let ts = new_timestamp();
        assert!(ts.ends_with('Z'), "{ts}");
        assert_eq!(ts.len(), "2024-01-01T00:00:00.000Z".len());
    }

    #[test]
    fn parse_matches_serde_names() {
        for ty in [CellType::Markdown, CellType::MarkdownPreview, CellType::Code] {
            assert_eq!(CellType::parse(ty.as_str()), Some(ty));
        }
        assert_eq!(CellType::parse("image"), None);
    }
}
