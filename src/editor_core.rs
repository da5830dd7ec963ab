//! Formatting edits on the text of one cell.
//!
//! Offsets are byte offsets into the cell text. A textarea reports UTF-16
//! positions; [`Selection::from_utf16`] and [`Selection::to_utf16`] convert.

use thiserror::Error;

use crate::model::CellType;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    pub start: usize,
    pub end: usize,
}

impl Selection {
    /// Orders the ends so `start <= end`.
    pub fn new(a: usize, b: usize) -> Self {
        Self {
            start: a.min(b),
            end: a.max(b),
        }
    }

    pub fn cursor(pos: usize) -> Self {
        Self::new(pos, pos)
    }

    /// Keeps both ends inside `text` and on char boundaries.
    pub fn clamp_to(self, text: &str) -> Self {
        Self::new(floor_boundary(text, self.start), floor_boundary(text, self.end))
    }

    /// Converts UTF-16 offsets, as a textarea reports them, to byte offsets.
    pub fn from_utf16(text: &str, start: usize, end: usize) -> Self {
        Self::new(utf16_to_byte(text, start), utf16_to_byte(text, end))
    }

    /// The selection as UTF-16 offsets into `text`.
    pub fn to_utf16(self, text: &str) -> (usize, usize) {
        let Selection { start, end } = self.clamp_to(text);
        (text[..start].encode_utf16().count(), text[..end].encode_utf16().count())
    }
}

fn utf16_to_byte(text: &str, units: usize) -> usize {
    let mut seen = 0;
    for (index, c) in text.char_indices() {
        if seen >= units {
            return index;
        }
        seen += c.len_utf16();
    }
    text.len()
}

fn floor_boundary(text: &str, pos: usize) -> usize {
    let mut pos = pos.min(text.len());
    while !text.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

/// Replaces `start..end` with `insert`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextChange {
    pub start: usize,
    pub end: usize,
    pub insert: String,
}

impl TextChange {
    pub fn new(start: usize, end: usize, insert: impl Into<String>) -> Self {
        Self {
            start,
            end,
            insert: insert.into(),
        }
    }

    fn check(&self, text: &str) -> Result<(), EditError> {
        let in_bounds = self.start <= self.end && self.end <= text.len();
        if in_bounds && text.is_char_boundary(self.start) && text.is_char_boundary(self.end) {
            return Ok(());
        }
        Err(EditError::InvalidRange {
            start: self.start,
            end: self.end,
            len: text.len(),
        })
    }
}

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum EditError {
    #[error("change {start}..{end} is outside the text (length {len}) or splits a character")]
    InvalidRange { start: usize, end: usize, len: usize },
    #[error("heading level {0} is not between 1 and 6")]
    InvalidHeadingLevel(u8),
    #[error("unknown toolbar action `{0}`")]
    UnknownAction(String),
}

/// What the UI should persist after an edit: feed it to
/// `NoteStore::update_cell`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CellEdit {
    pub timestamp: String,
    pub content: String,
    pub cell_type: CellType,
}

/// The text of one cell while it is being edited.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CellDraft {
    pub timestamp: String,
    pub text: String,
    pub selection: Selection,
}

impl CellDraft {
    /// A draft with the caret at the end of `text`.
    pub fn new(timestamp: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let selection = Selection::cursor(text.len());
        Self {
            timestamp: timestamp.into(),
            text,
            selection,
        }
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.selection = selection.clamp_to(&self.text);
    }

    /// Applies `change` and leaves the caret at `caret`, which is an offset
    /// into the new text.
    pub fn apply(&mut self, change: TextChange, caret: usize) -> Result<(), EditError> {
        change.check(&self.text)?;
        self.text.replace_range(change.start..change.end, &change.insert);
        self.selection = Selection::cursor(caret).clamp_to(&self.text);
        Ok(())
    }

    /// Applies a toolbar button to the current selection. Toolbar edits
    /// always leave the cell as markdown.
    pub fn apply_toolbar(&mut self, action: ToolbarAction) -> Result<CellEdit, EditError> {
        if let ToolbarAction::Heading(level) = action {
            if !(1..=6).contains(&level) {
                return Err(EditError::InvalidHeadingLevel(level));
            }
        }
        let Selection { start, end } = self.selection;
        let selected = &self.text[start..end];

        let (insert, caret) = match action {
            ToolbarAction::BulletList => {
                let lines = toggle_bullets(selected);
                let caret = start + lines.len();
                (lines, caret)
            }
            _ => {
                let (prefix, suffix) = action.markers();
                // Caret lands after the selected text, before any closing marker.
                let caret = start + prefix.len() + selected.len();
                (format!("{prefix}{selected}{suffix}"), caret)
            }
        };
        self.apply(TextChange::new(start, end, insert), caret)?;
        Ok(self.to_edit(CellType::Markdown))
    }

    pub fn to_edit(&self, cell_type: CellType) -> CellEdit {
        CellEdit {
            timestamp: self.timestamp.clone(),
            content: self.text.clone(),
            cell_type,
        }
    }
}

/// The markdown toolbar's buttons.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolbarAction {
    Heading(u8),
    Bold,
    Italic,
    Underline,
    Strikethrough,
    BulletList,
    Code,
    HorizontalRule,
    Link,
}

impl ToolbarAction {
    /// Parses a button name: `bold`, `italic`, `underline`, `strikethrough`,
    /// `bullet-list`, `code`, `horizontal-rule`, `link`, or `h1`..`h6`.
    pub fn parse(name: &str) -> Result<Self, EditError> {
        let action = match name {
            "bold" => ToolbarAction::Bold,
            "italic" => ToolbarAction::Italic,
            "underline" => ToolbarAction::Underline,
            "strikethrough" => ToolbarAction::Strikethrough,
            "bullet-list" => ToolbarAction::BulletList,
            "code" => ToolbarAction::Code,
            "horizontal-rule" => ToolbarAction::HorizontalRule,
            "link" => ToolbarAction::Link,
            _ => {
                let level = name
                    .strip_prefix('h')
                    .and_then(|level| level.parse::<u8>().ok())
                    .ok_or_else(|| EditError::UnknownAction(name.to_string()))?;
                ToolbarAction::Heading(level)
            }
        };
        Ok(action)
    }

    /// `(prefix, suffix)` placed around the selection.
    fn markers(self) -> (&'static str, &'static str) {
        const HEADINGS: [&str; 6] = ["# ", "## ", "### ", "#### ", "##### ", "###### "];
        match self {
            ToolbarAction::Heading(level) => (HEADINGS[usize::from(level.clamp(1, 6)) - 1], ""),
            ToolbarAction::Bold => ("**", "**"),
            ToolbarAction::Italic => ("*", "*"),
            ToolbarAction::Underline => ("<u>", "</u>"),
            ToolbarAction::Strikethrough => ("~~", "~~"),
            ToolbarAction::BulletList => ("- ", ""),
            ToolbarAction::Code => ("```", "```"),
            ToolbarAction::HorizontalRule => ("", "\n---"),
            ToolbarAction::Link => ("[", "](url)"),
        }
    }
}

// Adds "- " to every selected line, or strips it when all lines have it.
fn toggle_bullets(selected: &str) -> String {
    let lines: Vec<&str> = selected.split('\n').collect();
    let all_bulleted = lines.iter().all(|line| line.starts_with("- "));
    lines
        .iter()
        .map(|line| match line.strip_prefix("- ") {
            Some(rest) if all_bulleted => rest.to_string(),
            _ => format!("- {line}"),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
