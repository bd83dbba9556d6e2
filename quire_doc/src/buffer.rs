//! Rope-backed text buffer with a modified flag, undo history and a cursor.

use std::ops::Range;

use quire_fs::LoadTarget;
use ropey::Rope;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    #[error("char index {index} out of bounds (len {len})")]
    OutOfBounds { index: usize, len: usize },
    #[error("invalid range {start}..{end}")]
    InvalidRange { start: usize, end: usize },
}

#[derive(Debug, Clone)]
enum Edit {
    Insert { at: usize, text: String },
    Remove { at: usize, text: String },
}

impl Edit {
    fn inverse(&self) -> Edit {
        match self {
            Edit::Insert { at, text } => Edit::Remove {
                at: *at,
                text: text.clone(),
            },
            Edit::Remove { at, text } => Edit::Insert {
                at: *at,
                text: text.clone(),
            },
        }
    }
}

/// Text content of a document. Positions are char indices.
#[derive(Debug, Clone, Default)]
pub struct TextBuffer {
    rope: Rope,
    modified: bool,
    undo: Vec<Edit>,
    redo: Vec<Edit>,
    cursor: usize,
}

impl TextBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rope(&self) -> &Rope {
        &self.rope
    }

    /// Full content as a string, e.g. as a save snapshot.
    pub fn text(&self) -> String {
        self.rope.to_string()
    }

    pub fn len_chars(&self) -> usize {
        self.rope.len_chars()
    }

    pub fn len_lines(&self) -> usize {
        self.rope.len_lines()
    }

    pub fn is_empty(&self) -> bool {
        self.rope.len_chars() == 0
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn set_modified(&mut self, modified: bool) {
        self.modified = modified;
    }

    pub fn insert(&mut self, at: usize, text: &str) -> Result<(), BufferError> {
        self.check_index(at)?;
        if text.is_empty() {
            return Ok(());
        }
        self.record(Edit::Insert {
            at,
            text: text.to_string(),
        });
        Ok(())
    }

    pub fn remove(&mut self, range: Range<usize>) -> Result<(), BufferError> {
        if range.start > range.end {
            return Err(BufferError::InvalidRange {
                start: range.start,
                end: range.end,
            });
        }
        self.check_index(range.end)?;
        if range.is_empty() {
            return Ok(());
        }
        let text = self.rope.slice(range.clone()).to_string();
        self.record(Edit::Remove {
            at: range.start,
            text,
        });
        Ok(())
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Revert the last edit. Returns `false` when there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        let Some(edit) = self.undo.pop() else {
            return false;
        };
        self.apply(&edit.inverse());
        self.redo.push(edit);
        self.modified = true;
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(edit) = self.redo.pop() else {
            return false;
        };
        self.apply(&edit);
        self.undo.push(edit);
        self.modified = true;
        true
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Move the cursor, clamped to the end of the text.
    pub fn set_cursor(&mut self, char_idx: usize) {
        self.cursor = char_idx.min(self.rope.len_chars());
    }

    /// Zero-based line of the cursor.
    pub fn cursor_line(&self) -> usize {
        self.rope.char_to_line(self.cursor)
    }

    /// Put the cursor at the start of `line` (zero-based), or at the start of
    /// the last line when `line` is past the end.
    pub fn place_cursor_at_line(&mut self, line: usize) {
        let last = self.rope.len_lines().saturating_sub(1);
        self.cursor = self.rope.line_to_char(line.min(last));
    }

    fn check_index(&self, index: usize) -> Result<(), BufferError> {
        let len = self.rope.len_chars();
        if index > len {
            return Err(BufferError::OutOfBounds { index, len });
        }
        Ok(())
    }

    fn record(&mut self, edit: Edit) {
        self.apply(&edit);
        self.undo.push(edit);
        self.redo.clear();
        self.modified = true;
    }

    fn apply(&mut self, edit: &Edit) {
        match edit {
            Edit::Insert { at, text } => {
                self.rope.insert(*at, text);
                if self.cursor >= *at {
                    self.cursor += text.chars().count();
                }
            }
            Edit::Remove { at, text } => {
                let end = at + text.chars().count();
                self.rope.remove(*at..end);
                if self.cursor > *at {
                    self.cursor = at + self.cursor.saturating_sub(end);
                    self.cursor = self.cursor.max(*at);
                }
            }
        }
    }
}

impl From<&str> for TextBuffer {
    fn from(text: &str) -> Self {
        TextBuffer {
            rope: Rope::from_str(text),
            ..TextBuffer::default()
        }
    }
}

impl LoadTarget for TextBuffer {
    fn set_text_not_undoable(&mut self, text: String) {
        self.rope = Rope::from_str(&text);
        self.undo.clear();
        self.redo.clear();
        self.modified = false;
        self.cursor = 0;
    }
}
