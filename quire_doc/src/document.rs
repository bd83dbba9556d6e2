//! An editable document bound to at most one file.
//!
//! A document drives one [`Loader`] or one [`Saver`] at a time. Both run in
//! phases: [`Document::poll`] executes a single phase and returns the events
//! it produced, so an event loop can interleave I/O with other work.
//! [`Document::run_io`] drives the active operation to completion.
//!
//! ```text
//! Untitled ──load──▶ Loading ──▶ Normal | LoadFailed
//! Normal   ──save──▶ Saving  ──▶ Normal | SaveFailed
//! ```

use std::mem;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use quire_fs::{
    CancelHandle, DEFAULT_MIME_TYPE, Encoding, ErrorKind, FsError, KEY_ENCODING, KEY_LANGUAGE,
    KEY_POSITION, LoadEvent, LoadOutcome, LoadTarget, Loader, NO_LANGUAGE, SaveEvent, SaveOutcome,
    Saver, UsageError,
};

use crate::buffer::TextBuffer;
use crate::context::DocumentContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(NonZeroUsize);

impl DocumentId {
    pub const fn new(id: NonZeroUsize) -> Self {
        Self(id)
    }

    pub const fn get(self) -> NonZeroUsize {
        self.0
    }
}

impl From<NonZeroUsize> for DocumentId {
    fn from(value: NonZeroUsize) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    Untitled,
    Normal,
    Loading,
    LoadFailed,
    Saving,
    SaveFailed,
}

/// Progress and completion of the document's load and save operations.
///
/// Every started operation ends with exactly one `Loaded` or `Saved`.
#[derive(Debug, Clone)]
pub enum DocumentEvent {
    Loading { read: u64, total: Option<u64> },
    Loaded(Result<(), FsError>),
    Saving { written: u64, total: u64 },
    Saved(Result<(), FsError>),
}

impl DocumentEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DocumentEvent::Loaded(_) | DocumentEvent::Saved(_))
    }
}

#[derive(Debug)]
pub struct Document {
    id: DocumentId,
    context: Arc<DocumentContext>,
    path: Option<PathBuf>,
    untitled_number: Option<u32>,
    encoding: Encoding,
    has_bom: bool,
    mime_type: String,
    mtime: Option<SystemTime>,
    language: Option<String>,
    language_set_by_user: bool,
    buffer: TextBuffer,
    state: DocumentState,
    loader: Option<Loader>,
    saver: Option<Saver>,
    requested_encoding: Option<Encoding>,
    /// One-based line to place the cursor on after loading; 0 for the start.
    requested_line: usize,
    create: bool,
    last_error: Option<FsError>,
    last_save_or_load: Option<Instant>,
    pending: Vec<DocumentEvent>,
}

impl Document {
    /// A new, empty untitled document.
    pub fn new(id: DocumentId, context: Arc<DocumentContext>) -> Self {
        let untitled_number = context.allocate_untitled();
        let encoding = context.default_encoding();
        Self {
            id,
            context,
            path: None,
            untitled_number: Some(untitled_number),
            encoding,
            has_bom: false,
            mime_type: DEFAULT_MIME_TYPE.to_string(),
            mtime: None,
            language: None,
            language_set_by_user: false,
            buffer: TextBuffer::new(),
            state: DocumentState::Untitled,
            loader: None,
            saver: None,
            requested_encoding: None,
            requested_line: 0,
            create: false,
            last_error: None,
            last_save_or_load: None,
            pending: Vec::new(),
        }
    }

    /// Start loading `path` into the document.
    ///
    /// The path is bound right away. `encoding` forces a charset and is
    /// remembered in the metadata store on success; `None` auto-detects.
    /// `line` is the one-based line for the cursor (0 keeps it at the start).
    /// With `create`, a missing file loads as an empty document.
    pub fn load(
        &mut self,
        path: impl Into<PathBuf>,
        encoding: Option<Encoding>,
        line: usize,
        create: bool,
    ) -> Result<(), UsageError> {
        self.ensure_idle()?;

        let path = path.into();
        self.set_path(Some(path.clone()), None);
        self.requested_encoding = encoding;
        self.requested_line = line;
        self.create = create;

        let remembered = self
            .context
            .metadata()
            .get(&path, KEY_ENCODING)
            .and_then(|label| Encoding::for_label(&label).ok());
        let hints = self.context.detection_hints(remembered);
        let mut loader = Loader::new(self.context.load_options(hints));

        let pending = &mut self.pending;
        loader.load(&path, encoding, &mut |event| {
            if matches!(event, LoadEvent::Started) {
                pending.push(DocumentEvent::Loading {
                    read: 0,
                    total: None,
                });
            }
        })?;

        self.loader = Some(loader);
        self.state = DocumentState::Loading;
        Ok(())
    }

    /// Ask the running load to stop. It ends with a `Cancelled` error on the
    /// next [`Document::poll`]. Returns `false` when nothing is loading.
    pub fn cancel_load(&self) -> bool {
        match self.loader_cancel_handle() {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    pub fn loader_cancel_handle(&self) -> Option<CancelHandle> {
        self.loader.as_ref().map(Loader::cancel_handle)
    }

    /// Save to the bound path with the current encoding.
    ///
    /// Fails with `ExternallyModified` if the file changed on disk since it
    /// was last loaded or saved.
    pub fn save(&mut self) -> Result<(), UsageError> {
        let path = self.path.clone().ok_or(UsageError::Untitled)?;
        self.start_save(path, self.encoding, self.mtime)
    }

    /// Save to `path` in `encoding`, without checking for external changes.
    pub fn save_as(&mut self, path: impl Into<PathBuf>, encoding: Encoding) -> Result<(), UsageError> {
        self.start_save(path.into(), encoding, None)
    }

    fn start_save(
        &mut self,
        path: PathBuf,
        encoding: Encoding,
        previous_mtime: Option<SystemTime>,
    ) -> Result<(), UsageError> {
        self.ensure_idle()?;

        let mut saver = Saver::new(self.context.save_options(self.has_bom));
        let text = self.buffer.text();
        let pending = &mut self.pending;
        saver.save(path, &text, encoding, previous_mtime, &mut |event| {
            if matches!(event, SaveEvent::Started) {
                pending.push(DocumentEvent::Saving {
                    written: 0,
                    total: 0,
                });
            }
        })?;

        self.saver = Some(saver);
        self.state = DocumentState::Saving;
        Ok(())
    }

    fn ensure_idle(&self) -> Result<(), UsageError> {
        if self.loader.is_some() {
            return Err(UsageError::LoadInProgress);
        }
        if self.saver.is_some() {
            return Err(UsageError::SaveInProgress);
        }
        Ok(())
    }

    /// Run one phase of the active operation and return the events produced
    /// since the last call.
    pub fn poll(&mut self) -> Vec<DocumentEvent> {
        let mut events = mem::take(&mut self.pending);
        if self.loader.is_some() {
            self.poll_loader(&mut events);
        } else if self.saver.is_some() {
            self.poll_saver(&mut events);
        }
        events
    }

    /// Drive the active operation to completion.
    pub fn run_io(&mut self) -> Vec<DocumentEvent> {
        let mut events = self.poll();
        while self.is_busy() {
            events.extend(self.poll());
        }
        events
    }

    fn poll_loader(&mut self, events: &mut Vec<DocumentEvent>) {
        let Some(loader) = self.loader.as_mut() else {
            return;
        };

        let mut done = None;
        let more = loader.step(&mut self.buffer, &mut |event| match event {
            LoadEvent::Started => {}
            LoadEvent::Progress { read, total } => events.push(DocumentEvent::Loading {
                read: *read,
                total: *total,
            }),
            LoadEvent::Done(result) => done = Some(result.clone()),
        });

        if let Some(result) = done {
            self.loader = None;
            let event = self.finish_load(result);
            events.push(event);
        } else if !more {
            log::warn!("load ended without a result");
            self.loader = None;
        }
    }

    fn poll_saver(&mut self, events: &mut Vec<DocumentEvent>) {
        let Some(saver) = self.saver.as_mut() else {
            return;
        };

        let mut done = None;
        let more = saver.step(&mut |event| match event {
            SaveEvent::Started => {}
            SaveEvent::Progress { written, total } => events.push(DocumentEvent::Saving {
                written: *written,
                total: *total,
            }),
            SaveEvent::Done(result) => done = Some(result.clone()),
        });

        if let Some(result) = done {
            self.saver = None;
            let event = self.finish_save(result);
            events.push(event);
        } else if !more {
            log::warn!("save ended without a result");
            self.saver = None;
        }
    }

    fn finish_load(&mut self, result: Result<LoadOutcome, FsError>) -> DocumentEvent {
        let result = match result {
            Ok(outcome) => {
                self.apply_loaded(outcome);
                Ok(())
            }
            Err(err) if self.create && err.kind() == ErrorKind::NotFound => {
                log::debug!("{} does not exist yet, starting empty", err.path().display());
                self.buffer.set_text_not_undoable(String::new());
                self.encoding = self
                    .requested_encoding
                    .unwrap_or_else(|| self.context.default_encoding());
                self.has_bom = false;
                self.mtime = None;
                self.finish_io();
                Ok(())
            }
            Err(err) => {
                log::warn!("{err}");
                self.state = DocumentState::LoadFailed;
                self.last_error = Some(err.clone());
                Err(err)
            }
        };
        DocumentEvent::Loaded(result)
    }

    fn apply_loaded(&mut self, outcome: LoadOutcome) {
        self.encoding = outcome.encoding;
        self.has_bom = outcome.has_bom;
        self.mtime = outcome.mtime;
        self.set_path(None, Some(outcome.mime_type));

        if let (Some(encoding), Some(path)) = (self.requested_encoding, &self.path) {
            self.context
                .metadata()
                .set(path, KEY_ENCODING, encoding.name());
        }

        if self.requested_line > 0 {
            self.buffer.place_cursor_at_line(self.requested_line - 1);
        } else {
            self.buffer.set_cursor(0);
        }
        self.buffer.set_modified(false);
        self.finish_io();
    }

    fn finish_save(&mut self, result: Result<SaveOutcome, FsError>) -> DocumentEvent {
        let result = match result {
            Ok(outcome) => {
                let write_bom = self.context.settings().write_bom || self.has_bom;
                self.has_bom = write_bom && !outcome.encoding.bom().is_empty();
                self.encoding = outcome.encoding;
                self.mtime = outcome.mtime;
                self.set_path(Some(outcome.path), Some(outcome.mime_type));
                if let Some(path) = &self.path {
                    self.context
                        .metadata()
                        .set(path, KEY_ENCODING, self.encoding.name());
                }
                self.buffer.set_modified(false);
                self.finish_io();
                Ok(())
            }
            Err(err) => {
                log::warn!("{err}");
                self.state = DocumentState::SaveFailed;
                self.last_error = Some(err.clone());
                Err(err)
            }
        };
        DocumentEvent::Saved(result)
    }

    fn finish_io(&mut self) {
        self.state = DocumentState::Normal;
        self.last_error = None;
        self.last_save_or_load = Some(Instant::now());
    }

    /// Bind `path` (if given) and reset the MIME type. Binding releases the
    /// untitled number; unless the user picked a language, the one stored for
    /// the file is restored, or one is derived from the MIME type.
    fn set_path(&mut self, path: Option<PathBuf>, mime_type: Option<String>) {
        if let Some(path) = path {
            self.path = Some(path);
            if let Some(number) = self.untitled_number.take() {
                self.context.release_untitled(number);
            }
        }

        self.mime_type = mime_type.unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());

        if self.language_set_by_user {
            return;
        }
        let stored = self
            .path
            .as_deref()
            .and_then(|path| self.context.metadata().get(path, KEY_LANGUAGE));
        let language = match stored {
            Some(id) if id == NO_LANGUAGE => None,
            Some(id) => Some(id),
            None if self.mime_type != DEFAULT_MIME_TYPE => language_for_mime(&self.mime_type),
            None => None,
        };
        self.set_language(language.as_deref(), false);
    }

    /// Set the highlighting language id. A choice made by the user is
    /// remembered for the file and survives later reloads.
    pub fn set_language(&mut self, language: Option<&str>, set_by_user: bool) {
        self.language = language.map(str::to_string);
        self.language_set_by_user = set_by_user;

        if set_by_user && let Some(path) = &self.path {
            self.context
                .metadata()
                .set(path, KEY_LANGUAGE, language.unwrap_or(NO_LANGUAGE));
        }
    }

    /// Change the encoding used by the next [`Document::save`], remembering
    /// it for the file.
    pub fn set_encoding(&mut self, encoding: Encoding) {
        self.encoding = encoding;
        if let Some(path) = &self.path {
            self.context
                .metadata()
                .set(path, KEY_ENCODING, encoding.name());
        }
    }

    /// Move the cursor to the start of a zero-based line. Returns `false` if
    /// the line is past the end, in which case the cursor goes to the last line.
    pub fn goto_line(&mut self, line: usize) -> bool {
        self.buffer.place_cursor_at_line(line);
        line < self.buffer.len_lines()
    }

    /// Close the document, storing its cursor offset and user-chosen
    /// language for the file.
    pub fn close(self) {
        if let Some(path) = &self.path {
            let metadata = self.context.metadata();
            metadata.set(path, KEY_POSITION, &self.buffer.cursor().to_string());
            if self.language_set_by_user {
                metadata.set(
                    path,
                    KEY_LANGUAGE,
                    self.language.as_deref().unwrap_or(NO_LANGUAGE),
                );
            }
        }
        log::debug!("closed {}", self.display_name());
    }

    /// Cursor offset stored when the file was last closed.
    pub fn stored_position(&self) -> Option<usize> {
        let path = self.path.as_deref()?;
        self.context
            .metadata()
            .get(path, KEY_POSITION)
            .and_then(|value| value.parse().ok())
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn untitled_number(&self) -> Option<u32> {
        self.untitled_number
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn has_bom(&self) -> bool {
        self.has_bom
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn mtime(&self) -> Option<SystemTime> {
        self.mtime
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn language_set_by_user(&self) -> bool {
        self.language_set_by_user
    }

    pub fn buffer(&self) -> &TextBuffer {
        &self.buffer
    }

    /// Mutable access to the text, or `None` while a load or save owns it.
    pub fn buffer_mut(&mut self) -> Option<&mut TextBuffer> {
        if self.is_busy() {
            return None;
        }
        Some(&mut self.buffer)
    }

    pub fn state(&self) -> DocumentState {
        self.state
    }

    pub fn last_error(&self) -> Option<&FsError> {
        self.last_error.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loader.is_some()
    }

    pub fn is_saving(&self) -> bool {
        self.saver.is_some()
    }

    pub fn is_busy(&self) -> bool {
        self.is_loading() || self.is_saving()
    }

    pub fn is_modified(&self) -> bool {
        self.buffer.is_modified()
    }

    pub fn is_untitled(&self) -> bool {
        self.path.is_none()
    }

    /// Untitled and never edited.
    pub fn is_untouched(&self) -> bool {
        self.path.is_none() && !self.buffer.is_modified()
    }

    /// The bound file no longer exists on disk.
    pub fn is_deleted(&self) -> bool {
        self.path.as_deref().is_some_and(|path| !path.exists())
    }

    /// "Unsaved Document N" for untitled documents, the file name otherwise.
    pub fn display_name(&self) -> String {
        match (&self.path, self.untitled_number) {
            (Some(path), _) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            (None, Some(number)) => format!("Unsaved Document {number}"),
            (None, None) => "Unsaved Document".to_string(),
        }
    }

    /// Full path for titles and tooltips.
    pub fn path_for_display(&self) -> String {
        match &self.path {
            Some(path) => path.display().to_string(),
            None => self.display_name(),
        }
    }

    /// Time since the last successful load or save.
    pub fn time_since_last_save_or_load(&self) -> Option<Duration> {
        self.last_save_or_load.map(|at| at.elapsed())
    }
}

impl Drop for Document {
    fn drop(&mut self) {
        if let Some(number) = self.untitled_number.take() {
            self.context.release_untitled(number);
        }
    }
}

/// Language id for a MIME type, e.g. `text/x-python` -> `python`.
fn language_for_mime(mime_type: &str) -> Option<String> {
    let (_, subtype) = mime_type.split_once('/')?;
    let subtype = subtype.strip_prefix("x-").unwrap_or(subtype);
    let id = match subtype {
        "plain" | "octet-stream" => return None,
        "csrc" | "chdr" => "c",
        "c++src" | "c++hdr" => "cpp",
        "shellscript" => "sh",
        other => other,
    };
    Some(id.to_string())
}
