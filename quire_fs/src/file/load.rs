//! Staged file loading with encoding negotiation.
//!
//! A [`Loader`] performs one load. It is driven one phase at a time through
//! [`Loader::step`] so the caller's event loop stays responsive, and reports
//! through [`LoadEvent`]s: `Started`, any number of `Progress`, then exactly
//! one `Done`.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use super::info::{FileInfo, FileKind};
use crate::content_type::guess_mime_type;
use crate::encoding::{DetectionHints, Encoding, resolve_encoding};
use crate::error::{ErrorKind, FsError, UsageError};

/// Where decoded text ends up. Written once, after the whole file is decoded.
pub trait LoadTarget {
    /// Replace the whole content without recording an undo step and clear the
    /// modified flag.
    fn set_text_not_undoable(&mut self, text: String);
}

impl LoadTarget for String {
    fn set_text_not_undoable(&mut self, text: String) {
        *self = text;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LoaderPhase {
    Idle,
    Opening,
    GettingInfo,
    Reading,
    Converting,
    Completed,
    Failed,
    End,
}

impl LoaderPhase {
    pub fn name(self) -> &'static str {
        match self {
            LoaderPhase::Idle => "idle",
            LoaderPhase::Opening => "opening",
            LoaderPhase::GettingInfo => "getting-info",
            LoaderPhase::Reading => "reading",
            LoaderPhase::Converting => "converting",
            LoaderPhase::Completed => "completed",
            LoaderPhase::Failed => "failed",
            LoaderPhase::End => "end",
        }
    }
}

/// Configuration for one load.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Bytes read per `Reading` step (default: 64KB)
    pub chunk_size: usize,
    /// Auto-detection inputs, used when no encoding is requested
    pub hints: DetectionHints,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions {
            chunk_size: 64 * 1024,
            hints: DetectionHints::default(),
        }
    }
}

/// Result of a successful load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutcome {
    pub path: PathBuf,
    pub encoding: Encoding,
    /// The file started with a byte order mark.
    pub has_bom: bool,
    pub mime_type: String,
    pub mtime: Option<SystemTime>,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub enum LoadEvent {
    Started,
    Progress { read: u64, total: Option<u64> },
    Done(Result<LoadOutcome, FsError>),
}

/// Requests cancellation of a running load from elsewhere.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Single-use staged loader.
#[derive(Debug)]
pub struct Loader {
    options: LoadOptions,
    path: PathBuf,
    requested_encoding: Option<Encoding>,
    phase: LoaderPhase,
    file: Option<File>,
    content: Vec<u8>,
    bytes_total: Option<u64>,
    bytes_read: u64,
    decoded: Option<String>,
    detected_encoding: Option<Encoding>,
    has_bom: bool,
    mime_type: Option<String>,
    mtime: Option<SystemTime>,
    last_error: Option<FsError>,
    cancel: CancelHandle,
}

impl Loader {
    pub fn new(options: LoadOptions) -> Self {
        Loader {
            options,
            path: PathBuf::new(),
            requested_encoding: None,
            phase: LoaderPhase::Idle,
            file: None,
            content: Vec::new(),
            bytes_total: None,
            bytes_read: 0,
            decoded: None,
            detected_encoding: None,
            has_bom: false,
            mime_type: None,
            mtime: None,
            last_error: None,
            cancel: CancelHandle::default(),
        }
    }

    /// Begin loading `path`. Emits `Started`; the phases run on [`Loader::step`].
    pub fn load(
        &mut self,
        path: impl Into<PathBuf>,
        encoding: Option<Encoding>,
        emit: &mut dyn FnMut(&LoadEvent),
    ) -> Result<(), UsageError> {
        if self.phase != LoaderPhase::Idle {
            return Err(UsageError::LoaderNotIdle(self.phase.name()));
        }

        self.path = path.into();
        self.requested_encoding = encoding;
        log::debug!("load {}: start", self.path.display());
        self.set_phase(LoaderPhase::Opening);
        emit(&LoadEvent::Started);
        Ok(())
    }

    /// Execute one phase. Returns `true` while more work remains.
    pub fn step(&mut self, target: &mut dyn LoadTarget, emit: &mut dyn FnMut(&LoadEvent)) -> bool {
        if matches!(self.phase, LoaderPhase::Idle | LoaderPhase::End) {
            return false;
        }
        if self.cancel.is_cancelled() {
            self.fail(FsError::new(ErrorKind::Cancelled, &self.path), emit);
            return false;
        }

        let result = match self.phase {
            LoaderPhase::Opening => self.open(),
            LoaderPhase::GettingInfo => self.get_info(),
            LoaderPhase::Reading => self.read_chunk(emit),
            LoaderPhase::Converting => self.convert(),
            LoaderPhase::Completed => {
                self.complete(target, emit);
                return false;
            }
            LoaderPhase::Idle | LoaderPhase::Failed | LoaderPhase::End => return false,
        };

        match result {
            Ok(()) => true,
            Err(err) => {
                self.fail(err, emit);
                false
            }
        }
    }

    /// Drive the load to its terminal event.
    pub fn run(&mut self, target: &mut dyn LoadTarget, emit: &mut dyn FnMut(&LoadEvent)) {
        while self.step(target, emit) {}
    }

    fn open(&mut self) -> Result<(), FsError> {
        let file = File::open(&self.path).map_err(|err| FsError::from_io(err, &self.path))?;
        self.file = Some(file);
        self.set_phase(LoaderPhase::GettingInfo);
        Ok(())
    }

    fn get_info(&mut self) -> Result<(), FsError> {
        let Some(file) = self.file.as_ref() else {
            return Err(FsError::new(ErrorKind::IoFailure, &self.path));
        };
        let info = FileInfo::from_file(file).map_err(|err| FsError::from_io(err, &self.path))?;

        match info.kind {
            FileKind::Regular => {}
            FileKind::Directory => return Err(FsError::new(ErrorKind::IsDirectory, &self.path)),
            FileKind::Other => return Err(FsError::new(ErrorKind::NotRegularFile, &self.path)),
        }

        self.bytes_total = Some(info.size);
        self.mtime = info.mtime;
        self.content = Vec::with_capacity(usize::try_from(info.size).unwrap_or(0));
        self.set_phase(LoaderPhase::Reading);
        Ok(())
    }

    fn read_chunk(&mut self, emit: &mut dyn FnMut(&LoadEvent)) -> Result<(), FsError> {
        let Some(file) = self.file.as_mut() else {
            return Err(FsError::new(ErrorKind::IoFailure, &self.path));
        };

        let mut chunk = vec![0u8; self.options.chunk_size.max(1)];
        let n = loop {
            match file.read(&mut chunk) {
                Ok(n) => break n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    return Err(FsError::from_io(err, &self.path).with_kind(ErrorKind::IoFailure));
                }
            }
        };

        if n == 0 {
            self.file = None;
            self.set_phase(LoaderPhase::Converting);
            return Ok(());
        }

        self.content.extend_from_slice(&chunk[..n]);
        self.bytes_read += n as u64;
        emit(&LoadEvent::Progress {
            read: self.bytes_read,
            total: self.bytes_total,
        });
        Ok(())
    }

    fn convert(&mut self) -> Result<(), FsError> {
        let decoded = resolve_encoding(&self.content, self.requested_encoding, &self.options.hints)
            .map_err(|err| FsError::from_conversion(err, &self.path))?;

        log::debug!(
            "load {}: decoded as {}{}",
            self.path.display(),
            decoded.encoding,
            if decoded.bom { " with BOM" } else { "" }
        );
        self.detected_encoding = Some(decoded.encoding);
        self.has_bom = decoded.bom;
        self.decoded = Some(decoded.text);
        self.set_phase(LoaderPhase::Completed);
        Ok(())
    }

    fn complete(&mut self, target: &mut dyn LoadTarget, emit: &mut dyn FnMut(&LoadEvent)) {
        target.set_text_not_undoable(self.decoded.take().unwrap_or_default());

        let mime_type = guess_mime_type(Some(&self.path), &self.content);
        self.content = Vec::new();
        self.mime_type = Some(mime_type.clone());

        let outcome = LoadOutcome {
            path: self.path.clone(),
            encoding: self.detected_encoding.unwrap_or_default(),
            has_bom: self.has_bom,
            mime_type,
            mtime: self.mtime,
            size: self.bytes_read,
        };
        self.set_phase(LoaderPhase::End);
        emit(&LoadEvent::Done(Ok(outcome)));
    }

    fn fail(&mut self, err: FsError, emit: &mut dyn FnMut(&LoadEvent)) {
        log::debug!("load {}: {err}", self.path.display());
        self.file = None;
        self.content = Vec::new();
        self.decoded = None;
        self.last_error = Some(err.clone());
        self.set_phase(LoaderPhase::Failed);
        emit(&LoadEvent::Done(Err(err)));
        self.set_phase(LoaderPhase::End);
    }

    fn set_phase(&mut self, phase: LoaderPhase) {
        debug_assert!(phase >= self.phase, "loader phases only move forward");
        log::trace!("load {}: {} -> {}", self.path.display(), self.phase.name(), phase.name());
        self.phase = phase;
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn phase(&self) -> LoaderPhase {
        self.phase
    }

    pub fn is_finished(&self) -> bool {
        self.phase == LoaderPhase::End
    }

    pub fn requested_encoding(&self) -> Option<Encoding> {
        self.requested_encoding
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn bytes_total(&self) -> Option<u64> {
        self.bytes_total
    }

    pub fn detected_encoding(&self) -> Option<Encoding> {
        self.detected_encoding
    }

    pub fn has_bom(&self) -> bool {
        self.has_bom
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    pub fn mtime(&self) -> Option<SystemTime> {
        self.mtime
    }

    pub fn last_error(&self) -> Option<&FsError> {
        self.last_error.as_ref()
    }
}

/// Load `path` into `target` in one go, for callers without an event loop.
pub fn load_file(
    path: impl AsRef<Path>,
    encoding: Option<Encoding>,
    options: LoadOptions,
    target: &mut dyn LoadTarget,
) -> Result<LoadOutcome, FsError> {
    let path = path.as_ref();
    let mut loader = Loader::new(options);
    let mut result = None;
    let mut emit = |event: &LoadEvent| {
        if let LoadEvent::Done(done) = event {
            result = Some(done.clone());
        }
    };

    // A fresh loader is always idle.
    if loader.load(path, encoding, &mut emit).is_err() {
        return Err(FsError::new(ErrorKind::IoFailure, path));
    }
    loader.run(target, &mut emit);
    result.unwrap_or_else(|| Err(FsError::new(ErrorKind::IoFailure, path)))
}
