//! Staged saving with backups and safe replacement of the destination.
//!
//! A [`Saver`] performs one save of a text snapshot. New files are created
//! exclusively. Existing files are replaced either by renaming a fully
//! written temporary file over them (fast path) or, when that is not
//! possible, by copying the original to a backup and rewriting it in place.
//! Either way the destination is fully replaced or left as it was.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::backup::{
    DEFAULT_BACKUP_SUFFIX, backup_path, copy_ownership, copy_to_backup, create_save_temp,
    discard_backup,
};
use super::info::{FileInfo, FileKind};
use crate::content_type::guess_mime_type;
use crate::encoding::{Encoding, encode};
use crate::error::{ErrorKind, FsError, UsageError};

/// Configuration for file saving operations
#[derive(Debug, Clone)]
pub struct SaveOptions {
    /// Keep the backup of the previous content after a successful save
    pub keep_backup: bool,
    /// Suffix appended to backup names (default: "~")
    pub backup_suffix: String,
    /// Directory for backups instead of the destination's directory
    pub backup_dir: Option<PathBuf>,
    /// Append a final newline when the text does not end with one
    pub ensure_trailing_newline: bool,
    /// Prepend the encoding's byte order mark
    pub write_bom: bool,
    /// Skip the external modification check
    pub ignore_mtime: bool,
    /// Bytes written between progress events (default: 64KB)
    pub chunk_size: usize,
}

impl Default for SaveOptions {
    fn default() -> Self {
        SaveOptions {
            keep_backup: false,
            backup_suffix: DEFAULT_BACKUP_SUFFIX.to_string(),
            backup_dir: None,
            ensure_trailing_newline: true,
            write_bom: false,
            ignore_mtime: false,
            chunk_size: 64 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SaverPhase {
    Idle,
    Opening,
    Writing,
    Completed,
    Failed,
}

impl SaverPhase {
    pub fn name(self) -> &'static str {
        match self {
            SaverPhase::Idle => "idle",
            SaverPhase::Opening => "opening",
            SaverPhase::Writing => "writing",
            SaverPhase::Completed => "completed",
            SaverPhase::Failed => "failed",
        }
    }
}

/// How the destination was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStrategy {
    /// The destination did not exist and was created.
    NewFile,
    /// Temporary file renamed over the original.
    Rename,
    /// Original copied to the backup, then rewritten in place.
    Copy,
}

/// Result of a successful save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    pub path: PathBuf,
    pub encoding: Encoding,
    pub mime_type: String,
    pub mtime: Option<SystemTime>,
    pub size: u64,
    pub strategy: SaveStrategy,
    /// Backup of the previous content, when one was kept.
    pub backup: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub enum SaveEvent {
    Started,
    Progress { written: u64, total: u64 },
    Done(Result<SaveOutcome, FsError>),
}

#[derive(Debug)]
enum Target {
    Create,
    Replace { file: File, info: FileInfo },
}

enum FastPath {
    Saved,
    Unavailable,
}

/// Single-use staged saver.
#[derive(Debug)]
pub struct Saver {
    options: SaveOptions,
    path: PathBuf,
    encoding: Encoding,
    previous_mtime: Option<SystemTime>,
    snapshot: String,
    phase: SaverPhase,
    content: Vec<u8>,
    target: Option<Target>,
    bytes_total: u64,
    bytes_written: u64,
    strategy: Option<SaveStrategy>,
    backup: Option<PathBuf>,
    last_error: Option<FsError>,
    #[cfg(test)]
    fail_replace: bool,
}

impl Saver {
    pub fn new(options: SaveOptions) -> Self {
        Saver {
            options,
            path: PathBuf::new(),
            encoding: Encoding::Utf8,
            previous_mtime: None,
            snapshot: String::new(),
            phase: SaverPhase::Idle,
            content: Vec::new(),
            target: None,
            bytes_total: 0,
            bytes_written: 0,
            strategy: None,
            backup: None,
            last_error: None,
            #[cfg(test)]
            fail_replace: false,
        }
    }

    /// Begin saving a snapshot of `text` to `path`. Emits `Started`.
    ///
    /// With `previous_mtime`, the save fails with `ExternallyModified` when
    /// the file on disk changed since then (unless `ignore_mtime` is set).
    pub fn save(
        &mut self,
        path: impl Into<PathBuf>,
        text: &str,
        encoding: Encoding,
        previous_mtime: Option<SystemTime>,
        emit: &mut dyn FnMut(&SaveEvent),
    ) -> Result<(), UsageError> {
        if self.phase != SaverPhase::Idle {
            return Err(UsageError::SaverNotIdle(self.phase.name()));
        }

        self.path = path.into();
        self.snapshot = text.to_owned();
        self.encoding = encoding;
        self.previous_mtime = previous_mtime;
        log::debug!("save {}: start ({encoding})", self.path.display());
        self.set_phase(SaverPhase::Opening);
        emit(&SaveEvent::Started);
        Ok(())
    }

    /// Execute one phase. Returns `true` while more work remains.
    pub fn step(&mut self, emit: &mut dyn FnMut(&SaveEvent)) -> bool {
        let result = match self.phase {
            SaverPhase::Opening => self.open(),
            SaverPhase::Writing => self.write(emit),
            SaverPhase::Idle | SaverPhase::Completed | SaverPhase::Failed => return false,
        };

        match result {
            Ok(()) if self.phase == SaverPhase::Completed => {
                self.complete(emit);
                false
            }
            Ok(()) => true,
            Err(err) => {
                self.fail(err, emit);
                false
            }
        }
    }

    /// Drive the save to its terminal event.
    pub fn run(&mut self, emit: &mut dyn FnMut(&SaveEvent)) {
        while self.step(emit) {}
    }

    fn open(&mut self) -> Result<(), FsError> {
        self.content = self.prepare_content()?;
        self.bytes_total = self.content.len() as u64;

        let info = match FileInfo::from_path(&self.path) {
            Ok(info) => info,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                self.target = Some(Target::Create);
                self.set_phase(SaverPhase::Writing);
                return Ok(());
            }
            Err(err) => return Err(FsError::from_io(err, &self.path)),
        };

        match info.kind {
            FileKind::Regular => {}
            FileKind::Directory => return Err(FsError::new(ErrorKind::IsDirectory, &self.path)),
            FileKind::Other => return Err(FsError::new(ErrorKind::NotRegularFile, &self.path)),
        }
        if info.is_read_only() {
            return Err(FsError::new(ErrorKind::ReadOnly, &self.path));
        }
        if let Some(previous) = self.previous_mtime
            && !self.options.ignore_mtime
            && info.mtime != Some(previous)
        {
            return Err(FsError::new(ErrorKind::ExternallyModified, &self.path));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|err| {
                let read_only = err.kind() == io::ErrorKind::PermissionDenied;
                let err = FsError::from_io(err, &self.path);
                if read_only {
                    err.with_kind(ErrorKind::ReadOnly)
                } else {
                    err
                }
            })?;

        self.target = Some(Target::Replace { file, info });
        self.set_phase(SaverPhase::Writing);
        Ok(())
    }

    /// Encode the snapshot, with the final newline and BOM policies applied.
    fn prepare_content(&mut self) -> Result<Vec<u8>, FsError> {
        let mut text = std::mem::take(&mut self.snapshot);
        if self.options.ensure_trailing_newline && !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }

        let encoded =
            encode(&text, self.encoding).map_err(|err| FsError::from_conversion(err, &self.path))?;

        let bom = if self.options.write_bom {
            self.encoding.bom()
        } else {
            &[]
        };
        let mut content = Vec::with_capacity(bom.len() + encoded.len());
        content.extend_from_slice(bom);
        content.extend_from_slice(&encoded);
        Ok(content)
    }

    fn write(&mut self, emit: &mut dyn FnMut(&SaveEvent)) -> Result<(), FsError> {
        match self.target.take() {
            Some(Target::Create) => self.write_new(emit)?,
            Some(Target::Replace { mut file, info }) => self.write_existing(&mut file, &info, emit)?,
            None => return Err(FsError::new(ErrorKind::IoFailure, &self.path)),
        }
        self.set_phase(SaverPhase::Completed);
        Ok(())
    }

    fn write_new(&mut self, emit: &mut dyn FnMut(&SaveEvent)) -> Result<(), FsError> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .map_err(|err| FsError::from_io(err, &self.path))?;

        self.write_content(&mut file, emit)
            .map_err(|err| FsError::from_io(err, &self.path).with_kind(ErrorKind::IoFailure))?;
        self.strategy = Some(SaveStrategy::NewFile);
        Ok(())
    }

    fn write_existing(
        &mut self,
        file: &mut File,
        info: &FileInfo,
        emit: &mut dyn FnMut(&SaveEvent),
    ) -> Result<(), FsError> {
        let backup = backup_path(
            &self.path,
            &self.options.backup_suffix,
            self.options.backup_dir.as_deref(),
            self.options.keep_backup,
        );
        if let Some(dir) = &self.options.backup_dir {
            fs::create_dir_all(dir).map_err(|err| {
                FsError::from_io(err, dir)
                    .with_kind(ErrorKind::IoFailure)
                    .with_detail("cannot create backup directory")
            })?;
        }

        if self.can_rename(info, &backup) {
            if let FastPath::Saved = self.save_by_rename(info, &backup, emit)? {
                self.strategy = Some(SaveStrategy::Rename);
                self.finish_backup(backup);
                return Ok(());
            }
            // Retrying from scratch, so progress restarts too.
            self.bytes_written = 0;
        }

        self.save_by_copy(file, info, &backup, emit)?;
        self.strategy = Some(SaveStrategy::Copy);
        self.finish_backup(backup);
        Ok(())
    }

    /// Renames only work within one filesystem, and would break hard and
    /// symbolic links.
    fn can_rename(&self, info: &FileInfo, backup: &Path) -> bool {
        if info.nlink > 1 || info.is_symlink {
            return false;
        }
        match &self.options.backup_dir {
            None => true,
            Some(_) => backup
                .parent()
                .and_then(|dir| FileInfo::from_path(dir).ok())
                .is_some_and(|dir| dir.device_id == info.device_id),
        }
    }

    fn save_by_rename(
        &mut self,
        info: &FileInfo,
        backup: &Path,
        emit: &mut dyn FnMut(&SaveEvent),
    ) -> Result<FastPath, FsError> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut temp = match create_save_temp(&dir) {
            Ok(temp) => temp,
            Err(err) => {
                log::debug!("save {}: no temp file ({err}), copying", self.path.display());
                return Ok(FastPath::Unavailable);
            }
        };
        if !copy_ownership(temp.as_file(), info) {
            log::debug!("save {}: cannot copy ownership, copying", self.path.display());
            return Ok(FastPath::Unavailable);
        }

        // Dropping `temp` on any early return removes it.
        self.write_content(temp.as_file_mut(), emit)
            .map_err(|err| FsError::from_io(err, &self.path).with_kind(ErrorKind::IoFailure))?;

        fs::rename(&self.path, backup).map_err(|err| FsError::from_io(err, &self.path))?;

        if let Err(err) = self.replace_with(temp) {
            if let Err(restore) = fs::rename(backup, &self.path) {
                log::warn!(
                    "save {}: could not restore original from {}: {restore}",
                    self.path.display(),
                    backup.display()
                );
            }
            return Err(FsError::from_io(err, &self.path).with_kind(ErrorKind::IoFailure));
        }
        Ok(FastPath::Saved)
    }

    fn replace_with(&self, temp: tempfile::NamedTempFile) -> io::Result<()> {
        if self.replace_blocked() {
            return Err(io::Error::other("injected rename failure"));
        }
        temp.persist(&self.path).map(|_| ()).map_err(|err| err.error)
    }

    #[cfg(test)]
    fn replace_blocked(&self) -> bool {
        self.fail_replace
    }

    #[cfg(not(test))]
    fn replace_blocked(&self) -> bool {
        false
    }

    fn save_by_copy(
        &mut self,
        file: &mut File,
        info: &FileInfo,
        backup: &Path,
        emit: &mut dyn FnMut(&SaveEvent),
    ) -> Result<(), FsError> {
        copy_to_backup(file, info, backup).map_err(|err| {
            FsError::from_io(err, backup)
                .with_kind(ErrorKind::IoFailure)
                .with_detail("cannot back up the original")
        })?;

        self.rewrite_in_place(file, emit)
            .map_err(|err| FsError::from_io(err, &self.path).with_kind(ErrorKind::IoFailure))
    }

    fn rewrite_in_place(&mut self, file: &mut File, emit: &mut dyn FnMut(&SaveEvent)) -> io::Result<()> {
        file.seek(SeekFrom::Start(0))?;
        file.set_len(0)?;
        self.write_content(file, emit)
    }

    fn finish_backup(&mut self, backup: PathBuf) {
        if self.options.keep_backup {
            self.backup = Some(backup);
        } else {
            discard_backup(&backup);
        }
    }

    fn write_content(&mut self, file: &mut File, emit: &mut dyn FnMut(&SaveEvent)) -> io::Result<()> {
        let chunk_size = self.options.chunk_size.max(1);
        self.bytes_written = 0;

        for chunk in self.content.chunks(chunk_size) {
            file.write_all(chunk)?;
            self.bytes_written += chunk.len() as u64;
            emit(&SaveEvent::Progress {
                written: self.bytes_written,
                total: self.bytes_total,
            });
        }

        file.flush()?;
        file.sync_all()
    }

    fn complete(&mut self, emit: &mut dyn FnMut(&SaveEvent)) {
        let mtime = match FileInfo::from_path(&self.path) {
            Ok(info) => info.mtime,
            Err(err) => {
                log::warn!("save {}: cannot stat result: {err}", self.path.display());
                None
            }
        };
        let mime_type = guess_mime_type(Some(&self.path), &self.content);
        self.content = Vec::new();

        let outcome = SaveOutcome {
            path: self.path.clone(),
            encoding: self.encoding,
            mime_type,
            mtime,
            size: self.bytes_written,
            strategy: self.strategy.unwrap_or(SaveStrategy::NewFile),
            backup: self.backup.clone(),
        };
        log::debug!(
            "save {}: completed ({:?}, {} bytes)",
            self.path.display(),
            outcome.strategy,
            outcome.size
        );
        emit(&SaveEvent::Done(Ok(outcome)));
    }

    fn fail(&mut self, err: FsError, emit: &mut dyn FnMut(&SaveEvent)) {
        log::debug!("save {}: {err}", self.path.display());
        self.target = None;
        self.content = Vec::new();
        self.last_error = Some(err.clone());
        self.set_phase(SaverPhase::Failed);
        emit(&SaveEvent::Done(Err(err)));
    }

    fn set_phase(&mut self, phase: SaverPhase) {
        debug_assert!(phase >= self.phase, "saver phases only move forward");
        log::trace!("save {}: {} -> {}", self.path.display(), self.phase.name(), phase.name());
        self.phase = phase;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn phase(&self) -> SaverPhase {
        self.phase
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, SaverPhase::Completed | SaverPhase::Failed)
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn bytes_total(&self) -> u64 {
        self.bytes_total
    }

    pub fn strategy(&self) -> Option<SaveStrategy> {
        self.strategy
    }

    pub fn last_error(&self) -> Option<&FsError> {
        self.last_error.as_ref()
    }
}

/// Save `text` to `path` in one go, for callers without an event loop.
pub fn save_file(
    path: impl AsRef<Path>,
    text: &str,
    encoding: Encoding,
    options: SaveOptions,
) -> Result<SaveOutcome, FsError> {
    let path = path.as_ref();
    let mut saver = Saver::new(options);
    let mut result = None;
    let mut emit = |event: &SaveEvent| {
        if let SaveEvent::Done(done) = event {
            result = Some(done.clone());
        }
    };

    // A fresh saver is always idle.
    if saver.save(path, text, encoding, None, &mut emit).is_err() {
        return Err(FsError::new(ErrorKind::IoFailure, path));
    }
    saver.run(&mut emit);
    result.unwrap_or_else(|| Err(FsError::new(ErrorKind::IoFailure, path)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn run_save(
        saver: &mut Saver,
        path: &Path,
        text: &str,
        encoding: Encoding,
        previous_mtime: Option<SystemTime>,
    ) -> Vec<SaveEvent> {
        let mut events = Vec::new();
        let mut emit = |event: &SaveEvent| events.push(event.clone());
        saver.save(path, text, encoding, previous_mtime, &mut emit).unwrap();
        saver.run(&mut emit);
        events
    }

    fn outcome(events: &[SaveEvent]) -> Result<SaveOutcome, FsError> {
        let mut done = events.iter().filter_map(|e| match e {
            SaveEvent::Done(result) => Some(result.clone()),
            _ => None,
        });
        let result = done.next().expect("no terminal event");
        assert!(done.next().is_none(), "more than one terminal event");
        result
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_save_new_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("new.txt");

        let mut saver = Saver::new(SaveOptions::default());
        let events = run_save(&mut saver, &path, "héllo", Encoding::Utf8, None);

        let outcome = outcome(&events).unwrap();
        assert_eq!(outcome.strategy, SaveStrategy::NewFile);
        assert_eq!(outcome.size, 7);
        assert!(outcome.mtime.is_some());
        assert_eq!(fs::read(&path).unwrap(), "héllo\n".as_bytes());
        assert_eq!(saver.phase(), SaverPhase::Completed);
        assert!(matches!(events.first(), Some(SaveEvent::Started)));
    }

    #[test]
    fn test_trailing_newline_not_duplicated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        save_file(&path, "line\n", Encoding::Utf8, SaveOptions::default()).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "line\n");

        let options = SaveOptions {
            ensure_trailing_newline: false,
            ..SaveOptions::default()
        };
        save_file(&path, "line", Encoding::Utf8, options).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "line");

        save_file(&path, "", Encoding::Utf8, SaveOptions::default()).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn test_replace_existing_by_rename() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.txt");
        fs::write(&path, "old\n").unwrap();

        let mut saver = Saver::new(SaveOptions::default());
        let events = run_save(&mut saver, &path, "new\n", Encoding::Utf8, None);
        let outcome = outcome(&events).unwrap();

        assert_eq!(outcome.strategy, SaveStrategy::Rename);
        assert_eq!(outcome.backup, None);
        assert_eq!(fs::read_to_string(&path).unwrap(), "new\n");
        // No backup and no temp file left behind.
        assert_eq!(dir_entries(dir.path()), vec!["doc.txt".to_string()]);
    }

    #[test]
    fn test_keep_backup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.txt");
        fs::write(&path, "old\n").unwrap();

        let options = SaveOptions {
            keep_backup: true,
            ..SaveOptions::default()
        };
        let mut saver = Saver::new(options);
        let events = run_save(&mut saver, &path, "new\n", Encoding::Utf8, None);
        let outcome = outcome(&events).unwrap();

        let backup = dir.path().join("doc.txt~");
        assert_eq!(outcome.backup.as_deref(), Some(backup.as_path()));
        assert_eq!(fs::read_to_string(&backup).unwrap(), "old\n");
        assert_eq!(fs::read_to_string(&path).unwrap(), "new\n");
    }

    #[test]
    fn test_backup_dir() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.txt");
        let backups = dir.path().join("backups");
        fs::write(&path, "old\n").unwrap();

        let options = SaveOptions {
            keep_backup: true,
            backup_suffix: ".bak".to_string(),
            backup_dir: Some(backups.clone()),
            ..SaveOptions::default()
        };
        save_file(&path, "new\n", Encoding::Utf8, options).unwrap();
        assert_eq!(fs::read_to_string(backups.join("doc.txt.bak")).unwrap(), "old\n");
    }

    #[test]
    fn test_unusable_backup_dir() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.txt");
        let not_a_dir = dir.path().join("backups");
        fs::write(&path, "old\n").unwrap();
        fs::write(&not_a_dir, "").unwrap();

        let options = SaveOptions {
            backup_dir: Some(not_a_dir.clone()),
            ..SaveOptions::default()
        };
        let mut saver = Saver::new(options);
        let events = run_save(&mut saver, &path, "new\n", Encoding::Utf8, None);
        let err = outcome(&events).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::IoFailure);
        assert_eq!(err.path(), not_a_dir);
        assert!(err.to_string().contains("cannot create backup directory"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "old\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_hard_link_uses_copy_and_keeps_link() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.txt");
        let link = dir.path().join("link.txt");
        fs::write(&path, "old\n").unwrap();
        fs::hard_link(&path, &link).unwrap();

        let mut saver = Saver::new(SaveOptions::default());
        let events = run_save(&mut saver, &path, "new\n", Encoding::Utf8, None);
        assert_eq!(outcome(&events).unwrap().strategy, SaveStrategy::Copy);

        assert_eq!(fs::read_to_string(&link).unwrap(), "new\n");
        assert_eq!(FileInfo::from_path(&path).unwrap().nlink, 2);
        assert!(!dir.path().join("doc.txt~").exists());
    }

    #[test]
    fn test_existing_backup_name_is_left_alone() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("foo.txt");
        let user_backup = dir.path().join("foo.txt~");
        fs::write(&path, "old\n").unwrap();
        fs::write(&user_backup, "user backup\n").unwrap();

        let mut saver = Saver::new(SaveOptions::default());
        let events = run_save(&mut saver, &path, "new\n", Encoding::Utf8, None);
        let outcome = outcome(&events).unwrap();

        assert_eq!(outcome.strategy, SaveStrategy::Rename);
        assert_eq!(outcome.backup, None);
        assert_eq!(fs::read_to_string(&path).unwrap(), "new\n");
        assert_eq!(fs::read_to_string(&user_backup).unwrap(), "user backup\n");
        assert_eq!(dir_entries(dir.path()), vec!["foo.txt", "foo.txt~"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_existing_backup_name_is_left_alone_when_copying() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("foo.txt");
        let user_backup = dir.path().join("foo.txt~");
        fs::write(&path, "old\n").unwrap();
        fs::write(&user_backup, "user backup\n").unwrap();
        fs::hard_link(&path, dir.path().join("alias.txt")).unwrap();

        let mut saver = Saver::new(SaveOptions::default());
        let events = run_save(&mut saver, &path, "new\n", Encoding::Utf8, None);
        let outcome = outcome(&events).unwrap();

        assert_eq!(outcome.strategy, SaveStrategy::Copy);
        assert_eq!(outcome.backup, None);
        assert_eq!(fs::read_to_string(dir.path().join("alias.txt")).unwrap(), "new\n");
        assert_eq!(fs::read_to_string(&user_backup).unwrap(), "user backup\n");
        assert_eq!(
            dir_entries(dir.path()),
            vec!["alias.txt", "foo.txt", "foo.txt~"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_uses_copy() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("target.txt");
        let link = dir.path().join("link.txt");
        fs::write(&target, "old\n").unwrap();
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let mut saver = Saver::new(SaveOptions::default());
        let events = run_save(&mut saver, &link, "new\n", Encoding::Utf8, None);
        assert_eq!(outcome(&events).unwrap().strategy, SaveStrategy::Copy);

        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(&target).unwrap(), "new\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_permissions_preserved() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.sh");
        fs::write(&path, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o750)).unwrap();

        save_file(&path, "#!/bin/sh\necho hi\n", Encoding::Utf8, SaveOptions::default()).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o750);
    }

    #[cfg(unix)]
    #[test]
    fn test_read_only_destination() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ro.txt");
        fs::write(&path, "keep\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o444)).unwrap();

        let mut saver = Saver::new(SaveOptions::default());
        let events = run_save(&mut saver, &path, "new\n", Encoding::Utf8, None);
        let err = outcome(&events).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ReadOnly);
        assert_eq!(saver.phase(), SaverPhase::Failed);
        assert_eq!(fs::read_to_string(&path).unwrap(), "keep\n");
    }

    #[test]
    fn test_directory_destination() {
        let dir = TempDir::new().unwrap();
        let mut saver = Saver::new(SaveOptions::default());
        let events = run_save(&mut saver, dir.path(), "x", Encoding::Utf8, None);
        assert_eq!(outcome(&events).unwrap_err().kind(), ErrorKind::IsDirectory);
    }

    #[test]
    fn test_unrepresentable_text() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("latin.txt");
        fs::write(&path, "keep\n").unwrap();

        let latin9 = Encoding::for_label("ISO-8859-15").unwrap();
        let mut saver = Saver::new(SaveOptions::default());
        let events = run_save(&mut saver, &path, "snow ☃", latin9, None);
        assert_eq!(
            outcome(&events).unwrap_err().kind(),
            ErrorKind::InvalidByteSequence
        );
        assert_eq!(fs::read_to_string(&path).unwrap(), "keep\n");
    }

    #[test]
    fn test_externally_modified() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.txt");
        fs::write(&path, "disk\n").unwrap();
        let stale = SystemTime::UNIX_EPOCH;

        let mut saver = Saver::new(SaveOptions::default());
        let events = run_save(&mut saver, &path, "mine\n", Encoding::Utf8, Some(stale));
        assert_eq!(
            outcome(&events).unwrap_err().kind(),
            ErrorKind::ExternallyModified
        );
        assert_eq!(fs::read_to_string(&path).unwrap(), "disk\n");

        let options = SaveOptions {
            ignore_mtime: true,
            ..SaveOptions::default()
        };
        let mut saver = Saver::new(options);
        let events = run_save(&mut saver, &path, "mine\n", Encoding::Utf8, Some(stale));
        assert!(outcome(&events).is_ok());
        assert_eq!(fs::read_to_string(&path).unwrap(), "mine\n");
    }

    #[test]
    fn test_matching_mtime_is_accepted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.txt");
        fs::write(&path, "disk\n").unwrap();
        let mtime = FileInfo::from_path(&path).unwrap().mtime;

        let mut saver = Saver::new(SaveOptions::default());
        let events = run_save(&mut saver, &path, "mine\n", Encoding::Utf8, mtime);
        assert!(outcome(&events).is_ok());
    }

    #[test]
    fn test_failed_replace_restores_original() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.txt");
        fs::write(&path, "original\n").unwrap();

        let mut saver = Saver::new(SaveOptions::default());
        saver.fail_replace = true;
        let events = run_save(&mut saver, &path, "replacement\n", Encoding::Utf8, None);

        assert_eq!(outcome(&events).unwrap_err().kind(), ErrorKind::IoFailure);
        assert_eq!(fs::read_to_string(&path).unwrap(), "original\n");
        assert_eq!(dir_entries(dir.path()), vec!["doc.txt".to_string()]);
    }

    #[test]
    fn test_bom_and_utf16() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wide.txt");
        let options = SaveOptions {
            write_bom: true,
            ..SaveOptions::default()
        };
        save_file(&path, "hi", Encoding::Utf16Le, options).unwrap();
        assert_eq!(
            fs::read(&path).unwrap(),
            vec![0xFF, 0xFE, b'h', 0, b'i', 0, b'\n', 0]
        );
    }

    #[test]
    fn test_progress_events() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("p.txt");
        let options = SaveOptions {
            chunk_size: 4,
            ..SaveOptions::default()
        };
        let mut saver = Saver::new(options);
        let events = run_save(&mut saver, &path, "0123456789", Encoding::Utf8, None);

        let progress: Vec<(u64, u64)> = events
            .iter()
            .filter_map(|e| match e {
                SaveEvent::Progress { written, total } => Some((*written, *total)),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![(4, 11), (8, 11), (11, 11)]);
    }

    #[test]
    fn test_saver_is_single_use() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        let mut saver = Saver::new(SaveOptions::default());
        run_save(&mut saver, &path, "x", Encoding::Utf8, None);

        let err = saver
            .save(&path, "y", Encoding::Utf8, None, &mut |_: &SaveEvent| {})
            .unwrap_err();
        assert_eq!(err, UsageError::SaverNotIdle("completed"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "x\n");
    }
}
