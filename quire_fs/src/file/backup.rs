//! Backup naming and the filesystem primitives of the two save strategies.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tempfile::{Builder, NamedTempFile};

use super::info::FileInfo;

/// Prefix of the temporary file written next to the destination.
pub const SAVE_TEMP_PREFIX: &str = ".quire-save-";

/// Default suffix appended to backup names.
pub const DEFAULT_BACKUP_SUFFIX: &str = "~";

/// Name of the backup for `dest`.
///
/// `<dest><suffix>`, or `<backup_dir>/<file name><suffix>` when a backup
/// directory is given. When backups are not kept and that name is taken, the
/// character just before the suffix is replaced by `z`, `y`, ... `b` and the
/// first free name wins; if every candidate exists the base name is used.
pub fn backup_path(
    dest: &Path,
    suffix: &str,
    backup_dir: Option<&Path>,
    keep_backup: bool,
) -> PathBuf {
    let suffix = if suffix.is_empty() {
        DEFAULT_BACKUP_SUFFIX
    } else {
        suffix
    };

    let file_name = dest
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let dir = match backup_dir {
        Some(dir) => dir.to_path_buf(),
        None => dest.parent().map(Path::to_path_buf).unwrap_or_default(),
    };

    let base = dir.join(format!("{file_name}{suffix}"));
    if keep_backup || !base.exists() {
        return base;
    }

    let mut stem = file_name;
    if stem.pop().is_none() {
        return base;
    }
    for replacement in ('b'..='z').rev() {
        let candidate = dir.join(format!("{stem}{replacement}{suffix}"));
        if !candidate.exists() {
            return candidate;
        }
    }

    log::warn!("all backup names for {} are taken", dest.display());
    base
}

/// Create a uniquely named `.quire-save-XXXXXX` file in `dir`.
///
/// The file is removed when the handle is dropped without being persisted.
pub fn create_save_temp(dir: &Path) -> io::Result<NamedTempFile> {
    Builder::new()
        .prefix(SAVE_TEMP_PREFIX)
        .rand_bytes(6)
        .tempfile_in(dir)
}

/// Give `file` the owner, group and permission bits of `original`.
///
/// Returns `false` when neither ownership nor permissions could be applied.
#[cfg(unix)]
pub fn copy_ownership(file: &File, original: &FileInfo) -> bool {
    use std::os::unix::fs::{PermissionsExt, fchown};

    let owned = fchown(file, Some(original.uid), Some(original.gid)).is_ok();
    let permitted = file
        .set_permissions(fs::Permissions::from_mode(original.mode))
        .is_ok();
    owned || permitted
}

#[cfg(not(unix))]
pub fn copy_ownership(file: &File, original: &FileInfo) -> bool {
    let mut permissions = match file.metadata() {
        Ok(meta) => meta.permissions(),
        Err(_) => return false,
    };
    permissions.set_readonly(original.is_read_only());
    file.set_permissions(permissions).is_ok()
}

/// Copy the current content of `original` into a fresh backup at `backup`.
///
/// A stale backup is removed first. The backup is created exclusively with
/// the original's permission bits; its group is set to the original's, or
/// failing that the "other" bits are mirrored onto the group bits.
pub fn copy_to_backup(original: &mut File, info: &FileInfo, backup: &Path) -> io::Result<()> {
    match fs::remove_file(backup) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }

    let mut backup_file = create_backup_file(backup, info)?;

    original.seek(SeekFrom::Start(0))?;
    io::copy(original, &mut backup_file)?;
    backup_file.sync_all()
}

#[cfg(unix)]
fn create_backup_file(backup: &Path, info: &FileInfo) -> io::Result<File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt, fchown};

    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(info.mode & 0o777)
        .open(backup)?;

    if fchown(&file, None, Some(info.gid)).is_err() {
        let mode = (info.mode & 0o707) | ((info.mode & 0o7) << 3);
        file.set_permissions(fs::Permissions::from_mode(mode))?;
    }
    Ok(file)
}

#[cfg(not(unix))]
fn create_backup_file(backup: &Path, _info: &FileInfo) -> io::Result<File> {
    OpenOptions::new().write(true).create_new(true).open(backup)
}

/// Remove a backup that is not meant to be kept. Failure is only logged.
pub fn discard_backup(backup: &Path) {
    if let Err(err) = fs::remove_file(backup) {
        if err.kind() != io::ErrorKind::NotFound {
            log::warn!("failed to remove backup {}: {err}", backup.display());
        }
    }
}
