//! Stat snapshots used by the loader and the saver.
//!
//! Captures the metadata needed to decide between save strategies (link
//! count, ownership, device) and to notice external modification (mtime).

use std::fs::{self, File, Metadata};
use std::io;
use std::path::Path;
use std::time::SystemTime;

/// What a path points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Regular,
    Directory,
    Other,
}

/// Stat snapshot of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub kind: FileKind,
    pub size: u64,
    pub mtime: Option<SystemTime>,
    /// Device ID (Unix), 0 elsewhere
    pub device_id: u64,
    /// Inode number (Unix), 0 elsewhere
    pub inode: u64,
    /// Hard link count, 1 where unknown
    pub nlink: u64,
    /// Permission bits (Unix mode & 0o7777)
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    /// The path itself is a symbolic link.
    pub is_symlink: bool,
}

impl FileInfo {
    /// Stat `path`, following symlinks, and record whether it was one.
    pub fn from_path<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        let is_symlink = fs::symlink_metadata(path)
            .map(|meta| meta.file_type().is_symlink())
            .unwrap_or(false);
        let metadata = fs::metadata(path)?;
        Ok(Self::from_metadata(&metadata, is_symlink))
    }

    /// Stat an open handle.
    pub fn from_file(file: &File) -> io::Result<Self> {
        let metadata = file.metadata()?;
        Ok(Self::from_metadata(&metadata, false))
    }

    pub fn from_metadata(metadata: &Metadata, is_symlink: bool) -> Self {
        let file_type = metadata.file_type();
        let kind = if file_type.is_file() {
            FileKind::Regular
        } else if file_type.is_dir() {
            FileKind::Directory
        } else {
            FileKind::Other
        };

        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            FileInfo {
                kind,
                size: metadata.size(),
                mtime: metadata.modified().ok(),
                device_id: metadata.dev(),
                inode: metadata.ino(),
                nlink: metadata.nlink(),
                mode: metadata.mode() & 0o7777,
                uid: metadata.uid(),
                gid: metadata.gid(),
                is_symlink,
            }
        }

        #[cfg(not(unix))]
        {
            FileInfo {
                kind,
                size: metadata.len(),
                mtime: metadata.modified().ok(),
                device_id: 0,
                inode: 0,
                nlink: 1,
                mode: if metadata.permissions().readonly() { 0o444 } else { 0o644 },
                uid: 0,
                gid: 0,
                is_symlink,
            }
        }
    }

    pub fn is_regular(&self) -> bool {
        self.kind == FileKind::Regular
    }

    /// No write permission bit is set for anyone.
    pub fn is_read_only(&self) -> bool {
        self.mode & 0o222 == 0
    }

    /// Same device and inode. Never true where inodes are not reported.
    pub fn is_same_file(&self, other: &FileInfo) -> bool {
        self.inode != 0 && self.device_id == other.device_id && self.inode == other.inode
    }

}
