//! File operations: staged loading and saving.
//!
//! This module provides:
//! - The phased [`Loader`](load::Loader) with cancellation and progress events
//! - The phased [`Saver`](save::Saver) with rename and copy backup strategies
//! - Stat snapshots used to pick a strategy and detect external changes

pub mod backup;
pub mod info;
pub mod load;
pub mod save;

pub use backup::{DEFAULT_BACKUP_SUFFIX, SAVE_TEMP_PREFIX, backup_path};
pub use info::{FileInfo, FileKind};
pub use load::{
    CancelHandle, LoadEvent, LoadOptions, LoadOutcome, LoadTarget, Loader, LoaderPhase, load_file,
};
pub use save::{
    SaveEvent, SaveOptions, SaveOutcome, SaveStrategy, Saver, SaverPhase, save_file,
};
