//! # quire_fs - Document I/O for quire
//!
//! Staged loading and saving of text files with encoding negotiation and
//! crash-safe replacement.
//!
//! Modules:
//! - `encoding` for conversion between charsets and UTF-8, and auto-detection
//! - `bom` for byte order mark sniffing (UTF-8/16/32)
//! - `content_type` for best-effort MIME type resolution
//! - `metadata` for per-file key/value storage
//! - `file` for the loader, the saver and their filesystem helpers
//! - `error` for the failure taxonomy

pub mod bom;
pub mod content_type;
pub mod encoding;
pub mod error;
pub mod file;
pub mod metadata;

pub use bom::{Bom, detect_bom, strip_bom};
pub use content_type::{DEFAULT_MIME_TYPE, guess_mime_type};
pub use encoding::{
    ConversionError, Decoded, DetectionHints, Encoding, decode, encode, locale_encoding,
    resolve_encoding,
};
pub use error::{ErrorKind, FsError, UsageError};
pub use file::{
    CancelHandle, FileInfo, FileKind, LoadEvent, LoadOptions, LoadOutcome, LoadTarget, Loader,
    LoaderPhase, SaveEvent, SaveOptions, SaveOutcome, SaveStrategy, Saver, SaverPhase, load_file,
    save_file,
};
pub use metadata::{
    JsonMetadataStore, KEY_ENCODING, KEY_LANGUAGE, KEY_POSITION, MemoryMetadata, MetadataError,
    MetadataStore, NO_LANGUAGE,
};
