//! # quire_doc - Documents for quire
//!
//! Binds the staged loader and saver of `quire_fs` to an editable text
//! buffer.
//!
//! Modules:
//! - `buffer` for the rope-backed text with undo and a cursor
//! - `document` for the per-file load/save state machine
//! - `registry` for ownership of open documents
//! - `context` for the settings, metadata store and untitled numbers the
//!   documents share

pub mod buffer;
pub mod context;
pub mod document;
pub mod registry;

pub use buffer::{BufferError, TextBuffer};
pub use context::{DocumentContext, UntitledNumbers};
pub use document::{Document, DocumentEvent, DocumentId, DocumentState};
pub use registry::DocumentRegistry;
