//! Notes attached to web pages: markdown and code cells stored per
//! normalized URL, plus the renderers that turn them into HTML.

pub mod backend;
#[cfg(target_arch = "wasm32")]
pub mod bindings;
pub mod config;
pub mod editor_core;
pub mod error;
pub mod highlight;
mod logging;
pub mod markup;
pub mod model;
pub mod store;
pub mod url;

pub use backend::{KvBackend, MemoryBackend};
pub use config::{ConflictPolicy, NotesConfig};
pub use error::{BackendError, Result, StoreError};
pub use markup::{render, MarkupRules, MarkupTransformer};
pub use model::{new_timestamp, Cell, CellType, Note};
pub use store::{AddOutcome, NoteStore, UpdateOutcome};
pub use url::{normalize_url, UrlNormalizer};
