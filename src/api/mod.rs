//! Purpose: Define the public Rust API boundary for the book inventory.
//! Exports: Book model, store handles, errors, and the local and HTTP clients.
//! Role: Single import path for the CLI, server, and integration tests.
//! Invariants: Store construction goes through `open_store`; callers own the handle.

mod client;
mod remote;

pub use client::{ApiResult, LocalClient};
pub use crate::core::book::{Book, BookFields, BookInput, BookPatch, NewBook};
pub use crate::core::connect::{DEFAULT_DB_NAME, StoreUri, open_store};
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::file_store::FileStore;
pub use crate::core::key::BookKey;
pub use crate::core::store::{MemoryStore, RecordStore};
pub use remote::{DEFAULT_TIMEOUT, RemoteClient};
