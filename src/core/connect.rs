// Store connection strings: `memory:`, `file:///dir?db=name`, or a bare path.
use std::path::PathBuf;
use std::sync::Arc;

use url::Url;

use crate::core::error::{Error, ErrorKind};
use crate::core::file_store::FileStore;
use crate::core::store::{MemoryStore, RecordStore};

pub const DEFAULT_DB_NAME: &str = "book-inventory";

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StoreUri {
    Memory,
    File { root: PathBuf, db: String },
}

impl StoreUri {
    pub fn parse(input: &str) -> Result<Self, Error> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("store connection string is empty")
                .with_hint("Use memory:, file:///path/to/dir, or a directory path."));
        }
        if trimmed == "memory:" || trimmed == "memory://" {
            return Ok(StoreUri::Memory);
        }
        if !trimmed.contains("://") {
            return Ok(StoreUri::File {
                root: PathBuf::from(trimmed),
                db: DEFAULT_DB_NAME.to_string(),
            });
        }

        let url = Url::parse(trimmed).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("invalid store connection string")
                .with_source(err)
        })?;
        if url.scheme() != "file" {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("unsupported store scheme `{}`", url.scheme()))
                .with_hint("Use memory: or file:///path/to/dir."));
        }
        let root = url.to_file_path().map_err(|_| {
            Error::new(ErrorKind::Usage)
                .with_message("store url must name a local directory")
                .with_hint("Use an absolute path like file:///var/lib/books.")
        })?;
        let db = url
            .query_pairs()
            .find(|(name, _)| name == "db")
            .map(|(_, value)| value.into_owned())
            .unwrap_or_else(|| DEFAULT_DB_NAME.to_string());
        ensure_db_name(&db)?;
        Ok(StoreUri::File { root, db })
    }
}

pub fn open_store(uri: &StoreUri) -> Result<Arc<dyn RecordStore>, Error> {
    match uri {
        StoreUri::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreUri::File { root, db } => {
            ensure_db_name(db)?;
            Ok(Arc::new(FileStore::open(root.join(db))?))
        }
    }
}

fn ensure_db_name(db: &str) -> Result<(), Error> {
    if db.is_empty() || db.contains('/') || db.contains('\\') || db == "." || db == ".." {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("database name must be a single path component")
            .with_hint("Use ?db=book-inventory or omit it."));
    }
    Ok(())
}
