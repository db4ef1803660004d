// File-backed record store: one JSON document per collection, held under an
// exclusive advisory lock for the lifetime of the store.
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fs2::FileExt;

use crate::core::book::{Book, BookPatch, NewBook};
use crate::core::error::{Error, ErrorKind, map_io_error_kind};
use crate::core::key::BookKey;
use crate::core::store::{Collection, RecordStore, lock_collection};

const COLLECTION_FILE: &str = "books.json";
const COLLECTION_TMP_FILE: &str = "books.json.tmp";
const LOCK_FILE: &str = "books.lock";

#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    collection: Mutex<Collection>,
    _lock: File,
}

impl FileStore {
    /// Opens (creating if needed) the collection stored under `dir`.
    ///
    /// Fails with `Io` if another process holds the collection lock and
    /// `Corrupt` if the collection document cannot be decoded.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, Error> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|err| {
            Error::new(map_io_error_kind(&err))
                .with_message("failed to create store directory")
                .with_path(&dir)
                .with_source(err)
        })?;

        let lock_path = dir.join(LOCK_FILE);
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&lock_path)
            .map_err(|err| {
                Error::new(map_io_error_kind(&err))
                    .with_message("failed to open store lock")
                    .with_path(&lock_path)
                    .with_source(err)
            })?;
        lock.try_lock_exclusive().map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("store is locked by another process")
                .with_path(&lock_path)
                .with_hint("Stop the other server or point --store at a different directory.")
                .with_source(err)
        })?;

        let collection = load_collection(&dir.join(COLLECTION_FILE))?;
        Ok(Self {
            dir,
            collection: Mutex::new(collection),
            _lock: lock,
        })
    }

    fn mutate<T>(&self, op: impl FnOnce(&mut Collection) -> Result<T, Error>) -> Result<T, Error> {
        let mut guard = lock_collection(&self.collection);
        let mut next = guard.clone();
        let out = op(&mut next)?;
        persist_collection(&self.dir, &next)?;
        *guard = next;
        Ok(out)
    }
}

impl RecordStore for FileStore {
    fn insert(&self, book: NewBook) -> Result<Book, Error> {
        self.mutate(|collection| collection.insert(book))
    }

    fn find_all(&self) -> Result<Vec<Book>, Error> {
        Ok(lock_collection(&self.collection).books().to_vec())
    }

    fn update(&self, key: &BookKey, patch: BookPatch) -> Result<Book, Error> {
        self.mutate(|collection| collection.update(key, &patch))
    }

    fn delete(&self, key: &BookKey) -> Result<Book, Error> {
        self.mutate(|collection| collection.delete(key))
    }

    fn describe(&self) -> String {
        format!("file:{}", self.dir.display())
    }
}

fn load_collection(path: &Path) -> Result<Collection, Error> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Collection::default());
        }
        Err(err) => {
            return Err(Error::new(map_io_error_kind(&err))
                .with_message("failed to read collection")
                .with_path(path)
                .with_source(err));
        }
    };
    let books: Vec<Book> = serde_json::from_slice(&bytes).map_err(|err| {
        Error::new(ErrorKind::Corrupt)
            .with_message("collection file is not a valid book list")
            .with_path(path)
            .with_source(err)
    })?;
    Collection::from_books(books).map_err(|err| err.with_path(path))
}

fn persist_collection(dir: &Path, collection: &Collection) -> Result<(), Error> {
    let tmp_path = dir.join(COLLECTION_TMP_FILE);
    let path = dir.join(COLLECTION_FILE);
    let encoded = serde_json::to_vec_pretty(collection.books()).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode collection")
            .with_source(err)
    })?;

    let write_err = |err: std::io::Error| {
        Error::new(map_io_error_kind(&err))
            .with_message("failed to write collection")
            .with_path(&tmp_path)
            .with_source(err)
    };
    let mut file = File::create(&tmp_path).map_err(write_err)?;
    file.write_all(&encoded).map_err(write_err)?;
    file.sync_all().map_err(write_err)?;
    drop(file);

    fs::rename(&tmp_path, &path).map_err(|err| {
        Error::new(map_io_error_kind(&err))
            .with_message("failed to replace collection")
            .with_path(&path)
            .with_source(err)
    })
}
