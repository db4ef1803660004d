// Record store contract plus the in-process collection both stores share.
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use crate::core::book::{Book, BookPatch, NewBook};
use crate::core::error::{Error, ErrorKind};
use crate::core::key::BookKey;

/// Durable collection of book records addressed by store-assigned keys.
///
/// Implementations serialize their own mutations; callers add no locking.
pub trait RecordStore: Send + Sync {
    /// Assigns a fresh key and appends the record.
    fn insert(&self, book: NewBook) -> Result<Book, Error>;

    /// Every live record, in insertion order.
    fn find_all(&self) -> Result<Vec<Book>, Error>;

    /// Applies the present patch fields. Unknown keys are `NotFound`.
    fn update(&self, key: &BookKey, patch: BookPatch) -> Result<Book, Error>;

    /// Removes and returns the record. Unknown keys are `NotFound`.
    fn delete(&self, key: &BookKey) -> Result<Book, Error>;

    fn describe(&self) -> String;
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct Collection {
    books: Vec<Book>,
}

impl Collection {
    pub(crate) fn from_books(books: Vec<Book>) -> Result<Self, Error> {
        let mut seen = HashSet::with_capacity(books.len());
        for book in &books {
            if !seen.insert(book.key) {
                return Err(Error::new(ErrorKind::Corrupt)
                    .with_message("duplicate book key in collection")
                    .with_key(book.key.to_string()));
            }
        }
        Ok(Self { books })
    }

    pub(crate) fn books(&self) -> &[Book] {
        &self.books
    }

    pub(crate) fn insert(&mut self, book: NewBook) -> Result<Book, Error> {
        let mut key = BookKey::generate()?;
        while self.position(&key).is_some() {
            key = BookKey::generate()?;
        }
        let book = book.into_book(key);
        self.books.push(book.clone());
        Ok(book)
    }

    pub(crate) fn update(&mut self, key: &BookKey, patch: &BookPatch) -> Result<Book, Error> {
        let idx = self.position(key).ok_or_else(|| not_found(key))?;
        let book = &mut self.books[idx];
        patch.apply(book);
        Ok(book.clone())
    }

    pub(crate) fn delete(&mut self, key: &BookKey) -> Result<Book, Error> {
        let idx = self.position(key).ok_or_else(|| not_found(key))?;
        Ok(self.books.remove(idx))
    }

    fn position(&self, key: &BookKey) -> Option<usize> {
        self.books.iter().position(|book| &book.key == key)
    }
}

pub(crate) fn not_found(key: &BookKey) -> Error {
    Error::new(ErrorKind::NotFound)
        .with_message("book not found")
        .with_key(key.to_string())
}

pub(crate) fn lock_collection(collection: &Mutex<Collection>) -> MutexGuard<'_, Collection> {
    collection
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    collection: Mutex<Collection>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryStore {
    fn insert(&self, book: NewBook) -> Result<Book, Error> {
        lock_collection(&self.collection).insert(book)
    }

    fn find_all(&self) -> Result<Vec<Book>, Error> {
        Ok(lock_collection(&self.collection).books().to_vec())
    }

    fn update(&self, key: &BookKey, patch: BookPatch) -> Result<Book, Error> {
        lock_collection(&self.collection).update(key, &patch)
    }

    fn delete(&self, key: &BookKey) -> Result<Book, Error> {
        lock_collection(&self.collection).delete(key)
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
