//! Purpose: Define the in-process client over an explicitly opened record store.
//! Exports: `LocalClient`.
//! Role: Service layer shared by the HTTP handlers and local callers; applies boundary validation.
//! Invariants: Every write is validated into `NewBook`/`BookPatch` before reaching the store.
//! Invariants: The store handle is owned by the caller; nothing here is global.
#![allow(clippy::result_large_err)]

use crate::core::book::{Book, BookFields, BookInput, BookPatch, NewBook};
use crate::core::connect::{StoreUri, open_store};
use crate::core::error::Error;
use crate::core::key::BookKey;
use crate::core::store::{MemoryStore, RecordStore};
use serde_json::Value;
use std::sync::Arc;

pub type ApiResult<T> = Result<T, Error>;

#[derive(Clone)]
pub struct LocalClient {
    store: Arc<dyn RecordStore>,
}

impl LocalClient {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub fn open(uri: &StoreUri) -> ApiResult<Self> {
        Ok(Self::new(open_store(uri)?))
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn describe(&self) -> String {
        self.store.describe()
    }

    pub fn list_books(&self) -> ApiResult<Vec<Book>> {
        self.store.find_all()
    }

    pub fn create_from_input(&self, input: BookInput) -> ApiResult<Book> {
        let book = NewBook::from_input(input)?;
        self.store.insert(book)
    }

    pub fn update_from_input(&self, key: &BookKey, input: BookInput) -> ApiResult<Book> {
        let patch = BookPatch::from_input(input).map_err(|err| err.with_key(key.to_string()))?;
        self.store.update(key, patch)
    }

    pub fn create_book(&self, fields: &BookFields) -> ApiResult<Book> {
        self.create_from_input(input_from_fields(fields))
    }

    pub fn update_book(&self, key: &BookKey, fields: &BookFields) -> ApiResult<Book> {
        self.update_from_input(key, input_from_fields(fields))
    }

    pub fn delete_book(&self, key: &BookKey) -> ApiResult<Book> {
        self.store.delete(key)
    }
}

fn input_from_fields(fields: &BookFields) -> BookInput {
    BookInput {
        title: Some(Value::String(fields.title.clone())),
        author: Some(Value::String(fields.author.clone())),
        year: Some(Value::String(fields.year.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::LocalClient;
    use crate::core::book::{BookFields, BookInput};
    use crate::core::error::ErrorKind;
    use crate::core::key::BookKey;
    use serde_json::json;

    #[test]
    fn form_fields_are_validated_like_requests() {
        let client = LocalClient::in_memory();
        let created = client
            .create_book(&BookFields::new("Dune", "Herbert", "1965"))
            .expect("create");
        assert_eq!(created.year, 1965);

        let err = client
            .create_book(&BookFields::new("Dune", "Herbert", "soon"))
            .expect_err("bad year");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(client.list_books().expect("list").len(), 1);
    }

    #[test]
    fn partial_update_keeps_other_fields() {
        let client = LocalClient::in_memory();
        let created = client
            .create_book(&BookFields::new("Dune", "Herbert", "1965"))
            .expect("create");
        let input: BookInput = serde_json::from_value(json!({ "year": 1966 })).expect("input");
        let updated = client
            .update_from_input(&created.key, input)
            .expect("update");
        assert_eq!(updated.title, "Dune");
        assert_eq!(updated.author, "Herbert");
        assert_eq!(updated.year, 1966);
    }

    #[test]
    fn invalid_update_reports_key() {
        let client = LocalClient::in_memory();
        let key = BookKey::generate().expect("key");
        let input: BookInput = serde_json::from_value(json!({ "title": "" })).expect("input");
        let err = client.update_from_input(&key, input).expect_err("invalid");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(err.key(), Some(key.to_string().as_str()));
    }

    #[test]
    fn null_fields_in_update_leave_record_unchanged() {
        let client = LocalClient::in_memory();
        let created = client
            .create_book(&BookFields::new("Dune", "Herbert", "1965"))
            .expect("create");
        let input: BookInput =
            serde_json::from_value(json!({ "title": null, "year": null })).expect("input");
        let err = client
            .update_from_input(&created.key, input)
            .expect_err("null fields");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(client.list_books().expect("list"), vec![created]);
    }

    #[test]
    fn missing_key_is_not_found() {
        let client = LocalClient::in_memory();
        let key = BookKey::generate().expect("key");
        let err = client.delete_book(&key).expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
