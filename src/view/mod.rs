//! Purpose: Headless client view over the book inventory API.
//! Exports: `BookView`, `BooksApi`, `Prompt`, `BookDraft`, `Field`, `Outcome`, `RetryAction`.
//! Role: Holds the fetched list, form drafts, the edit dialog, and notifications.
//! Invariants: Every mutation is followed by a full List; records are never patched locally.
//! Invariants: Every API call resolves to an `Outcome`; failures raise an error notification.
//! Invariants: Edits touch only the detached draft until committed.

mod notification;

pub use notification::{NOTIFICATION_TTL, Notification, Severity, notification_json};

use std::time::Instant;

use crate::api::{LocalClient, RemoteClient};
use crate::core::book::{Book, BookFields};
use crate::core::error::{Error, ErrorKind};
use crate::core::key::BookKey;

pub const MISSING_FIELDS_ALERT: &str = "Please fill all fields!";
pub const DELETE_CONFIRMATION: &str = "Are you sure you want to delete this book?";

/// The four calls the view makes against the REST service.
pub trait BooksApi {
    fn list(&self) -> Result<Vec<Book>, Error>;
    fn create(&self, fields: &BookFields) -> Result<Book, Error>;
    fn update(&self, key: &BookKey, fields: &BookFields) -> Result<Book, Error>;
    fn delete(&self, key: &BookKey) -> Result<Book, Error>;
}

impl BooksApi for RemoteClient {
    fn list(&self) -> Result<Vec<Book>, Error> {
        self.list_books()
    }

    fn create(&self, fields: &BookFields) -> Result<Book, Error> {
        self.create_book(fields)
    }

    fn update(&self, key: &BookKey, fields: &BookFields) -> Result<Book, Error> {
        self.update_book(key, fields)
    }

    fn delete(&self, key: &BookKey) -> Result<Book, Error> {
        self.delete_book(key)
    }
}

impl BooksApi for LocalClient {
    fn list(&self) -> Result<Vec<Book>, Error> {
        self.list_books()
    }

    fn create(&self, fields: &BookFields) -> Result<Book, Error> {
        self.create_book(fields)
    }

    fn update(&self, key: &BookKey, fields: &BookFields) -> Result<Book, Error> {
        self.update_book(key, fields)
    }

    fn delete(&self, key: &BookKey) -> Result<Book, Error> {
        self.delete_book(key)
    }
}

impl<A: BooksApi + ?Sized> BooksApi for &A {
    fn list(&self) -> Result<Vec<Book>, Error> {
        (**self).list()
    }

    fn create(&self, fields: &BookFields) -> Result<Book, Error> {
        (**self).create(fields)
    }

    fn update(&self, key: &BookKey, fields: &BookFields) -> Result<Book, Error> {
        (**self).update(key, fields)
    }

    fn delete(&self, key: &BookKey) -> Result<Book, Error> {
        (**self).delete(key)
    }
}

/// Blocking user interaction: a dismiss-only alert and a yes/no confirmation.
pub trait Prompt {
    fn alert(&mut self, message: &str);
    fn confirm(&mut self, message: &str) -> bool;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Field {
    Title,
    Author,
    Year,
}

impl Field {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "title" => Some(Field::Title),
            "author" => Some(Field::Author),
            "year" => Some(Field::Year),
            _ => None,
        }
    }

    fn slot(self, fields: &mut BookFields) -> &mut String {
        match self {
            Field::Title => &mut fields.title,
            Field::Author => &mut fields.author,
            Field::Year => &mut fields.year,
        }
    }
}

/// Detached copy of one record backing the edit dialog.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BookDraft {
    pub key: BookKey,
    pub fields: BookFields,
}

impl BookDraft {
    pub fn from_book(book: &Book) -> Self {
        Self {
            key: book.key,
            fields: BookFields::from_book(book),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// The call (and the follow-up List) succeeded.
    Completed,
    /// Blocked locally before any network call.
    Rejected,
    /// The user declined the confirmation.
    Cancelled,
    Failed(ErrorKind),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RetryAction {
    Refresh,
    Create(BookFields),
    Update(BookDraft),
    Delete(BookKey),
}

pub struct BookView<A> {
    api: A,
    records: Vec<Book>,
    draft_new: BookFields,
    editing: Option<BookDraft>,
    notification: Option<Notification>,
    retry: Option<RetryAction>,
}

impl<A: BooksApi> BookView<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            records: Vec::new(),
            draft_new: BookFields::default(),
            editing: None,
            notification: None,
            retry: None,
        }
    }

    pub fn records(&self) -> &[Book] {
        &self.records
    }

    pub fn draft_new(&self) -> &BookFields {
        &self.draft_new
    }

    pub fn editing(&self) -> Option<&BookDraft> {
        self.editing.as_ref()
    }

    pub fn pending_retry(&self) -> Option<&RetryAction> {
        self.retry.as_ref()
    }

    /// The current notification, if it has not yet auto-dismissed at `now`.
    pub fn notification(&self, now: Instant) -> Option<&Notification> {
        self.notification
            .as_ref()
            .filter(|notification| notification.is_visible_at(now))
    }

    pub fn dismiss_expired(&mut self, now: Instant) {
        if self
            .notification
            .as_ref()
            .is_some_and(|notification| !notification.is_visible_at(now))
        {
            self.notification = None;
        }
    }

    pub fn mount(&mut self) -> Outcome {
        self.refresh()
    }

    pub fn refresh(&mut self) -> Outcome {
        match self.api.list() {
            Ok(books) => {
                self.records = books;
                if self.retry == Some(RetryAction::Refresh) {
                    self.retry = None;
                }
                Outcome::Completed
            }
            Err(err) => self.fail("Failed to load books", err, RetryAction::Refresh),
        }
    }

    pub fn set_draft_field(&mut self, field: Field, value: impl Into<String>) {
        *field.slot(&mut self.draft_new) = value.into();
    }

    pub fn add(&mut self, prompt: &mut dyn Prompt) -> Outcome {
        if self.draft_new.has_empty_field() {
            prompt.alert(MISSING_FIELDS_ALERT);
            return Outcome::Rejected;
        }
        let fields = self.draft_new.clone();
        self.create(fields)
    }

    /// Opens the edit dialog on a copy of the record. Unknown keys change nothing.
    pub fn begin_edit(&mut self, key: &BookKey) -> bool {
        match self.records.iter().find(|book| &book.key == key) {
            Some(book) => {
                self.editing = Some(BookDraft::from_book(book));
                true
            }
            None => false,
        }
    }

    pub fn edit_field(&mut self, field: Field, value: impl Into<String>) -> bool {
        match self.editing.as_mut() {
            Some(draft) => {
                *field.slot(&mut draft.fields) = value.into();
                true
            }
            None => false,
        }
    }

    pub fn cancel_edit(&mut self) {
        self.editing = None;
    }

    pub fn commit_edit(&mut self) -> Outcome {
        match self.editing.clone() {
            Some(draft) => self.update(draft),
            None => Outcome::Rejected,
        }
    }

    pub fn delete(&mut self, key: &BookKey, prompt: &mut dyn Prompt) -> Outcome {
        if !prompt.confirm(DELETE_CONFIRMATION) {
            return Outcome::Cancelled;
        }
        self.remove(*key)
    }

    /// Replays the last retryable failure. Deletes are not re-confirmed.
    pub fn retry(&mut self) -> Outcome {
        let Some(action) = self.retry.take() else {
            return Outcome::Rejected;
        };
        match action {
            RetryAction::Refresh => self.refresh(),
            RetryAction::Create(fields) => self.create(fields),
            RetryAction::Update(draft) => {
                self.editing = Some(draft.clone());
                self.update(draft)
            }
            RetryAction::Delete(key) => self.remove(key),
        }
    }

    fn create(&mut self, fields: BookFields) -> Outcome {
        match self.api.create(&fields) {
            Ok(_) => {
                self.draft_new = BookFields::default();
                self.retry = None;
                self.notify("Book added!", Severity::Success);
                self.refresh()
            }
            Err(err) => self.fail("Failed to add book", err, RetryAction::Create(fields)),
        }
    }

    fn update(&mut self, draft: BookDraft) -> Outcome {
        match self.api.update(&draft.key, &draft.fields) {
            Ok(_) => {
                self.editing = None;
                self.retry = None;
                self.notify("Book updated!", Severity::Success);
                self.refresh()
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                self.editing = None;
                self.vanished(err)
            }
            Err(err) => self.fail("Failed to update book", err, RetryAction::Update(draft)),
        }
    }

    fn remove(&mut self, key: BookKey) -> Outcome {
        match self.api.delete(&key) {
            Ok(_) => {
                self.retry = None;
                self.notify("Book deleted!", Severity::Info);
                self.refresh()
            }
            Err(err) if err.kind() == ErrorKind::NotFound => self.vanished(err),
            Err(err) => self.fail("Failed to delete book", err, RetryAction::Delete(key)),
        }
    }

    // Record was removed elsewhere; resync so the stale row disappears.
    fn vanished(&mut self, err: Error) -> Outcome {
        let kind = err.kind();
        self.retry = None;
        self.notify(
            format!("Book no longer exists: {}", error_summary(&err)),
            Severity::Error,
        );
        match self.refresh() {
            Outcome::Completed => Outcome::Failed(kind),
            other => other,
        }
    }

    fn fail(&mut self, context: &str, err: Error, action: RetryAction) -> Outcome {
        let kind = err.kind();
        let mut notification = Notification::new(
            format!("{context}: {}", error_summary(&err)),
            Severity::Error,
            Instant::now(),
        );
        if is_retryable(kind) {
            notification = notification.retryable();
            self.retry = Some(action);
        } else {
            self.retry = None;
        }
        self.notification = Some(notification);
        Outcome::Failed(kind)
    }

    fn notify(&mut self, message: impl Into<String>, severity: Severity) {
        self.notification = Some(Notification::new(message, severity, Instant::now()));
    }
}

fn is_retryable(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::Io | ErrorKind::Internal)
}

fn error_summary(err: &Error) -> String {
    err.message()
        .map(str::to_string)
        .unwrap_or_else(|| err.kind().as_str().to_string())
}
