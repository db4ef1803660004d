// Core modules implementing the book model, record stores, and error modeling.
pub mod book;
pub mod connect;
pub mod error;
pub mod file_store;
pub mod key;
pub mod store;
