//! Purpose: Shared library crate used by the `books` CLI, server, and tests.
//! Exports: `core` (book model, stores, errors), `api` (public surface), `view` (client state).
//! Role: Backs both the REST service and the terminal client.
//! Invariants: The store is an explicitly constructed value; no global connection state.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod core;
pub mod view;
