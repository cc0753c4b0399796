//! Alldone REST backend library.
//!
//! Exposes the HTTP server for use in tests and embedding. The server keeps
//! accounts and tasks in memory and scopes every task operation to the user
//! behind the bearer token.

pub mod accounts;
pub mod api;
pub mod config;
pub mod store;
