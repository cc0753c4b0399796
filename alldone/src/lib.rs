//! Alldone: personal task list client library.

pub mod api;
pub mod app;
pub mod config;
pub mod session;
pub mod tasks;
