//! Shared wire definitions for the Alldone REST API.
//!
//! Both the server and the client speak JSON over HTTP; the types in this
//! crate are the request and response bodies of that API.

pub mod auth;
pub mod task;
