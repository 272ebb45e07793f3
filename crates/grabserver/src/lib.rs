//! grabserver - HTTP front-end and command line for the grab download service
//!
//! - `web`: axum router, handlers, progress stream and rate limiting
//! - `cli`: command line definition

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod cli;
pub mod web;
