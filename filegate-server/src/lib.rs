//! The file gateway server.
//!
//! This builds on top of [`filegate_service`] and exposes the configured storage backend through a
//! small HTTP API for uploading, listing, viewing, downloading and deleting files.
#![warn(missing_debug_implementations)]

pub mod cli;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod healthcheck;
pub mod observability;
pub mod state;
pub mod web;
