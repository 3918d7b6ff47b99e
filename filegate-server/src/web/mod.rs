//! The filegate webserver.
//!
//! The main server application is implemented in the [`App`] struct, which sets up routing and
//! middleware. To listen to incoming connections, use the [`server()`] function, which opens a TCP
//! listener and serves the application until the process is asked to terminate.
//!
//! # Testing
//!
//! For end-to-end tests of the server, see the `filegate-test` crate, which starts an in-process
//! server backed by a temporary directory.

mod app;
mod middleware;
mod server;

pub use app::App;
pub use server::server;
