//! `geolog` - Collect location reports into an append-only JSON collection
//!
//! This library provides the append store that serializes concurrent writes
//! to the on-disk collection, the request handler that feeds it, and the
//! HTTP server, configuration and logging around them.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod record;
pub mod server;
pub mod storage;

pub use api::{ApiRequest, ApiResponse, Handler, HandlerSettings};
pub use config::Config;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use record::Record;
pub use server::{HttpServer, ShutdownHandle};
pub use storage::{AppendOutcome, AppendStore, StoreOptions};
