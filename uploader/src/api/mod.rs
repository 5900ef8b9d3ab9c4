//! HTTP API module.
//!
//! Client side of the upload API ([`client`]), its wire types ([`types`]),
//! the log broadcaster ([`logs`]) and an in-memory stub server ([`server`]).

pub mod client;
pub mod logs;
pub mod server;
pub mod types;

pub use client::{HttpClient, UploadService};
pub use logs::*;
pub use server::start_server;
pub use types::*;
