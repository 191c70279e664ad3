//! Write-through S3 proxy library.
//!
//! Re-signs inbound S3 requests and forwards them to a primary object
//! store, then asynchronously records inventory and replays mutations
//! against a disaster-recovery mirror. See each module for the component
//! of spec it implements; `main.rs` only wires these together with a
//! `hyper` connection-accept loop.

pub mod addressing;
pub mod config;
pub mod dispatcher;
pub mod httpclient;
pub mod mirror;
pub mod outbound;

pub use config::Config;
pub use dispatcher::{handle_request, AppState};
