//! # cxxbox
//!
//! Wandbox-style API that compiles and runs untrusted C++ snippets in
//! ephemeral hardened Docker containers.
//!
//! ## Features
//!
//! - **One sandbox per request:** freshly created, security-hardened,
//!   unconditionally torn down
//! - **Two-phase execution:** compile then run, each under its own timeout
//! - **Hand-built injection:** source enters the container as an in-memory
//!   ustar archive
//! - **Outcome memoization:** content-addressed TTL cache over full results

pub mod archive;
pub mod cache;
pub mod config;
pub mod error;
pub mod options;
pub mod orchestrator;
pub mod response;
pub mod sandbox;

pub use config::Config;
pub use error::{Error, Result};
pub use orchestrator::Orchestrator;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");
