//! Clipshare
//!
//! The reference board server, shared by the `clipshare-server` binary and
//! the end-to-end tests.

pub mod server;
