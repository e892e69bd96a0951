//! Library crate for port-watch-rs exposing reusable modules.
pub mod config;
pub mod diff;
pub mod logging;
pub mod notify;
pub mod ports;
pub mod scanner;
pub mod state;
pub mod types;
pub mod watcher;
