//! Quarry: a self-hosted web workbench server.
//!
//! The interesting machinery lives in [`http`]: listen-target resolution
//! (including systemd socket activation and busy-port fallback), transport
//! selection, the single listener's lifecycle, and signal-driven graceful
//! shutdown. The rest of the crate is the configuration, datastore bootstrap,
//! and the web application the listener serves.

pub mod config;
pub mod db;
pub mod http;
pub mod middleware;
pub mod routes;
pub mod state;
