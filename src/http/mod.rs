//! Server bootstrap and listener lifecycle.
//!
//! This module owns everything between "the configuration is valid" and "the
//! process has exited":
//! - **Listen target resolution**: systemd socket activation, or probing the
//!   configured port and falling back to a free one when it is taken
//! - **Transport selection**: HTTPS when key and certificate are configured,
//!   plain HTTP otherwise
//! - **Listener lifecycle**: a single bind, an idle timeout, and a startup
//!   banner once the listener accepts connections
//! - **Shutdown coordination**: SIGTERM/SIGINT drain the listener and end
//!   the process exactly once

pub mod port;
pub mod shutdown;

mod server;
mod tls;

pub use port::ListenTarget;
pub use server::{start_server, ListenerState, ServerError, ServerHandle};
pub use tls::{TlsMaterial, TransportMode};
