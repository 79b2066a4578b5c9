//! Listen target resolution.
//!
//! Decides what the server will actually listen on: a socket inherited from
//! systemd, the configured port, or a free fallback port when the configured
//! one is taken. Port probing happens against the kernel, so the answer is
//! only a snapshot; the race between probe and bind is accepted, the same
//! trade-off every port detector makes.

use std::io;
use std::net::{IpAddr, SocketAddr, TcpListener};

/// First file descriptor passed by systemd socket activation.
///
/// `LISTEN_FDS` sockets are numbered upwards from here. Quarry binds exactly
/// one port, so only this first descriptor is ever consumed.
pub const SD_LISTEN_FDS_START: i32 = 3;

/// Environment variable systemd uses to announce passed sockets.
pub const LISTEN_FDS_ENV: &str = "LISTEN_FDS";

/// What the transport layer should bind to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenTarget {
    /// Listening socket inherited from the service manager
    Inherited { fd: i32 },
    /// TCP port that was free when probed
    Port(u16),
}

/// Resolve the listen target for the desired port.
///
/// With `systemd_socket` set and at least one passed socket, the first
/// inherited descriptor wins and no port is probed. Otherwise the desired
/// port is probed and a free alternate is substituted when it is occupied;
/// a busy port is an expected condition here, not an error.
pub fn resolve(ip: IpAddr, desired: u16, systemd_socket: bool) -> io::Result<ListenTarget> {
    resolve_with_socket_count(ip, desired, systemd_socket, passed_socket_count())
}

/// Number of sockets the service manager passed to this process.
fn passed_socket_count() -> u32 {
    std::env::var(LISTEN_FDS_ENV)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(0)
}

fn resolve_with_socket_count(
    ip: IpAddr,
    desired: u16,
    systemd_socket: bool,
    passed_sockets: u32,
) -> io::Result<ListenTarget> {
    if systemd_socket {
        if passed_sockets > 0 {
            tracing::info!(fd = SD_LISTEN_FDS_START, "Using socket passed by systemd");
            return Ok(ListenTarget::Inherited {
                fd: SD_LISTEN_FDS_START,
            });
        }
        tracing::warn!(
            port = desired,
            "systemd socket requested but none was passed. Binding port manually"
        );
    }

    if port_is_free(ip, desired) {
        return Ok(ListenTarget::Port(desired));
    }

    let fallback = free_port(ip)?;
    tracing::info!(
        "Port {} already occupied. Using port {} instead.",
        desired,
        fallback
    );
    Ok(ListenTarget::Port(fallback))
}

fn port_is_free(ip: IpAddr, port: u16) -> bool {
    TcpListener::bind(SocketAddr::new(ip, port)).is_ok()
}

/// Ask the kernel for any free port. This can only fail when the ephemeral
/// range is exhausted, which leaves nothing sensible to fall back to anyway.
fn free_port(ip: IpAddr) -> io::Result<u16> {
    let listener = TcpListener::bind(SocketAddr::new(ip, 0))?;
    Ok(listener.local_addr()?.port())
}
