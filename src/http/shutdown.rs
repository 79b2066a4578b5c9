//! Graceful shutdown and signal handling.
//!
//! Termination signals are turned into events on a channel and consumed by a
//! single coordinator, the only place allowed to end the process early.
//! Tests drive the coordinator with synthetic events instead of real
//! signals.

use futures::{Stream, StreamExt};

use super::server::{ListenerState, ServerHandle};

/// A termination request delivered to the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGTERM
    Terminate,
    /// SIGINT / Ctrl+C
    Interrupt,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownSignal::Terminate => write!(f, "SIGTERM"),
            ShutdownSignal::Interrupt => write!(f, "SIGINT"),
        }
    }
}

/// How a coordinator run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// A signal arrived before anything was bound; exit right away
    ExitBeforeBind,
    /// A graceful drain was started (or was already under way)
    DrainStarted,
    /// A second signal cut the drain short
    ForcedClose,
    /// The signal source closed without delivering anything
    SignalSourceClosed,
}

/// Install the shutdown coordinator for this process.
///
/// Must run before the startup sequence awaits anything slow, so a signal
/// arriving before the bind still ends the process cleanly with status 0.
pub fn install(handle: ServerHandle) {
    let signals = os_signals();
    tokio::spawn(async move {
        if drive(handle, signals).await == ShutdownOutcome::ExitBeforeBind {
            std::process::exit(0);
        }
    });
}

/// Consume signal events and walk the listener through its close.
///
/// The first signal either ends the process (nothing bound yet) or starts a
/// graceful drain. The drain has no deadline; a second signal received while
/// draining force-closes the listener instead of waiting it out.
pub async fn drive<S>(handle: ServerHandle, signals: S) -> ShutdownOutcome
where
    S: Stream<Item = ShutdownSignal>,
{
    let mut signals = std::pin::pin!(signals);
    let Some(signal) = signals.next().await else {
        return ShutdownOutcome::SignalSourceClosed;
    };

    match handle.state() {
        ListenerState::Unbound | ListenerState::Binding => {
            tracing::info!("Received {}, but no server to shutdown", signal);
            ShutdownOutcome::ExitBeforeBind
        }
        ListenerState::Listening => {
            tracing::info!(
                connections = handle.connection_count(),
                "Received {}, shutting down server...",
                signal
            );
            handle.graceful_shutdown();

            match signals.next().await {
                Some(second) => {
                    tracing::warn!("Received {} while draining, closing immediately", second);
                    handle.immediate_shutdown();
                    ShutdownOutcome::ForcedClose
                }
                None => ShutdownOutcome::DrainStarted,
            }
        }
        ListenerState::Closing | ListenerState::Closed => ShutdownOutcome::DrainStarted,
    }
}

/// Deliver OS termination signals as coordinator events.
pub fn os_signals() -> async_channel::Receiver<ShutdownSignal> {
    let (tx, rx) = async_channel::bounded(4);

    let interrupt_tx = tx.clone();
    tokio::spawn(async move {
        loop {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
            if interrupt_tx.send(ShutdownSignal::Interrupt).await.is_err() {
                break;
            }
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM handler");
        while terminate.recv().await.is_some() {
            if tx.send(ShutdownSignal::Terminate).await.is_err() {
                break;
            }
        }
    });
    #[cfg(not(unix))]
    drop(tx);

    rx
}
