//! This module contains functions to handle signals.

use derive_more::Display;
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::info;

/// The message a spawned service receives from the main application process
/// to notify it to shut down.
#[derive(Copy, Clone, Debug, Display, PartialEq, Eq)]
pub enum Halted {
    Normal,
    Dropped,
}

/// Creates a future that resolves on SIGTERM (unix only).
///
/// # Panics
///
/// Panics if unable to install the signal handler.
#[must_use]
pub fn global_terminate_signal<'a>() -> BoxFuture<'a, ()> {
    #[cfg(unix)]
    let terminate: BoxFuture<'a, ()> = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    }
    .boxed();

    #[cfg(not(unix))]
    let terminate: BoxFuture<'a, ()> = std::future::pending::<()>().boxed();

    terminate
}

/// Creates a future that resolves on SIGQUIT (unix only).
///
/// # Panics
///
/// Panics if unable to install the signal handler.
#[must_use]
pub fn global_quit_signal<'a>() -> BoxFuture<'a, ()> {
    #[cfg(unix)]
    let quit: BoxFuture<'a, ()> = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::quit())
            .expect("failed to install signal handler")
            .recv()
            .await;
    }
    .boxed();

    #[cfg(not(unix))]
    let quit: BoxFuture<'a, ()> = std::future::pending::<()>().boxed();

    quit
}

/// Creates a future that resolves on the interrupt, i.e. `ctrl_c`, signal.
///
/// # Panics
///
/// Panics if unable to install the signal handler.
#[must_use]
pub fn global_interrupt_signal<'a>() -> BoxFuture<'a, ()> {
    let interrupt: BoxFuture<'a, ()> = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    }
    .boxed();

    interrupt
}

/// Resolves on `ctrl_c`, `quit` or the `terminate` signal.
pub async fn global_shutdown_signal() {
    let interrupt = global_interrupt_signal();
    let terminate = global_terminate_signal();
    let quit = global_quit_signal();

    tokio::select! {
        () = interrupt => {},
        () = terminate => {},
        () = quit => {}
    }
}

/// Resolves when the `rx_halt` channel or the global shutdown signal
/// resolves.
///
/// # Panics
///
/// Will panic if the halt channel is closed without a message.
pub async fn shutdown_signal(rx_halt: tokio::sync::oneshot::Receiver<Halted>) {
    let halt = async {
        match rx_halt.await {
            Ok(signal) => signal,
            Err(err) => panic!("Failed to install stop signal: {err}"),
        }
    };

    tokio::select! {
        signal = halt => { info!("Halt signal processed: {}", signal) },
        () = global_shutdown_signal() => { info!("Global shutdown signal processed") }
    }
}

/// Same as `shutdown_signal()`, but shows a message when it resolves.
pub async fn shutdown_signal_with_message(rx_halt: tokio::sync::oneshot::Receiver<Halted>, message: String) {
    shutdown_signal(rx_halt).await;

    info!("{message}");
}
