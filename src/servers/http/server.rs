//! The HTTP server instance for one listening address.
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum_server::Handle;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::v1::routes::router;
use crate::core::Tracker;
use crate::servers::signals::{shutdown_signal_with_message, Halted};

/// A started HTTP tracker server bound to one address.
pub struct RunningServer {
    /// The address the server actually bound to.
    pub binding: SocketAddr,
    tx_halt: tokio::sync::oneshot::Sender<Halted>,
    task: JoinHandle<()>,
}

impl RunningServer {
    /// Asks the server to shut down gracefully and waits for it.
    pub async fn stop(self) {
        drop(self.tx_halt.send(Halted::Normal));
        drop(self.task.await);
    }
}

/// Binds one listening address and starts serving the tracker routes on it.
///
/// # Errors
///
/// Returns the bind error; the caller decides whether a partial bind is
/// acceptable.
pub fn start(tracker: Arc<Tracker>, bind_to: SocketAddr) -> std::io::Result<RunningServer> {
    let socket = std::net::TcpListener::bind(bind_to)?;
    socket.set_nonblocking(true)?;
    let binding = socket.local_addr()?;

    let (tx_halt, rx_halt) = tokio::sync::oneshot::channel::<Halted>();
    let handle = Handle::new();

    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        shutdown_signal_with_message(rx_halt, format!("Shutting down HTTP tracker on {binding}")).await;
        shutdown_handle.graceful_shutdown(Some(Duration::from_secs(90)));
    });

    let app = router(tracker).into_make_service_with_connect_info::<SocketAddr>();

    let task = tokio::spawn(async move {
        info!("HTTP tracker listening on {}", binding);
        if let Err(io_error) = axum_server::from_tcp(socket).handle(handle).serve(app).await {
            error!("HTTP tracker on {} failed: {}", binding, io_error);
        }
        info!("HTTP tracker on {} stopped", binding);
    });

    Ok(RunningServer { binding, tx_halt, task })
}
