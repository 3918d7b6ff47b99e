use std::net::SocketAddr;
use std::path::Path;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpSocket};
use tokio::signal::unix::SignalKind;

use crate::config::Config;
use crate::endpoints::health::SHUTDOWN_MARKER_PATH;
use crate::state::State;
use crate::web::app::App;

/// The maximum backlog for TCP listen sockets before refusing connections.
const TCP_LISTEN_BACKLOG: u32 = 1024;

/// Runs the filegate HTTP server.
///
/// The storage backend is connected before the listener is bound, so a misconfigured backend
/// fails startup instead of serving errors. Runs until termination is requested and drains
/// in-flight requests before returning.
pub async fn server(config: Config) -> Result<()> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting filegate");

    let state = State::new(config)
        .await
        .context("failed to initialize storage backend")?;
    let backend = state.service.backend_name();
    let listener = listen(state.config.http_addr).context("failed to start TCP listener")?;

    if Path::new(SHUTDOWN_MARKER_PATH).exists() {
        tracing::warn!(
            path = SHUTDOWN_MARKER_PATH,
            "Shutdown marker present at startup, /ready will report unavailable"
        );
    }

    let server_handle = tokio::spawn(async move {
        App::new(state)
            .graceful_shutdown(true)
            .serve(listener)
            .await
    });

    tokio::spawn(async move {
        elegant_departure::get_shutdown_guard().wait().await;
        tracing::info!(backend, "Draining in-flight requests");
    });

    elegant_departure::tokio::depart()
        .on_termination()
        .on_sigint()
        .on_signal(SignalKind::hangup())
        .on_signal(SignalKind::quit())
        .await;

    let server_result = server_handle.await.map_err(From::from).flatten();
    tracing::info!(backend, "Filegate stopped");
    server_result
}

fn listen(addr: SocketAddr) -> Result<TcpListener> {
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4(),
        SocketAddr::V6(_) => TcpSocket::new_v6(),
    }?;

    #[cfg(all(unix, not(target_os = "solaris"), not(target_os = "illumos")))]
    socket.set_reuseport(true)?;
    socket.bind(addr)?;

    let listener = socket.listen(TCP_LISTEN_BACKLOG)?;
    tracing::info!(%addr, "Listening for HTTP requests");

    Ok(listener)
}
