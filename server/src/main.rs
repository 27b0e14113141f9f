mod app;
mod config;
mod routes;
mod services;
mod state;

use tokio::signal;
use tracing_subscriber::EnvFilter;

use crate::state::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let state = AppState::new();
    if state.vworld_keys.is_empty() {
        tracing::warn!("no VWORLD_KEYS configured; /api/vworld will refuse lookups");
    }
    if state.naver.is_none() {
        tracing::warn!("no Naver credentials configured; address search is disabled");
    }

    tokio::spawn(services::cache_evictor::run(state.clone()));

    let app = app::build_app(state);

    let Some(listener) = bind_with_fallback(config::server_port()).await else {
        return;
    };
    match listener.local_addr() {
        Ok(addr) => tracing::info!("Pilji Map server listening on {addr}"),
        Err(e) => tracing::warn!(error = %e, "listener has no observable local address"),
    }

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "server failed");
    }

    tracing::info!("Server shut down gracefully");
}

/// Bind the fixed port, walking upward past ports already in use.
async fn bind_with_fallback(base_port: u16) -> Option<tokio::net::TcpListener> {
    for offset in 0..=config::PORT_FALLBACK_ATTEMPTS {
        let port = base_port.saturating_add(offset);
        let addr = format!("0.0.0.0:{port}");
        match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => return Some(listener),
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::warn!(port, "port in use, trying the next one");
            }
            Err(e) => {
                tracing::error!(error = %e, %addr, "failed to bind TCP listener");
                return None;
            }
        }
    }
    tracing::error!(
        base_port,
        attempts = config::PORT_FALLBACK_ATTEMPTS,
        "no free port found"
    );
    None
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                return;
            }
        };
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::bind_with_fallback;

    #[tokio::test]
    async fn falls_back_to_the_next_port_when_taken() {
        // Occupy a port, then ask for it: the fallback should land one above.
        let blocker = tokio::net::TcpListener::bind("0.0.0.0:0")
            .await
            .expect("bind blocker");
        let taken_port = blocker.local_addr().expect("blocker address").port();

        let listener = bind_with_fallback(taken_port)
            .await
            .expect("a nearby port should be free");
        let bound_port = listener.local_addr().expect("listener address").port();
        assert_ne!(bound_port, taken_port);
        assert!(bound_port > taken_port);
        assert!(bound_port <= taken_port + super::config::PORT_FALLBACK_ATTEMPTS);
    }
}
