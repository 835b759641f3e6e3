//! Listener setup and lifecycle.
//!
//! The public listener serves ingest and metrics, behind the Basic auth gate
//! when it is enabled. The optional internal listener serves `/metrics` only
//! and is never gated, so a scraper on a private network needs no
//! credentials. Both share one [`AppState`].

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::timeout::{RequestBodyTimeoutLayer, TimeoutLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api;
use crate::config::ServerConfig;
use crate::middleware::{BasicAuth, basic_auth};
use crate::state::AppState;

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {name} listener to {addr}: {source}")]
    Bind {
        name: &'static str,
        addr: String,
        source: std::io::Error,
    },
    #[error("{name} listener failed: {source}")]
    Serve {
        name: &'static str,
        source: std::io::Error,
    },
}

/// Build the public application: ingest and metrics, gated if `auth` is set.
pub fn public_app(state: Arc<AppState>, auth: Option<BasicAuth>) -> Router {
    let mut router = api::router();
    if let Some(auth) = auth {
        router = router.layer(axum::middleware::from_fn_with_state(
            Arc::new(auth),
            basic_auth,
        ));
    }
    with_deadlines(router, &state.config.server).with_state(state)
}

/// Build the internal application: metrics only, never gated.
pub fn internal_app(state: Arc<AppState>) -> Router {
    with_deadlines(api::metrics_router(), &state.config.server).with_state(state)
}

fn with_deadlines(router: Router<Arc<AppState>>, config: &ServerConfig) -> Router<Arc<AppState>> {
    router
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.write_timeout_secs),
        ))
        .layer(RequestBodyTimeoutLayer::new(Duration::from_secs(
            config.read_timeout_secs,
        )))
        .layer(TraceLayer::new_for_http())
}

/// Run the configured listeners until `shutdown` is cancelled.
///
/// If either listener fails, the other is shut down as well.
pub async fn serve(
    state: Arc<AppState>,
    auth: Option<BasicAuth>,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let public = run_listener(
        "public",
        state.config.server.bind.clone(),
        public_app(Arc::clone(&state), auth),
        shutdown.clone(),
    );

    match state.config.server.internal_bind.clone() {
        Some(internal_bind) => {
            let internal = run_listener(
                "internal",
                internal_bind,
                internal_app(Arc::clone(&state)),
                shutdown.clone(),
            );
            tokio::try_join!(public, internal).map(|_| ())
        }
        None => {
            info!("Internal listener disabled");
            public.await
        }
    }
}

async fn run_listener(
    name: &'static str,
    addr: String,
    app: Router,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let result = async {
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                name,
                addr: addr.clone(),
                source,
            })?;

        match listener.local_addr() {
            Ok(local) => info!("Serving {} listener on {}", name, local),
            Err(_) => info!("Serving {} listener on {}", name, addr),
        }

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.clone().cancelled_owned())
            .await
            .map_err(|source| ServerError::Serve { name, source })
    }
    .await;

    if result.is_err() {
        shutdown.cancel();
    }
    result
}
