//! HTTP server for the conversation store.
//!
//! Provides REST endpoints for:
//! - Conversation CRUD and message editing
//! - Date-grouped listings
//! - Export/import of portable documents
//! - Server-sent change events

pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::http::Method;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::store::ServerConfig;

/// Boxed error returned by the serving functions.
pub type ServeError = Box<dyn std::error::Error + Send + Sync>;

/// Router with CORS and request tracing applied.
pub fn build_app(state: Arc<AppState>) -> Router {
    // Browser front ends may be served from another local origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers(Any);

    create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Bind `config.host:config.port` and serve until `shutdown_signal` completes.
///
/// # Errors
/// Returns an error if the address cannot be bound or serving fails.
pub async fn run_server_with_shutdown<F>(
    state: Arc<AppState>,
    config: &ServerConfig,
    shutdown_signal: F,
) -> Result<(), ServeError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(SocketAddr::new(config.host, config.port)).await?;
    serve(listener, state, shutdown_signal).await
}

/// Serve on an already bound listener.
///
/// # Errors
/// Returns an error if serving fails.
pub async fn serve<F>(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown_signal: F,
) -> Result<(), ServeError>
where
    F: Future<Output = ()> + Send + 'static,
{
    tracing::info!(address = %listener.local_addr()?, "Chatvault server listening");
    axum::serve(listener, build_app(state))
        .with_graceful_shutdown(shutdown_signal)
        .await?;
    tracing::info!("Chatvault server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    use crate::store::SqliteConversationStore;

    #[tokio::test]
    async fn test_serves_until_shutdown() {
        let store = SqliteConversationStore::open_in_memory().await.unwrap();
        let state = AppState::with_store(Arc::new(store), &ServerConfig::default());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

        let server = tokio::spawn(serve(listener, state, async move {
            let _ = stop_rx.await;
        }));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("\"service\":\"chatvault\""));

        stop_tx.send(()).unwrap();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_cors_preflight_is_answered() {
        use axum::body::Body;
        use axum::http::{Request, header};
        use tower::ServiceExt;

        let store = SqliteConversationStore::open_in_memory().await.unwrap();
        let state = AppState::with_store(Arc::new(store), &ServerConfig::default());
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/conversations")
            .header(header::ORIGIN, "http://localhost:5173")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "DELETE")
            .body(Body::empty())
            .unwrap();

        let response = build_app(state).oneshot(request).await.unwrap();

        assert!(
            response
                .headers()
                .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        );
    }
}
