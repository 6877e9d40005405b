//! Local playlist endpoint
//!
//! Serves a fixed status and body at `/devbytes` on a random port.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;

struct PlaylistState {
    status: StatusCode,
    body: String,
    requests: AtomicUsize,
}

/// Playlist server instance
///
/// When dropped, the server shuts down.
pub struct PlaylistServer {
    /// Base URL (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    state: Arc<PlaylistState>,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

async fn serve_playlist(State(state): State<Arc<PlaylistState>>) -> impl IntoResponse {
    state.requests.fetch_add(1, Ordering::SeqCst);
    (
        state.status,
        [("content-type", "application/json")],
        state.body.clone(),
    )
}

impl PlaylistServer {
    /// Spawns a server answering every playlist request with `status` and `body`
    ///
    /// # Panics
    ///
    /// Panics if the port cannot be bound.
    pub async fn spawn(status: u16, body: &str) -> Self {
        let state = Arc::new(PlaylistState {
            status: StatusCode::from_u16(status).expect("Invalid status code"),
            body: body.to_string(),
            requests: AtomicUsize::new(0),
        });

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let app = Router::new()
            .route("/devbytes", get(serve_playlist))
            .with_state(Arc::clone(&state));

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("Playlist server failed");
        });

        Self {
            base_url: format!("http://127.0.0.1:{}", port),
            state,
            _shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn playlist_url(&self) -> String {
        format!("{}/devbytes", self.base_url)
    }

    /// Number of playlist requests served so far
    pub fn request_count(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }
}

impl Drop for PlaylistServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
