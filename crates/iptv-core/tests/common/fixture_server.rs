//! Local stand-in for remote logo hosts and playlist servers.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use image::{ImageBuffer, Rgba};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Clone)]
struct FixtureState {
    playlist: Arc<String>,
    png: Arc<Vec<u8>>,
    logo_hits: Arc<AtomicUsize>,
}

pub struct FixtureServer {
    pub base_url: String,
    logo_hits: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl FixtureServer {
    /// Serves `playlist` at `/playlist.m3u` (and after a 5 s stall at `/slow.m3u`),
    /// a 640x480 PNG at `/logo.png`, a 404 at `/missing.png` and HTML at
    /// `/not-an-image.png`.
    pub async fn start(playlist: &str) -> Self {
        let logo_hits = Arc::new(AtomicUsize::new(0));
        let state = FixtureState {
            playlist: Arc::new(playlist.to_string()),
            png: Arc::new(test_png(640, 480)),
            logo_hits: logo_hits.clone(),
        };

        let app = Router::new()
            .route("/playlist.m3u", get(serve_playlist))
            .route("/slow.m3u", get(serve_slow_playlist))
            .route("/logo.png", get(serve_logo))
            .route("/missing.png", get(|| async { StatusCode::NOT_FOUND }))
            .route(
                "/not-an-image.png",
                get(|| async { "<html>moved</html>" }),
            )
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            logo_hits,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Requests received on `/logo.png` so far.
    pub fn logo_hits(&self) -> usize {
        self.logo_hits.load(Ordering::SeqCst)
    }
}

impl Drop for FixtureServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve_playlist(State(state): State<FixtureState>) -> String {
    state.playlist.to_string()
}

async fn serve_slow_playlist(State(state): State<FixtureState>) -> String {
    tokio::time::sleep(Duration::from_secs(5)).await;
    state.playlist.to_string()
}

async fn serve_logo(State(state): State<FixtureState>) -> impl IntoResponse {
    state.logo_hits.fetch_add(1, Ordering::SeqCst);
    ([(header::CONTENT_TYPE, "image/png")], state.png.to_vec())
}

/// A red/blue checkerboard PNG.
pub fn test_png(width: u32, height: u32) -> Vec<u8> {
    let img: ImageBuffer<Rgba<u8>, Vec<u8>> = ImageBuffer::from_fn(width, height, |x, y| {
        if (x + y) % 2 == 0 {
            Rgba([255, 0, 0, 255])
        } else {
            Rgba([0, 0, 255, 255])
        }
    });

    let mut buffer = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut buffer), image::ImageFormat::Png)
        .unwrap();
    buffer
}

/// An address nothing listens on.
pub async fn closed_port_url(path: &str) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}{path}")
}
