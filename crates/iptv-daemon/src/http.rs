use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use iptv_core::config::PlaylistConfig;
use iptv_core::{CatalogError, CatalogStats, Category, Channel, LogoCache, Playlist, PlaylistStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{error, info};

#[derive(Clone)]
pub struct HttpState {
    pub store: Arc<PlaylistStore>,
    pub logos: Arc<LogoCache>,
    pub playlist: PlaylistConfig,
}

#[derive(Serialize)]
struct FavoriteStatus {
    is_favorite: bool,
}

#[derive(Serialize)]
struct Cleared {
    cleared: usize,
}

#[derive(Serialize)]
struct Reloaded {
    channels: usize,
    revision: u64,
}

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    term: String,
}

#[derive(Deserialize)]
struct ReloadParams {
    source: Option<String>,
}

struct ApiError(CatalogError);

impl From<CatalogError> for ApiError {
    fn from(e: CatalogError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CatalogError::NotFound(_) => StatusCode::NOT_FOUND,
            CatalogError::Format(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CatalogError::Io { .. } | CatalogError::LogoFetch { .. } => StatusCode::BAD_GATEWAY,
            CatalogError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            CatalogError::State(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn router(state: HttpState) -> Router {
    let logo_dir = ServeDir::new(state.logos.cache_dir());
    let logo_prefix = state.logos.public_prefix().to_string();

    Router::new()
        .route("/api/stats", get(get_stats))
        .route("/api/playlist", get(get_playlist))
        .route("/api/categories/:category", get(get_category))
        .route("/api/channels/:category/:channel", get(get_channel))
        .route("/api/channels/:category/:channel/play", post(play_channel))
        .route(
            "/api/channels/:category/:channel/favorite",
            post(toggle_favorite),
        )
        .route("/api/recent", get(get_recent).delete(clear_recent))
        .route("/api/favorites", get(get_favorites).delete(clear_favorites))
        .route("/api/search", get(search))
        .route("/api/reload", post(reload))
        .nest_service(&logo_prefix, logo_dir)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(bind_address: String, port: u16, state: HttpState) -> anyhow::Result<()> {
    let app = router(state);

    let addr = format!("{}:{}", bind_address, port);
    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        error!("Failed to bind HTTP server to {}: {}", addr, e);
        e
    })?;

    info!("HTTP API server listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn get_stats(State(state): State<HttpState>) -> Json<CatalogStats> {
    Json(state.store.stats().await)
}

async fn get_playlist(State(state): State<HttpState>) -> ApiResult<Playlist> {
    state
        .store
        .snapshot()
        .await
        .map(Json)
        .ok_or_else(|| CatalogError::NotFound("playlist".to_string()).into())
}

async fn get_category(
    State(state): State<HttpState>,
    Path(category): Path<String>,
) -> ApiResult<Category> {
    Ok(Json(state.store.get_category(&category).await?))
}

async fn get_channel(
    State(state): State<HttpState>,
    Path((category, channel)): Path<(String, String)>,
) -> ApiResult<Channel> {
    Ok(Json(state.store.get_channel(&category, &channel).await?))
}

async fn play_channel(
    State(state): State<HttpState>,
    Path((category, channel)): Path<(String, String)>,
) -> ApiResult<Channel> {
    let channel = state.store.set_recent_channel(&category, &channel).await?;
    info!("HTTP API: Play {}", channel.title);
    Ok(Json(channel))
}

async fn toggle_favorite(
    State(state): State<HttpState>,
    Path((category, channel)): Path<(String, String)>,
) -> ApiResult<FavoriteStatus> {
    let is_favorite = state
        .store
        .toggle_favorite_channel(&category, &channel)
        .await?;
    Ok(Json(FavoriteStatus { is_favorite }))
}

async fn get_recent(State(state): State<HttpState>) -> Json<Vec<Channel>> {
    Json(state.store.recent_channels().await)
}

async fn clear_recent(State(state): State<HttpState>) -> Json<Cleared> {
    Json(Cleared {
        cleared: state.store.clear_recent_channels().await,
    })
}

async fn get_favorites(State(state): State<HttpState>) -> Json<Vec<Channel>> {
    Json(state.store.favorite_channels().await)
}

async fn clear_favorites(State(state): State<HttpState>) -> Json<Cleared> {
    Json(Cleared {
        cleared: state.store.clear_favorite_channels().await,
    })
}

async fn search(
    State(state): State<HttpState>,
    Query(params): Query<SearchParams>,
) -> Json<Playlist> {
    Json(state.store.search_channels(&params.term).await)
}

/// Re-reads the configured source, or `?source=` when given.
async fn reload(
    State(state): State<HttpState>,
    Query(params): Query<ReloadParams>,
) -> ApiResult<Reloaded> {
    let source = params
        .source
        .unwrap_or_else(|| state.playlist.source.clone());
    if source.is_empty() {
        return Err(CatalogError::NotFound("playlist source".to_string()).into());
    }
    info!("HTTP API: Reload from {}", source);
    let channels = state
        .store
        .reload(&source, &state.logos, state.playlist.reload_timeout())
        .await?;
    Ok(Json(Reloaded {
        channels,
        revision: state.store.revision().await,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use iptv_core::m3u::encode_id;
    use tower::ServiceExt;

    const PLAYLIST: &str = "#EXTM3U
#EXTINF:-1 tvg-id=\"fox\" group-title=\"News\",FOX TV
http://streams/fox.m3u8
#EXTINF:-1 tvg-id=\"cnn\" group-title=\"News\",CNN
http://streams/cnn.m3u8
#EXTINF:-1 tvg-id=\"natgeo\" group-title=\"Documentary\",Nat Geo
http://streams/natgeo.m3u8
";

    struct TestApp {
        _dir: tempfile::TempDir,
        state: HttpState,
    }

    async fn test_app(load: bool) -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("channels.m3u");
        std::fs::write(&source, PLAYLIST).unwrap();

        let state = HttpState {
            store: Arc::new(PlaylistStore::in_memory()),
            logos: Arc::new(LogoCache::new(dir.path().join("logo"))),
            playlist: PlaylistConfig {
                source: source.to_string_lossy().into_owned(),
                ..PlaylistConfig::default()
            },
        };
        if load {
            state
                .store
                .reload(
                    &state.playlist.source,
                    &state.logos,
                    state.playlist.reload_timeout(),
                )
                .await
                .unwrap();
        }
        TestApp { _dir: dir, state }
    }

    async fn call(app: &TestApp, method: Method, uri: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = router(app.state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    fn channel_uri(category: &str, channel: &str, action: &str) -> String {
        format!(
            "/api/channels/{}/{}{}",
            encode_id(category),
            encode_id(channel),
            action
        )
    }

    #[tokio::test]
    async fn test_stats_before_and_after_reload() {
        let app = test_app(false).await;
        let (status, stats) = call(&app, Method::GET, "/api/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["loaded"], false);
        assert_eq!(stats["channels"], 0);

        let (status, _) = call(&app, Method::GET, "/api/playlist").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, reloaded) = call(&app, Method::POST, "/api/reload").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reloaded["channels"], 3);
        assert_eq!(reloaded["revision"], 1);

        let (_, stats) = call(&app, Method::GET, "/api/stats").await;
        assert_eq!(stats["loaded"], true);
        assert_eq!(stats["categories"], 2);
        assert_eq!(stats["channels"], 3);
        assert_eq!(stats["revision"], 1);
    }

    #[tokio::test]
    async fn test_lookup_and_not_found() {
        let app = test_app(true).await;

        let (status, category) = call(
            &app,
            Method::GET,
            &format!("/api/categories/{}", encode_id("News")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(category["name"], "News");

        let (status, channel) = call(&app, Method::GET, &channel_uri("News", "fox", "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(channel["title"], "FOX TV");
        assert_eq!(channel["media_url"], "http://streams/fox.m3u8");

        let (status, body) = call(&app, Method::GET, &channel_uri("News", "bbc", "")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("could not be found"));
    }

    #[tokio::test]
    async fn test_play_and_favorite() {
        let app = test_app(true).await;

        call(&app, Method::POST, &channel_uri("News", "fox", "/play")).await;
        let (status, played) =
            call(&app, Method::POST, &channel_uri("Documentary", "natgeo", "/play")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(played["recent_ordinal"], 1);

        let (_, recent) = call(&app, Method::GET, "/api/recent").await;
        let titles: Vec<&str> = recent
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["title"].as_str().unwrap())
            .collect();
        assert_eq!(titles, vec!["Nat Geo", "FOX TV"]);

        let (_, favorite) = call(&app, Method::POST, &channel_uri("News", "cnn", "/favorite")).await;
        assert_eq!(favorite["is_favorite"], true);
        let (_, favorites) = call(&app, Method::GET, "/api/favorites").await;
        assert_eq!(favorites.as_array().unwrap().len(), 1);

        let (_, cleared) = call(&app, Method::DELETE, "/api/recent").await;
        assert_eq!(cleared["cleared"], 2);
        let (_, cleared) = call(&app, Method::DELETE, "/api/favorites").await;
        assert_eq!(cleared["cleared"], 1);

        let (status, _) = call(&app, Method::POST, &channel_uri("News", "bbc", "/play")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_search() {
        let app = test_app(true).await;
        let (status, results) = call(&app, Method::GET, "/api/search?term=FOX").await;
        assert_eq!(status, StatusCode::OK);
        let categories = results["categories"].as_object().unwrap();
        assert_eq!(categories.len(), 1);
        assert!(categories.contains_key(&encode_id("News")));
    }

    #[tokio::test]
    async fn test_failed_reload_reports_error() {
        let app = test_app(true).await;
        let (status, _) = call(&app, Method::POST, "/api/reload?source=/nonexistent/list.m3u").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let (_, stats) = call(&app, Method::GET, "/api/stats").await;
        assert_eq!(stats["channels"], 3);
        assert_eq!(stats["revision"], 1);
    }

    #[tokio::test]
    async fn test_serves_cached_logos() {
        let app = test_app(false).await;
        let cache_dir = app.state.logos.cache_dir().to_path_buf();
        std::fs::create_dir_all(&cache_dir).unwrap();
        std::fs::write(cache_dir.join("Zm94.jpg"), b"jpeg").unwrap();

        let request = Request::builder()
            .uri("/logo/Zm94.jpg")
            .body(Body::empty())
            .unwrap();
        let response = router(app.state.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"jpeg");
    }
}
