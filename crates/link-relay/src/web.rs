use crate::bitly::{Bitlink, LinkShortener, shorten_and_tag};
use crate::config::RelayConfig;
use crate::error::RelayError;
use anyhow::{Context, Result};
use axum::Router;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::{StatusCode, Uri, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{debug, info, warn};

struct RelayState<S> {
    shortener: Arc<S>,
    token: Option<Arc<str>>,
    build_dir: Arc<PathBuf>,
}

impl<S> Clone for RelayState<S> {
    fn clone(&self) -> Self {
        Self {
            shortener: self.shortener.clone(),
            token: self.token.clone(),
            build_dir: self.build_dir.clone(),
        }
    }
}

pub fn router<S: LinkShortener + 'static>(shortener: S, config: &RelayConfig) -> Router {
    let state = RelayState {
        shortener: Arc::new(shortener),
        token: config.bitly_api_token.as_deref().map(Arc::from),
        build_dir: Arc::new(config.build_dir.clone()),
    };
    Router::new()
        .route("/", get(serve_index::<S>))
        .route("/image_link", get(image_link::<S>))
        .fallback(serve_asset::<S>)
        .with_state(state)
}

pub async fn run<S: LinkShortener + 'static>(shortener: S, config: RelayConfig) -> Result<()> {
    if config.bitly_api_token.is_none() {
        warn!("BITLY_API_TOKEN is not set; /image_link will answer 500");
    }
    if !config.index_path().is_file() {
        warn!(path = %config.index_path().display(), "gallery bundle has no index.html");
    }

    let app = router(shortener, &config);
    let addr = config.socket_addr();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind relay listener on {addr}"))?;
    info!(?addr, build_dir = %config.build_dir.display(), "Now listening...");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("relay server exited")?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.ok();
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut term) = signal(SignalKind::terminate()) {
            term.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();
    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown requested");
}

#[derive(Deserialize)]
struct ImageLinkQuery {
    url: Option<String>,
}

async fn image_link<S: LinkShortener>(
    State(state): State<RelayState<S>>,
    query: Result<Query<ImageLinkQuery>, QueryRejection>,
) -> Result<Json<Bitlink>, RelayError> {
    // The credential check comes before any look at the query string.
    let token = state.token.as_deref().ok_or(RelayError::MissingToken)?;
    let long_url = query
        .map_err(|rejection| {
            debug!(error = %rejection, "unusable image_link query");
            RelayError::MissingUrl
        })?
        .0
        .url
        .filter(|url| !url.trim().is_empty())
        .ok_or(RelayError::MissingUrl)?;
    let link = shorten_and_tag(state.shortener.as_ref(), token, &long_url).await?;
    info!(id = %link.id, long_url = %long_url, "shortened image link");
    Ok(Json(link))
}

async fn serve_index<S>(State(state): State<RelayState<S>>) -> Response {
    send_file(&state.build_dir.join("index.html")).await
}

async fn serve_asset<S>(State(state): State<RelayState<S>>, uri: Uri) -> Response {
    let Some(path) = resolve_asset(&state.build_dir, uri.path()) else {
        warn!(path = uri.path(), "rejected asset path");
        return (StatusCode::BAD_REQUEST, "invalid path").into_response();
    };
    let is_file = tokio::fs::metadata(&path)
        .await
        .is_ok_and(|meta| meta.is_file());
    if is_file {
        send_file(&path).await
    } else {
        debug!(path = uri.path(), "no such asset; serving index.html");
        send_file(&state.build_dir.join("index.html")).await
    }
}

/// Map a request path onto `root`, refusing anything that could escape it.
fn resolve_asset(root: &Path, request_path: &str) -> Option<PathBuf> {
    let mut path = root.to_path_buf();
    for segment in request_path.split('/') {
        match segment {
            "" | "." => {}
            ".." => return None,
            s if s.contains('\\') || s.contains('\0') => return None,
            s => path.push(s),
        }
    }
    Some(path)
}

async fn send_file(path: &Path) -> Response {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let mut resp = Response::new(bytes.into());
            resp.headers_mut().insert(
                header::CONTENT_TYPE,
                header::HeaderValue::from_static(content_type(path)),
            );
            resp
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to read asset");
            (StatusCode::NOT_FOUND, "not found").into_response()
        }
    }
}

fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("js" | "mjs") => "text/javascript; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("json" | "map") => "application/json",
        Some("txt") => "text/plain; charset=utf-8",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        _ => "application/octet-stream",
    }
}
