//! Request dispatch: maps resolved paths to listings or file deliveries.

use std::path::Path;

use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::{Html, IntoResponse, Response};
use tracing::debug;

use crate::error::ServerError;
use crate::renderer::{plan_delivery, render_listing, scan_directory};
use crate::transfer::deliver;
use crate::AppState;

/// GET handler for every path under the served root.
pub async fn serve_path(
    State(state): State<AppState>,
    uri: Uri,
) -> Result<Response, ServerError> {
    let resolved = state.resolver.resolve(uri.path())?;

    if !resolved.exists {
        return Err(ServerError::NotFound(uri.path().to_string()));
    }

    if resolved.is_dir {
        serve_listing(&state, &resolved.path).await
    } else {
        serve_file(&state, &resolved.path, download_requested(&uri)).await
    }
}

/// True when the query string carries the exact `download=true` pair.
/// Parsed straight off the raw query so repeated or malformed parameters
/// never bounce a request out of the HTML error surface.
fn download_requested(uri: &Uri) -> bool {
    uri.query()
        .map(|query| query.split('&').any(|pair| pair == "download=true"))
        .unwrap_or(false)
}

/// OPTIONS handler. The CORS headers come from the router layers, so a bare
/// 200 with no body is all that is needed here.
pub async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn serve_listing(state: &AppState, dir: &Path) -> Result<Response, ServerError> {
    debug!(path = %dir.display(), "rendering directory listing");

    let rel_path = relative_to_root(state.resolver.root(), dir);
    let config = state.config.clone();
    let scan_target = dir.to_path_buf();
    let entries = tokio::task::spawn_blocking(move || scan_directory(&scan_target, &config))
        .await
        .map_err(join_error)??;

    Ok(Html(render_listing(&rel_path, &entries)).into_response())
}

async fn serve_file(
    state: &AppState,
    path: &Path,
    download: bool,
) -> Result<Response, ServerError> {
    let config = state.config.clone();
    let plan_target = path.to_path_buf();
    let plan = tokio::task::spawn_blocking(move || plan_delivery(&plan_target, download, &config))
        .await
        .map_err(join_error)??;

    debug!(path = %path.display(), disposition = ?plan.disposition, "serving file");
    deliver(path, &plan).await
}

fn relative_to_root(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn join_error(err: tokio::task::JoinError) -> ServerError {
    ServerError::Io(std::io::Error::new(std::io::ErrorKind::Other, err))
}
