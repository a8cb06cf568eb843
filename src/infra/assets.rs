//! Static files served from the client build directory.

use std::{io::ErrorKind, path::PathBuf, sync::Arc};

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use mime_guess::Mime;

use crate::application::error::ErrorReport;

const SOURCE: &str = "infra::assets::serve_static";

/// Well-known root files, served without caching headers.
const ROOT_FILES: &[&str] = &["/robots.txt", "/favicon.ico", "/manifest.json"];

const ASSET_EXTENSIONS: &[&str] = &[
    "js", "json", "png", "svg", "ico", "css", "txt", "woff", "woff2",
];

/// True for paths answered from the static directory instead of the
/// render pipeline.
pub fn is_static_path(path: &str) -> bool {
    if ROOT_FILES.contains(&path) {
        return true;
    }
    let file = path.rsplit('/').next().unwrap_or_default();
    file.rsplit_once('.')
        .is_some_and(|(stem, ext)| !stem.is_empty() && ASSET_EXTENSIONS.contains(&ext))
}

#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: Arc<PathBuf>,
}

impl StaticFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Arc::new(root.into()),
        }
    }

    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let candidate = path.trim_start_matches('/');
        if candidate.is_empty() || candidate.ends_with('/') || candidate.contains("..") {
            return None;
        }
        Some(self.root.join(candidate))
    }
}

pub async fn serve_static(State(files): State<StaticFiles>, uri: Uri) -> Response {
    let path = uri.path();
    let Some(file) = files.resolve(path) else {
        return rejected_response(StatusCode::NOT_FOUND);
    };

    match tokio::fs::read(&file).await {
        Ok(contents) => {
            let mime = mime_guess::from_path(&file).first_or_octet_stream();
            let immutable = !ROOT_FILES.contains(&path);
            build_response(Bytes::from(contents), mime, immutable)
        }
        Err(err) if matches!(err.kind(), ErrorKind::NotFound | ErrorKind::IsADirectory) => {
            not_found_response(path)
        }
        Err(err) => {
            let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
            ErrorReport::from_error(SOURCE, StatusCode::INTERNAL_SERVER_ERROR, &err)
                .attach(&mut response);
            response
        }
    }
}

fn not_found_response(path: &str) -> Response {
    let mut response = StatusCode::NOT_FOUND.into_response();
    ErrorReport::from_message(
        SOURCE,
        StatusCode::NOT_FOUND,
        format!("static file `{path}` not found"),
    )
    .attach(&mut response);
    response
}

fn rejected_response(status: StatusCode) -> Response {
    let mut response = status.into_response();
    ErrorReport::from_message(SOURCE, status, "Static asset request rejected")
        .attach(&mut response);
    response
}

fn build_response(bytes: Bytes, mime: Mime, immutable: bool) -> Response {
    let len = bytes.len();
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&len.to_string()) {
        headers.insert(header::CONTENT_LENGTH, value);
    }
    let cache_control = if immutable {
        "public, max-age=31536000, immutable"
    } else {
        "public, max-age=3600"
    };
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(cache_control));

    response
}
