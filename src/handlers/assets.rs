use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::header::HeaderValue;
use hyper::{Response, StatusCode};
use tracing::debug;

use crate::handlers::response::{full, status_response};

/// Serves the prebuilt frontend bundle. Paths that resolve to a file under
/// the asset root are served verbatim; everything else falls back to the
/// index page so client-side routes work on hard refresh.
pub struct AssetServer {
    root: PathBuf,
}

impl AssetServer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        AssetServer { root: root.into() }
    }

    pub async fn serve(&self, request_path: &str) -> Response<BoxBody<Bytes, hyper::Error>> {
        let Some(relative) = sanitize(request_path) else {
            debug!(path = %request_path, "rejected asset path");
            return status_response(StatusCode::FORBIDDEN);
        };

        let mut file_path = self.root.join(&relative);
        if relative.as_os_str().is_empty() || !is_file(&file_path).await {
            file_path = self.root.join("index.html");
        }

        match tokio::fs::read(&file_path).await {
            Ok(contents) => {
                let mut response = Response::new(full(contents));
                response.headers_mut().insert(
                    hyper::header::CONTENT_TYPE,
                    HeaderValue::from_static(content_type(&file_path)),
                );
                response
            }
            Err(err) => {
                debug!(path = %file_path.display(), error = %err, "asset not found");
                status_response(StatusCode::NOT_FOUND)
            }
        }
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

/// Reduces a request path to a relative path with only normal components.
/// Parent-directory segments would escape the asset root, so their presence
/// rejects the whole path.
fn sanitize(request_path: &str) -> Option<PathBuf> {
    let trimmed = request_path.trim_start_matches('/');
    let mut clean = PathBuf::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(clean)
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("html") => "text/html; charset=utf-8",
        Some("js") => "application/javascript",
        Some("css") => "text/css",
        Some("json") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("ico") => "image/x-icon",
        Some("woff2") => "font/woff2",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("restyle-assets-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn sanitize_rejects_traversal() {
        assert_eq!(sanitize("/../etc/passwd"), None);
        assert_eq!(sanitize("/a/../../b"), None);
        assert_eq!(sanitize("/assets/app.js"), Some(PathBuf::from("assets/app.js")));
        assert_eq!(sanitize("/./app.js"), Some(PathBuf::from("app.js")));
        assert_eq!(sanitize("/"), Some(PathBuf::new()));
    }

    #[test]
    fn content_type_is_derived_from_extension() {
        assert_eq!(content_type(Path::new("index.html")), "text/html; charset=utf-8");
        assert_eq!(content_type(Path::new("app.js")), "application/javascript");
        assert_eq!(content_type(Path::new("style.css")), "text/css");
        assert_eq!(content_type(Path::new("logo.svg")), "image/svg+xml");
        assert_eq!(content_type(Path::new("unknown.bin")), "application/octet-stream");
        assert_eq!(content_type(Path::new("no_extension")), "application/octet-stream");
    }

    #[tokio::test]
    async fn serves_matching_file_verbatim() {
        let dir = scratch_dir("match");
        std::fs::write(dir.join("app.js"), "console.log(1)").unwrap();

        let server = AssetServer::new(&dir);
        let response = server.serve("/app.js").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[hyper::header::CONTENT_TYPE],
            "application/javascript"
        );
    }

    #[tokio::test]
    async fn unmatched_route_falls_back_to_index() {
        let dir = scratch_dir("fallback");
        std::fs::write(dir.join("index.html"), "<html></html>").unwrap();

        let server = AssetServer::new(&dir);
        for path in ["/", "/some/client/route", "/missing.js"] {
            let response = server.serve(path).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(
                response.headers()[hyper::header::CONTENT_TYPE],
                "text/html; charset=utf-8"
            );
        }
    }

    #[tokio::test]
    async fn missing_index_is_not_found() {
        let dir = scratch_dir("empty");
        let server = AssetServer::new(dir.join("does-not-exist"));
        let response = server.serve("/anything").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn traversal_is_forbidden() {
        let dir = scratch_dir("traversal");
        let server = AssetServer::new(&dir);
        let response = server.serve("/../secret.txt").await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
