//! Static file handler.
//!
//! Serves the files under a root directory. A directory requested without a
//! trailing slash is redirected to the slashed form, and a slashed directory
//! serves its `index.html`. Content types are left to sniffing.

use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use bytes::Bytes;

use crate::http::{Handler, ResponseWriter};

const INDEX: &str = "index.html";

/// Serves files below `root`.
#[derive(Debug, Clone)]
pub struct FileServer {
    root: PathBuf,
}

impl FileServer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Handler for FileServer {
    fn serve(&self, req: &Request<Bytes>, w: &mut ResponseWriter<'_>) {
        let method = req.method();
        if method != Method::GET && method != Method::HEAD {
            w.headers_mut()
                .insert(header::ALLOW, HeaderValue::from_static("GET, HEAD"));
            return error(w, StatusCode::METHOD_NOT_ALLOWED);
        }

        let path = req.uri().path();
        let Some(relative) = sanitize(path) else {
            return error(w, StatusCode::NOT_FOUND);
        };
        let target = self.root.join(relative);

        match fs::metadata(&target) {
            Ok(meta) if meta.is_dir() => {
                if !path.ends_with('/') {
                    let location = match req.uri().query() {
                        Some(query) => format!("{path}/?{query}"),
                        None => format!("{path}/"),
                    };
                    return redirect(w, &location);
                }
                send_file(w, &target.join(INDEX), method == Method::HEAD);
            }
            Ok(_) => send_file(w, &target, method == Method::HEAD),
            Err(_) => error(w, StatusCode::NOT_FOUND),
        }
    }
}

/// Turn a URL path into a relative filesystem path, refusing to leave the root.
fn sanitize(path: &str) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return None,
            s if s.contains('\\') => return None,
            s => out.push(s),
        }
    }
    // `push` of an absolute-looking segment would replace the whole path.
    out.components()
        .all(|c| matches!(c, Component::Normal(_)))
        .then_some(out)
}

fn send_file(w: &mut ResponseWriter<'_>, path: &Path, head_only: bool) {
    let contents = match fs::read(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return error(w, StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Failed to read file");
            return error(w, StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    w.write_status(StatusCode::OK);
    if head_only {
        return;
    }
    if let Err(e) = w.write_all(&contents) {
        tracing::debug!(path = %path.display(), error = %e, "Failed to write response body");
    }
}

fn redirect(w: &mut ResponseWriter<'_>, location: &str) {
    match HeaderValue::from_str(location) {
        Ok(value) => {
            w.headers_mut().insert(header::LOCATION, value);
            w.write_status(StatusCode::MOVED_PERMANENTLY);
        }
        Err(_) => error(w, StatusCode::BAD_REQUEST),
    }
}

fn error(w: &mut ResponseWriter<'_>, status: StatusCode) {
    w.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    w.write_status(status);
    let reason = status.canonical_reason().unwrap_or("Error");
    let _ = writeln!(w, "{reason}");
}
