//! Redirect rewriting for applications mounted under a reverse-proxy prefix.
//!
//! An application served at `/app` behind a proxy still redirects to
//! `/login`; this decorator turns that into `/app/login` so the redirect
//! stays valid from the outside.

use std::io;

use axum::http::{header, HeaderMap, HeaderValue, Request, StatusCode};
use bytes::Bytes;
use url::{Position, Url};

use crate::http::{Detached, Handler, ResponseSink, ResponseWriter, Takeover};

/// Base used to resolve relative `Location` values. Never serialized.
const RELATIVE_BASE: &str = "http://relative.invalid/";

/// Wrap `inner` so the path of every 3xx `Location` is prefixed with
/// `base_path`.
pub fn proxy_redirect<H: Handler>(base_path: impl Into<String>, inner: H) -> ProxyRedirect<H> {
    ProxyRedirect {
        base_path: base_path.into(),
        inner,
    }
}

/// Redirect rewrite decorator. See [`proxy_redirect`].
pub struct ProxyRedirect<H> {
    base_path: String,
    inner: H,
}

impl<H: Handler> Handler for ProxyRedirect<H> {
    fn serve(&self, req: &Request<Bytes>, w: &mut ResponseWriter<'_>) {
        match w {
            ResponseWriter::Plain(sink) => {
                let mut rewriter = RedirectRewriter::new(&self.base_path, &mut **sink);
                self.inner.serve(req, &mut ResponseWriter::Plain(&mut rewriter));
            }
            ResponseWriter::TakeoverCapable(sink) => {
                let mut rewriter = RedirectRewriter::new(&self.base_path, &mut **sink);
                self.inner
                    .serve(req, &mut ResponseWriter::TakeoverCapable(&mut rewriter));
            }
        }
    }
}

struct RedirectRewriter<'a, S: ?Sized> {
    base_path: &'a str,
    inner: &'a mut S,
    /// Set once the status line is out; later calls must not rewrite again.
    status_sent: bool,
}

impl<'a, S: ?Sized> RedirectRewriter<'a, S> {
    fn new(base_path: &'a str, inner: &'a mut S) -> Self {
        Self {
            base_path,
            inner,
            status_sent: false,
        }
    }
}

impl<S: ResponseSink + ?Sized> ResponseSink for RedirectRewriter<'_, S> {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_status(&mut self, status: StatusCode) {
        if !self.status_sent && status.is_redirection() {
            rewrite_location(self.inner.headers_mut(), self.base_path);
        }
        self.status_sent = true;
        self.inner.write_status(status);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // A body written without a status is a 200; nothing to rewrite.
        self.status_sent = true;
        self.inner.write(buf)
    }
}

impl<S: Takeover + ?Sized> Takeover for RedirectRewriter<'_, S> {
    fn take_over(&mut self) -> io::Result<Detached> {
        self.inner.take_over()
    }
}

// TODO: rewrite the url= target of a Refresh header the same way.
fn rewrite_location(headers: &mut HeaderMap, base_path: &str) {
    let Some(location) = headers
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
    else {
        return;
    };

    let Some(rewritten) = prefix_location(location, base_path) else {
        tracing::debug!(location = %location, "Location is not a rewritable URL, leaving it as is");
        return;
    };

    if let Ok(value) = HeaderValue::from_str(&rewritten) {
        headers.insert(header::LOCATION, value);
    }
}

/// Prefix the path of `location` with `base_path`, keeping everything else.
///
/// Absolute URLs stay absolute; scheme-relative (`//host/p`) and relative
/// (`/p`, `p`, `?q`) references are re-serialized in their own form.
/// Returns `None` when `location` does not parse or has no hierarchical path.
pub fn prefix_location(location: &str, base_path: &str) -> Option<String> {
    match Url::parse(location) {
        Ok(mut url) => {
            if url.cannot_be_a_base() {
                return None;
            }
            let path = single_joining_slash(base_path, url.path());
            url.set_path(&path);
            Some(url.into())
        }
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let mut url = Url::parse(RELATIVE_BASE).ok()?.join(location).ok()?;
            let path = single_joining_slash(base_path, url.path());
            url.set_path(&path);
            if location.starts_with("//") {
                Some(format!("//{}", &url[Position::BeforeUsername..]))
            } else {
                Some(url[Position::BeforePath..].to_owned())
            }
        }
        Err(_) => None,
    }
}

/// Join `a` and `b` with exactly one slash between them.
pub fn single_joining_slash(a: &str, b: &str) -> String {
    match (a.ends_with('/'), b.starts_with('/')) {
        (true, true) => format!("{a}{}", &b[1..]),
        (false, false) => format!("{a}/{b}"),
        _ => format!("{a}{b}"),
    }
}
