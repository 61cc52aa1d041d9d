//! Transparent gzip compression.
//!
//! # Responsibilities
//! - Detect `gzip` in the request's `Accept-Encoding`
//! - Route body writes through a gzip encoder bound to the real sink
//! - Sniff the content type from uncompressed bytes
//! - Finish the gzip stream exactly once, even if the handler panics
//!
//! # Design Decisions
//! - Compressing responses are handed down as `Plain`: a raw connection
//!   cannot carry a half-written gzip stream, so takeover is not offered
//! - Responses that are not compressed are passed through untouched

use std::io::{self, Write};

use axum::http::{header, HeaderMap, HeaderValue, Request, StatusCode};
use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::http::sniff::detect_content_type;
use crate::http::{Handler, ResponseSink, ResponseWriter};

/// Wrap `inner` so responses are gzip-encoded when the client accepts it.
pub fn gzip<H: Handler>(inner: H) -> Gzip<H> {
    Gzip { inner }
}

/// Compression decorator. See [`gzip`].
pub struct Gzip<H> {
    inner: H,
}

impl<H: Handler> Handler for Gzip<H> {
    fn serve(&self, req: &Request<Bytes>, w: &mut ResponseWriter<'_>) {
        if !accepts_gzip(req.headers()) {
            return self.inner.serve(req, w);
        }

        w.headers_mut()
            .insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        match w {
            ResponseWriter::Plain(sink) => self.serve_compressed(req, &mut **sink),
            ResponseWriter::TakeoverCapable(sink) => self.serve_compressed(req, &mut **sink),
        }
    }
}

impl<H: Handler> Gzip<H> {
    fn serve_compressed<S>(&self, req: &Request<Bytes>, sink: &mut S)
    where
        S: ResponseSink + ?Sized,
    {
        let mut gz = GzipSink::new(sink);
        self.inner.serve(req, &mut ResponseWriter::Plain(&mut gz));
    }
}

/// Whether any comma-separated token of `Accept-Encoding` is exactly `gzip`.
pub fn accepts_gzip(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT_ENCODING)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.split(',').any(|token| token.trim() == "gzip"))
}

/// Adapts a response sink to `io::Write` for the encoder.
struct BodyWriter<'a, S: ?Sized> {
    sink: &'a mut S,
    /// Once set, the encoder can no longer reach the sink.
    closed: bool,
}

impl<S: ResponseSink + ?Sized> Write for BodyWriter<'_, S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "gzip stream already finished",
            ));
        }
        self.sink.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Compressing sink.
///
/// The status line is held back until the first body byte so the sniffed
/// content type is part of the committed headers. A response without a body
/// gets no gzip stream and no `Content-Encoding`.
struct GzipSink<'a, S: ResponseSink + ?Sized> {
    encoder: GzEncoder<BodyWriter<'a, S>>,
    pending_status: Option<StatusCode>,
    started: bool,
}

impl<'a, S: ResponseSink + ?Sized> GzipSink<'a, S> {
    fn new(sink: &'a mut S) -> Self {
        Self {
            encoder: GzEncoder::new(
                BodyWriter {
                    sink,
                    closed: false,
                },
                Compression::default(),
            ),
            pending_status: None,
            started: false,
        }
    }

    fn sink(&mut self) -> &mut S {
        &mut *self.encoder.get_mut().sink
    }

    /// Commit headers and status ahead of the first compressed byte.
    fn start(&mut self, first_chunk: &[u8]) {
        self.started = true;
        let pending = self.pending_status.take();
        let sink = self.sink();
        let headers = sink.headers_mut();
        // The handler's length describes the uncompressed body.
        headers.remove(header::CONTENT_LENGTH);
        if !headers.contains_key(header::CONTENT_TYPE) {
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static(detect_content_type(first_chunk)),
            );
        }
        if let Some(status) = pending {
            sink.write_status(status);
        }
    }

    /// Runs once, from `Drop`.
    fn finish(&mut self) {
        if self.started {
            if let Err(e) = self.encoder.try_finish() {
                tracing::warn!(error = %e, "Failed to finish gzip stream");
            }
        } else {
            let pending = self.pending_status.take();
            let sink = self.sink();
            sink.headers_mut().remove(header::CONTENT_ENCODING);
            if let Some(status) = pending {
                sink.write_status(status);
            }
        }
        // The encoder's own drop would try to finish again.
        self.encoder.get_mut().closed = true;
    }
}

impl<S: ResponseSink + ?Sized> ResponseSink for GzipSink<'_, S> {
    fn headers(&self) -> &HeaderMap {
        self.encoder.get_ref().sink.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.sink().headers_mut()
    }

    fn write_status(&mut self, status: StatusCode) {
        if self.started {
            self.sink().write_status(status);
        } else {
            self.pending_status.get_or_insert(status);
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.started {
            self.start(buf);
        }
        self.encoder.write(buf)
    }
}

impl<S: ResponseSink + ?Sized> Drop for GzipSink<'_, S> {
    fn drop(&mut self) {
        self.finish();
    }
}
