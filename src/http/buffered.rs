//! In-memory response sink used by the server adapter.
//!
//! Collects status, headers and body for one exchange and converts them into
//! an Axum response once the handler chain has returned. Behaves like a
//! default HTTP/1.1 response writer: the first status wins, a body write
//! implies `200 OK`, and the content type is sniffed when the handler never
//! sets one.
//!
//! Headers are committed together with the status line. Edits made through
//! `headers_mut` after that point stay in the handler's map and are not sent.

use std::io;

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::Response,
};
use hyper::upgrade::OnUpgrade;

use crate::http::sink::{Detached, ResponseSink, ResponseWriter, Takeover};
use crate::http::sniff::detect_content_type;

/// Buffers one response in memory.
#[derive(Debug, Default)]
pub struct BufferedSink {
    status: Option<StatusCode>,
    headers: HeaderMap,
    committed: Option<HeaderMap>,
    body: Vec<u8>,
    takeover_capable: bool,
    upgrade: Option<OnUpgrade>,
    taken_over: bool,
}

impl BufferedSink {
    /// A sink without takeover support.
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose connection can be taken over through `upgrade`.
    pub fn with_upgrade(upgrade: OnUpgrade) -> Self {
        Self {
            takeover_capable: true,
            upgrade: Some(upgrade),
            ..Self::default()
        }
    }

    /// The writer to hand to a handler chain.
    pub fn writer(&mut self) -> ResponseWriter<'_> {
        if self.takeover_capable {
            ResponseWriter::TakeoverCapable(self)
        } else {
            ResponseWriter::Plain(self)
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn is_taken_over(&self) -> bool {
        self.taken_over
    }

    /// The headers the client receives: the committed set once a status or
    /// body byte has been written, the handler's map before that.
    pub fn response_headers(&self) -> &HeaderMap {
        self.committed.as_ref().unwrap_or(&self.headers)
    }

    fn commit(&mut self) -> &mut HeaderMap {
        self.committed.get_or_insert_with(|| self.headers.clone())
    }

    /// Build the response. A taken-over exchange without an explicit status
    /// answers `101 Switching Protocols` so the upgrade can complete.
    pub fn into_response(self) -> Response {
        let status = match self.status {
            Some(status) => status,
            None if self.taken_over => StatusCode::SWITCHING_PROTOCOLS,
            None => StatusCode::OK,
        };

        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = status;
        *response.headers_mut() = self.committed.unwrap_or(self.headers);
        response
    }

    #[cfg(test)]
    pub(crate) fn upgradable() -> Self {
        Self::with_upgrade(hyper::upgrade::on(axum::http::Request::new(())))
    }
}

impl ResponseSink for BufferedSink {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_status(&mut self, status: StatusCode) {
        if self.taken_over {
            tracing::debug!(status = %status, "Status written after connection takeover, ignoring");
            return;
        }
        match self.status {
            None => {
                self.status = Some(status);
                self.commit();
            }
            Some(current) => {
                tracing::debug!(current = %current, ignored = %status, "Superfluous status write");
            }
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.taken_over {
            return Err(io::Error::other("connection has been taken over"));
        }
        self.status.get_or_insert(StatusCode::OK);
        let first = self.body.is_empty();
        let headers = self.commit();
        if first && !headers.contains_key(header::CONTENT_TYPE) {
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static(detect_content_type(buf)),
            );
        }
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }
}

impl Takeover for BufferedSink {
    fn take_over(&mut self) -> io::Result<Detached> {
        match self.upgrade.take() {
            Some(upgrade) => {
                self.commit();
                self.taken_over = true;
                Ok(Detached::new(upgrade))
            }
            None if self.taken_over => Err(io::Error::other("connection already taken over")),
            None => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "connection takeover is not supported by this response",
            )),
        }
    }
}
