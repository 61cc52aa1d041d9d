//! Response sink contract shared by handlers and decorators.
//!
//! # Responsibilities
//! - Define the response surface a handler writes to (headers, status, body)
//! - Model connection takeover as an optional, separate capability
//! - Hand handlers a writer whose variant states whether takeover exists
//!
//! # Design Decisions
//! - Takeover lives in its own trait; a sink without it cannot be asked for it
//! - Decorators probe the capability once, by matching on [`ResponseWriter`],
//!   and hand the same variant down to the handler they wrap
//! - Handlers are synchronous; the server adapter runs them on the blocking pool

use std::io;

use axum::http::{HeaderMap, Request, StatusCode};
use bytes::Bytes;
use hyper::upgrade::{OnUpgrade, Upgraded};
use hyper_util::rt::TokioIo;

/// The response half of an exchange.
pub trait ResponseSink {
    /// Response headers.
    fn headers(&self) -> &HeaderMap;

    /// Mutable response headers.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Send the status line. Only the first call reaches the client.
    fn write_status(&mut self, status: StatusCode);

    /// Write body bytes, returning how many were accepted.
    ///
    /// Writing without a prior status implies `200 OK`.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
}

/// Ability to detach the underlying transport from the HTTP exchange.
pub trait Takeover {
    /// Take the connection over. The response is finished without a body and
    /// the returned handle yields the raw stream once the upgrade completes.
    fn take_over(&mut self) -> io::Result<Detached>;
}

/// A sink that also supports [`Takeover`].
pub trait TakeoverSink: ResponseSink + Takeover {}

impl<T: ResponseSink + Takeover + ?Sized> TakeoverSink for T {}

/// A connection detached from its HTTP exchange.
#[derive(Debug)]
pub struct Detached {
    upgrade: OnUpgrade,
}

impl Detached {
    pub fn new(upgrade: OnUpgrade) -> Self {
        Self { upgrade }
    }

    /// Wait for the upgrade to complete and return the raw stream.
    pub async fn into_io(self) -> Result<TokioIo<Upgraded>, hyper::Error> {
        self.upgrade.await.map(TokioIo::new)
    }
}

/// The writer a handler receives.
///
/// The variant is the capability probe: decorators match on it once, before
/// calling the handler they wrap, and never inspect the sink again.
pub enum ResponseWriter<'a> {
    Plain(&'a mut dyn ResponseSink),
    TakeoverCapable(&'a mut dyn TakeoverSink),
}

impl ResponseWriter<'_> {
    pub fn headers(&self) -> &HeaderMap {
        match self {
            Self::Plain(sink) => sink.headers(),
            Self::TakeoverCapable(sink) => sink.headers(),
        }
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        match self {
            Self::Plain(sink) => sink.headers_mut(),
            Self::TakeoverCapable(sink) => sink.headers_mut(),
        }
    }

    pub fn write_status(&mut self, status: StatusCode) {
        match self {
            Self::Plain(sink) => sink.write_status(status),
            Self::TakeoverCapable(sink) => sink.write_status(status),
        }
    }

    pub fn supports_takeover(&self) -> bool {
        matches!(self, Self::TakeoverCapable(_))
    }

    /// Take the connection over, if the sink underneath supports it.
    pub fn take_over(&mut self) -> io::Result<Detached> {
        match self {
            Self::Plain(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "connection takeover is not supported by this response",
            )),
            Self::TakeoverCapable(sink) => sink.take_over(),
        }
    }
}

impl io::Write for ResponseWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(sink) => sink.write(buf),
            Self::TakeoverCapable(sink) => sink.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// An application handler, or a decorator around one.
pub trait Handler: Send + Sync + 'static {
    fn serve(&self, req: &Request<Bytes>, w: &mut ResponseWriter<'_>);
}

impl<H: Handler + ?Sized> Handler for std::sync::Arc<H> {
    fn serve(&self, req: &Request<Bytes>, w: &mut ResponseWriter<'_>) {
        (**self).serve(req, w)
    }
}

/// Handler built from a closure. See [`handler_fn`].
#[derive(Clone)]
pub struct HandlerFn<F> {
    f: F,
}

/// Turn a closure into a [`Handler`].
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: Fn(&Request<Bytes>, &mut ResponseWriter<'_>) + Send + Sync + 'static,
{
    HandlerFn { f }
}

impl<F> Handler for HandlerFn<F>
where
    F: Fn(&Request<Bytes>, &mut ResponseWriter<'_>) + Send + Sync + 'static,
{
    fn serve(&self, req: &Request<Bytes>, w: &mut ResponseWriter<'_>) {
        (self.f)(req, w)
    }
}
