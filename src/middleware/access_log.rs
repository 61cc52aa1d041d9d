//! Access logging.
//!
//! # Responsibilities
//! - Capture the final status code and body byte count of each response
//! - Measure request latency
//! - Emit one fixed-format line per request through an [`AccessLogWriter`]
//!
//! # Log Format
//! ```text
//! TIMESTAMP METHOD STATUS PATH ORIGIN BYTES DURATION 'USER_AGENT'
//! 2024/03/05 07:08:09 GET 200 /a?x=1 10.0.0.1 2 12.4ms 'curl/8.5.0'
//! ```
//!
//! # Design Decisions
//! - The first status the handler writes is the one logged
//! - A body write or a connection takeover without a status counts as 200
//! - A failed log write never affects the response

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ConnectInfo;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use bytes::Bytes;
use chrono::{DateTime, Local};

use crate::http::{Detached, Handler, ResponseSink, ResponseWriter, Takeover};
use crate::observability::LogFile;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Destination for access log records.
pub trait AccessLogWriter: Send + Sync {
    fn write_record(&self, record: &LogRecord) -> io::Result<()>;
}

impl AccessLogWriter for LogFile {
    fn write_record(&self, record: &LogRecord) -> io::Result<()> {
        self.write(format!("{record}\n").as_bytes()).map(|_| ())
    }
}

/// Emits records as `tracing` events on the `access_log` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLog;

impl AccessLogWriter for TracingLog {
    fn write_record(&self, record: &LogRecord) -> io::Result<()> {
        tracing::info!(target: "access_log", "{record}");
        Ok(())
    }
}

/// One access log line.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub timestamp: DateTime<Local>,
    pub method: Method,
    /// `None` when the handler neither wrote a status nor a body.
    pub status: Option<StatusCode>,
    pub path: String,
    pub origin: String,
    pub bytes: u64,
    pub elapsed: Duration,
    pub user_agent: String,
}

impl LogRecord {
    fn from_request(
        req: &Request<Bytes>,
        timestamp: DateTime<Local>,
        status: Option<StatusCode>,
        bytes: u64,
        elapsed: Duration,
    ) -> Self {
        let uri = req.uri();
        let path = uri
            .path_and_query()
            .map(|pq| pq.as_str().to_owned())
            .unwrap_or_else(|| uri.to_string());
        let user_agent = header_str(req.headers(), header::USER_AGENT.as_str())
            .unwrap_or_default()
            .to_owned();

        Self {
            timestamp,
            method: req.method().clone(),
            status,
            path,
            origin: origin(req),
            bytes,
            elapsed,
            user_agent,
        }
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ",
            self.timestamp.format("%Y/%m/%d %H:%M:%S"),
            self.method
        )?;
        match self.status {
            Some(status) => write!(f, "{}", status.as_u16())?,
            None => f.write_str("-")?,
        }
        write!(
            f,
            " {} {} {} {:?} '{}'",
            self.path, self.origin, self.bytes, self.elapsed, self.user_agent
        )
    }
}

/// Forwarded-for header when present and non-empty, else the peer address.
fn origin<B>(req: &Request<B>) -> String {
    if let Some(forwarded) = header_str(req.headers(), X_FORWARDED_FOR).filter(|v| !v.is_empty()) {
        return forwarded.to_owned();
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "-".to_owned())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Wrap `inner` so every request it serves is logged to `writer`.
pub fn access_log<H: Handler>(writer: Arc<dyn AccessLogWriter>, inner: H) -> AccessLog<H> {
    AccessLog { inner, writer }
}

/// Access log decorator. See [`access_log`].
pub struct AccessLog<H> {
    inner: H,
    writer: Arc<dyn AccessLogWriter>,
}

impl<H: Handler> Handler for AccessLog<H> {
    fn serve(&self, req: &Request<Bytes>, w: &mut ResponseWriter<'_>) {
        let timestamp = Local::now();
        let start = Instant::now();

        let (status, bytes) = match w {
            ResponseWriter::Plain(sink) => {
                let mut recorder = StatusRecorder::new(&mut **sink);
                self.inner.serve(req, &mut ResponseWriter::Plain(&mut recorder));
                (recorder.status(), recorder.bytes())
            }
            ResponseWriter::TakeoverCapable(sink) => {
                let mut recorder = StatusRecorder::new(&mut **sink);
                self.inner
                    .serve(req, &mut ResponseWriter::TakeoverCapable(&mut recorder));
                (recorder.status(), recorder.bytes())
            }
        };

        let record = LogRecord::from_request(req, timestamp, status, bytes, start.elapsed());
        if let Err(e) = self.writer.write_record(&record) {
            tracing::warn!(error = %e, path = %record.path, "Failed to write access log record");
        }
    }
}

/// Records the first status and the body byte count of a response.
pub struct StatusRecorder<'a, S: ?Sized> {
    inner: &'a mut S,
    status: Option<StatusCode>,
    bytes: u64,
}

impl<'a, S: ?Sized> StatusRecorder<'a, S> {
    pub fn new(inner: &'a mut S) -> Self {
        Self {
            inner,
            status: None,
            bytes: 0,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl<S: ResponseSink + ?Sized> ResponseSink for StatusRecorder<'_, S> {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_status(&mut self, status: StatusCode) {
        self.inner.write_status(status);
        self.status.get_or_insert(status);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.status.get_or_insert(StatusCode::OK);
        let n = self.inner.write(buf)?;
        self.bytes += n as u64;
        Ok(n)
    }
}

impl<S: Takeover + ?Sized> Takeover for StatusRecorder<'_, S> {
    fn take_over(&mut self) -> io::Result<Detached> {
        // No status line follows a takeover; count it as a success.
        self.status.get_or_insert(StatusCode::OK);
        self.inner.take_over()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{handler_fn, BufferedSink};
    use axum::http::HeaderValue;
    use chrono::TimeZone;
    use std::io::Write;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryLog(Mutex<Vec<LogRecord>>);

    impl MemoryLog {
        fn records(&self) -> Vec<LogRecord> {
            self.0.lock().unwrap().clone()
        }
    }

    impl AccessLogWriter for MemoryLog {
        fn write_record(&self, record: &LogRecord) -> io::Result<()> {
            self.0.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    fn serve<H: Handler>(handler: H, req: Request<Bytes>, sink: &mut BufferedSink) -> LogRecord {
        let log = Arc::new(MemoryLog::default());
        access_log(log.clone(), handler).serve(&req, &mut sink.writer());
        let mut records = log.records();
        assert_eq!(records.len(), 1);
        records.remove(0)
    }

    fn get(uri: &str) -> Request<Bytes> {
        Request::builder().uri(uri).body(Bytes::new()).unwrap()
    }

    #[test]
    fn writes_without_status_log_ok_and_byte_total() {
        let handler = handler_fn(|_, w| {
            w.write_all(b"hello ").unwrap();
            w.write_all(b"world").unwrap();
        });
        let record = serve(handler, get("/"), &mut BufferedSink::new());

        assert_eq!(record.status, Some(StatusCode::OK));
        assert_eq!(record.bytes, 11);
    }

    #[test]
    fn first_explicit_status_is_logged() {
        let handler = handler_fn(|_, w| {
            w.write_status(StatusCode::NOT_FOUND);
            w.write_status(StatusCode::INTERNAL_SERVER_ERROR);
            w.write_all(b"missing").unwrap();
        });
        let mut sink = BufferedSink::new();
        let record = serve(handler, get("/nope"), &mut sink);

        assert_eq!(record.status, Some(StatusCode::NOT_FOUND));
        assert_eq!(record.bytes, 7);
        assert_eq!(sink.status(), Some(StatusCode::NOT_FOUND));
    }

    #[test]
    fn takeover_before_status_logs_ok() {
        let handler = handler_fn(|_, w| {
            assert!(w.supports_takeover());
            w.take_over().unwrap();
        });
        let mut sink = BufferedSink::upgradable();
        let record = serve(handler, get("/ws"), &mut sink);

        assert_eq!(record.status, Some(StatusCode::OK));
        assert_eq!(record.bytes, 0);
        assert!(sink.is_taken_over());
    }

    #[test]
    fn plain_sink_stays_plain() {
        let handler = handler_fn(|_, w| {
            assert!(!w.supports_takeover());
        });
        let record = serve(handler, get("/"), &mut BufferedSink::new());
        assert_eq!(record.status, None);
    }

    #[test]
    fn origin_prefers_forwarded_for() {
        let noop = || handler_fn(|_, _| {});
        let peer: SocketAddr = "192.0.2.7:41000".parse().unwrap();

        let mut req = get("/");
        req.headers_mut()
            .insert(X_FORWARDED_FOR, HeaderValue::from_static("203.0.113.9"));
        req.extensions_mut().insert(ConnectInfo(peer));
        assert_eq!(serve(noop(), req, &mut BufferedSink::new()).origin, "203.0.113.9");

        let mut req = get("/");
        req.headers_mut()
            .insert(X_FORWARDED_FOR, HeaderValue::from_static(""));
        req.extensions_mut().insert(ConnectInfo(peer));
        assert_eq!(serve(noop(), req, &mut BufferedSink::new()).origin, "192.0.2.7:41000");

        assert_eq!(serve(noop(), get("/"), &mut BufferedSink::new()).origin, "-");
    }

    #[test]
    fn record_captures_request_fields() {
        let req = Request::builder()
            .method(Method::POST)
            .uri("/a?x=1")
            .header(header::USER_AGENT, "curl/8.5.0")
            .body(Bytes::new())
            .unwrap();
        let record = serve(handler_fn(|_, _| {}), req, &mut BufferedSink::new());

        assert_eq!(record.method, Method::POST);
        assert_eq!(record.path, "/a?x=1");
        assert_eq!(record.user_agent, "curl/8.5.0");
    }

    struct FailingLog;

    impl AccessLogWriter for FailingLog {
        fn write_record(&self, _record: &LogRecord) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::StorageFull, "disk full"))
        }
    }

    #[test]
    fn failed_log_write_leaves_response_alone() {
        let handler = access_log(
            Arc::new(FailingLog),
            handler_fn(|_, w| {
                w.headers_mut()
                    .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
                w.write_status(StatusCode::ACCEPTED);
                w.write_all(b"queued").unwrap();
            }),
        );
        let mut sink = BufferedSink::new();
        handler.serve(&get("/jobs"), &mut sink.writer());

        assert_eq!(sink.status(), Some(StatusCode::ACCEPTED));
        assert_eq!(sink.body(), b"queued");
        let response = sink.into_response();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
    }

    #[test]
    fn formats_fixed_field_line() {
        let record = LogRecord {
            timestamp: Local.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap(),
            method: Method::GET,
            status: Some(StatusCode::OK),
            path: "/a?x=1".into(),
            origin: "10.0.0.1".into(),
            bytes: 2,
            elapsed: Duration::from_micros(12_400),
            user_agent: "curl/8.5.0".into(),
        };
        assert_eq!(
            record.to_string(),
            "2024/03/05 07:08:09 GET 200 /a?x=1 10.0.0.1 2 12.4ms 'curl/8.5.0'"
        );

        let unset = LogRecord {
            status: None,
            user_agent: String::new(),
            ..record
        };
        assert_eq!(
            unset.to_string(),
            "2024/03/05 07:08:09 GET - /a?x=1 10.0.0.1 2 12.4ms ''"
        );
    }
}
