//! Append-only log file that survives external deletion and rotation.
//!
//! # Responsibilities
//! - Own the open handle of one append-only file
//! - Serialize every write, recreate and close behind one lock
//! - Recreate the file in place when a write fails, then retry once
//!
//! # Lifecycle
//! ```text
//! Open ──write fails──▶ Broken ──recreate ok──▶ Open
//!   │                     │
//!   └────── close ────────┴──────▶ Closed (terminal)
//! ```
//!
//! # Design Decisions
//! - A handle whose path no longer names it (deleted or rotated away) counts
//!   as a failed write, so the next line lands in a fresh file at the path
//! - Recreation runs while the lock is held; log lines are small and a
//!   briefly blocked writer is preferable to interleaved output
//! - Writes after close are rejected with [`LogFileError::Closed`]

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;

/// Errors reported by [`LogFile`].
#[derive(Debug, Error)]
pub enum LogFileError {
    #[error("could not open log file {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("log file is closed")]
    Closed,

    #[error("log file is not open")]
    NotOpen,

    #[error("log file was removed or replaced")]
    Detached,
}

enum State {
    Open(File),
    Broken,
    Closed,
}

/// A log file that reopens itself when writes fail.
pub struct LogFile {
    path: PathBuf,
    mode: u32,
    state: Mutex<State>,
}

impl LogFile {
    /// Open `path` for appending, creating it with permission `mode` if it
    /// does not exist.
    pub fn open(path: impl Into<PathBuf>, mode: u32) -> Result<Self, LogFileError> {
        let path = path.into();
        let file = open_append(&path, mode).map_err(|source| LogFileError::Open {
            path: path.clone(),
            source,
        })?;

        tracing::debug!(path = %path.display(), mode = %format!("{mode:o}"), "Log file opened");
        Ok(Self {
            path,
            mode,
            state: Mutex::new(State::Open(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `buf`. On failure the file is recreated and the write retried
    /// exactly once; the retry's result is returned.
    pub fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.lock();
        if matches!(*state, State::Closed) {
            return Err(io::Error::other(LogFileError::Closed));
        }

        match self.attempt(&mut state, buf) {
            Ok(n) => return Ok(n),
            Err(e) => {
                tracing::debug!(path = %self.path.display(), error = %e, "Log write failed, recreating file");
            }
        }

        if let Err(e) = self.recreate_locked(&mut state) {
            tracing::warn!(path = %self.path.display(), error = %e, "Could not recreate log file");
        }
        self.attempt(&mut state, buf)
    }

    /// Reopen the file at its path, replacing the current handle.
    ///
    /// The binary calls this on `SIGHUP`, after an external rotation.
    pub fn recreate(&self) -> io::Result<()> {
        let mut state = self.lock();
        self.recreate_locked(&mut state)
    }

    /// Close the file. Returns the result of flushing it to disk; closing
    /// again is a no-op.
    pub fn close(&self) -> io::Result<()> {
        let mut state = self.lock();
        match std::mem::replace(&mut *state, State::Closed) {
            State::Open(file) => file.sync_all(),
            State::Broken => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                LogFileError::NotOpen,
            )),
            State::Closed => Ok(()),
        }
    }

    fn attempt(&self, state: &mut State, buf: &[u8]) -> io::Result<usize> {
        match state {
            State::Open(file) => {
                if !still_linked(file, &self.path) {
                    return Err(io::Error::new(io::ErrorKind::NotFound, LogFileError::Detached));
                }
                file.write_all(buf)?;
                Ok(buf.len())
            }
            State::Broken => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                LogFileError::NotOpen,
            )),
            State::Closed => Err(io::Error::other(LogFileError::Closed)),
        }
    }

    fn recreate_locked(&self, state: &mut State) -> io::Result<()> {
        if matches!(state, State::Closed) {
            return Err(io::Error::other(LogFileError::Closed));
        }
        match open_append(&self.path, self.mode) {
            Ok(file) => {
                *state = State::Open(file);
                tracing::info!(path = %self.path.display(), "Log file recreated");
                Ok(())
            }
            Err(e) => {
                *state = State::Broken;
                Err(e)
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock leaves a valid state behind.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Write for &LogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        LogFile::write(*self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl std::fmt::Debug for LogFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogFile")
            .field("path", &self.path)
            .field("mode", &format_args!("{:o}", self.mode))
            .finish_non_exhaustive()
    }
}

fn open_append(path: &Path, mode: u32) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.create(true).append(true);
    apply_mode(&mut options, mode);
    options.open(path)
}

#[cfg(unix)]
fn apply_mode(options: &mut OpenOptions, mode: u32) {
    use std::os::unix::fs::OpenOptionsExt;
    options.mode(mode);
}

#[cfg(not(unix))]
fn apply_mode(_options: &mut OpenOptions, _mode: u32) {}

/// Whether `path` still names the file behind `file`.
#[cfg(unix)]
fn still_linked(file: &File, path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (fs::metadata(path), file.metadata()) {
        (Ok(on_disk), Ok(open)) => on_disk.dev() == open.dev() && on_disk.ino() == open.ino(),
        (Err(e), _) => e.kind() != io::ErrorKind::NotFound,
        // Let the write itself report the problem.
        (Ok(_), Err(_)) => true,
    }
}

#[cfg(not(unix))]
fn still_linked(_file: &File, path: &Path) -> bool {
    !matches!(fs::metadata(path), Err(e) if e.kind() == io::ErrorKind::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.log");
        (dir, path)
    }

    #[test]
    fn open_fails_without_parent_directory() {
        let (dir, _) = fixture();
        let path = dir.path().join("missing").join("access.log");
        let err = LogFile::open(&path, 0o644).unwrap_err();
        assert!(matches!(err, LogFileError::Open { .. }));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn appends_to_existing_content() {
        let (_dir, path) = fixture();
        fs::write(&path, "before\n").unwrap();

        let log = LogFile::open(&path, 0o644).unwrap();
        assert_eq!(log.write(b"one\n").unwrap(), 4);
        (&log).write_all(b"two\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "before\none\ntwo\n");
    }

    #[test]
    fn recreates_after_external_deletion() {
        let (_dir, path) = fixture();
        let log = LogFile::open(&path, 0o644).unwrap();
        log.write(b"lost\n").unwrap();

        fs::remove_file(&path).unwrap();
        log.write(b"after\n").unwrap();
        log.write(b"again\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "after\nagain\n");
    }

    #[test]
    fn follows_rotation_to_a_fresh_file() {
        let (dir, path) = fixture();
        let rotated = dir.path().join("access.log.1");
        let log = LogFile::open(&path, 0o644).unwrap();
        log.write(b"old\n").unwrap();

        fs::rename(&path, &rotated).unwrap();
        log.write(b"new\n").unwrap();

        assert_eq!(fs::read_to_string(&rotated).unwrap(), "old\n");
        assert_eq!(fs::read_to_string(&path).unwrap(), "new\n");
    }

    #[test]
    fn failed_recreate_leaves_sink_broken_until_next_write() {
        let (dir, _) = fixture();
        let logs = dir.path().join("logs");
        fs::create_dir(&logs).unwrap();
        let path = logs.join("access.log");
        let log = LogFile::open(&path, 0o644).unwrap();

        fs::remove_dir_all(&logs).unwrap();
        assert!(log.write(b"dropped\n").is_err());
        assert!(log.write(b"dropped\n").is_err());

        fs::create_dir(&logs).unwrap();
        log.write(b"recovered\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "recovered\n");
    }

    #[test]
    fn writes_after_close_are_rejected() {
        let (_dir, path) = fixture();
        let log = LogFile::open(&path, 0o644).unwrap();
        log.write(b"kept\n").unwrap();
        log.close().unwrap();

        let err = log.write(b"late\n").unwrap_err();
        assert!(err.to_string().contains("closed"));
        assert!(log.recreate().is_err());
        assert!(log.write(b"later\n").is_err());
        assert!(log.close().is_ok());
        assert_eq!(fs::read_to_string(&path).unwrap(), "kept\n");
    }

    #[test]
    fn concurrent_writers_do_not_interleave() {
        let (_dir, path) = fixture();
        let log = Arc::new(LogFile::open(&path, 0o644).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let log = Arc::clone(&log);
                thread::spawn(move || {
                    for i in 0..50 {
                        let line = format!("thread-{t} line-{i} {}\n", "x".repeat(64));
                        log.write(line.as_bytes()).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 400);
        assert!(lines.iter().all(|l| l.starts_with("thread-") && l.ends_with(&"x".repeat(64))));
    }

    #[cfg(unix)]
    #[test]
    fn creates_file_with_requested_mode() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, path) = fixture();
        let _log = LogFile::open(&path, 0o600).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
