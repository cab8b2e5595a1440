//! Output sinks for completed log lines.
//!
//! A sink receives whole lines (without the trailing newline) and is
//! responsible for appending the terminator. Sinks are created once when a
//! logger is constructed and live for the process lifetime; write failures
//! are not retried.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Default flush interval for [`BufferedSink`].
pub const DEFAULT_BUFFER_INTERVAL: Duration = Duration::from_millis(1000);

/// Destination for completed log lines.
pub trait Sink: Send + Sync {
    /// Write one line (or one pre-joined batch of lines) plus `\n`.
    fn write_line(&self, line: &str) -> io::Result<()>;
}

/// Sink writing to the process's standard output.
pub struct StdoutSink;

impl Sink for StdoutSink {
    fn write_line(&self, line: &str) -> io::Result<()> {
        let mut out = io::stdout().lock();
        out.write_all(line.as_bytes())?;
        out.write_all(b"\n")
    }
}

/// Append-mode file sink. The file is opened (and created if absent) at
/// construction so configuration errors surface immediately.
pub struct FileSink {
    file: Mutex<File>,
    path: PathBuf,
}

impl FileSink {
    /// Open `path` for appending. A relative path is resolved against
    /// `base_dir` when one is given, otherwise against the working directory.
    pub fn open(path: impl AsRef<Path>, base_dir: Option<&Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let resolved = match base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        };
        let file = OpenOptions::new().create(true).append(true).open(&resolved)?;
        Ok(Self {
            file: Mutex::new(file),
            path: resolved,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Sink for FileSink {
    fn write_line(&self, line: &str) -> io::Result<()> {
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")
    }
}

/// In-memory sink capturing lines for tests and demos. Each `write_line`
/// call counts as one physical write.
#[derive(Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
    writes: AtomicUsize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, one entry per physical write, newline
    /// terminated.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of physical writes observed.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl Sink for MemorySink {
    fn write_line(&self, line: &str) -> io::Result<()> {
        let mut lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        lines.push(format!("{line}\n"));
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Buffering decorator: accumulates lines and flushes them to the inner sink
/// as a single physical write on a timer.
///
/// Appends go through an mpsc channel into a single consumer task, so
/// concurrent exchanges can never interleave partial lines. The task swaps
/// the accumulated batch out before writing, and flushes whatever remains
/// when the handle is dropped (channel close), so shutdown loses nothing.
pub struct BufferedSink {
    tx: mpsc::UnboundedSender<String>,
}

impl BufferedSink {
    /// Spawn the background flush task. Requires a tokio runtime.
    pub fn spawn(inner: Arc<dyn Sink>, interval: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(buffer_task(inner, rx, interval));
        Self { tx }
    }
}

impl Sink for BufferedSink {
    fn write_line(&self, line: &str) -> io::Result<()> {
        // The consumer task owns the inner sink; its write errors are
        // reported there.
        let _ = self.tx.send(line.to_string());
        Ok(())
    }
}

async fn buffer_task(
    inner: Arc<dyn Sink>,
    mut rx: mpsc::UnboundedReceiver<String>,
    interval: Duration,
) {
    let mut batch: Vec<String> = Vec::new();

    // interval_at: the first tick fires one full period out, not immediately.
    let mut flush_timer =
        tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    flush_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Some(line) => batch.push(line),
                // All senders dropped: final flush, then exit.
                None => {
                    flush(&*inner, &mut batch);
                    break;
                }
            },
            _ = flush_timer.tick() => flush(&*inner, &mut batch),
        }
    }
}

fn flush(inner: &dyn Sink, batch: &mut Vec<String>) {
    if batch.is_empty() {
        return;
    }
    let taken = std::mem::take(batch);
    let count = taken.len();
    // One physical write per flush; the inner sink appends the final newline.
    if let Err(e) = inner.write_line(&taken.join("\n")) {
        tracing::error!(error = %e, count = count, "failed to flush buffered log lines");
    } else {
        tracing::debug!(count = count, "flushed buffered log lines");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_file_sink_appends() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::open("access.log", Some(dir.path())).unwrap();
        sink.write_line("one").unwrap();
        sink.write_line("two").unwrap();

        let mut contents = String::new();
        File::open(dir.path().join("access.log"))
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "one\ntwo\n");
    }

    #[test]
    fn test_file_sink_open_failure_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        let result = FileSink::open("no/such/subdir/access.log", Some(dir.path()));
        assert!(result.is_err());
    }

    #[test]
    fn test_file_sink_absolute_path_ignores_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        let absolute = dir.path().join("abs.log");
        let sink = FileSink::open(&absolute, Some(Path::new("/nonexistent-base"))).unwrap();
        assert_eq!(sink.path(), absolute.as_path());
    }

    #[tokio::test]
    async fn test_buffered_sink_coalesces_writes() {
        let inner = Arc::new(MemorySink::new());
        let buffered = BufferedSink::spawn(inner.clone(), Duration::from_millis(100));

        buffered.write_line("line one").unwrap();
        buffered.write_line("line two").unwrap();
        buffered.write_line("line three").unwrap();

        // Nothing reaches the inner sink until the timer fires.
        assert_eq!(inner.write_count(), 0);

        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(inner.write_count(), 1);
        assert_eq!(inner.lines(), vec!["line one\nline two\nline three\n"]);
    }

    #[tokio::test]
    async fn test_buffered_sink_flushes_on_drop() {
        let inner = Arc::new(MemorySink::new());
        let buffered = BufferedSink::spawn(inner.clone(), Duration::from_secs(3600));

        buffered.write_line("pending").unwrap();
        drop(buffered);

        // Channel close triggers the final flush.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(inner.lines(), vec!["pending\n"]);
    }

    #[tokio::test]
    async fn test_buffered_sink_preserves_submission_order() {
        let inner = Arc::new(MemorySink::new());
        let buffered = BufferedSink::spawn(inner.clone(), Duration::from_millis(50));

        for i in 0..10 {
            buffered.write_line(&format!("line {i}")).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        let joined = inner.lines().concat();
        let expected: String = (0..10).map(|i| format!("line {i}\n")).collect();
        assert_eq!(joined, expected);
    }
}
