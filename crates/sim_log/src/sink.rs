use std::{
    fs::File,
    io::{
        self,
        Write,
    },
    path::Path,
    sync::Arc,
};

use anyhow::Context as _;
use parking_lot::Mutex;

/// Shared destination for all loggers of one scenario.
///
/// Only one coroutine runs at a time, so the lock is never contended; it
/// exists to make the sink `Send + Sync` across the runner threads.
#[derive(Clone)]
pub struct LogSink {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl LogSink {
    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        LogSink {
            inner: Arc::new(Mutex::new(writer)),
        }
    }

    /// Sink writing the scenario log to a file.
    pub fn file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("creating scenario log {}", path.display()))?;
        Ok(Self::new(Box::new(file)))
    }

    /// Sink backed by an in-memory buffer, readable with the returned handle.
    /// Used by tests asserting on log contents.
    pub fn buffered() -> (Self, BufferHandle) {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = LogSink::new(Box::new(BufferWriter {
            buffer: buffer.clone(),
        }));
        (sink, BufferHandle { buffer })
    }

    pub(crate) fn write_all(&self, bytes: &[u8]) {
        let mut writer = self.inner.lock();
        if let Err(e) = writer.write_all(bytes) {
            tracing::warn!("log sink write failed: {e}");
        }
        let _ = writer.flush();
    }
}

pub struct BufferHandle {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl BufferHandle {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).into_owned()
    }
}

struct BufferWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl Write for BufferWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
