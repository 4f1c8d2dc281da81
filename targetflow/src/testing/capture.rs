//! In-memory capture of build log output.

use crate::logging::BuildLogFormat;
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

/// Collects build log lines written while installed.
///
/// The capture is installed as the thread-local default subscriber, so it
/// sees events from the current thread only. Use it with
/// `#[tokio::test(flavor = "current_thread")]` when spawned tasks log.
#[derive(Debug, Clone, Default)]
pub struct LogCapture {
    buf: Arc<Mutex<Vec<u8>>>,
    ansi: bool,
    verbose: bool,
}

impl LogCapture {
    /// Creates a capture without ANSI colors.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a capture, with or without ANSI colors.
    #[must_use]
    pub fn with_ansi(ansi: bool) -> Self {
        Self {
            ansi,
            ..Self::default()
        }
    }

    /// Also captures debug-level records such as lifecycle events.
    #[must_use]
    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }

    /// Installs the capture until the returned guard is dropped.
    #[must_use]
    pub fn install(&self) -> DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(self.ansi)
            .with_max_level(if self.verbose {
                tracing::Level::DEBUG
            } else {
                tracing::Level::INFO
            })
            .event_format(BuildLogFormat::new(self.ansi))
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    /// Returns everything captured so far.
    #[must_use]
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock()).into_owned()
    }

    /// Returns the captured lines.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(ToString::to_string).collect()
    }

    /// Returns true if any captured output contains `needle`.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.contents().contains(needle)
    }
}

/// Writer handed out by [`LogCapture`].
#[derive(Debug)]
pub struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

impl io::Write for CaptureWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = CaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CaptureWriter(self.buf.clone())
    }
}
