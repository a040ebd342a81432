//! Operator-facing output
//!
//! Progress and results go to stdout, warnings to stderr. Neither is a
//! log: they are part of the command's interface.

use crate::error::Result;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

type Sink = Arc<Mutex<Box<dyn Write + Send>>>;

#[derive(Clone)]
pub struct Terminal {
    out: Sink,
    err: Sink,
}

impl Terminal {
    pub fn new(out: Box<dyn Write + Send>, err: Box<dyn Write + Send>) -> Self {
        Self {
            out: Arc::new(Mutex::new(out)),
            err: Arc::new(Mutex::new(err)),
        }
    }

    /// The process's real stdout and stderr
    pub fn stdio() -> Self {
        Self::new(Box::new(io::stdout()), Box::new(io::stderr()))
    }

    /// A terminal writing into in-memory buffers
    pub fn captured() -> (Self, Captured) {
        let captured = Captured::default();
        let terminal = Self::new(
            Box::new(SharedBuffer(captured.out.clone())),
            Box::new(SharedBuffer(captured.err.clone())),
        );
        (terminal, captured)
    }

    pub fn print(&self, text: &str) -> Result<()> {
        write_to(&self.out, text)
    }

    pub fn warn(&self, text: &str) -> Result<()> {
        write_to(&self.err, text)
    }

    /// Writer onto the same stream as [`Terminal::print`], for forwarding
    /// a child command's output
    pub fn output(&self) -> TerminalOutput {
        TerminalOutput(self.out.clone())
    }
}

/// [`Write`] handle returned by [`Terminal::output`]
pub struct TerminalOutput(Sink);

impl Write for TerminalOutput {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).write(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).flush()
    }
}

fn write_to(sink: &Sink, text: &str) -> Result<()> {
    let mut writer = sink.lock().unwrap_or_else(PoisonError::into_inner);
    writer.write_all(text.as_bytes())?;
    writer.flush()?;
    Ok(())
}

/// Buffers behind a [`Terminal::captured`] terminal
#[derive(Clone, Default)]
pub struct Captured {
    out: Arc<Mutex<Vec<u8>>>,
    err: Arc<Mutex<Vec<u8>>>,
}

impl Captured {
    pub fn stdout(&self) -> String {
        let buf = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buf).into_owned()
    }

    pub fn stderr(&self) -> String {
        let buf = self.err.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut buf = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
