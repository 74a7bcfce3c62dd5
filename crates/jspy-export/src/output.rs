//! Output targets

use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Where a capture writes its JSON array
pub enum Output {
    /// Process standard output
    Stdout,
    /// A file, created or truncated when the capture starts
    File(PathBuf),
    /// Any other writer
    Writer(Box<dyn Write + Send>),
}

impl Output {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    pub fn writer<W: Write + Send + 'static>(writer: W) -> Self {
        Self::Writer(Box::new(writer))
    }

    pub fn is_stdout(&self) -> bool {
        matches!(self, Self::Stdout)
    }

    /// Pretty printing defaults to on for stdout and off everywhere else
    pub fn resolve_pretty(&self, pretty: Option<bool>) -> bool {
        pretty.unwrap_or_else(|| self.is_stdout())
    }

    /// Open the target for writing
    pub fn into_writer(self) -> io::Result<Box<dyn Write + Send>> {
        match self {
            Self::Stdout => Ok(Box::new(io::stdout())),
            Self::File(path) => {
                let file = File::create(&path)?;
                info!("Writing messages to: {}", path.display());
                Ok(Box::new(BufWriter::new(file)))
            }
            Self::Writer(writer) => Ok(writer),
        }
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::Stdout
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => f.write_str("Stdout"),
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
            Self::Writer(_) => f.write_str("Writer(..)"),
        }
    }
}

/// In-memory output that stays readable while a capture writes to it
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything written so far
    pub fn contents(&self) -> Vec<u8> {
        match self.inner.lock() {
            Ok(buf) => buf.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Everything written so far, lossily decoded as UTF-8
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut buf = self
            .inner
            .lock()
            .map_err(|e| io::Error::other(format!("Lock poisoned: {}", e)))?;
        buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pretty_defaults_to_stdout_only() {
        assert!(Output::Stdout.resolve_pretty(None));
        assert!(!Output::file("/tmp/x.json").resolve_pretty(None));
        assert!(!Output::writer(Vec::new()).resolve_pretty(None));
    }

    #[test]
    fn test_explicit_pretty_wins() {
        assert!(!Output::Stdout.resolve_pretty(Some(false)));
        assert!(Output::writer(Vec::new()).resolve_pretty(Some(true)));
    }

    #[test]
    fn test_file_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let mut writer = Output::file(&path).into_writer().unwrap();
        writer.write_all(b"[]").unwrap();
        writer.flush().unwrap();
        drop(writer);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[]");
    }

    #[test]
    fn test_shared_buffer_visible_through_clone() {
        let buffer = SharedBuffer::new();
        let mut writer = Output::writer(buffer.clone()).into_writer().unwrap();
        writer.write_all("héllo".as_bytes()).unwrap();
        assert_eq!(buffer.to_string_lossy(), "héllo");
    }
}
