//! Streaming JSON array writer
//!
//! Writes an open-ended JSON array one element at a time, without holding
//! previous elements in memory and without knowing the element count in
//! advance. The output is valid JSON once [`JsonArrayWriter::close`] runs;
//! until then it is an unterminated array.
//!
//! Layout:
//!
//! | mode    | empty    | with elements                 |
//! |---------|----------|-------------------------------|
//! | pretty  | `[\n]\n` | `[\n<el>,\n<el>\n]\n`         |
//! | compact | `[]\n`   | `[<el>,\n<el>]\n`             |
//!
//! Pretty elements are indented with two spaces. Non-ASCII text is written
//! as-is, never `\u` escaped.

use jspy_core::Message;
use std::io::{self, Write};
use thiserror::Error;
use tracing::trace;

/// Writer error type
#[derive(Error, Debug)]
pub enum WriterError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("JSON array already closed")]
    Closed,

    #[error("JSON array output failed earlier, stream is incomplete")]
    Failed,
}

pub type WriterResult<T> = Result<T, WriterError>;

/// Writer for one streaming JSON array
pub struct JsonArrayWriter<W: Write> {
    writer: W,
    pretty: bool,
    flush_each: bool,
    elements: u64,
    closed: bool,
    failed: bool,
}

impl<W: Write> JsonArrayWriter<W> {
    /// Write the opening bracket and start a new array
    pub fn open(mut writer: W, pretty: bool) -> WriterResult<Self> {
        writer.write_all(if pretty { b"[\n" } else { b"[" })?;
        writer.flush()?;

        Ok(Self {
            writer,
            pretty,
            flush_each: true,
            elements: 0,
            closed: false,
            failed: false,
        })
    }

    /// Flush after each element (default: on)
    pub fn with_flush_each(mut self, flush_each: bool) -> Self {
        self.flush_each = flush_each;
        self
    }

    /// Append one message as an array element.
    ///
    /// The element is rendered in full before anything is written, so a
    /// serialization failure leaves the stream untouched. The separator and
    /// the element go out in a single write. After an I/O error the stream
    /// state is unknown and every later call returns [`WriterError::Failed`].
    pub fn write(&mut self, message: &Message) -> WriterResult<()> {
        self.check_usable()?;

        let mut chunk = Vec::new();
        if self.elements > 0 {
            chunk.extend_from_slice(b",\n");
        }
        if self.pretty {
            serde_json::to_writer_pretty(&mut chunk, message)?;
        } else {
            serde_json::to_writer(&mut chunk, message)?;
        }

        self.emit(&chunk, self.flush_each)?;
        self.elements += 1;
        trace!(elements = self.elements, "Wrote message to JSON array");
        Ok(())
    }

    /// Write the closing bracket. The array is complete JSON afterwards.
    pub fn close(&mut self) -> WriterResult<()> {
        self.check_usable()?;
        self.closed = true;

        let closing: &[u8] = if self.pretty && self.elements > 0 {
            b"\n]\n"
        } else {
            b"]\n"
        };
        self.emit(closing, true)
    }

    fn check_usable(&self) -> WriterResult<()> {
        if self.closed {
            Err(WriterError::Closed)
        } else if self.failed {
            Err(WriterError::Failed)
        } else {
            Ok(())
        }
    }

    fn emit(&mut self, bytes: &[u8], flush: bool) -> WriterResult<()> {
        let result = self.writer.write_all(bytes).and_then(|()| {
            if flush {
                self.writer.flush()
            } else {
                Ok(())
            }
        });
        if result.is_err() {
            self.failed = true;
        }
        result.map_err(WriterError::from)
    }

    /// Number of elements written so far
    pub fn elements(&self) -> u64 {
        self.elements
    }

    pub fn is_pretty(&self) -> bool {
        self.pretty
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// True once an I/O error has left the stream incomplete
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Give back the underlying writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn msg(msg_type: &str, text: &str) -> Message {
        Message::from_value(json!({
            "header": {"msg_id": text, "msg_type": msg_type},
            "parent_header": {},
            "metadata": {},
            "content": {"text": text}
        }))
        .unwrap()
    }

    fn output(writer: JsonArrayWriter<Vec<u8>>) -> String {
        String::from_utf8(writer.into_inner()).unwrap()
    }

    /// Buffer whose `fail_on`-th write call returns an error
    struct FailingWriter {
        buf: Vec<u8>,
        calls: usize,
        fail_on: usize,
    }

    impl FailingWriter {
        fn new(fail_on: usize) -> Self {
            Self { buf: Vec::new(), calls: 0, fail_on }
        }
    }

    impl Write for FailingWriter {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.calls += 1;
            if self.calls == self.fail_on {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            self.buf.extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_empty_compact() {
        let mut writer = JsonArrayWriter::open(Vec::new(), false).unwrap();
        writer.close().unwrap();
        let out = output(writer);
        assert_eq!(out, "[]\n");
        assert_eq!(serde_json::from_str::<Value>(&out).unwrap(), json!([]));
    }

    #[test]
    fn test_empty_pretty() {
        let mut writer = JsonArrayWriter::open(Vec::new(), true).unwrap();
        writer.close().unwrap();
        let out = output(writer);
        assert_eq!(out, "[\n]\n");
        assert_eq!(serde_json::from_str::<Value>(&out).unwrap(), json!([]));
    }

    #[test]
    fn test_compact_separators() {
        let mut writer = JsonArrayWriter::open(Vec::new(), false).unwrap();
        writer.write(&msg("stream", "a")).unwrap();
        writer.write(&msg("stream", "b")).unwrap();
        writer.close().unwrap();
        let out = output(writer);

        assert!(out.starts_with("[{"));
        assert!(out.ends_with("}]\n"));
        assert_eq!(out.matches(",\n").count(), 1);

        let parsed: Vec<Message> = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed, vec![msg("stream", "a"), msg("stream", "b")]);
    }

    #[test]
    fn test_pretty_layout() {
        let mut writer = JsonArrayWriter::open(Vec::new(), true).unwrap();
        writer.write(&msg("stream", "a")).unwrap();
        writer.close().unwrap();
        let out = output(writer);

        assert!(out.starts_with("[\n{\n  \"header\""));
        assert!(out.ends_with("}\n]\n"));
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_many_elements_valid_json() {
        let mut writer = JsonArrayWriter::open(Vec::new(), true).unwrap();
        for i in 0..50 {
            writer.write(&msg("stream", &i.to_string())).unwrap();
        }
        assert_eq!(writer.elements(), 50);
        writer.close().unwrap();

        let parsed: Vec<Message> = serde_json::from_str(&output(writer)).unwrap();
        let ids: Vec<_> = parsed.iter().map(|m| m.msg_id().unwrap().to_string()).collect();
        let expected: Vec<_> = (0..50).map(|i| i.to_string()).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_non_ascii_written_literally() {
        let mut writer = JsonArrayWriter::open(Vec::new(), false).unwrap();
        writer.write(&msg("stream", "naïve ☃")).unwrap();
        writer.close().unwrap();
        let out = output(writer);
        assert!(out.contains("naïve ☃"));
        assert!(!out.contains("\\u"));
    }

    #[test]
    fn test_write_after_close() {
        let mut writer = JsonArrayWriter::open(Vec::new(), false).unwrap();
        writer.close().unwrap();
        assert!(matches!(
            writer.write(&msg("stream", "late")),
            Err(WriterError::Closed)
        ));
        assert!(matches!(writer.close(), Err(WriterError::Closed)));
    }

    #[test]
    fn test_io_error_stops_further_output() {
        // open: call 1, first element: call 2, second element: call 3
        let mut writer = JsonArrayWriter::open(FailingWriter::new(3), false).unwrap();
        writer.write(&msg("stream", "a")).unwrap();
        let before = writer.writer.buf.clone();

        assert!(matches!(
            writer.write(&msg("stream", "b")),
            Err(WriterError::Io(_))
        ));
        assert!(writer.is_failed());
        assert_eq!(writer.elements(), 1);

        assert!(matches!(
            writer.write(&msg("stream", "c")),
            Err(WriterError::Failed)
        ));
        assert!(matches!(writer.close(), Err(WriterError::Failed)));
        assert!(!writer.is_closed());

        let out = writer.into_inner().buf;
        assert_eq!(out, before);
        assert!(!String::from_utf8(out).unwrap().contains(",\n,\n"));
    }

    #[test]
    fn test_separator_and_element_written_together() {
        let mut writer = JsonArrayWriter::open(FailingWriter::new(usize::MAX), false).unwrap();
        writer.write(&msg("stream", "a")).unwrap();
        writer.write(&msg("stream", "b")).unwrap();
        // one call for `[` and one per element
        assert_eq!(writer.writer.calls, 3);
    }

    #[test]
    fn test_unclosed_array_is_incomplete() {
        let mut writer = JsonArrayWriter::open(Vec::new(), false).unwrap();
        writer.write(&msg("stream", "a")).unwrap();
        assert!(serde_json::from_str::<Value>(&output(writer)).is_err());
    }
}
